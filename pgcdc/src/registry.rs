//! Maps source relation OIDs to the logical table names used in
//! configuration, and caches each table's replica identity.

use std::collections::HashMap;

use crate::error::Error;
use crate::source::SourceClient;

/// Mirrors Postgres' `pg_class.relreplident`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ReplicaIdentity {
    Default,
    Nothing,
    Full,
    Index,
}

impl ReplicaIdentity {
    fn from_char(c: char) -> Option<Self> {
        match c {
            'd' => Some(Self::Default),
            'n' => Some(Self::Nothing),
            'f' => Some(Self::Full),
            'i' => Some(Self::Index),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    table_name: String,
    identity: ReplicaIdentity,
}

/// Relation-id -> table-name map, populated once at bootstrap from the
/// source's system catalogs and read-only for the rest of the process'
/// lifetime (schema evolution at runtime is out of scope).
#[derive(Debug, Default)]
pub struct RelationRegistry {
    entries: HashMap<i32, Entry>,
}

impl RelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every ordinary table belonging to `publication_name`, failing if
    /// any *configured* table lacks `full` replica identity. Idempotent:
    /// replaces the whole map rather than merging into it.
    pub async fn load(
        &mut self,
        client: &SourceClient,
        publication_name: &str,
        configured_tables: &[String],
    ) -> Result<(), Error> {
        let rows = client
            .query(
                "SELECT c.oid, n.nspname, c.relname, c.relreplident \
                 FROM pg_publication_tables pt \
                 JOIN pg_namespace n ON n.nspname = pt.schemaname \
                 JOIN pg_class c ON c.relname = pt.tablename AND c.relnamespace = n.oid \
                 WHERE pt.pubname = $1 AND c.relkind = 'r'",
                &[&publication_name],
            )
            .await?;

        let mut entries = HashMap::with_capacity(rows.len());

        for row in rows {
            let oid: i32 = row.get(0);
            let table_name: String = row.get(2);
            let identity_char: i8 = row.get(3);
            let identity = ReplicaIdentity::from_char(identity_char as u8 as char)
                .unwrap_or(ReplicaIdentity::Default);

            if configured_tables.iter().any(|t| t == &table_name) && identity != ReplicaIdentity::Full
            {
                return Err(Error::ReplicaIdentity(table_name, identity));
            }

            entries.insert(
                oid,
                Entry {
                    table_name,
                    identity,
                },
            );
        }

        self.entries = entries;
        Ok(())
    }

    /// Resolve a relation id to its configured logical table name. Absent is
    /// not an error: the caller should silently discard the message.
    pub fn resolve(&self, relation_id: i32) -> Option<&str> {
        self.entries.get(&relation_id).map(|e| e.table_name.as_str())
    }

    #[cfg(test)]
    pub(crate) fn insert_for_test(&mut self, relation_id: i32, table_name: String) {
        self.entries.insert(
            relation_id,
            Entry {
                table_name,
                identity: ReplicaIdentity::Full,
            },
        );
    }
}

impl std::fmt::Debug for ReplicaIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Default => "default",
            Self::Nothing => "nothing",
            Self::Full => "full",
            Self::Index => "index",
        };
        write!(f, "{}", s)
    }
}
