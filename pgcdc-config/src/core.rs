use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs::read_to_string;
use std::path::Path;
use std::time::Duration;

use super::destination::DestinationConfig;
use super::error::Error;
use super::source::SourceConfig;
use super::table::TableConfig;

/// Log output format.
///
/// https://docs.pgcdc.dev/configuration/pgcdc.toml/general/#log_format
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable, single line per event (default).
    #[default]
    Plain,
    /// Structured JSON, one object per line.
    Json,
}

fn default_status_interval_ms() -> u64 {
    10_000
}

fn default_sync_batch_rows() -> usize {
    10_000
}

/// Top-level configuration, normally loaded from `pgcdc.toml`.
///
/// https://docs.pgcdc.dev/configuration/pgcdc.toml/
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Source database connection settings.
    pub source: SourceConfig,

    /// Destination database connection settings.
    pub destination: DestinationConfig,

    /// Name of the publication on the source containing the tables to
    /// replicate. The publication must already exist.
    pub publication_name: String,

    /// Name of the (permanent) logical replication slot used for the
    /// ongoing stream. Auto-generated if not set.
    #[serde(default)]
    pub replication_slot: Option<String>,

    /// Source table name -> projection settings.
    pub tables: IndexMap<String, TableConfig>,

    /// How often, in milliseconds, to send standby status updates back to
    /// the source while streaming.
    ///
    /// _Default:_ `10000`
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,

    /// Maximum number of rows buffered per table during the initial sync
    /// before a batch is flushed to the destination.
    ///
    /// _Default:_ `10000`
    #[serde(default = "default_sync_batch_rows")]
    pub sync_batch_rows: usize,

    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Config {
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    /// Load and validate configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let contents =
            read_to_string(path).map_err(|e| Error::Io(display.clone(), e))?;
        Self::from_toml_str(&contents, &display)
    }

    /// Parse and validate configuration from a TOML string. `name` is used
    /// only for error messages.
    pub fn from_toml_str(contents: &str, name: &str) -> Result<Self, Error> {
        let config: Self =
            toml::from_str(contents).map_err(|e| Error::Parse(name.to_string(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, logging non-fatal warnings for risky but
    /// legal settings (e.g. `MergeTree` tables, which tolerate duplicates
    /// after a restart rather than failing outright).
    pub fn validate(&self) -> Result<(), Error> {
        if self.tables.is_empty() {
            return Err(Error::NoTables);
        }

        for (name, table) in &self.tables {
            if table.engine.requires_version_column() && table.version_column.is_none() {
                return Err(Error::MissingVersionColumn(
                    name.clone(),
                    table.engine.to_string(),
                ));
            }

            if table.engine.requires_sign_column() && table.sign_column.is_none() {
                return Err(Error::MissingSignColumn(
                    name.clone(),
                    table.engine.to_string(),
                ));
            }

            if !table.engine.tolerates_duplicates() {
                tracing::warn!(
                    "table \"{}\" uses MergeTree: a restart before the last standby status \
                     update is acknowledged can re-apply already-committed rows as duplicates",
                    name
                );
            }

            if table.engine == super::engine::TableEngineKind::MergeTree
                && (table.sign_column.is_some() || table.version_column.is_some())
            {
                tracing::warn!(
                    "table \"{}\": sign_column/version_column is ignored by MergeTree",
                    name
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::TableEngineKind;

    fn sample(engine: &str, extra: &str) -> String {
        format!(
            r#"
publication_name = "pub1"

[source]
host = "localhost"
user = "replicator"
database = "app"

[destination]
url = "http://localhost:8123"

[tables.orders]
engine = "{engine}"
{extra}
"#
        )
    }

    #[test]
    fn parses_minimal_merge_tree_config() {
        let config = Config::from_toml_str(&sample("merge_tree", ""), "test").unwrap();
        assert_eq!(config.tables["orders"].engine, TableEngineKind::MergeTree);
        assert_eq!(config.status_interval_ms, 10_000);
    }

    #[test]
    fn rejects_replacing_without_version_column() {
        let err = Config::from_toml_str(&sample("replacing_merge_tree", ""), "test").unwrap_err();
        assert!(matches!(err, Error::MissingVersionColumn(_, _)));
    }

    #[test]
    fn rejects_collapsing_without_sign_column() {
        let err = Config::from_toml_str(&sample("collapsing_merge_tree", ""), "test").unwrap_err();
        assert!(matches!(err, Error::MissingSignColumn(_, _)));
    }

    #[test]
    fn accepts_versioned_collapsing_with_both_columns() {
        let extra = "sign_column = \"sign\"\nversion_column = \"ver\"\n";
        let config =
            Config::from_toml_str(&sample("versioned_collapsing_merge_tree", extra), "test")
                .unwrap();
        assert_eq!(
            config.tables["orders"].engine,
            TableEngineKind::VersionedCollapsingMergeTree
        );
    }

    #[test]
    fn rejects_empty_tables() {
        let toml = r#"
publication_name = "pub1"

[source]
host = "localhost"
user = "replicator"
database = "app"

[destination]
url = "http://localhost:8123"

[tables]
"#;
        let err = Config::from_toml_str(toml, "test").unwrap_err();
        assert!(matches!(err, Error::NoTables));
    }

    #[test]
    fn destination_name_defaults_to_source_name() {
        let config = Config::from_toml_str(&sample("merge_tree", ""), "test").unwrap();
        let table = &config.tables["orders"];
        assert_eq!(table.destination_name("orders"), "orders");
    }
}
