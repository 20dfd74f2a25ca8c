use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::engine::TableEngineKind;

/// A single source table projected into the destination.
///
/// https://docs.pgcdc.dev/configuration/pgcdc.toml/tables/
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    /// Destination table engine.
    pub engine: TableEngineKind,

    /// Name of the table on the destination, if different from the source
    /// table name. Defaults to the source table's name.
    pub destination_table: Option<String>,

    /// Column used by `ReplacingMergeTree` and `VersionedCollapsingMergeTree`
    /// to select the surviving row. Required for those engines.
    pub version_column: Option<String>,

    /// Column used by `CollapsingMergeTree` and `VersionedCollapsingMergeTree`
    /// to cancel a row against its predecessor. Required for those engines.
    pub sign_column: Option<String>,
}

impl TableConfig {
    /// Name of the table on the destination.
    pub fn destination_name<'a>(&'a self, source_table: &'a str) -> &'a str {
        self.destination_table.as_deref().unwrap_or(source_table)
    }
}
