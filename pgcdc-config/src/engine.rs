use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Destination table engine. Determines how row-level mutations are folded
/// into append-only columnar storage.
///
/// https://docs.pgcdc.dev/configuration/pgcdc.toml/tables/#engine
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TableEngineKind {
    /// Append-only. Updates and deletes are dropped.
    MergeTree,
    /// Every mutation becomes an insert; the engine keeps only the row with
    /// the highest value in `version_column`.
    ReplacingMergeTree,
    /// Every row carries a sign column. Deletes/updates are expressed as a
    /// cancelling pair of rows.
    CollapsingMergeTree,
    /// Like `CollapsingMergeTree`, but every emitted row also carries a
    /// monotonically increasing version column.
    VersionedCollapsingMergeTree,
}

impl TableEngineKind {
    /// Whether this engine requires a `version_column` to be configured.
    pub fn requires_version_column(&self) -> bool {
        matches!(
            self,
            Self::ReplacingMergeTree | Self::VersionedCollapsingMergeTree
        )
    }

    /// Whether this engine requires a `sign_column` to be configured.
    pub fn requires_sign_column(&self) -> bool {
        matches!(
            self,
            Self::CollapsingMergeTree | Self::VersionedCollapsingMergeTree
        )
    }

    /// Plain `MergeTree` silently drops updates/deletes; operators who pick
    /// it accept at-least-once duplicates on restart.
    pub fn tolerates_duplicates(&self) -> bool {
        !matches!(self, Self::MergeTree)
    }
}

impl Display for TableEngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::MergeTree => "MergeTree",
            Self::ReplacingMergeTree => "ReplacingMergeTree",
            Self::CollapsingMergeTree => "CollapsingMergeTree",
            Self::VersionedCollapsingMergeTree => "VersionedCollapsingMergeTree",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for TableEngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['_', '-'], "").as_str() {
            "mergetree" => Ok(Self::MergeTree),
            "replacingmergetree" => Ok(Self::ReplacingMergeTree),
            "collapsingmergetree" => Ok(Self::CollapsingMergeTree),
            "versionedcollapsingmergetree" => Ok(Self::VersionedCollapsingMergeTree),
            _ => Err(format!("unknown table engine: {}", s)),
        }
    }
}
