use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Connection settings for the logical-replication source.
///
/// https://docs.pgcdc.dev/configuration/pgcdc.toml/source/
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// IP address or DNS name of the source Postgres server.
    pub host: String,

    /// Port the source Postgres server is listening on.
    ///
    /// _Default:_ `5432`
    #[serde(default = "SourceConfig::default_port")]
    pub port: u16,

    /// User Postgres replicates as. Must have the `REPLICATION` attribute.
    pub user: String,

    /// Password for `user`.
    #[serde(default)]
    pub password: Option<String>,

    /// Name of the source database.
    pub database: String,
}

impl SourceConfig {
    fn default_port() -> u16 {
        5432
    }
}
