use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Connection settings for the columnar destination database.
///
/// https://docs.pgcdc.dev/configuration/pgcdc.toml/destination/
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DestinationConfig {
    /// HTTP endpoint of the destination cluster, e.g. `http://localhost:8123`.
    pub url: String,

    /// Destination database name. Defaults to `default`.
    #[serde(default = "DestinationConfig::default_database")]
    pub database: String,

    /// Optional HTTP basic-auth user.
    #[serde(default)]
    pub user: Option<String>,

    /// Optional HTTP basic-auth password.
    #[serde(default)]
    pub password: Option<String>,
}

impl DestinationConfig {
    fn default_database() -> String {
        "default".to_string()
    }
}
