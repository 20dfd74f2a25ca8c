use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error reading \"{0}\": {1}")]
    Io(String, #[source] std::io::Error),

    #[error("TOML parse error in \"{0}\": {1}")]
    Parse(String, #[source] toml::de::Error),

    #[error("no tables configured")]
    NoTables,

    #[error("table \"{0}\": engine {1} requires `version_column`")]
    MissingVersionColumn(String, String),

    #[error("table \"{0}\": engine {1} requires `sign_column`")]
    MissingSignColumn(String, String),
}
