use thiserror::Error;

use crate::engine::FlushError;

/// Top-level error. Every fatal path the coordinator can take rolls up into
/// one of these variants, which `main` matches on to pick an exit code and a
/// one-line log message.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration: {0}")]
    Config(#[from] pgcdc_config::Error),

    #[error("source connect: {0}")]
    SourceConnect(#[source] tokio_postgres::Error),

    #[error("destination connect: {0}")]
    DestinationConnect(String),

    #[error("table \"{0}\" has replica identity {1:?}, expected full")]
    ReplicaIdentity(String, crate::registry::ReplicaIdentity),

    #[error("table \"{0}\": no relation found in publication for configured table")]
    UnknownTable(String),

    #[error("unsupported table engine: {0}")]
    UnsupportedEngine(String),

    #[error("initial sync of \"{0}\" failed: {1}")]
    Sync(String, #[source] Box<Error>),

    #[error("decode error: {0}")]
    Decode(#[from] crate::wire::Error),

    #[error("flush failed for table \"{0}\": {1}")]
    Flush(String, #[source] FlushError),

    #[error("source protocol: {0}")]
    Source(#[from] tokio_postgres::Error),

    #[error("destination protocol: {0}")]
    Destination(#[from] reqwest::Error),

    #[error("unexpected reply from source during {0}")]
    OutOfSync(&'static str),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
