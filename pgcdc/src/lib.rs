pub mod bootstrap;
pub mod coordinator;
pub mod destination;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod lsn;
pub mod registry;
pub mod source;
pub mod stream;
pub mod util;
pub mod wire;

pub use error::Error;

use pgcdc_config::LogFormat;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` controls verbosity;
/// `format` picks between human-readable and structured JSON output, the
/// latter meant for shipping to a log aggregator.
pub fn logger(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Plain => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}
