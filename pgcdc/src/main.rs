use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use pgcdc::bootstrap;
use pgcdc::coordinator::Coordinator;
use pgcdc::destination::DestinationClient;
use pgcdc::lifecycle::listen_for_shutdown;
use pgcdc::registry::RelationRegistry;
use pgcdc::source::SourceClient;
use pgcdc::stream::StreamConsumer;
use pgcdc::Error;
use pgcdc_config::Config;
use tokio::sync::Notify;
use tracing::{error, info};

/// Replicates PostgreSQL logical-replication changes into a columnar
/// analytical database.
#[derive(Parser, Debug)]
#[command(name = "pgcdc", version)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "pgcdc.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Bootstrap (if needed) and start streaming.
    Run,

    /// Parse and validate the configuration file without connecting to
    /// anything.
    Configcheck,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command.clone().unwrap_or(Commands::Run) {
        Commands::Configcheck => config_check(&cli.config),
        Commands::Run => {
            if let Err(err) = run(&cli.config).await {
                eprintln!("pgcdc: {}", err);
                std::process::exit(1);
            }
        }
    }
}

fn config_check(path: &PathBuf) {
    match Config::load(path) {
        Ok(_) => println!("{}: OK", path.display()),
        Err(err) => {
            eprintln!("{}: {}", path.display(), err);
            std::process::exit(1);
        }
    }
}

async fn run(config_path: &PathBuf) -> Result<(), Error> {
    let config = Config::load(config_path)?;
    pgcdc::logger(config.log_format);

    info!("starting pgcdc");

    let source = SourceClient::connect(&config.source).await?;
    let destination = DestinationClient::new(&config.destination);
    destination
        .ping()
        .await
        .map_err(|_| Error::DestinationConnect(config.destination.url.clone()))?;

    let replication_client = SourceClient::connect_replication(&config.source).await?;
    let snapshot = bootstrap::open_snapshot(&replication_client).await?;

    let slot_name = config
        .replication_slot
        .clone()
        .unwrap_or_else(|| format!("pgcdc_{}", pgcdc::util::random_string(19)));
    let from_lsn = bootstrap::ensure_replication_slot(&replication_client, &slot_name, &snapshot).await?;

    let mut registry = RelationRegistry::new();
    registry
        .load(
            &source,
            &config.publication_name,
            &config.tables.keys().cloned().collect::<Vec<_>>(),
        )
        .await?;

    info!("running initial snapshot sync");
    let adapters =
        bootstrap::sync_tables(&source, &replication_client, &config, &destination, &snapshot)
            .await?;

    info!(slot = %slot_name, from_lsn = %from_lsn, "starting replication stream");
    let replication_stream = replication_client
        .start_replication(&slot_name, &config.publication_name, from_lsn)
        .await?;
    let consumer = StreamConsumer::new(replication_stream);

    let shutdown = Arc::new(Notify::new());
    tokio::spawn(listen_for_shutdown(shutdown.clone()));

    let mut coordinator = Coordinator::new(
        Box::new(consumer),
        registry,
        adapters,
        config.status_interval(),
        shutdown,
        from_lsn,
    );

    let result = coordinator.run().await;
    if let Err(err) = &result {
        error!("replication stopped: {}", err);
    }
    info!(lsn = %coordinator.last_applied(), "stopped");
    result
}
