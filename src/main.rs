//! kvlog server - a networked key-value store backed by a replayable
//! transaction log.

use anyhow::{Context, Result};
use clap::{Parser as ClapParser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use kvlog::network::Server;
use kvlog::replay;
use kvlog::store::KeyValueStore;
use kvlog::wal::TransactionLogger;

/// kvlog server - a key-value store with a durable transaction log
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7171")]
    port: u16,

    /// Host to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Data directory
    #[arg(short = 'D', long, default_value = "./kvlog_data")]
    data_dir: PathBuf,

    /// Transaction log backend
    #[arg(short, long, value_enum, default_value = "file")]
    backend: Backend,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Maximum concurrent connections
    #[arg(short = 'c', long, default_value = "100")]
    max_connections: usize,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Backend {
    /// Append-only log file
    File,
    /// SQLite transactions table
    Sqlite,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    // Create data directory if it doesn't exist
    std::fs::create_dir_all(&args.data_dir).context("Failed to create data directory")?;

    // A broken transaction log is fatal: the service must not start if its
    // durability layer cannot be opened.
    let logger = match args.backend {
        Backend::File => {
            let path = args.data_dir.join("transactions.log");
            log::info!("using file transaction log at {}", path.display());
            TransactionLogger::with_file(&path)
                .with_context(|| format!("Failed to open transaction log at {}", path.display()))?
        }
        Backend::Sqlite => {
            let path = args.data_dir.join("transactions.db");
            log::info!("using sqlite transaction log at {}", path.display());
            TransactionLogger::with_sqlite(&path)
                .with_context(|| format!("Failed to open transaction log at {}", path.display()))?
        }
    };
    let logger = Arc::new(logger);

    // Rebuild store state from the log before serving any request.
    let store = Arc::new(KeyValueStore::new());
    let applied = replay::restore(&store, &logger)
        .await
        .context("Transaction log replay failed")?;
    log::info!("replayed {} events, {} keys restored", applied, store.len());

    // Start the background persister, then monitor its error feed: a persist
    // failure after startup is a durability gap, logged but not fatal.
    logger.run().context("Failed to start the log persister")?;

    let mut error_feed = logger
        .errors()
        .context("Transaction log error feed already taken")?;
    tokio::spawn(async move {
        while let Some(err) = error_feed.recv().await {
            log::error!("durability gap: transaction log write failed: {}", err);
        }
    });

    // Create and start the server
    let addr = SocketAddr::from((
        args.host
            .parse::<std::net::IpAddr>()
            .context("Invalid host address")?,
        args.port,
    ));

    let server = Server::new(store, logger.clone(), args.max_connections);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run(Some(addr)).await {
            log::error!("server error: {}", e);
        }
    });

    // Wait for Ctrl+C
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    log::info!("shutting down");
    server_handle.abort();

    // Drain pending writes and release the backend.
    logger
        .close()
        .await
        .context("Failed to close the transaction log")?;

    Ok(())
}
