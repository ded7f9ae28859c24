//! sqlsheet - PostgreSQL to spreadsheet exporter
//!
//! Runs a query and streams its rows into an xlsx or CSV file with bounded
//! memory use.
//!
//! # Usage
//!
//! ```bash
//! sqlsheet "SELECT * FROM orders" \
//!     --database-url postgres://app@localhost/shop \
//!     -o orders.xlsx
//! ```

use std::time::Instant;

use tracing::{Level, debug, info};

use sqlsheet::cli::CliInterface;
use sqlsheet::connection::ConnectionManager;
use sqlsheet::error::Result;
use sqlsheet::export::{ExportCoordinator, PgRowSource, ProgressTracker, open_sink};

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error ({}): {}", e.phase(), e);
        std::process::exit(1);
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Handle subcommands or run the export
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;

    initialize_logging(&cli);

    if cli.handle_subcommand()? {
        return Ok(());
    }

    run_export(&cli).await
}

/// Run one export with the effective configuration
async fn run_export(cli: &CliInterface) -> Result<()> {
    let config = cli.config();
    config.validate()?;

    let start_time = Instant::now();
    let export = &config.export;

    // Fail on a bad output path before touching the database
    let format = export.resolved_format();
    let sink = open_sink(format, &export.output, &export.sheet_name)?;
    info!("Writing {:?} to {}", format, export.output.display());

    let manager = ConnectionManager::new(&config.connection)?;
    debug!("Using database {}", manager.display_url());
    let client = manager.acquire().await?;
    let source = PgRowSource::open(client, &export.query).await?;

    let tracker = ProgressTracker::new(export.progress && !cli.is_quiet());
    let outcome = ExportCoordinator::new(Box::new(source), sink, tracker)
        .with_batch_size(export.batch_size)
        .with_queue_capacity(export.queue_capacity)
        .with_start_time(start_time)
        .execute()
        .await;

    manager.trim_idle();
    manager.close();

    let result = outcome?;
    info!(
        "Saved {} ({} bytes, {} batches)",
        export.output.display(),
        result.file_size_bytes,
        result.batches
    );

    if !cli.is_quiet() {
        println!();
        println!("{result}");
    }

    Ok(())
}

/// Initialize logging system based on verbosity level
///
/// # Arguments
/// * `cli` - CLI interface with verbosity settings
fn initialize_logging(cli: &CliInterface) {
    let level = if cli.args().very_verbose {
        Level::TRACE
    } else if cli.args().verbose {
        Level::DEBUG
    } else {
        cli.config().logging.level.to_tracing_level()
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
