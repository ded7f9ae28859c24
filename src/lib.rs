//! sqlsheet library
//!
//! Streams the result of a PostgreSQL query into a spreadsheet file without
//! holding the result set in memory. Rows are read in fixed-size batches and
//! handed through a bounded queue to a single writer task.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `connection`: PostgreSQL connection pool
//! - `error`: Error types and handling
//! - `export`: The streaming export pipeline
//!
//! # Example
//!
//! ```no_run
//! use sqlsheet::config::{Config, ExportFormat};
//! use sqlsheet::connection::ConnectionManager;
//! use sqlsheet::export::{ExportCoordinator, PgRowSource, ProgressTracker, open_sink};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let manager = ConnectionManager::new(&config.connection)?;
//!
//!     let sink = open_sink(ExportFormat::Xlsx, "orders.xlsx".as_ref(), "Orders")?;
//!     let source = PgRowSource::open(manager.acquire().await?, "SELECT * FROM orders").await?;
//!
//!     let result = ExportCoordinator::new(Box::new(source), sink, ProgressTracker::hidden())
//!         .execute()
//!         .await?;
//!     println!("{result}");
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod export;

// Re-export commonly used types
pub use config::Config;
pub use connection::ConnectionManager;
pub use error::{Result, SheetError};
pub use export::{ExportCoordinator, ExportResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
pub fn version() -> &'static str {
    VERSION
}
