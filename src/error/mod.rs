//! Error handling for export operations.
//!
//! Every fatal condition in an export run maps onto one phase of the pipeline:
//! - connection establishment
//! - query execution
//! - column metadata
//! - row scan/decode
//! - row render/write
//! - flush/persist
//!
//! The phase is carried by the [`SheetError`] variant so the caller can tell
//! the user which part of the run failed before the process exits.
//!
//! # Example
//!
//! ```rust
//! use sqlsheet::error::{Result, SheetError};
//!
//! fn render() -> Result<()> {
//!     Err(SheetError::Render("cell limit exceeded".to_string()))
//! }
//!
//! let err = render().unwrap_err();
//! assert_eq!(err.phase(), "render");
//! ```

pub mod kinds;

// Re-export commonly used types
pub use kinds::{ConfigError, ConnectionError, Result, SheetError};
