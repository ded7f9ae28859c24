use std::{fmt, io};

/// Crate-wide `Result` type using [`SheetError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, SheetError>;

/// Top-level error type for export runs.
///
/// Each pipeline phase has its own variant so a failure can always be
/// attributed to the step that produced it.
#[derive(Debug)]
pub enum SheetError {
    /// Connection establishment or pool errors.
    Connection(ConnectionError),

    /// Query preparation or execution failed.
    Query(String),

    /// Column metadata could not be established.
    Metadata(String),

    /// A row could not be fetched or decoded.
    Scan(String),

    /// A row could not be rendered into the output document.
    Render(String),

    /// The output document could not be flushed or saved.
    Persist(String),

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors.
    Io(io::Error),

    /// The writer task ended without reporting an outcome.
    Pipeline(String),
}

/// Connection-specific errors.
#[derive(Debug)]
pub enum ConnectionError {
    /// Failed to build the connection pool.
    PoolCreation(String),

    /// Failed to obtain a connection from the pool.
    Acquire(String),

    /// Connection acquisition timed out.
    Timeout,

    /// Invalid connection URL.
    InvalidUrl(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

impl SheetError {
    /// Short name of the pipeline phase this error belongs to
    pub fn phase(&self) -> &'static str {
        match self {
            SheetError::Connection(_) => "connection",
            SheetError::Query(_) => "query",
            SheetError::Metadata(_) => "metadata",
            SheetError::Scan(_) => "scan",
            SheetError::Render(_) => "render",
            SheetError::Persist(_) => "persist",
            SheetError::Config(_) => "config",
            SheetError::Io(_) => "io",
            SheetError::Pipeline(_) => "pipeline",
        }
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for SheetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetError::Connection(e) => write!(f, "Connection error: {e}"),
            SheetError::Query(msg) => write!(f, "Query failed: {msg}"),
            SheetError::Metadata(msg) => write!(f, "Column metadata error: {msg}"),
            SheetError::Scan(msg) => write!(f, "Row scan failed: {msg}"),
            SheetError::Render(msg) => write!(f, "Row render failed: {msg}"),
            SheetError::Persist(msg) => write!(f, "Failed to persist output: {msg}"),
            SheetError::Config(e) => write!(f, "Configuration error: {e}"),
            SheetError::Io(e) => write!(f, "I/O error: {e}"),
            SheetError::Pipeline(msg) => write!(f, "Pipeline error: {msg}"),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::PoolCreation(msg) => {
                write!(f, "Failed to create connection pool: {msg}")
            }
            ConnectionError::Acquire(msg) => write!(f, "Failed to connect: {msg}"),
            ConnectionError::Timeout => write!(f, "Connection timeout"),
            ConnectionError::InvalidUrl(url) => write!(f, "Invalid connection URL: {url}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for SheetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SheetError::Connection(e) => Some(e),
            SheetError::Config(e) => Some(e),
            SheetError::Io(e) => Some(e),
            _ => None,
        }
    }
}
impl std::error::Error for ConnectionError {}
impl std::error::Error for ConfigError {}

/* ========================= Conversions to SheetError ========================= */

impl From<io::Error> for SheetError {
    fn from(err: io::Error) -> Self {
        SheetError::Io(err)
    }
}

impl From<ConnectionError> for SheetError {
    fn from(err: ConnectionError) -> Self {
        SheetError::Connection(err)
    }
}

impl From<ConfigError> for SheetError {
    fn from(err: ConfigError) -> Self {
        SheetError::Config(err)
    }
}
