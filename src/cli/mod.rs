//! Command-line interface for sqlsheet
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and merging (file, environment, arguments)
//! - Subcommands (`completion`, `config`)

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::config::{Config, ExportFormat, LogLevel};
use crate::connection::sanitize_url;
use crate::error::Result;

pub mod completion;

/// sqlsheet - stream a PostgreSQL query result into a spreadsheet
#[derive(Parser, Debug)]
#[command(
    name = "sqlsheet",
    version,
    about = "Export a PostgreSQL query result to xlsx or CSV",
    long_about = "Streams the rows of a PostgreSQL query into a single-sheet spreadsheet
in fixed-size batches, keeping memory use bounded regardless of result size."
)]
pub struct CliArgs {
    /// SQL query to export
    ///
    /// Example: sqlsheet "SELECT * FROM orders"
    #[arg(value_name = "QUERY")]
    pub query: Option<String>,

    /// PostgreSQL connection URL
    ///
    /// Format: postgres://[user[:password]@]host[:port]/database[?options]
    #[arg(long, value_name = "URL")]
    pub database_url: Option<String>,

    /// Output file path
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Worksheet name (xlsx only)
    #[arg(long = "sheet", value_name = "NAME")]
    pub sheet_name: Option<String>,

    /// Output format; inferred from the output extension when omitted
    #[arg(long, value_enum, value_name = "FORMAT")]
    pub format: Option<ExportFormat>,

    /// Rows per batch
    #[arg(long, value_name = "ROWS")]
    pub batch_size: Option<usize>,

    /// Batches buffered between the reader and the writer
    #[arg(long, value_name = "BATCHES")]
    pub queue_capacity: Option<usize>,

    /// Maximum number of open database connections
    #[arg(long, value_name = "N")]
    pub max_connections: Option<usize>,

    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Quiet mode (errors only, no progress or summary)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv")]
    pub very_verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Subcommands for sqlsheet
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate shell completion script
    Completion {
        /// Shell type
        #[arg(value_enum, value_name = "SHELL")]
        shell: Shell,
    },

    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate effective configuration
        #[arg(long)]
        validate: bool,
    },
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Effective configuration
    config: Config,
}

impl CliInterface {
    /// Parse the process arguments and load configuration
    ///
    /// # Returns
    /// * `Result<Self>` - New CLI interface or error
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Build from already-parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Self::load_config(&args)?;
        Ok(Self { args, config })
    }

    /// Load configuration from file, then apply environment and arguments
    ///
    /// Validation is left to the caller, so subcommands that do not export
    /// work with an incomplete configuration.
    fn load_config(args: &CliArgs) -> Result<Config> {
        let mut config = Config::load_from_file(args.config_file.as_deref())?;
        config.apply_env();
        Self::apply_args_to_config(&mut config, args);
        Ok(config)
    }

    /// Apply command-line arguments to override configuration values
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        Self::apply_export_args(config, args);
        Self::apply_logging_args(config, args);
        Self::apply_connection_args(config, args);
    }

    fn apply_export_args(config: &mut Config, args: &CliArgs) {
        let export = &mut config.export;
        if let Some(query) = &args.query {
            export.query = query.clone();
        }
        if let Some(output) = &args.output {
            export.output = output.clone();
        }
        if let Some(sheet) = &args.sheet_name {
            export.sheet_name = sheet.clone();
        }
        if let Some(format) = args.format {
            export.format = Some(format);
        }
        if let Some(batch_size) = args.batch_size {
            export.batch_size = batch_size;
        }
        if let Some(capacity) = args.queue_capacity {
            export.queue_capacity = capacity;
        }
        if args.quiet {
            export.progress = false;
        }
    }

    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    fn apply_connection_args(config: &mut Config, args: &CliArgs) {
        let connection = &mut config.connection;
        if let Some(url) = &args.database_url {
            connection.url = url.clone();
        }
        if let Some(max) = args.max_connections {
            connection.max_open_connections = max;
            connection.max_idle_connections = connection.max_idle_connections.min(max);
        }
    }

    /// Effective configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Parsed command-line arguments
    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Whether progress and summary output is suppressed
    pub fn is_quiet(&self) -> bool {
        self.args.quiet
    }

    /// Handle subcommands if present
    ///
    /// # Returns
    /// * `Result<bool>` - True if a subcommand was handled and the process should exit
    pub fn handle_subcommand(&self) -> Result<bool> {
        match &self.args.command {
            Some(Commands::Completion { shell }) => {
                completion::generate_completion(*shell)?;
                Ok(true)
            }
            Some(Commands::Config { show, validate }) => {
                self.handle_config_command(*show, *validate)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Handle config subcommand
    ///
    /// Without flags the effective configuration is shown.
    fn handle_config_command(&self, show: bool, validate: bool) -> Result<()> {
        if validate {
            self.config.validate()?;
            println!("Configuration is valid");
        }

        if show || !validate {
            self.show_config()?;
        }

        Ok(())
    }

    /// Show effective configuration with credentials hidden
    fn show_config(&self) -> Result<()> {
        println!("Configuration file: {}", self.config_path().display());
        println!();

        let mut shown = self.config.clone();
        shown.connection.url = sanitize_url(&shown.connection.url);
        println!("{}", shown.to_toml_string()?);

        Ok(())
    }

    /// Configuration file path (from args or default)
    fn config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_cli_args_parsing() {
        let args = parse(&["sqlsheet"]);
        assert!(args.query.is_none());
        assert!(args.command.is_none());
        assert!(!args.quiet);
    }

    #[test]
    fn test_cli_args_with_query_and_flags() {
        let args = parse(&[
            "sqlsheet",
            "SELECT 1",
            "-o",
            "out.csv",
            "--format",
            "csv",
            "--batch-size",
            "500",
            "--queue-capacity",
            "4",
            "--sheet",
            "Data",
        ]);
        assert_eq!(args.query.as_deref(), Some("SELECT 1"));
        assert_eq!(args.output, Some(PathBuf::from("out.csv")));
        assert_eq!(args.format, Some(ExportFormat::Csv));
        assert_eq!(args.batch_size, Some(500));
        assert_eq!(args.queue_capacity, Some(4));
        assert_eq!(args.sheet_name.as_deref(), Some("Data"));
    }

    #[test]
    fn test_args_override_config() {
        let args = parse(&[
            "sqlsheet",
            "SELECT id FROM t",
            "--database-url",
            "postgres://localhost/db",
            "--batch-size",
            "250",
            "--max-connections",
            "4",
            "-q",
        ]);
        let mut config = Config::default();
        CliInterface::apply_args_to_config(&mut config, &args);

        assert_eq!(config.export.query, "SELECT id FROM t");
        assert_eq!(config.export.batch_size, 250);
        assert!(!config.export.progress);
        assert_eq!(config.connection.url, "postgres://localhost/db");
        assert_eq!(config.connection.max_open_connections, 4);
        assert_eq!(config.connection.max_idle_connections, 4);
        assert_eq!(config.logging.level, LogLevel::Error);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_verbosity_precedence() {
        let mut config = Config::default();
        CliInterface::apply_args_to_config(&mut config, &parse(&["sqlsheet", "-v", "--vv"]));
        assert_eq!(config.logging.level, LogLevel::Trace);

        let mut config = Config::default();
        CliInterface::apply_args_to_config(&mut config, &parse(&["sqlsheet", "-v"]));
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_unset_args_keep_config_values() {
        let mut config = Config::default();
        config.export.queue_capacity = 3;
        CliInterface::apply_args_to_config(&mut config, &parse(&["sqlsheet"]));
        assert_eq!(config.export.queue_capacity, 3);
        assert!(config.export.progress);
    }

    #[test]
    fn test_subcommands_parse() {
        let args = parse(&["sqlsheet", "completion", "zsh"]);
        assert!(matches!(
            args.command,
            Some(Commands::Completion { shell: Shell::Zsh })
        ));

        let args = parse(&["sqlsheet", "config", "--show", "--validate"]);
        assert!(matches!(
            args.command,
            Some(Commands::Config {
                show: true,
                validate: true
            })
        ));
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        assert!(CliArgs::try_parse_from(["sqlsheet", "--format", "ods"]).is_err());
    }
}
