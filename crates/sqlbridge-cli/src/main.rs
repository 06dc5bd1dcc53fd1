//! sqlbridge command-line shell
//!
//! An interactive SQLite shell running on the sqlbridge client and the
//! bundled rusqlite gateway.
//!
//! # Usage
//!
//! ```bash
//! # Start interactive REPL on an in-memory database
//! sqlbridge
//!
//! # Open a database file (relative paths resolve under the databases path)
//! sqlbridge -d notes.db
//!
//! # Execute a single command
//! sqlbridge -d notes.db -c "SELECT * FROM note"
//!
//! # Execute commands from a file
//! sqlbridge -d notes.db -f schema.sql
//!
//! # Output as JSON
//! sqlbridge -o json -c "SELECT 1 AS one"
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sqlbridge_common::LogLevel;

mod commands;
mod config;
mod formatter;
mod repl;

use config::CliConfig;
use formatter::OutputFormat;
use repl::Repl;

/// sqlbridge command-line shell
#[derive(Parser, Debug)]
#[command(
    name = "sqlbridge",
    version,
    about = "Interactive SQLite shell over the sqlbridge client",
    long_about = "An interactive SQLite shell over the sqlbridge client.\n\n\
                  Use it for interactive SQL sessions, running scripts and\n\
                  inspecting databases created through sqlbridge."
)]
struct Args {
    /// Database path, or :memory:
    #[arg(short = 'd', long, env = "SQLBRIDGE_DATABASE")]
    database: Option<String>,

    /// Base directory for relative database paths
    #[arg(long, value_name = "DIR", env = "SQLBRIDGE_DATABASES_PATH")]
    databases_path: Option<PathBuf>,

    /// Open the database read-only
    #[arg(short = 'r', long)]
    read_only: bool,

    /// Execute a single SQL command and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Execute SQL commands from file and exit
    #[arg(short = 'f', long, value_name = "FILE")]
    file: Option<PathBuf>,

    /// Output format
    #[arg(short = 'o', long = "format", value_enum)]
    format: Option<OutputFormatArg>,

    /// Native log level
    #[arg(long, value_enum)]
    log_level: Option<LogLevelArg>,

    /// Enable verbose output
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Suppress banner and connection messages (for scripting)
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

/// Output format argument
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormatArg {
    /// Display results in a formatted table
    Table,
    /// Display results as JSON
    Json,
    /// Display results as CSV
    Csv,
    /// Display raw values
    Raw,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Table => OutputFormat::Table,
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::Csv => OutputFormat::Csv,
            OutputFormatArg::Raw => OutputFormat::Raw,
        }
    }
}

/// Native log level argument
#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevelArg {
    /// No native logging
    None,
    /// Log every statement
    Sql,
    /// Log statements and lifecycle events
    Verbose,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::None => LogLevel::None,
            LogLevelArg::Sql => LogLevel::Sql,
            LogLevelArg::Verbose => LogLevel::Verbose,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose);

    let config = load_config(&args)?;
    let format = match args.format {
        Some(format) => format.into(),
        None => config
            .output_format
            .parse::<OutputFormat>()
            .map_err(anyhow::Error::msg)?,
    };

    if let Some(command) = &args.command {
        execute_command(config, command, format).await
    } else if let Some(file) = &args.file {
        execute_file(config, file, format).await
    } else {
        run_repl(config, format, args.quiet).await
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("sqlbridge=debug,sqlbridge_client=debug,sqlbridge_gateway=debug")
        } else {
            EnvFilter::new("sqlbridge=warn,sqlbridge_client=warn,sqlbridge_gateway=warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn load_config(args: &Args) -> Result<CliConfig> {
    let mut config = match &args.config {
        Some(path) => CliConfig::from_file(path)?,
        None => CliConfig::load_default().context("loading default config")?,
    };

    // Command line overrides the file
    if let Some(database) = &args.database {
        config.database = database.clone();
    }
    if let Some(path) = &args.databases_path {
        config.databases_path = Some(path.clone());
    }
    if args.read_only {
        config.read_only = true;
    }
    if let Some(level) = args.log_level {
        config.log_level = level.into();
    }

    Ok(config)
}

async fn execute_command(config: CliConfig, sql: &str, format: OutputFormat) -> Result<()> {
    info!("Executing command: {}", sql);

    let mut repl = Repl::new(config, format, true);
    repl.connect().await?;
    let result: Result<()> = async {
        for statement in repl::split_statements(sql) {
            repl.execute_and_print(statement).await?;
        }
        Ok(())
    }
    .await;
    repl.disconnect().await?;
    result
}

async fn execute_file(config: CliConfig, path: &Path, format: OutputFormat) -> Result<()> {
    info!("Executing file: {}", path.display());

    let mut repl = Repl::new(config, format, true);
    repl.connect().await?;
    let result = repl.execute_file(path).await;
    repl.disconnect().await?;
    result
}

async fn run_repl(config: CliConfig, format: OutputFormat, quiet: bool) -> Result<()> {
    let mut repl = Repl::new(config, format, quiet);

    if !quiet {
        repl.print_banner();
    }

    repl.connect().await?;
    repl.run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from([
            "sqlbridge",
            "-d",
            "notes.db",
            "--read-only",
            "-o",
            "csv",
            "--log-level",
            "sql",
            "-c",
            "SELECT 1",
        ]);
        assert_eq!(args.database.as_deref(), Some("notes.db"));
        assert!(args.read_only);
        assert!(matches!(args.format, Some(OutputFormatArg::Csv)));
        assert_eq!(args.command.as_deref(), Some("SELECT 1"));

        let config = load_config(&args).unwrap();
        assert_eq!(config.database, "notes.db");
        assert!(config.read_only);
        assert_eq!(config.log_level, LogLevel::Sql);
    }

    #[test]
    fn test_args_verify() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
