//! Backslash commands for the REPL.
//!
//! Provides commands like `\dt`, `\d`, `\q`, etc.

use anyhow::Result;

use crate::formatter::OutputFormat;
use crate::repl::Repl;

/// Result of executing a command.
pub enum CommandResult {
    /// Continue the REPL.
    Continue,
    /// Exit the REPL.
    Exit,
    /// Output a message.
    Output(String),
    /// Toggle timing mode.
    ToggleTiming,
    /// Set output format.
    SetFormat(OutputFormat),
}

/// A parsed command.
#[derive(Debug)]
pub enum Command {
    /// Quit the REPL.
    Quit,
    /// Show help.
    Help,
    /// Describe a table.
    Describe(Option<String>),
    /// List tables.
    ListTables,
    /// Show connection info.
    ConnectionInfo,
    /// Toggle timing.
    Timing,
    /// Set output format.
    Format(String),
    /// Show version.
    Version,
    /// Show or set `PRAGMA user_version`.
    UserVersion(Option<String>),
    /// Show connection counters.
    Stats,
    /// Execute a file.
    Include(String),
    /// Unknown command.
    Unknown(String),
}

impl Command {
    /// Parses a command string.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        let cmd = input.strip_prefix('\\').unwrap_or(input);

        let mut parts = cmd.splitn(2, char::is_whitespace);
        let cmd_name = parts.next().unwrap_or_default().to_lowercase();
        let args = parts
            .next()
            .map(|s| s.trim().trim_end_matches(';').trim().to_string())
            .filter(|s| !s.is_empty());

        match cmd_name.as_str() {
            "q" | "quit" | "exit" => Command::Quit,
            "?" | "h" | "help" => Command::Help,
            "d" => Command::Describe(args),
            "dt" | "tables" => Command::ListTables,
            "conninfo" | "c" => Command::ConnectionInfo,
            "timing" | "t" => Command::Timing,
            "format" | "f" => Command::Format(args.unwrap_or_else(|| "table".to_string())),
            "version" | "v" => Command::Version,
            "user_version" | "uv" => Command::UserVersion(args),
            "stats" => Command::Stats,
            "i" | "include" => Command::Include(args.unwrap_or_default()),
            _ => Command::Unknown(cmd_name),
        }
    }

    /// Executes the command.
    pub async fn execute(&self, repl: &mut Repl) -> Result<CommandResult> {
        match self {
            Command::Quit => Ok(CommandResult::Exit),

            Command::Help => Ok(CommandResult::Output(Self::help_text())),

            Command::Describe(Some(name)) => {
                let sql = format!("PRAGMA table_info({})", quote_identifier(name));
                repl.execute_and_print(&sql).await?;
                Ok(CommandResult::Continue)
            }

            Command::Describe(None) | Command::ListTables => {
                repl.execute_and_print(
                    "SELECT name, type FROM sqlite_master \
                     WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
                     ORDER BY name",
                )
                .await?;
                Ok(CommandResult::Continue)
            }

            Command::ConnectionInfo => Ok(CommandResult::Output(repl.connection_info())),

            Command::Timing => Ok(CommandResult::ToggleTiming),

            Command::Format(format) => match format.parse::<OutputFormat>() {
                Ok(fmt) => Ok(CommandResult::SetFormat(fmt)),
                Err(msg) => Ok(CommandResult::Output(msg)),
            },

            Command::Version => {
                let sqlite = repl.sqlite_version().await?;
                Ok(CommandResult::Output(format!(
                    "sqlbridge v{}\nSQLite {}",
                    env!("CARGO_PKG_VERSION"),
                    sqlite
                )))
            }

            Command::UserVersion(None) => {
                let version = repl.user_version().await?;
                Ok(CommandResult::Output(format!("user_version = {}", version)))
            }

            Command::UserVersion(Some(arg)) => match arg.parse::<i32>() {
                Ok(version) => {
                    repl.set_user_version(version).await?;
                    Ok(CommandResult::Output(format!("user_version = {}", version)))
                }
                Err(_) => Ok(CommandResult::Output(format!(
                    "Invalid version '{}'. Usage: \\user_version [N]",
                    arg
                ))),
            },

            Command::Stats => Ok(CommandResult::Output(repl.stats())),

            Command::Include(path) => {
                if path.is_empty() {
                    Ok(CommandResult::Output("Usage: \\i <filename>".to_string()))
                } else {
                    repl.execute_file(std::path::Path::new(path)).await?;
                    Ok(CommandResult::Continue)
                }
            }

            Command::Unknown(cmd) => Ok(CommandResult::Output(format!(
                "Unknown command '\\{}'. Type \\? for help.",
                cmd
            ))),
        }
    }

    /// Returns help text.
    fn help_text() -> String {
        r#"sqlbridge Commands
==================

General:
  \q, \quit             Exit the shell
  \?, \help             Show this help
  \v, \version          Show version information

Connection:
  \c, \conninfo         Show connection information
  \stats                Show connection counters

Schema:
  \d [TABLE]            Describe a table, or list tables
  \dt, \tables          List all tables and views
  \user_version [N]     Show or set PRAGMA user_version

Display:
  \t, \timing           Toggle timing display
  \f FORMAT             Set output format (table, json, csv, raw)

Files:
  \i FILE               Execute statements from file

Type SQL statements followed by a semicolon to execute them.
"#
        .to_string()
    }
}

/// Quotes an identifier for use inside a PRAGMA argument.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quit() {
        assert!(matches!(Command::parse("\\q"), Command::Quit));
        assert!(matches!(Command::parse("\\quit"), Command::Quit));
        assert!(matches!(Command::parse("\\exit"), Command::Quit));
    }

    #[test]
    fn test_parse_help() {
        assert!(matches!(Command::parse("\\?"), Command::Help));
        assert!(matches!(Command::parse("\\help"), Command::Help));
    }

    #[test]
    fn test_parse_describe() {
        match Command::parse("\\d users;") {
            Command::Describe(Some(name)) => assert_eq!(name, "users"),
            other => panic!("Expected Describe, got {:?}", other),
        }
        assert!(matches!(Command::parse("\\d"), Command::Describe(None)));
    }

    #[test]
    fn test_parse_user_version() {
        assert!(matches!(
            Command::parse("\\user_version"),
            Command::UserVersion(None)
        ));
        match Command::parse("\\user_version 3") {
            Command::UserVersion(Some(arg)) => assert_eq!(arg, "3"),
            other => panic!("Expected UserVersion, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_format() {
        match Command::parse("\\f json") {
            Command::Format(fmt) => assert_eq!(fmt, "json"),
            other => panic!("Expected Format, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_unknown() {
        match Command::parse("\\xyz") {
            Command::Unknown(cmd) => assert_eq!(cmd, "xyz"),
            other => panic!("Expected Unknown, got {:?}", other),
        }
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("users"), "\"users\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
