//! Interactive REPL (Read-Eval-Print-Loop) for sqlbridge.
//!
//! Provides an interactive SQL shell with command history, line editing,
//! and multi-line input support.

use std::borrow::Cow;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{CompletionType, Config, EditMode, Editor, Helper};
use tracing::{debug, error, info};

use sqlbridge_client::{
    in_transaction_change, Database, DatabaseFactory, OpenOptions, QueryResult, SqlExecutor,
};

use crate::commands::{Command, CommandResult};
use crate::config::CliConfig;
use crate::formatter::{self, OutputFormat};

/// The REPL prompt shown when waiting for input.
const PROMPT: &str = "sqlbridge> ";

/// Prompt while a raw `BEGIN` is open.
const TRANSACTION_PROMPT: &str = "sqlbridge*> ";

const KEYWORDS: &[&str] = &[
    "ABORT", "ALTER", "AND", "AS", "ASC", "ATTACH", "AUTOINCREMENT", "BEGIN", "BETWEEN", "BLOB",
    "BY", "CASE", "CHECK", "COLLATE", "COMMIT", "CONFLICT", "CREATE", "DEFAULT", "DELETE", "DESC",
    "DISTINCT", "DROP", "ELSE", "END", "EXCLUSIVE", "EXISTS", "EXPLAIN", "FAIL", "FOREIGN",
    "FROM", "GROUP", "HAVING", "IGNORE", "IMMEDIATE", "IN", "INDEX", "INNER", "INSERT",
    "INTEGER", "INTO", "IS", "JOIN", "KEY", "LEFT", "LIKE", "LIMIT", "NOT", "NULL", "OFFSET",
    "ON", "OR", "ORDER", "PRAGMA", "PRIMARY", "REAL", "REFERENCES", "REPLACE", "RETURNING",
    "ROLLBACK", "SELECT", "SET", "TABLE", "TEXT", "THEN", "TRANSACTION", "TRIGGER", "UNIQUE",
    "UPDATE", "VACUUM", "VALUES", "VIEW", "WHEN", "WHERE", "WITH",
];

/// REPL helper for rustyline.
struct ReplHelper;

impl Completer for ReplHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = line[..pos]
            .rfind(|c: char| c.is_whitespace() || c == '(' || c == ',')
            .map(|i| i + 1)
            .unwrap_or(0);

        let word_upper = line[start..pos].to_uppercase();
        if word_upper.is_empty() {
            return Ok((start, Vec::new()));
        }

        let matches = KEYWORDS
            .iter()
            .filter(|kw| kw.starts_with(&word_upper))
            .map(|kw| Pair {
                display: kw.to_string(),
                replacement: kw.to_string(),
            })
            .collect();

        Ok((start, matches))
    }
}

impl Hinter for ReplHelper {
    type Hint = String;
}

impl Highlighter for ReplHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        Cow::Borrowed(line)
    }
}

impl Validator for ReplHelper {
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        let trimmed = ctx.input().trim();

        if trimmed.is_empty() || trimmed.starts_with('\\') || trimmed.ends_with(';') {
            return Ok(ValidationResult::Valid(None));
        }

        Ok(ValidationResult::Incomplete)
    }
}

impl Helper for ReplHelper {}

/// What a statement is run as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Returns rows.
    Query,
    /// Returns the inserted row id.
    Insert,
    /// Returns a change count.
    Update,
    /// Returns nothing.
    Execute,
}

impl StatementKind {
    /// Classifies `sql` by its leading keyword.
    pub fn of(sql: &str) -> Self {
        let keyword = sql
            .trim_start()
            .split(|c: char| c.is_whitespace() || c == '(')
            .next()
            .unwrap_or_default()
            .to_uppercase();
        match keyword.as_str() {
            "SELECT" | "PRAGMA" | "WITH" | "EXPLAIN" | "VALUES" => StatementKind::Query,
            "INSERT" | "REPLACE" => StatementKind::Insert,
            "UPDATE" | "DELETE" => StatementKind::Update,
            _ => StatementKind::Execute,
        }
    }
}

enum Outcome {
    Rows(QueryResult),
    Inserted(Option<i64>),
    Changed(usize),
    Done,
}

/// Interactive shell over one database.
pub struct Repl {
    config: CliConfig,
    factory: Option<DatabaseFactory>,
    db: Option<Database>,
    format: OutputFormat,
    quiet: bool,
    in_transaction: bool,
    timing: bool,
}

impl Repl {
    /// Creates a new REPL instance.
    pub fn new(config: CliConfig, format: OutputFormat, quiet: bool) -> Self {
        let timing = config.timing;
        Self {
            config,
            factory: None,
            db: None,
            format,
            quiet,
            in_transaction: false,
            timing,
        }
    }

    /// Prints the welcome banner.
    pub fn print_banner(&self) {
        println!("sqlbridge v{}", env!("CARGO_PKG_VERSION"));
        println!("Type \\? for help, \\q to quit.\n");
    }

    /// Starts the gateway and opens the configured database.
    pub async fn connect(&mut self) -> Result<()> {
        let factory = DatabaseFactory::local(self.config.bridge_config())
            .context("starting the local gateway")?;
        let options = OpenOptions::new().read_only(self.config.read_only);
        let db = factory
            .open_database(&self.config.database, options)
            .await
            .with_context(|| format!("opening {}", self.config.database))?;

        info!(path = %db.path(), read_only = db.read_only(), "database opened");
        if !self.quiet {
            println!(
                "Connected to {}{}",
                db.path(),
                if db.read_only() { " (read-only)" } else { "" }
            );
        }

        self.factory = Some(factory);
        self.db = Some(db);
        Ok(())
    }

    /// Closes the database.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(db) = self.db.take() {
            if self.in_transaction {
                // a raw BEGIN left open would make the native close fail
                if let Err(e) = db.execute("ROLLBACK", vec![]).await {
                    debug!("rollback before close failed: {}", e);
                }
                self.in_transaction = false;
            }
            db.close().await.context("closing database")?;
        }
        if let Some(factory) = self.factory.take() {
            factory.close_all().await.context("closing databases")?;
        }
        Ok(())
    }

    fn db(&self) -> Result<&Database> {
        self.db.as_ref().context("Not connected to a database")
    }

    /// Runs the main REPL loop.
    pub async fn run(&mut self) -> Result<()> {
        let rl_config = Config::builder()
            .history_ignore_space(true)
            .completion_type(CompletionType::List)
            .edit_mode(EditMode::Emacs)
            .max_history_size(self.config.history_size)?
            .build();

        let mut editor: Editor<ReplHelper, DefaultHistory> = Editor::with_config(rl_config)?;
        editor.set_helper(Some(ReplHelper));

        let history_file = self.config.history_path();
        if let Some(path) = &history_file {
            if path.exists() {
                if let Err(e) = editor.load_history(path) {
                    debug!("Failed to load history: {}", e);
                }
            }
        }

        loop {
            let prompt = if self.in_transaction {
                TRANSACTION_PROMPT
            } else {
                PROMPT
            };

            match editor.readline(prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    if let Err(e) = editor.add_history_entry(line) {
                        debug!("Failed to add history entry: {}", e);
                    }

                    match self.process_line(line).await {
                        Ok(true) => break,
                        Ok(false) => {}
                        Err(e) => eprintln!("Error: {:#}", e),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("\\q");
                    break;
                }
                Err(e) => {
                    error!("Readline error: {}", e);
                    break;
                }
            }
        }

        if let Some(path) = &history_file {
            save_history(&mut editor, path);
        }

        self.disconnect().await?;
        println!("Goodbye!");
        Ok(())
    }

    /// Processes a single line of input. Returns `true` to exit.
    async fn process_line(&mut self, line: &str) -> Result<bool> {
        if line.starts_with('\\') {
            return self.process_command(line).await;
        }

        for statement in split_statements(line) {
            self.execute_and_print(statement).await?;
        }
        Ok(false)
    }

    async fn process_command(&mut self, line: &str) -> Result<bool> {
        let cmd = Command::parse(line);

        match cmd.execute(self).await? {
            CommandResult::Continue => Ok(false),
            CommandResult::Exit => Ok(true),
            CommandResult::Output(msg) => {
                println!("{}", msg);
                Ok(false)
            }
            CommandResult::ToggleTiming => {
                self.timing = !self.timing;
                println!("Timing is {}.", if self.timing { "on" } else { "off" });
                Ok(false)
            }
            CommandResult::SetFormat(format) => {
                self.format = format;
                println!("Output format set to {:?}.", format);
                Ok(false)
            }
        }
    }

    /// Executes one statement and prints its result.
    pub async fn execute_and_print(&mut self, sql: &str) -> Result<()> {
        let sql = strip_leading_comments(sql).trim_end_matches(';').trim();
        if sql.is_empty() {
            return Ok(());
        }

        let start = Instant::now();
        let outcome = self.execute(sql).await?;
        let elapsed = start.elapsed();

        if let Some(entering) = in_transaction_change(sql) {
            self.in_transaction = entering;
        }

        self.print_outcome(&outcome, elapsed);
        Ok(())
    }

    async fn execute(&self, sql: &str) -> Result<Outcome> {
        let db = self.db()?;
        debug!(sql, "executing");
        let outcome = match StatementKind::of(sql) {
            StatementKind::Query => Outcome::Rows(db.raw_query(sql, vec![]).await?),
            StatementKind::Insert => Outcome::Inserted(db.raw_insert(sql, vec![]).await?),
            StatementKind::Update => Outcome::Changed(db.raw_update(sql, vec![]).await?),
            StatementKind::Execute => {
                db.execute(sql, vec![]).await?;
                Outcome::Done
            }
        };
        Ok(outcome)
    }

    fn print_outcome(&self, outcome: &Outcome, elapsed: Duration) {
        match outcome {
            Outcome::Rows(result) if !result.is_empty() || result.columns().is_some() => {
                println!("{}", formatter::format_result(result, self.format));
                if self.format == OutputFormat::Table {
                    let count = result.count();
                    println!("({} row{})", count, if count == 1 { "" } else { "s" });
                }
            }
            Outcome::Inserted(Some(id)) => println!("Inserted row {}", id),
            Outcome::Changed(count) => println!(
                "{} row{} affected",
                count,
                if *count == 1 { "" } else { "s" }
            ),
            Outcome::Rows(_) | Outcome::Inserted(None) | Outcome::Done => println!("OK"),
        }

        if self.timing {
            println!("Time: {:.3}ms", elapsed.as_secs_f64() * 1000.0);
        }
    }

    /// Executes every statement of a SQL script, stopping at the first error.
    pub async fn execute_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        for statement in split_statements(&content) {
            self.execute_and_print(statement).await?;
        }
        Ok(())
    }

    /// Describes the open connection.
    pub fn connection_info(&self) -> String {
        match &self.db {
            Some(db) => format!(
                "Database: {}\nConnection id: {}\nRead-only: {}\nIn transaction: {}",
                db.path(),
                db.id().map_or_else(|| "(closed)".to_string(), |id| id.to_string()),
                db.read_only(),
                self.in_transaction
            ),
            None => "Not connected.".to_string(),
        }
    }

    /// Formats the connection counters.
    pub fn stats(&self) -> String {
        match &self.db {
            Some(db) => {
                let stats = db.stats();
                format!(
                    "Operations: {}\nTransactions: {} begun, {} committed, {} rolled back\n\
                     Lock waits: {} ({} warnings)",
                    stats.operations,
                    stats.transactions_begun,
                    stats.commits,
                    stats.rollbacks,
                    stats.lock_waits,
                    stats.lock_warnings
                )
            }
            None => "Not connected.".to_string(),
        }
    }

    /// The SQLite library version.
    pub async fn sqlite_version(&self) -> Result<String> {
        let result = self
            .db()?
            .raw_query("SELECT sqlite_version() AS version", vec![])
            .await?;
        Ok(result
            .row(0)
            .get_str("version")
            .unwrap_or("unknown")
            .to_string())
    }

    /// `PRAGMA user_version`.
    pub async fn user_version(&self) -> Result<i32> {
        Ok(self.db()?.get_version().await?)
    }

    /// Sets `PRAGMA user_version`.
    pub async fn set_user_version(&self, version: i32) -> Result<()> {
        self.db()?.set_version(version).await?;
        Ok(())
    }
}

fn save_history(editor: &mut Editor<ReplHelper, DefaultHistory>, path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            debug!("Failed to create history directory: {}", e);
            return;
        }
    }
    if let Err(e) = editor.save_history(path) {
        debug!("Failed to save history: {}", e);
    }
}

/// Drops comments and whitespace before the first keyword.
fn strip_leading_comments(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if let Some(line) = rest.strip_prefix("--") {
            rest = line.split_once('\n').map_or("", |(_, tail)| tail).trim_start();
        } else if let Some(block) = rest.strip_prefix("/*") {
            rest = block.split_once("*/").map_or("", |(_, tail)| tail).trim_start();
        } else {
            return rest;
        }
    }
}

/// Splits SQL text into statements on `;`, ignoring semicolons inside
/// quotes and comments. Comment-only fragments are dropped.
pub fn split_statements(content: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;
    let mut in_line_comment = false;
    let mut in_block_comment = false;
    let mut has_code = false;

    let mut chars = content.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let next = chars.peek().map(|&(_, n)| n);

        if in_block_comment {
            if c == '*' && next == Some('/') {
                chars.next();
                in_block_comment = false;
            }
            continue;
        }
        if in_line_comment {
            if c == '\n' {
                in_line_comment = false;
            }
            continue;
        }
        if let Some(q) = quote {
            if c == q {
                // doubled quote is an escaped quote
                if next == Some(q) {
                    chars.next();
                } else {
                    quote = None;
                }
            }
            continue;
        }

        match c {
            '/' if next == Some('*') => {
                chars.next();
                in_block_comment = true;
            }
            '-' if next == Some('-') => {
                chars.next();
                in_line_comment = true;
            }
            '\'' | '"' | '`' => {
                quote = Some(c);
                has_code = true;
            }
            ';' => {
                if has_code {
                    statements.push(&content[start..i]);
                }
                start = i + 1;
                has_code = false;
            }
            c if !c.is_whitespace() => has_code = true,
            _ => {}
        }
    }

    if has_code {
        statements.push(&content[start..]);
    }

    statements
}
