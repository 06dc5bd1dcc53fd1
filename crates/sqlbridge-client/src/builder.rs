//! SQL statement builder for the table-level helpers.
//!
//! Builds `INSERT`, `UPDATE`, `DELETE` and `SELECT` statements with
//! positional arguments. Table and column names that are SQLite keywords
//! are wrapped in double quotes.

use std::fmt::Write;

use sqlbridge_common::Value;

use crate::args::check_arguments;
use crate::error::{SqliteError, SqliteResult};

/// Conflict resolution for `INSERT` and `UPDATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictAlgorithm {
    /// Abort and roll back the current transaction.
    Rollback,
    /// Abort the statement, keep earlier changes of the transaction.
    Abort,
    /// Abort the statement, keep the changes it already made.
    Fail,
    /// Skip the conflicting row.
    Ignore,
    /// Delete the conflicting rows, then write.
    Replace,
}

impl ConflictAlgorithm {
    /// The `OR ...` clause.
    pub fn as_sql(&self) -> &'static str {
        match self {
            ConflictAlgorithm::Rollback => "OR ROLLBACK",
            ConflictAlgorithm::Abort => "OR ABORT",
            ConflictAlgorithm::Fail => "OR FAIL",
            ConflictAlgorithm::Ignore => "OR IGNORE",
            ConflictAlgorithm::Replace => "OR REPLACE",
        }
    }
}

/// Clauses of a `SELECT` built by [`SqlBuilder::query`].
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    distinct: bool,
    columns: Vec<String>,
    where_clause: Option<String>,
    where_args: Vec<Value>,
    group_by: Option<String>,
    having: Option<String>,
    order_by: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl QueryOptions {
    /// Creates options selecting every column and row.
    pub fn new() -> Self {
        Self::default()
    }

    /// `SELECT DISTINCT`.
    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    /// Columns to return; empty means `*`.
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// `WHERE` clause with its `?` arguments.
    pub fn where_clause(mut self, clause: impl Into<String>, args: Vec<Value>) -> Self {
        self.where_clause = Some(clause.into());
        self.where_args = args;
        self
    }

    /// `GROUP BY` clause.
    pub fn group_by(mut self, clause: impl Into<String>) -> Self {
        self.group_by = Some(clause.into());
        self
    }

    /// `HAVING` clause; requires `group_by`.
    pub fn having(mut self, clause: impl Into<String>) -> Self {
        self.having = Some(clause.into());
        self
    }

    /// `ORDER BY` clause.
    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by = Some(clause.into());
        self
    }

    /// `LIMIT`.
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// `OFFSET`.
    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// A built statement: SQL text plus positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlBuilder {
    sql: String,
    arguments: Vec<Value>,
}

impl SqlBuilder {
    /// `DELETE FROM table [WHERE ...]`. No clause deletes every row.
    pub fn delete(
        table: &str,
        where_clause: Option<&str>,
        where_args: Vec<Value>,
    ) -> SqliteResult<Self> {
        check_arguments(&where_args)?;
        let mut sql = format!("DELETE FROM {}", escape_name(table));
        write_clause(&mut sql, " WHERE ", where_clause);
        Ok(Self {
            sql,
            arguments: where_args,
        })
    }

    /// `SELECT ... FROM table ...`.
    pub fn query(table: &str, options: &QueryOptions) -> SqliteResult<Self> {
        if options.group_by.is_none() && options.having.is_some() {
            return Err(SqliteError::invalid_argument(
                "HAVING clauses are only permitted when using a groupBy clause",
            ));
        }
        check_arguments(&options.where_args)?;

        let mut sql = String::from("SELECT ");
        if options.distinct {
            sql.push_str("DISTINCT ");
        }
        if options.columns.is_empty() {
            sql.push_str("* ");
        } else {
            let columns: Vec<String> = options.columns.iter().map(|c| escape_name(c)).collect();
            sql.push_str(&columns.join(", "));
            sql.push(' ');
        }
        sql.push_str("FROM ");
        sql.push_str(&escape_name(table));
        write_clause(&mut sql, " WHERE ", options.where_clause.as_deref());
        write_clause(&mut sql, " GROUP BY ", options.group_by.as_deref());
        write_clause(&mut sql, " HAVING ", options.having.as_deref());
        write_clause(&mut sql, " ORDER BY ", options.order_by.as_deref());
        // OFFSET is only valid after LIMIT
        if options.limit.is_some() || options.offset.is_some() {
            let _ = write!(sql, " LIMIT {}", options.limit.unwrap_or(-1));
        }
        if let Some(offset) = options.offset {
            let _ = write!(sql, " OFFSET {}", offset);
        }

        Ok(Self {
            sql,
            arguments: options.where_args.clone(),
        })
    }

    /// `INSERT [OR ...] INTO table (...) VALUES (...)`.
    ///
    /// Null values are written inline as `NULL`. Inserting no values needs
    /// `null_column_hack`, the column that receives an explicit `NULL`.
    pub fn insert(
        table: &str,
        values: &[(&str, Value)],
        null_column_hack: Option<&str>,
        conflict: Option<ConflictAlgorithm>,
    ) -> SqliteResult<Self> {
        let mut sql = String::from("INSERT");
        if let Some(conflict) = conflict {
            sql.push(' ');
            sql.push_str(conflict.as_sql());
        }
        sql.push_str(" INTO ");
        sql.push_str(&escape_name(table));
        sql.push_str(" (");

        let mut arguments = Vec::new();
        if values.is_empty() {
            let column = null_column_hack.ok_or_else(|| {
                SqliteError::invalid_argument("nullColumnHack required when inserting no data")
            })?;
            sql.push_str(column);
            sql.push_str(") VALUES (NULL");
        } else {
            let mut placeholders = String::from(") VALUES (");
            for (i, (column, value)) in values.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                    placeholders.push_str(", ");
                }
                sql.push_str(&escape_name(column));
                if value.is_null() {
                    placeholders.push_str("NULL");
                } else {
                    arguments.push(value.clone());
                    placeholders.push('?');
                }
            }
            sql.push_str(&placeholders);
        }
        sql.push(')');
        check_arguments(&arguments)?;

        Ok(Self { sql, arguments })
    }

    /// `UPDATE [OR ...] table SET ... [WHERE ...]`.
    ///
    /// Set arguments come first, then `where_args`.
    pub fn update(
        table: &str,
        values: &[(&str, Value)],
        where_clause: Option<&str>,
        where_args: Vec<Value>,
        conflict: Option<ConflictAlgorithm>,
    ) -> SqliteResult<Self> {
        if values.is_empty() {
            return Err(SqliteError::invalid_argument("Empty values"));
        }
        check_arguments(&where_args)?;

        let mut sql = String::from("UPDATE");
        if let Some(conflict) = conflict {
            sql.push(' ');
            sql.push_str(conflict.as_sql());
        }
        sql.push(' ');
        sql.push_str(&escape_name(table));
        sql.push_str(" SET ");

        let mut arguments = Vec::with_capacity(values.len() + where_args.len());
        for (i, (column, value)) in values.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&escape_name(column));
            if value.is_null() {
                sql.push_str(" = NULL");
            } else {
                arguments.push(value.clone());
                sql.push_str(" = ?");
            }
        }
        check_arguments(&arguments)?;
        arguments.extend(where_args);
        write_clause(&mut sql, " WHERE ", where_clause);

        Ok(Self { sql, arguments })
    }

    /// The SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The positional arguments.
    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// Splits into SQL text and arguments.
    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.arguments)
    }
}

fn write_clause(sql: &mut String, name: &str, clause: Option<&str>) {
    if let Some(clause) = clause {
        sql.push_str(name);
        sql.push_str(clause);
    }
}

/// Quotes `name` if it is an SQLite keyword.
pub fn escape_name(name: &str) -> String {
    if is_keyword(name) {
        format!("\"{}\"", name)
    } else {
        name.to_string()
    }
}

/// Quotes `name` if it is a keyword or not a plain identifier.
pub fn escape_entity_name(name: &str) -> String {
    let plain = name
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !plain || is_keyword(name) {
        format!("\"{}\"", name)
    } else {
        name.to_string()
    }
}

/// Removes the quotes added by [`escape_name`].
pub fn unescape_name(name: &str) -> &str {
    let bytes = name.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' || first == b'`') && first == last {
            let inner = &name[1..name.len() - 1];
            if is_keyword(inner) {
                return inner;
            }
        }
    }
    name
}

fn is_keyword(name: &str) -> bool {
    KEYWORDS
        .binary_search(&name.to_ascii_lowercase().as_str())
        .is_ok()
}

// Sorted for binary search.
const KEYWORDS: &[&str] = &[
    "abort", "action", "add", "after", "all", "alter", "always", "analyze", "and", "as", "asc",
    "attach", "autoincrement", "before", "begin", "between", "by", "cascade", "case", "cast",
    "check", "collate", "column", "commit", "conflict", "constraint", "create", "cross", "current",
    "current_date", "current_time", "current_timestamp", "database", "default", "deferrable",
    "deferred", "delete", "desc", "detach", "distinct", "do", "drop", "each", "else", "end",
    "escape", "except", "exclude", "exclusive", "exists", "explain", "fail", "filter", "first",
    "following", "for", "foreign", "from", "full", "generated", "glob", "group", "groups", "having",
    "if", "ignore", "immediate", "in", "index", "indexed", "initially", "inner", "insert",
    "instead", "intersect", "into", "is", "isnull", "join", "key", "last", "left", "like", "limit",
    "match", "materialized", "natural", "no", "not", "nothing", "notnull", "null", "nulls", "of",
    "offset", "on", "or", "order", "others", "outer", "over", "partition", "plan", "pragma",
    "preceding", "primary", "query", "raise", "range", "recursive", "references", "regexp",
    "reindex", "release", "rename", "replace", "restrict", "returning", "right", "rollback", "row",
    "rows", "savepoint", "select", "set", "table", "temp", "temporary", "then", "ties", "to",
    "transaction", "trigger", "unbounded", "union", "unique", "update", "using", "vacuum",
    "values", "view", "virtual", "when", "where", "window", "with", "without",
];
