//! Query results.
//!
//! A [`QueryResult`] is a list of [`QueryRow`]s. Rows come in two shapes:
//! compact rows share one column list per result set, expanded rows each
//! carry their own name to value map.

use std::collections::HashMap;
use std::ops::Index;
use std::sync::Arc;

use sqlbridge_common::{Value, ValueMap};

mod batch;
mod decode;

pub use batch::{BatchResult, BatchResults};
pub use decode::{decode, decode_query_result, Decoded};

static NULL_VALUE: Value = Value::Null;

/// Column names shared by every row of a compact result set.
#[derive(Debug, PartialEq)]
pub struct Columns {
    names: Vec<String>,
    keys: Vec<String>,
    index: HashMap<String, usize>,
}

impl Columns {
    /// Builds the shared column set.
    ///
    /// Duplicate names resolve to their first occurrence, both in
    /// [`keys`](Self::keys) and in lookups.
    pub fn new(names: Vec<String>) -> Self {
        let mut index = HashMap::with_capacity(names.len());
        let mut keys = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if !index.contains_key(name) {
                index.insert(name.clone(), i);
                keys.push(name.clone());
            }
        }
        Self { names, keys, index }
    }

    /// All column names as returned by SQLite, duplicates included.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Distinct column names in first-occurrence order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Position of `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Number of columns, duplicates included.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One row of a [`QueryResult`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryRow {
    /// The row returned for an out-of-range index.
    Empty,
    /// Values positioned against a shared column list.
    Compact {
        /// Shared columns.
        columns: Arc<Columns>,
        /// Row values; may be shorter than the column list.
        values: Vec<Value>,
    },
    /// An independent name to value map.
    Expanded(ValueMap),
}

static EMPTY_ROW: QueryRow = QueryRow::Empty;

impl QueryRow {
    /// Value of column `name`, or `None` if the row has no such column.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            QueryRow::Empty => None,
            QueryRow::Compact { columns, values } => {
                columns.position(name).and_then(|i| values.get(i))
            }
            QueryRow::Expanded(map) => map.get(name),
        }
    }

    /// Value at column position `index`.
    ///
    /// Expanded rows are ordered by column name.
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        match self {
            QueryRow::Empty => None,
            QueryRow::Compact { values, .. } => values.get(index),
            QueryRow::Expanded(map) => map.values().nth(index),
        }
    }

    /// Integer value of column `name`.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    /// String value of column `name`.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// True if the row has a column named `name`.
    pub fn contains_key(&self, name: &str) -> bool {
        match self {
            QueryRow::Empty => false,
            QueryRow::Compact { columns, .. } => columns.position(name).is_some(),
            QueryRow::Expanded(map) => map.contains_key(name),
        }
    }

    /// Distinct column names.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            QueryRow::Empty => Vec::new(),
            QueryRow::Compact { columns, .. } => columns.keys().iter().map(String::as_str).collect(),
            QueryRow::Expanded(map) => map.keys().map(String::as_str).collect(),
        }
    }

    /// `(column, value)` pairs, one per distinct column.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.keys()
            .into_iter()
            .map(move |key| (key, self.get(key).unwrap_or(&NULL_VALUE)))
    }

    /// Number of distinct columns.
    pub fn len(&self) -> usize {
        match self {
            QueryRow::Empty => 0,
            QueryRow::Compact { columns, .. } => columns.keys().len(),
            QueryRow::Expanded(map) => map.len(),
        }
    }

    /// True for the empty row.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the row into a map.
    pub fn to_map(&self) -> ValueMap {
        self.iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }
}

impl Index<&str> for QueryRow {
    type Output = Value;

    /// Missing columns read as [`Value::Null`].
    fn index(&self, name: &str) -> &Value {
        self.get(name).unwrap_or(&NULL_VALUE)
    }
}

/// Rows returned by a query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    rows: Vec<QueryRow>,
    columns: Option<Arc<Columns>>,
    cursor_id: Option<i64>,
}

impl QueryResult {
    /// The result with no rows.
    pub const EMPTY: QueryResult = QueryResult {
        rows: Vec::new(),
        columns: None,
        cursor_id: None,
    };

    /// Builds a compact result from a column list and value rows.
    pub fn compact(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let columns = Arc::new(Columns::new(columns));
        let rows = rows
            .into_iter()
            .map(|values| QueryRow::Compact {
                columns: Arc::clone(&columns),
                values,
            })
            .collect();
        Self {
            rows,
            columns: Some(columns),
            cursor_id: None,
        }
    }

    /// Builds an expanded result from independent row maps.
    pub fn expanded(rows: Vec<ValueMap>) -> Self {
        Self {
            rows: rows.into_iter().map(QueryRow::Expanded).collect(),
            columns: None,
            cursor_id: None,
        }
    }

    pub(crate) fn with_cursor_id(mut self, cursor_id: Option<i64>) -> Self {
        self.cursor_id = cursor_id;
        self
    }

    /// Number of rows.
    pub fn count(&self) -> usize {
        self.rows.len()
    }

    /// True if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row at `index`, or the empty row when out of range.
    pub fn row(&self, index: usize) -> &QueryRow {
        self.rows.get(index).unwrap_or(&EMPTY_ROW)
    }

    /// Iterates over the rows.
    pub fn iter(&self) -> std::slice::Iter<'_, QueryRow> {
        self.rows.iter()
    }

    /// Shared columns of a compact result.
    pub fn columns(&self) -> Option<&Columns> {
        self.columns.as_deref()
    }

    /// Native cursor id when more pages remain.
    pub fn cursor_id(&self) -> Option<i64> {
        self.cursor_id
    }

    /// First value of the first row, as an integer.
    ///
    /// Used for `PRAGMA user_version` and `SELECT COUNT(*)` style queries.
    pub fn first_int_value(&self) -> Option<i64> {
        self.rows.first().and_then(|row| row.get_index(0)).and_then(Value::as_i64)
    }

    pub(crate) fn into_rows(self) -> Vec<QueryRow> {
        self.rows
    }
}

impl Index<usize> for QueryResult {
    type Output = QueryRow;

    fn index(&self, index: usize) -> &QueryRow {
        self.row(index)
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = &'a QueryRow;
    type IntoIter = std::slice::Iter<'a, QueryRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QueryResult {
        QueryResult::compact(
            vec!["id".to_string(), "name".to_string()],
            vec![
                vec![Value::Int(1), Value::from("a")],
                vec![Value::Int(2), Value::from("b")],
            ],
        )
    }

    #[test]
    fn test_compact_lookup() {
        let result = sample();
        assert_eq!(result.count(), 2);
        assert_eq!(result[0]["name"], Value::from("a"));
        assert_eq!(result[1].get_i64("id"), Some(2));
        assert_eq!(result[0].keys(), vec!["id", "name"]);
    }

    #[test]
    fn test_out_of_range_row_is_empty() {
        let result = sample();
        assert_eq!(result[5], QueryRow::Empty);
        assert!(result[5].is_empty());
        assert_eq!(result[5]["name"], Value::Null);
        assert!(QueryResult::EMPTY[0].is_empty());
    }

    #[test]
    fn test_missing_column_has_no_value() {
        let result = sample();
        assert_eq!(result[0].get("missing"), None);
        assert_eq!(result[0]["missing"], Value::Null);
    }

    #[test]
    fn test_short_row() {
        let result = QueryResult::compact(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![Value::Int(1)]],
        );
        assert_eq!(result[0].get("a"), Some(&Value::Int(1)));
        assert_eq!(result[0].get("b"), None);
    }

    #[test]
    fn test_duplicate_columns_resolve_to_first() {
        let result = QueryResult::compact(
            vec!["id".to_string(), "id".to_string(), "v".to_string()],
            vec![vec![Value::Int(1), Value::Int(2), Value::Int(3)]],
        );
        assert_eq!(result[0]["id"], Value::Int(1));
        assert_eq!(result[0].keys(), vec!["id", "v"]);
        assert_eq!(result.columns().map(Columns::len), Some(3));
    }

    #[test]
    fn test_expanded_rows() {
        let row: ValueMap = [("x".to_string(), Value::Int(7))].into_iter().collect();
        let result = QueryResult::expanded(vec![row.clone()]);
        assert_eq!(result[0]["x"], Value::Int(7));
        assert_eq!(result[0].to_map(), row);
        assert!(result.columns().is_none());
    }

    #[test]
    fn test_first_int_value() {
        assert_eq!(sample().first_int_value(), Some(1));
        assert_eq!(QueryResult::EMPTY.first_int_value(), None);
    }
}
