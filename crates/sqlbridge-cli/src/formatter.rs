//! Output formatting for query results.
//!
//! Supports table, JSON, CSV, and raw output formats.

use std::str::FromStr;

use comfy_table::{Cell, ContentArrangement, Table};
use serde_json::Value as JsonValue;

use sqlbridge_client::{QueryResult, Value};

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Formatted table output.
    Table,
    /// JSON output.
    Json,
    /// CSV output.
    Csv,
    /// Raw output (values separated by tabs).
    Raw,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "raw" => Ok(OutputFormat::Raw),
            other => Err(format!(
                "Unknown format '{}'. Available: table, json, csv, raw",
                other
            )),
        }
    }
}

/// Formats a query result according to the specified format.
pub fn format_result(result: &QueryResult, format: OutputFormat) -> String {
    let grid = Grid::from_result(result);
    match format {
        OutputFormat::Table => format_table(&grid),
        OutputFormat::Json => format_json(&grid),
        OutputFormat::Csv => format_csv(&grid),
        OutputFormat::Raw => format_raw(&grid),
    }
}

/// Header plus positional values, whatever the result's shape.
struct Grid<'a> {
    header: Vec<String>,
    rows: Vec<Vec<&'a Value>>,
}

impl<'a> Grid<'a> {
    fn from_result(result: &'a QueryResult) -> Self {
        static NULL: Value = Value::Null;

        match result.columns() {
            // compact rows keep duplicate column names, read them by position
            Some(columns) => Grid {
                header: columns.names().to_vec(),
                rows: result
                    .iter()
                    .map(|row| {
                        (0..columns.len())
                            .map(|i| row.get_index(i).unwrap_or(&NULL))
                            .collect()
                    })
                    .collect(),
            },
            None => {
                let header: Vec<String> = result
                    .iter()
                    .next()
                    .map(|row| row.keys().into_iter().map(str::to_string).collect())
                    .unwrap_or_default();
                let rows = result
                    .iter()
                    .map(|row| {
                        header
                            .iter()
                            .map(|name| row.get(name).unwrap_or(&NULL))
                            .collect()
                    })
                    .collect();
                Grid { header, rows }
            }
        }
    }
}

fn format_table(grid: &Grid<'_>) -> String {
    let mut table = Table::new();

    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .load_preset(comfy_table::presets::UTF8_FULL)
        .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);

    if !grid.header.is_empty() {
        table.set_header(grid.header.iter().map(Cell::new));
    }

    for row in &grid.rows {
        table.add_row(row.iter().map(|v| Cell::new(v.to_string())));
    }

    table.to_string()
}

fn format_json(grid: &Grid<'_>) -> String {
    let rows: Vec<JsonValue> = grid
        .rows
        .iter()
        .map(|row| {
            let mut obj = serde_json::Map::new();
            for (i, value) in row.iter().enumerate() {
                let name = grid
                    .header
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("column_{}", i));
                // first occurrence wins, like lookups by name
                obj.entry(name).or_insert_with(|| value.to_json());
            }
            JsonValue::Object(obj)
        })
        .collect();

    serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
}

fn format_csv(grid: &Grid<'_>) -> String {
    let mut output = String::new();

    if !grid.header.is_empty() {
        let header: Vec<String> = grid.header.iter().map(|c| escape_csv(c)).collect();
        output.push_str(&header.join(","));
        output.push('\n');
    }

    for row in &grid.rows {
        let values: Vec<String> = row.iter().map(|v| escape_csv(&csv_value(v))).collect();
        output.push_str(&values.join(","));
        output.push('\n');
    }

    output
}

/// NULL is an empty field in CSV.
fn csv_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Escapes a value for CSV output.
fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn format_raw(grid: &Grid<'_>) -> String {
    let mut output = String::new();

    if !grid.header.is_empty() {
        output.push_str(&grid.header.join("\t"));
        output.push('\n');
    }

    for row in &grid.rows {
        let values: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        output.push_str(&values.join("\t"));
        output.push('\n');
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlbridge_common::ValueMap;

    fn make_test_result() -> QueryResult {
        QueryResult::compact(
            vec!["id".to_string(), "name".to_string(), "note".to_string()],
            vec![
                vec![Value::Int(1), Value::from("Alice"), Value::Null],
                vec![Value::Int(2), Value::from("Bob"), Value::from("a, b")],
            ],
        )
    }

    #[test]
    fn test_format_table() {
        let output = format_result(&make_test_result(), OutputFormat::Table);
        assert!(output.contains("id"));
        assert!(output.contains("name"));
        assert!(output.contains("Alice"));
        assert!(output.contains("Bob"));
    }

    #[test]
    fn test_format_json() {
        let output = format_result(&make_test_result(), OutputFormat::Json);
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["name"], "Alice");
        assert!(parsed[0]["note"].is_null());
    }

    #[test]
    fn test_format_csv() {
        let output = format_result(&make_test_result(), OutputFormat::Csv);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "id,name,note");
        assert_eq!(lines[1], "1,Alice,");
        assert_eq!(lines[2], "2,Bob,\"a, b\"");
    }

    #[test]
    fn test_format_raw() {
        let output = format_result(&make_test_result(), OutputFormat::Raw);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "id\tname\tnote");
        assert_eq!(lines[1], "1\tAlice\tNULL");
    }

    #[test]
    fn test_duplicate_columns_keep_positions() {
        let result = QueryResult::compact(
            vec!["v".to_string(), "v".to_string()],
            vec![vec![Value::Int(1), Value::Int(2)]],
        );
        let output = format_result(&result, OutputFormat::Raw);
        assert_eq!(output.lines().nth(1), Some("1\t2"));

        let json = format_result(&result, OutputFormat::Json);
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["v"], 1);
    }

    #[test]
    fn test_expanded_rows() {
        let mut row = ValueMap::new();
        row.insert("a".to_string(), Value::Int(7));
        row.insert("b".to_string(), Value::from("x"));
        let result = QueryResult::expanded(vec![row]);

        let output = format_result(&result, OutputFormat::Csv);
        assert_eq!(output, "a,b\n7,x\n");
    }

    #[test]
    fn test_parse_format() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("hello"), "hello");
        assert_eq!(escape_csv("hello,world"), "\"hello,world\"");
        assert_eq!(escape_csv("hello\"world"), "\"hello\"\"world\"");
    }
}
