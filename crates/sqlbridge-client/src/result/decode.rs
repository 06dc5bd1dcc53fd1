//! Structural decoding of native payloads.
//!
//! The shape of a value decides what it is, never the method that
//! produced it: the same shapes come back from single calls and from
//! batch slots.

use sqlbridge_common::constants::{
    PARAM_COLUMNS, PARAM_CURSOR_ID, PARAM_ERROR, PARAM_RESULT, PARAM_ROWS, PARAM_TRANSACTION_ID,
};
use sqlbridge_common::{NativeError, Value};

use super::QueryResult;
use crate::error::{DatabaseException, SqliteError, SqliteResult};

/// A decoded native payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Rows, compact or expanded.
    Rows(QueryResult),
    /// A transaction id allocated by `BEGIN`.
    TransactionId(i64),
    /// A wrapped error descriptor.
    Error(DatabaseException),
    /// Anything else: row id, change count, null.
    Scalar(Value),
}

/// Decodes `value` by shape.
///
/// - `{columns, rows, cursorId?}` is a compact result;
/// - a list of maps is an expanded result;
/// - `{error: {...}}` is an error descriptor;
/// - `{result: v}` decodes `v`;
/// - `{transactionId: n}` is a transaction id;
/// - anything else is a scalar.
pub fn decode(value: &Value) -> SqliteResult<Decoded> {
    match value {
        Value::Map(map) if map.contains_key(PARAM_COLUMNS) => {
            decode_compact(value).map(Decoded::Rows)
        }
        Value::Map(map) if map.contains_key(PARAM_ERROR) => Ok(Decoded::Error(
            DatabaseException::from(NativeError::from_value(&map[PARAM_ERROR])),
        )),
        Value::Map(map) if map.contains_key(PARAM_RESULT) => decode(&map[PARAM_RESULT]),
        Value::Map(map) if map.len() == 1 && map.contains_key(PARAM_TRANSACTION_ID) => {
            match map[PARAM_TRANSACTION_ID].as_i64() {
                Some(id) => Ok(Decoded::TransactionId(id)),
                None => Ok(Decoded::Scalar(value.clone())),
            }
        }
        Value::List(items) if items.iter().all(|item| matches!(item, Value::Map(_))) => {
            decode_expanded(items).map(Decoded::Rows)
        }
        other => Ok(Decoded::Scalar(other.clone())),
    }
}

/// Decodes a payload that must be rows. Null decodes to no rows.
pub fn decode_query_result(value: &Value) -> SqliteResult<QueryResult> {
    match value {
        Value::Null => Ok(QueryResult::EMPTY),
        _ => match decode(value)? {
            Decoded::Rows(result) => Ok(result),
            Decoded::Error(e) => Err(SqliteError::Database(e)),
            other => Err(SqliteError::decode(format!(
                "expected rows, got {:?}",
                other
            ))),
        },
    }
}

fn decode_compact(value: &Value) -> SqliteResult<QueryResult> {
    let columns = value
        .get(PARAM_COLUMNS)
        .and_then(Value::as_list)
        .ok_or_else(|| SqliteError::decode("'columns' must be a list"))?
        .iter()
        .map(|column| {
            column
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| SqliteError::decode("column names must be strings"))
        })
        .collect::<SqliteResult<Vec<_>>>()?;

    let rows = match value.get(PARAM_ROWS) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::List(rows)) => rows
            .iter()
            .map(|row| match row {
                Value::List(values) if values.len() <= columns.len() => Ok(values.clone()),
                Value::List(values) => Err(SqliteError::decode(format!(
                    "row has {} values for {} columns",
                    values.len(),
                    columns.len()
                ))),
                _ => Err(SqliteError::decode("rows must be lists")),
            })
            .collect::<SqliteResult<Vec<_>>>()?,
        Some(_) => return Err(SqliteError::decode("'rows' must be a list")),
    };

    let cursor_id = value.get(PARAM_CURSOR_ID).and_then(Value::as_i64);
    Ok(QueryResult::compact(columns, rows).with_cursor_id(cursor_id))
}

fn decode_expanded(items: &[Value]) -> SqliteResult<QueryResult> {
    let rows = items
        .iter()
        .filter_map(|item| item.as_map().cloned())
        .collect();
    Ok(QueryResult::expanded(rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: Vec<(&str, Value)>) -> Value {
        pairs.into_iter().collect()
    }

    fn compact_payload() -> Value {
        map(vec![
            (
                "columns",
                Value::List(vec![Value::from("id"), Value::from("name")]),
            ),
            (
                "rows",
                Value::List(vec![
                    Value::List(vec![Value::Int(1), Value::from("a")]),
                    Value::List(vec![Value::Int(2), Value::from("b")]),
                ]),
            ),
        ])
    }

    #[test]
    fn test_compact_rows() {
        let result = decode_query_result(&compact_payload()).unwrap();
        assert_eq!(result.count(), 2);
        assert_eq!(result[0]["name"], Value::from("a"));
        assert_eq!(result.cursor_id(), None);
    }

    #[test]
    fn test_cursor_id_is_kept() {
        let mut payload = compact_payload();
        if let Value::Map(m) = &mut payload {
            m.insert("cursorId".to_string(), Value::Int(4));
        }
        assert_eq!(decode_query_result(&payload).unwrap().cursor_id(), Some(4));
    }

    #[test]
    fn test_expanded_rows() {
        let payload = Value::List(vec![map(vec![("x", Value::Int(1))])]);
        let result = decode_query_result(&payload).unwrap();
        assert_eq!(result[0]["x"], Value::Int(1));
    }

    #[test]
    fn test_null_and_empty_list() {
        assert!(decode_query_result(&Value::Null).unwrap().is_empty());
        assert!(decode_query_result(&Value::List(vec![])).unwrap().is_empty());
    }

    #[test]
    fn test_overlong_row_is_rejected() {
        let payload = map(vec![
            ("columns", Value::List(vec![Value::from("a")])),
            (
                "rows",
                Value::List(vec![Value::List(vec![Value::Int(1), Value::Int(2)])]),
            ),
        ]);
        assert!(matches!(
            decode_query_result(&payload),
            Err(SqliteError::Decode(_))
        ));
    }

    #[test]
    fn test_wrappers_and_scalars() {
        let wrapped = map(vec![("result", Value::Int(12))]);
        assert_eq!(decode(&wrapped).unwrap(), Decoded::Scalar(Value::Int(12)));

        let txn = map(vec![("transactionId", Value::Int(3))]);
        assert_eq!(decode(&txn).unwrap(), Decoded::TransactionId(3));

        let error = map(vec![(
            "error",
            map(vec![
                ("code", Value::from("sqlite_error")),
                ("message", Value::from("no such table: t")),
            ]),
        )]);
        match decode(&error).unwrap() {
            Decoded::Error(e) => assert!(e.is_no_such_table(Some("t"))),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            decode_query_result(&error),
            Err(SqliteError::Database(_))
        ));

        assert_eq!(decode(&Value::Null).unwrap(), Decoded::Scalar(Value::Null));
        assert!(matches!(
            decode_query_result(&Value::Int(1)),
            Err(SqliteError::Decode(_))
        ));
    }
}
