//! Per-operation results of a batch.

use std::ops::Index;

use sqlbridge_common::Value;

use super::decode::{decode, Decoded};
use super::QueryResult;
use crate::error::{DatabaseException, SqliteError, SqliteResult};

/// Outcome of one batched operation.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchResult {
    /// Rows of a query.
    Rows(QueryResult),
    /// Insert row id, update/delete change count, or null for execute.
    Scalar(Value),
    /// The operation failed.
    Error(DatabaseException),
}

impl BatchResult {
    fn from_slot(slot: &Value) -> SqliteResult<Self> {
        Ok(match decode(slot)? {
            Decoded::Rows(rows) => BatchResult::Rows(rows),
            Decoded::Error(e) => BatchResult::Error(e),
            Decoded::TransactionId(id) => BatchResult::Scalar(Value::Int(id)),
            Decoded::Scalar(value) => BatchResult::Scalar(value),
        })
    }

    /// True if the operation failed.
    pub fn is_error(&self) -> bool {
        matches!(self, BatchResult::Error(_))
    }

    /// The rows, for a query slot.
    pub fn as_rows(&self) -> Option<&QueryResult> {
        match self {
            BatchResult::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    /// The scalar as an integer, for insert/update/delete slots.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            BatchResult::Scalar(value) => value.as_i64(),
            _ => None,
        }
    }

    /// The error, for a failed slot.
    pub fn as_error(&self) -> Option<&DatabaseException> {
        match self {
            BatchResult::Error(e) => Some(e),
            _ => None,
        }
    }
}

/// Ordered batch results: one slot per submitted operation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchResults {
    slots: Vec<BatchResult>,
}

impl BatchResults {
    /// Decodes every slot of a native batch response.
    ///
    /// Null (a `noResult` batch) decodes to no slots.
    pub fn from_value(value: &Value) -> SqliteResult<Self> {
        let slots = match value {
            Value::Null => Vec::new(),
            Value::List(items) => items
                .iter()
                .map(BatchResult::from_slot)
                .collect::<SqliteResult<Vec<_>>>()?,
            other => {
                return Err(SqliteError::decode(format!(
                    "batch result must be a list, got {}",
                    other.type_name()
                )))
            }
        };
        Ok(Self { slots })
    }

    /// Surfaces the first failed slot as the error of the whole batch.
    pub fn into_checked(self) -> SqliteResult<Self> {
        match self.slots.iter().find_map(BatchResult::as_error) {
            Some(e) => Err(SqliteError::Database(e.clone())),
            None => Ok(self),
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if there are no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot at `index`.
    pub fn get(&self, index: usize) -> Option<&BatchResult> {
        self.slots.get(index)
    }

    /// Iterates over the slots in submission order.
    pub fn iter(&self) -> std::slice::Iter<'_, BatchResult> {
        self.slots.iter()
    }

    /// Number of failed slots.
    pub fn error_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_error()).count()
    }
}

impl Index<usize> for BatchResults {
    type Output = BatchResult;

    fn index(&self, index: usize) -> &BatchResult {
        &self.slots[index]
    }
}

impl IntoIterator for BatchResults {
    type Item = BatchResult;
    type IntoIter = std::vec::IntoIter<BatchResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: Vec<(&str, Value)>) -> Value {
        pairs.into_iter().collect()
    }

    fn mixed_response() -> Value {
        Value::List(vec![
            map(vec![("result", Value::Int(1))]),
            map(vec![(
                "error",
                map(vec![
                    ("code", Value::from("sqlite_error")),
                    ("message", Value::from("UNIQUE constraint failed: t.id")),
                    (
                        "data",
                        map(vec![("sql", Value::from("INSERT INTO t VALUES (1)"))]),
                    ),
                ]),
            )]),
            map(vec![(
                "result",
                map(vec![
                    ("columns", Value::List(vec![Value::from("id")])),
                    ("rows", Value::List(vec![Value::List(vec![Value::Int(1)])])),
                ]),
            )]),
            map(vec![("result", Value::Null)]),
        ])
    }

    #[test]
    fn test_slots_preserve_order() {
        let results = BatchResults::from_value(&mixed_response()).unwrap();
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].as_i64(), Some(1));
        let error = results[1].as_error().unwrap();
        assert!(error.is_unique_constraint(None));
        assert_eq!(error.sql(), Some("INSERT INTO t VALUES (1)"));
        assert_eq!(results[2].as_rows().unwrap()[0]["id"], Value::Int(1));
        assert_eq!(results[3], BatchResult::Scalar(Value::Null));
        assert_eq!(results.error_count(), 1);
    }

    #[test]
    fn test_into_checked_surfaces_first_error() {
        let results = BatchResults::from_value(&mixed_response()).unwrap();
        let err = results.into_checked().unwrap_err();
        assert!(err
            .as_database_exception()
            .unwrap()
            .is_unique_constraint(Some("t.id")));
    }

    #[test]
    fn test_no_result_batch() {
        assert!(BatchResults::from_value(&Value::Null).unwrap().is_empty());
        assert!(BatchResults::from_value(&Value::Int(1)).is_err());
    }
}
