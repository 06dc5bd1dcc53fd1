//! The native error descriptor.

use thiserror::Error;

use crate::constants::{
    ERROR_BAD_PARAM, ERROR_INTERNAL, ERROR_NOT_IMPLEMENTED, ERROR_OPEN_FAILED, ERROR_SQLITE,
    PARAM_ERROR_CODE, PARAM_ERROR_DATA, PARAM_ERROR_MESSAGE,
};
use crate::value::{Value, ValueMap};

/// An error reported by the native layer: `(code, message, details)`.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{code}: {message}")]
pub struct NativeError {
    /// Error code, one of the `ERROR_*` constants for the bundled driver.
    pub code: String,
    /// Human readable message, usually the SQLite message verbatim.
    pub message: String,
    /// Optional diagnostic payload (for SQL errors: `{sql, arguments}`).
    pub details: Option<Value>,
}

impl NativeError {
    /// Creates an error without details.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Attaches a diagnostic payload.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// A generic SQLite failure.
    pub fn sqlite(message: impl Into<String>) -> Self {
        Self::new(ERROR_SQLITE, message)
    }

    /// A malformed argument.
    pub fn bad_param(message: impl Into<String>) -> Self {
        Self::new(ERROR_BAD_PARAM, message)
    }

    /// An internal binding failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ERROR_INTERNAL, message)
    }

    /// A failed open.
    pub fn open_failed(message: impl Into<String>) -> Self {
        Self::new(ERROR_OPEN_FAILED, message)
    }

    /// An unknown method.
    pub fn not_implemented(method: &str) -> Self {
        Self::new(ERROR_NOT_IMPLEMENTED, format!("method '{}' not implemented", method))
    }

    /// Encodes the error as the `{code, message, data}` map used in batch slots.
    pub fn to_value(&self) -> Value {
        let mut map = ValueMap::new();
        map.insert(PARAM_ERROR_CODE.to_string(), Value::from(self.code.as_str()));
        map.insert(
            PARAM_ERROR_MESSAGE.to_string(),
            Value::from(self.message.as_str()),
        );
        if let Some(details) = &self.details {
            map.insert(PARAM_ERROR_DATA.to_string(), details.clone());
        }
        Value::Map(map)
    }

    /// Decodes a `{code, message, data}` map. Missing parts fall back to
    /// `sqlite_error` and an empty message.
    pub fn from_value(value: &Value) -> Self {
        let code = value
            .get(PARAM_ERROR_CODE)
            .and_then(Value::as_str)
            .unwrap_or(ERROR_SQLITE);
        let message = value
            .get(PARAM_ERROR_MESSAGE)
            .and_then(Value::as_str)
            .unwrap_or_default();
        let details = value.get(PARAM_ERROR_DATA).cloned();
        Self {
            code: code.to_string(),
            message: message.to_string(),
            details,
        }
    }
}
