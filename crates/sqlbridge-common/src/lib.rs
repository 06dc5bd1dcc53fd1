//! # sqlbridge-common
//!
//! Common types, errors, and wire constants for sqlbridge.
//!
//! This crate provides the vocabulary spoken on both sides of the native
//! invocation boundary. It includes:
//!
//! - **Constants**: method names, argument keys, error codes and sentinels
//! - **Value**: the closed tagged union carried by every native call
//! - **Errors**: the three-part `NativeError` descriptor
//! - **Config**: `BridgeConfig`, shared by the gateway and the client
//!
//! ## Example
//!
//! ```rust
//! use sqlbridge_common::{constants, Value, ValueMap};
//!
//! let mut args = ValueMap::new();
//! args.insert(constants::PARAM_SQL.to_string(), Value::from("SELECT 1"));
//! args.insert(constants::PARAM_ID.to_string(), Value::from(1_i64));
//! let payload = Value::Map(args);
//! assert_eq!(payload.get(constants::PARAM_ID).and_then(Value::as_i64), Some(1));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod error;
pub mod value;

// Re-export commonly used items at the crate root
pub use config::{BridgeConfig, LogLevel};
pub use error::{NativeError, NativeResult};
pub use value::{Value, ValueMap};
