//! # sqlbridge-test
//!
//! Integration test harness for sqlbridge.
//!
//! Provides a [`TestBridge`](utils::TestBridge): a temporary databases
//! directory, the bundled rusqlite gateway wrapped in a call recorder, and a
//! [`DatabaseFactory`](sqlbridge_client::DatabaseFactory) over both. Tests
//! assert on the exact native calls the client issued.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod utils;

pub use utils::{init_tracing, map, TestBridge};
