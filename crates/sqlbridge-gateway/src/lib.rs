//! # sqlbridge-gateway
//!
//! The native invocation gateway: the one capability through which the
//! client reaches a SQLite engine.
//!
//! - [`NativeGateway`] is the `invoke(method, args)` contract.
//! - [`Worker`] owns the dedicated thread every native call runs on, fed by
//!   a bounded FIFO queue with single-fulfilment replies.
//! - [`LocalDriver`] implements the native contract on top of `rusqlite`,
//!   including per-connection transaction tracking and the queue of
//!   operations waiting for an unrelated transaction to end.
//! - [`LocalGateway`] binds the two together.
//! - [`RecordingGateway`] wraps any gateway and records the calls it sees.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sqlbridge_common::{BridgeConfig, Value};
//! use sqlbridge_gateway::{LocalGateway, NativeGateway};
//!
//! let gateway = LocalGateway::spawn(BridgeConfig::default())?;
//! let args: Value = vec![("path", Value::from(":memory:"))].into_iter().collect();
//! let opened = gateway.invoke("openDatabase", args).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// The gateway trait.
pub mod gateway;

/// Single-threaded worker.
pub mod worker;

/// Local rusqlite driver.
pub mod driver;

/// Local gateway (worker + driver).
pub mod local;

/// Call recording wrapper.
pub mod recording;

pub use driver::LocalDriver;
pub use gateway::NativeGateway;
pub use local::LocalGateway;
pub use recording::{RecordedCall, RecordingGateway};
pub use worker::{CallHandler, NativeCall, Reply, Worker};
