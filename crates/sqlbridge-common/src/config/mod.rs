//! Configuration for sqlbridge.
//!
//! This module provides the configuration shared by the gateway and the
//! client.

mod bridge;

pub use bridge::{BridgeConfig, LogLevel};
