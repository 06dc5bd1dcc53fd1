//! Error handling for the native boundary.
//!
//! This module provides the three-part error descriptor produced by every
//! gateway implementation.

mod native;

pub use native::NativeError;

/// Result type alias for native invocations.
pub type NativeResult<T> = std::result::Result<T, NativeError>;
