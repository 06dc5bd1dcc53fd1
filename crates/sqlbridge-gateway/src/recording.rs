//! A gateway wrapper that records every call before forwarding it.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use sqlbridge_common::constants::PARAM_SQL;
use sqlbridge_common::{NativeResult, Value};

use crate::gateway::NativeGateway;

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Method name.
    pub method: String,
    /// Argument payload as sent.
    pub args: Value,
}

impl RecordedCall {
    /// The `sql` argument, if any.
    pub fn sql(&self) -> Option<&str> {
        self.args.get(PARAM_SQL).and_then(Value::as_str)
    }
}

/// Records calls and forwards them to an inner gateway.
pub struct RecordingGateway<G> {
    inner: G,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl<G: NativeGateway> RecordingGateway<G> {
    /// Wraps `inner`.
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Snapshot of every call so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// The `sql` argument of every recorded call that had one, in order.
    pub fn statements(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| call.sql().map(str::to_string))
            .collect()
    }

    /// Number of recorded calls whose SQL starts with `prefix`, ignoring case.
    pub fn count_statements(&self, prefix: &str) -> usize {
        let prefix = prefix.to_uppercase();
        self.statements()
            .iter()
            .filter(|sql| sql.trim_start().to_uppercase().starts_with(&prefix))
            .count()
    }

    /// Forgets all recorded calls.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl<G: NativeGateway> NativeGateway for RecordingGateway<G> {
    async fn invoke(&self, method: &str, args: Value) -> NativeResult<Value> {
        self.calls.lock().push(RecordedCall {
            method: method.to_string(),
            args: args.clone(),
        });
        self.inner.invoke(method, args).await
    }
}
