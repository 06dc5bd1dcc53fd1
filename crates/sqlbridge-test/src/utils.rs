//! Shared helpers for integration tests.

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use sqlbridge_client::DatabaseFactory;
use sqlbridge_common::{BridgeConfig, Value};
use sqlbridge_gateway::{LocalGateway, NativeGateway, RecordedCall, RecordingGateway};

/// A factory over a recording local gateway, rooted in a temp directory.
pub struct TestBridge {
    dir: TempDir,
    gateway: Arc<RecordingGateway<LocalGateway>>,
    factory: DatabaseFactory,
}

impl TestBridge {
    /// Starts a gateway with the test configuration.
    pub fn new() -> Self {
        init_tracing();
        let dir = TempDir::new().expect("failed to create temp dir");
        let config = BridgeConfig::for_testing(dir.path());
        let local = LocalGateway::spawn(config.clone()).expect("failed to start gateway");
        let gateway = Arc::new(RecordingGateway::new(local));
        let factory = DatabaseFactory::new(gateway.clone() as Arc<dyn NativeGateway>, config);
        Self {
            dir,
            gateway,
            factory,
        }
    }

    /// The databases directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The client factory.
    pub fn factory(&self) -> &DatabaseFactory {
        &self.factory
    }

    /// The recording gateway, for raw native calls.
    pub fn gateway(&self) -> &RecordingGateway<LocalGateway> {
        &self.gateway
    }

    /// Every recorded call to `method`, in order.
    pub fn calls(&self, method: &str) -> Vec<RecordedCall> {
        self.gateway
            .calls()
            .into_iter()
            .filter(|call| call.method == method)
            .collect()
    }

    /// SQL statements sent so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.gateway.statements()
    }

    /// Number of statements starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.gateway.count_statements(prefix)
    }

    /// Forgets the recorded calls.
    pub fn reset(&self) {
        self.gateway.clear();
    }
}

impl Default for TestBridge {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a map payload from key/value pairs.
pub fn map(pairs: Vec<(&str, Value)>) -> Value {
    pairs.into_iter().collect()
}

/// Installs a test-writer subscriber once. Filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
