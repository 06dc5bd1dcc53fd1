//! The local gateway: a [`Worker`] running the [`LocalDriver`].

use std::io;

use async_trait::async_trait;
use tracing::info;

use sqlbridge_common::{BridgeConfig, NativeResult, Value};

use crate::driver::LocalDriver;
use crate::gateway::NativeGateway;
use crate::worker::Worker;

/// Gateway backed by the bundled rusqlite driver.
#[derive(Debug)]
pub struct LocalGateway {
    worker: Worker,
}

impl LocalGateway {
    /// Validates `config` and starts the worker thread.
    pub fn spawn(config: BridgeConfig) -> io::Result<Self> {
        config
            .validate()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let driver = LocalDriver::new(&config);
        let worker = Worker::spawn("sqlbridge-local", config.worker_queue_capacity, driver)?;
        info!(
            databases_path = %config.databases_path.display(),
            log_level = %config.log_level,
            "local gateway started"
        );
        Ok(Self { worker })
    }
}

#[async_trait]
impl NativeGateway for LocalGateway {
    async fn invoke(&self, method: &str, args: Value) -> NativeResult<Value> {
        self.worker.submit(method, args).await
    }
}
