//! Single-threaded worker with a bounded FIFO queue.
//!
//! Native SQLite bindings may require thread affinity, so every call goes
//! through one dedicated OS thread. Callers submit from async code and
//! await a one-shot reply; submission only waits while the queue is full.

use std::fmt;
use std::io;
use std::thread::JoinHandle;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use sqlbridge_common::{NativeError, NativeResult, Value};

/// Single-fulfilment reply slot for one call.
pub struct Reply(pub(crate) oneshot::Sender<NativeResult<Value>>);

impl Reply {
    /// Publishes the result. A caller that stopped waiting is ignored.
    pub fn send(self, result: NativeResult<Value>) {
        if self.0.send(result).is_err() {
            debug!("reply dropped, caller no longer waiting");
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply")
            .field("closed", &self.0.is_closed())
            .finish()
    }
}

/// One method invocation travelling to the worker.
#[derive(Debug)]
pub struct NativeCall {
    /// Method name.
    pub method: String,
    /// Argument payload.
    pub args: Value,
    /// Where the result goes.
    pub reply: Reply,
}

impl NativeCall {
    /// Replies with `result`, consuming the call.
    pub fn respond(self, result: NativeResult<Value>) {
        self.reply.send(result);
    }
}

/// Handles calls on the worker thread.
///
/// A handler may reply right away or keep the [`NativeCall`] and reply
/// later from a subsequent `handle` invocation.
pub trait CallHandler: Send + 'static {
    /// Processes one call.
    fn handle(&mut self, call: NativeCall);

    /// Called once after the queue is closed and drained.
    fn shutdown(&mut self) {}
}

/// Owner of the worker thread and the submitting end of its queue.
pub struct Worker {
    name: String,
    sender: Option<mpsc::Sender<NativeCall>>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawns a worker thread named `name` running `handler`.
    pub fn spawn<H: CallHandler>(
        name: impl Into<String>,
        capacity: usize,
        mut handler: H,
    ) -> io::Result<Self> {
        let name = name.into();
        let (sender, mut receiver) = mpsc::channel::<NativeCall>(capacity.max(1));

        let thread = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                while let Some(call) = receiver.blocking_recv() {
                    handler.handle(call);
                }
                handler.shutdown();
            })?;

        debug!(worker = %name, capacity, "worker started");

        Ok(Self {
            name,
            sender: Some(sender),
            thread: Some(thread),
        })
    }

    /// Name of the worker thread.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueues a call and waits for its reply.
    pub async fn submit(&self, method: &str, args: Value) -> NativeResult<Value> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| NativeError::internal("worker stopped"))?;

        let (tx, rx) = oneshot::channel();
        let call = NativeCall {
            method: method.to_string(),
            args,
            reply: Reply(tx),
        };

        sender
            .send(call)
            .await
            .map_err(|_| NativeError::internal("worker stopped"))?;

        rx.await
            .map_err(|_| NativeError::internal(format!("no reply for method '{}'", method)))?
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("running", &self.thread.is_some())
            .finish()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Closing the channel ends the receive loop.
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(worker = %self.name, "worker thread panicked");
            }
        }
    }
}
