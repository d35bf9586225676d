use crate::dispatch::timer::{ScheduledTask, TimerId};
use crate::errors::types::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Producer side of a [`TaskQueue`]
pub struct QueueHandle<T> {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<T>,
    runtime: Option<Handle>,
}

impl<T> Clone for QueueHandle<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            tx: self.tx.clone(),
            runtime: self.runtime.clone(),
        }
    }
}

impl<T: Send + 'static> QueueHandle<T> {
    /// Post a task; fails only when the queue itself was dropped
    pub fn post(&self, task: T) -> Result<()> {
        self.tx
            .send(task)
            .map_err(|_| Error::QueueClosed(self.name.to_string()))
    }

    /// Post the task built by `make` after `delay`.
    ///
    /// The factory receives the timer's id so the consumer can recognise stale
    /// expiries. The timer runs on the runtime the queue was bound to, or on
    /// the caller's runtime; with neither this fails with
    /// [`Error::NoRuntime`].
    pub fn post_delayed_with<F>(&self, delay: Duration, make: F) -> Result<ScheduledTask>
    where
        F: FnOnce(TimerId) -> T + Send + 'static,
    {
        let runtime = match &self.runtime {
            Some(runtime) => runtime.clone(),
            None => Handle::try_current().map_err(|_| Error::NoRuntime(self.name.to_string()))?,
        };
        let id = TimerId::next();
        let tx = self.tx.clone();
        let name = self.name.clone();
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(make(id)).is_err() {
                debug!(queue = %name, %id, "Timer fired after queue closed");
            } else {
                trace!(queue = %name, %id, "Timer fired");
            }
        });
        Ok(ScheduledTask::new(id, handle))
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Single-consumer FIFO of tasks.
///
/// The queue keeps one sender of its own, so `next` never observes a closed
/// channel while the queue is alive.
pub struct TaskQueue<T> {
    handle: QueueHandle<T>,
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T: Send + 'static> TaskQueue<T> {
    /// Create a queue whose timers run on the current runtime, if any
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), Handle::try_current().ok())
    }

    /// Create a queue whose timers run on `runtime`
    pub fn with_runtime(name: impl Into<String>, runtime: Handle) -> Self {
        Self::build(name.into(), Some(runtime))
    }

    fn build(name: String, runtime: Option<Handle>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            handle: QueueHandle {
                name: Arc::from(name.as_str()),
                tx,
                runtime,
            },
            rx,
        }
    }

    /// A producer handle for this queue
    pub fn handle(&self) -> QueueHandle<T> {
        self.handle.clone()
    }

    /// Wait for the next task
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take the next task if one is ready
    pub fn try_next(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }
}
