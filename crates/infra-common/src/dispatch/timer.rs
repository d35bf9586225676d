use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;

static NEXT_TIMER: AtomicU64 = AtomicU64::new(1);

/// Identifier carried by a timer-expiry task.
///
/// Owners remember the id of the timer they armed last; an expiry whose id no
/// longer matches is stale and must be ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    pub(crate) fn next() -> Self {
        TimerId(NEXT_TIMER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Handle to a delayed post.
///
/// Dropping the handle cancels the timer.
#[must_use = "dropping a ScheduledTask cancels it"]
pub struct ScheduledTask {
    id: TimerId,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub(crate) fn new(id: TimerId, handle: JoinHandle<()>) -> Self {
        Self { id, handle }
    }

    /// Id of the timer, as passed to the task factory
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Whether the timer has fired (or was cancelled)
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the timer; a no-op when it already fired
    pub fn cancel(self) {
        // Drop aborts
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id)
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}
