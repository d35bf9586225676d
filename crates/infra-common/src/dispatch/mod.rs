//! Single-consumer task queue and cancellable delayed tasks
//!
//! All state transitions in the workspace run on the task that drains a
//! [`TaskQueue`]. Radio drivers and timers never touch state directly; they
//! post onto the queue through a [`QueueHandle`].

pub mod queue;
pub mod timer;

pub use queue::{QueueHandle, TaskQueue};
pub use timer::{ScheduledTask, TimerId};
