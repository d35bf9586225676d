//! Common infrastructure for the telephony framework
//!
//! This crate holds the pieces every other crate in the workspace leans on:
//!
//! - **[`events`]**: the [`NotificationHub`](events::NotificationHub), a typed
//!   multi-subscriber broadcast table with explicit subscription handles and
//!   origin tags
//! - **[`dispatch`]**: the single-consumer [`TaskQueue`](dispatch::TaskQueue)
//!   that serializes all state transitions, plus cancellable delayed tasks
//! - **[`logging`]**: `tracing` subscriber setup and log contexts
//! - **[`config`]**: layered configuration loading (TOML file + environment)
//! - **[`errors`]**: the shared error type
//!
//! # Single-writer model
//!
//! Everything that mutates call state runs on whichever task owns the
//! `TaskQueue`. Producers (radio drivers, timers) only ever hold a
//! [`QueueHandle`](dispatch::QueueHandle) and post work onto the queue.

pub mod config;
pub mod dispatch;
pub mod errors;
pub mod events;
pub mod logging;

pub use dispatch::{QueueHandle, ScheduledTask, TaskQueue, TimerId};
pub use errors::types::{Error, Result};
pub use events::{Notification, NotificationHub, Origin, Subscription, SubscriptionHandle};
