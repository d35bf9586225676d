//! Cross-radio call coordination
//!
//! The [`CallCoordinator`] presents every registered phone as one call
//! control surface. It never owns a session: every method takes the
//! [`PhoneArena`](telephony_phone_core::PhoneArena) explicitly and mutates
//! sessions only through their own operations.
//!
//! - `coordinator`: registry, default phone, subscriptions
//! - `queries`: aggregate state and call lookups
//! - `call_ops`: arbitration of dial, answer, swap, conference and transfer
//! - `event_handler`: fan-out of phone events with the ringing collision guard
//! - `eligibility`: conference and transfer tables keyed by radio class

mod call_ops;
mod coordinator;
pub mod eligibility;
mod event_handler;
mod queries;

pub use coordinator::CallCoordinator;
pub use eligibility::ConferencePath;
pub use queries::CallSnapshot;
