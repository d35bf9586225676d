//! Per-radio call control
//!
//! A [`PhoneSession`] owns one radio's three call slots and every connection
//! in them. Its operations validate preconditions synchronously, hand the
//! work to the radio and return a [`Completion`](crate::radio::Completion);
//! state changes arrive later as [`RadioEvent`](crate::radio::RadioEvent)s
//! dispatched through [`PhoneSession::handle_task`].

mod call_ops;
mod ecm;
mod event_handler;
mod mmi_ops;
mod phone;
mod post_dial;

pub use ecm::EcmTimerAction;
pub use phone::{DialOutcome, PhoneDispatch, PhoneSession, PhoneTask};
