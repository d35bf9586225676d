//! Error types for phone sessions

use crate::types::{PhoneId, RadioClass};
use thiserror::Error;

/// Result type for phone operations
pub type PhoneResult<T> = Result<T, PhoneError>;

/// Errors raised synchronously by phone operations.
///
/// Asynchronous outcomes never show up here: they arrive on the request's
/// [`Completion`](crate::radio::Completion) or as hub notifications.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PhoneError {
    /// The operation is not legal in the current call state
    #[error("Call state error: {reason}")]
    CallState { reason: String },

    /// No phone with this id is known
    #[error("Unknown phone: {0}")]
    UnknownPhone(PhoneId),

    /// No connection with this id is known on the phone
    #[error("Unknown connection: {0}")]
    UnknownConnection(String),

    /// Character is not a valid DTMF tone
    #[error("Invalid DTMF character: {0:?}")]
    InvalidDtmf(char),

    /// The operation does not exist for this radio class
    #[error("{operation} is not supported on {radio_class} radios")]
    Unsupported {
        operation: String,
        radio_class: RadioClass,
    },

    /// The phone is not registered with the coordinator
    #[error("Phone {0} is not registered")]
    NotRegistered(PhoneId),

    /// Posting to the task queue failed
    #[error("Queue error: {0}")]
    Queue(String),
}

impl PhoneError {
    /// Create a call state error
    pub fn call_state(reason: impl Into<String>) -> Self {
        Self::CallState {
            reason: reason.into(),
        }
    }

    /// Create an unsupported-operation error
    pub fn unsupported(operation: impl Into<String>, radio_class: RadioClass) -> Self {
        Self::Unsupported {
            operation: operation.into(),
            radio_class,
        }
    }

    /// Whether this is a precondition failure
    pub fn is_call_state(&self) -> bool {
        matches!(self, Self::CallState { .. })
    }
}

impl From<telephony_infra_common::Error> for PhoneError {
    fn from(err: telephony_infra_common::Error) -> Self {
        Self::Queue(err.to_string())
    }
}
