//! Error types for SMS dispatch

use crate::types::MessageId;
use thiserror::Error;

pub type SmsResult<T> = Result<T, SmsError>;

/// Errors raised synchronously by the dispatcher.
///
/// Send failures are never reported here; they arrive as
/// [`SmsEvent::SendFailed`](crate::events::SmsEvent::SendFailed).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SmsError {
    #[error("Unknown message: {0}")]
    UnknownMessage(MessageId),

    /// A confirmation answer arrived for a message that is not waiting for one
    #[error("Message {0} is not awaiting confirmation")]
    NotAwaitingConfirmation(MessageId),

    /// A configured short-code pattern does not compile
    #[error("Invalid short-code pattern {pattern:?} for {country}: {reason}")]
    InvalidPattern {
        country: String,
        pattern: String,
        reason: String,
    },

    #[error("Queue error: {0}")]
    Queue(String),
}

impl SmsError {
    pub fn invalid_pattern(
        country: impl Into<String>,
        pattern: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::InvalidPattern {
            country: country.into(),
            pattern: pattern.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<telephony_infra_common::Error> for SmsError {
    fn from(err: telephony_infra_common::Error) -> Self {
        Self::Queue(err.to_string())
    }
}
