//! Error types for the telephony service facade

use telephony_phone_core::PhoneError;
use telephony_sms_core::SmsError;
use thiserror::Error;

/// Result type for service-level operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised while building or driving a [`TelephonyService`](crate::TelephonyService).
///
/// Coordinator operations keep returning [`PhoneError`] unchanged; this type
/// only wraps it where the service adds its own failure modes.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Phone(#[from] PhoneError),

    #[error(transparent)]
    Sms(#[from] SmsError),

    #[error(transparent)]
    Infra(#[from] telephony_infra_common::Error),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// SMS was used before being enabled on a phone
    #[error("SMS is not enabled")]
    SmsDisabled,
}

impl EngineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}
