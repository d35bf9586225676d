//! Identifiers, requests and outcomes

use serde::{Deserialize, Serialize};
use std::fmt;
use telephony_phone_core::RadioError;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_MESSAGE: AtomicU64 = AtomicU64::new(1);
static NEXT_GROUP: AtomicU64 = AtomicU64::new(1);

/// Process-unique id of one outbound message part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(u64);

impl MessageId {
    pub(crate) fn next() -> Self {
        MessageId(NEXT_MESSAGE.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sms{}", self.0)
    }
}

/// Id shared by the parts of one multipart message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(u64);

impl GroupId {
    pub(crate) fn next() -> Self {
        GroupId(NEXT_GROUP.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group{}", self.0)
    }
}

/// A text message to send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsRequest {
    /// Package of the calling app, the unit of rate limiting and permissions
    pub app: String,
    pub destination: String,
    /// One entry per part
    pub parts: Vec<String>,
    pub status_report: bool,
}

impl SmsRequest {
    pub fn text(app: impl Into<String>, destination: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            destination: destination.into(),
            parts: vec![body.into()],
            status_report: false,
        }
    }

    pub fn multipart(
        app: impl Into<String>,
        destination: impl Into<String>,
        parts: Vec<String>,
    ) -> Self {
        Self {
            app: app.into(),
            destination: destination.into(),
            parts,
            status_report: false,
        }
    }

    pub fn with_status_report(mut self) -> Self {
        self.status_report = true;
        self
    }
}

/// What the transport hands to the radio for one part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingSms {
    pub destination: String,
    pub body: String,
    pub status_report: bool,
    /// Number of earlier attempts for this part
    pub retry: u32,
}

/// Failure class reported by the radio for one send attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendFailure {
    /// Transient network failure; the send may be retried
    Retry,
    FdnCheckFailure,
    /// Any other failure, with the radio's error code when it gave one
    Other(Option<i32>),
}

impl From<RadioError> for SendFailure {
    fn from(err: RadioError) -> Self {
        match err {
            RadioError::SmsFailRetry => SendFailure::Retry,
            RadioError::FdnCheckFailure => SendFailure::FdnCheckFailure,
            RadioError::Code(code) => SendFailure::Other(Some(code)),
            _ => SendFailure::Other(None),
        }
    }
}

/// Why a message finally failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SmsFailure {
    GenericFailure,
    RadioOff,
    NoService,
    FdnCheckFailure,
    /// Too many messages waiting for confirmation, or the user refused to
    /// exceed the send limit
    LimitExceeded,
    /// The user refused this short-code message
    ShortCodeNotAllowed,
    /// The app is never allowed to send to premium short codes
    ShortCodeNeverAllowed,
}

/// Delivery status carried by a status report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Complete,
    /// Temporary failure; the network keeps trying
    Pending,
    /// Permanent failure
    Failed,
}

/// Category of a destination, ordered from least to most restrictive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SmsCategory {
    NotShortCode,
    FreeShortCode,
    StandardShortCode,
    PossiblePremiumShortCode,
    PremiumShortCode,
}

impl SmsCategory {
    /// Whether sending needs the app's premium permission
    pub fn needs_confirmation(&self) -> bool {
        matches!(
            self,
            SmsCategory::PossiblePremiumShortCode | SmsCategory::PremiumShortCode
        )
    }
}

/// Per-app permission to send to premium short codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PremiumPermission {
    #[default]
    Unknown,
    AskUser,
    NeverAllow,
    AlwaysAllow,
}

/// Why the user is being asked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfirmationKind {
    PremiumShortCode,
    PossiblePremiumShortCode,
    SendLimitReached,
}

/// A question put to the user before sending
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    /// First part of the message; answer with this id
    pub message: MessageId,
    pub app: String,
    pub destination: String,
    pub kind: ConfirmationKind,
}

/// The user's answer; `remember` updates the app's premium permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationDecision {
    Allow { remember: bool },
    Deny { remember: bool },
}
