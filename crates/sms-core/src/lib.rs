//! Outbound SMS dispatch for the telephony framework
//!
//! - **[`dispatcher`]**: the [`SmsDispatcher`] that gates, sends, retries and
//!   tracks delivery of every message part
//! - **[`tracker`]**: per-part state and the retry decision
//! - **[`short_code`]** and **[`usage`]**: destination classification, the
//!   per-app send limit and premium permissions
//! - **[`transport`]**: the radio and user-prompt collaborators
//!
//! A message addressed to a premium or possible-premium short code is held
//! until the user confirms it, unless the sending app is always allowed or
//! never allowed. A network "retry" failure is retried after a fixed delay up
//! to `max_send_retries` times; every other failure is final.
//!
//! Like the phone sessions, the dispatcher is driven from one task: send
//! results, retry timers and status reports are [`SmsTask`]s on its queue.

pub mod dispatcher;
pub mod error;
pub mod events;
pub mod settings;
pub mod short_code;
pub mod tracker;
pub mod transport;
pub mod types;
pub mod usage;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use dispatcher::{SmsDispatcher, SmsTask, Submission};
pub use error::{SmsError, SmsResult};
pub use events::{SmsEvent, SmsEventKind};
pub use settings::{CountryPatterns, PremiumRule, SmsSettings};
pub use short_code::ShortCodeClassifier;
pub use tracker::{SmsTracker, TrackerState};
pub use transport::{ConfirmationPrompter, SmsTransport};
pub use types::{
    ConfirmationDecision, ConfirmationKind, ConfirmationRequest, DeliveryStatus, GroupId,
    MessageId, OutgoingSms, PremiumPermission, SendFailure, SmsCategory, SmsFailure, SmsRequest,
};
pub use usage::SmsUsageMonitor;
