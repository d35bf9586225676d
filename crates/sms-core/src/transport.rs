//! Collaborators the dispatcher talks to
//!
//! Neither trait may call back into the dispatcher synchronously. Send
//! results are posted onto the dispatcher's queue as
//! [`SmsTask::SendComplete`](crate::dispatcher::SmsTask::SendComplete);
//! user answers come back through
//! [`SmsDispatcher::confirm`](crate::dispatcher::SmsDispatcher::confirm).

use crate::types::{ConfirmationRequest, MessageId, OutgoingSms};

/// Radio side of SMS sending
pub trait SmsTransport: Send {
    fn send(&mut self, message: MessageId, sms: &OutgoingSms);
}

/// Asks the user whether a message may be sent
pub trait ConfirmationPrompter: Send {
    fn prompt(&mut self, request: &ConfirmationRequest);
}
