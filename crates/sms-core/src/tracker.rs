//! Per-part send state and the retry machine

use crate::types::{GroupId, MessageId, OutgoingSms, SendFailure, SmsFailure};
use chrono::{DateTime, Utc};
use telephony_infra_common::ScheduledTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// Created, not yet through the gate
    Queued,
    AwaitingConfirmation,
    /// Handed to the transport, waiting for the send result
    Sending,
    RetryScheduled,
    /// Sent; waiting for the status report
    AwaitingDelivery,
    Sent,
    Delivered,
    Failed(SmsFailure),
}

impl TrackerState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TrackerState::Sent | TrackerState::Delivered | TrackerState::Failed(_)
        )
    }
}

/// What to do after a failed send attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureOutcome {
    Retry,
    Fail(SmsFailure),
}

/// One outbound message part
#[derive(Debug)]
pub struct SmsTracker {
    id: MessageId,
    group: Option<GroupId>,
    app: String,
    destination: String,
    body: String,
    status_report: bool,
    retry_count: u32,
    message_ref: Option<u32>,
    state: TrackerState,
    pub(crate) retry_timer: Option<ScheduledTask>,
    created_at: DateTime<Utc>,
}

impl SmsTracker {
    pub(crate) fn new(
        group: Option<GroupId>,
        app: &str,
        destination: &str,
        body: &str,
        status_report: bool,
    ) -> Self {
        Self {
            id: MessageId::next(),
            group,
            app: app.to_string(),
            destination: destination.to_string(),
            body: body.to_string(),
            status_report,
            retry_count: 0,
            message_ref: None,
            state: TrackerState::Queued,
            retry_timer: None,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn group(&self) -> Option<GroupId> {
        self.group
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn wants_status_report(&self) -> bool {
        self.status_report
    }

    /// Retries performed so far; never above the configured ceiling
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Network reference assigned when the send succeeded
    pub fn message_ref(&self) -> Option<u32> {
        self.message_ref
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn set_state(&mut self, state: TrackerState) {
        self.state = state;
    }

    pub(crate) fn outgoing(&self) -> OutgoingSms {
        OutgoingSms {
            destination: self.destination.clone(),
            body: self.body.clone(),
            status_report: self.status_report,
            retry: self.retry_count,
        }
    }

    /// Record a successful send; returns whether a status report is awaited
    pub(crate) fn on_sent(&mut self, message_ref: u32) -> bool {
        self.message_ref = Some(message_ref);
        self.retry_timer = None;
        self.state = if self.status_report {
            TrackerState::AwaitingDelivery
        } else {
            TrackerState::Sent
        };
        self.status_report
    }

    /// Classify a failed attempt made while the radio was in service.
    ///
    /// Only the retry class is retried, and only while the count is below
    /// `max_retries`.
    pub(crate) fn on_send_failed(&mut self, failure: SendFailure, max_retries: u32) -> FailureOutcome {
        match failure {
            SendFailure::Retry if self.retry_count < max_retries => {
                self.retry_count += 1;
                self.state = TrackerState::RetryScheduled;
                FailureOutcome::Retry
            }
            SendFailure::FdnCheckFailure => self.fail(SmsFailure::FdnCheckFailure),
            SendFailure::Retry | SendFailure::Other(_) => self.fail(SmsFailure::GenericFailure),
        }
    }

    pub(crate) fn fail(&mut self, failure: SmsFailure) -> FailureOutcome {
        self.retry_timer = None;
        self.state = TrackerState::Failed(failure);
        FailureOutcome::Fail(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tracker() -> SmsTracker {
        SmsTracker::new(None, "com.example.app", "5551234", "hello", false)
    }

    #[test]
    fn test_retry_class_retries_until_ceiling() {
        let mut t = tracker();
        for expected in 1..=3 {
            assert_eq!(t.on_send_failed(SendFailure::Retry, 3), FailureOutcome::Retry);
            assert_eq!(t.retry_count(), expected);
        }
        assert_eq!(
            t.on_send_failed(SendFailure::Retry, 3),
            FailureOutcome::Fail(SmsFailure::GenericFailure)
        );
        assert_eq!(t.retry_count(), 3);
        assert_eq!(t.state(), TrackerState::Failed(SmsFailure::GenericFailure));
    }

    #[test]
    fn test_other_failures_fail_immediately() {
        let mut t = tracker();
        assert_eq!(
            t.on_send_failed(SendFailure::Other(Some(38)), 3),
            FailureOutcome::Fail(SmsFailure::GenericFailure)
        );
        assert_eq!(t.retry_count(), 0);

        let mut t = tracker();
        assert_eq!(
            t.on_send_failed(SendFailure::FdnCheckFailure, 3),
            FailureOutcome::Fail(SmsFailure::FdnCheckFailure)
        );
    }

    #[test]
    fn test_sent_waits_for_status_report_when_requested() {
        let mut t = SmsTracker::new(None, "app", "5551234", "hi", true);
        assert!(t.on_sent(7));
        assert_eq!(t.state(), TrackerState::AwaitingDelivery);
        assert_eq!(t.message_ref(), Some(7));

        let mut t = tracker();
        assert!(!t.on_sent(8));
        assert!(t.state().is_terminal());
    }
}
