//! Outbound SMS dispatch
//!
//! Every message part gets an [`SmsTracker`]. A submission passes the
//! premium short-code gate and the per-app rate limit before its parts go to
//! the [`SmsTransport`]; either check may park it behind a user
//! confirmation. At most `max_pending_confirmations` submissions wait at
//! once; anything beyond that fails with
//! [`SmsFailure::LimitExceeded`] without asking the user.
//!
//! Send results, retry timers and status reports all arrive as [`SmsTask`]s
//! on the dispatcher's queue and are handled one at a time.

use crate::error::{SmsError, SmsResult};
use crate::events::{SmsEvent, SmsEventKind};
use crate::settings::SmsSettings;
use crate::tracker::{FailureOutcome, SmsTracker, TrackerState};
use crate::transport::{ConfirmationPrompter, SmsTransport};
use crate::types::{
    ConfirmationDecision, ConfirmationKind, ConfirmationRequest, DeliveryStatus, GroupId,
    MessageId, PremiumPermission, SendFailure, SmsCategory, SmsFailure, SmsRequest,
};
use crate::usage::SmsUsageMonitor;
use indexmap::IndexMap;
use std::collections::HashMap;
use telephony_infra_common::logging::LogContext;
use telephony_infra_common::{
    NotificationHub, Origin, QueueHandle, Subscription, SubscriptionHandle, TimerId,
};
use telephony_phone_core::ServiceState;
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Level};

/// Work item on the SMS queue
#[derive(Debug)]
pub enum SmsTask {
    /// The radio finished one send attempt; `Ok` carries the message reference
    SendComplete {
        message: MessageId,
        result: Result<u32, SendFailure>,
    },
    Retry {
        message: MessageId,
        timer: TimerId,
    },
    StatusReport {
        message_ref: u32,
        status: DeliveryStatus,
    },
}

/// Ids handed back for one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Set for multipart messages
    pub group: Option<GroupId>,
    /// One id per part, in order
    pub messages: Vec<MessageId>,
}

#[derive(Debug)]
struct PendingConfirmation {
    parts: Vec<MessageId>,
    kind: ConfirmationKind,
}

#[derive(Debug)]
struct GroupState {
    unsent: usize,
    failed: bool,
}

pub struct SmsDispatcher {
    settings: SmsSettings,
    transport: Box<dyn SmsTransport>,
    prompter: Box<dyn ConfirmationPrompter>,
    queue: QueueHandle<SmsTask>,
    usage: SmsUsageMonitor,
    trackers: IndexMap<MessageId, SmsTracker>,
    pending_confirmations: IndexMap<MessageId, PendingConfirmation>,
    groups: HashMap<GroupId, GroupState>,
    service_state: ServiceState,
    sim_country: Option<String>,
    network_country: Option<String>,
    hub: NotificationHub<SmsEvent>,
    log_context: LogContext,
}

impl SmsDispatcher {
    /// Fails only when a configured short-code pattern does not compile
    pub fn new(
        settings: SmsSettings,
        transport: Box<dyn SmsTransport>,
        prompter: Box<dyn ConfirmationPrompter>,
        queue: QueueHandle<SmsTask>,
    ) -> SmsResult<Self> {
        let usage = SmsUsageMonitor::new(&settings)?;
        let log_context = LogContext::new("sms-dispatcher").with_field("queue", queue.name());
        info!(
            max_retries = settings.max_send_retries,
            queue_limit = settings.max_pending_confirmations,
            rate_limit = settings.rate_limit_max_count,
            "SMS dispatcher created"
        );
        Ok(Self {
            settings,
            transport,
            prompter,
            queue,
            usage,
            trackers: IndexMap::new(),
            pending_confirmations: IndexMap::new(),
            groups: HashMap::new(),
            service_state: ServiceState::OutOfService,
            sim_country: None,
            network_country: None,
            hub: NotificationHub::new("sms"),
            log_context,
        })
    }

    pub fn set_service_state(&mut self, state: ServiceState) {
        debug!(?state, "SMS service state changed");
        self.service_state = state;
    }

    pub fn service_state(&self) -> ServiceState {
        self.service_state
    }

    /// Countries whose short-code rules apply
    pub fn set_countries(&mut self, sim: Option<String>, network: Option<String>) {
        self.sim_country = sim;
        self.network_country = network;
    }

    pub fn usage_monitor(&self) -> &SmsUsageMonitor {
        &self.usage
    }

    pub fn usage_monitor_mut(&mut self) -> &mut SmsUsageMonitor {
        &mut self.usage
    }

    pub fn settings(&self) -> &SmsSettings {
        &self.settings
    }

    /// Tracker of a part that has not reached a final state
    pub fn tracker(&self, message: MessageId) -> Option<&SmsTracker> {
        self.trackers.get(&message)
    }

    pub fn active_count(&self) -> usize {
        self.trackers.len()
    }

    /// Submissions waiting for the user
    pub fn pending_confirmation_count(&self) -> usize {
        self.pending_confirmations.len()
    }

    pub fn subscribe(&mut self, kind: SmsEventKind) -> Subscription<SmsEvent> {
        self.hub.subscribe(kind, Origin::Client)
    }

    pub fn subscribe_with(
        &mut self,
        kinds: &[SmsEventKind],
        tx: mpsc::UnboundedSender<SmsEvent>,
    ) -> SubscriptionHandle {
        self.hub.subscribe_with(kinds, Origin::Client, tx)
    }

    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        self.hub.unsubscribe(handle)
    }

    /// Queue a message for sending.
    ///
    /// The outcome of each part arrives on the hub; the returned ids name
    /// the parts.
    pub fn send(&mut self, request: SmsRequest) -> Submission {
        let span = self.log_context.span(Level::DEBUG);
        let _guard = span.enter();

        let SmsRequest {
            app,
            destination,
            mut parts,
            status_report,
        } = request;
        if parts.is_empty() {
            parts.push(String::new());
        }

        let group = (parts.len() > 1).then(GroupId::next);
        if let Some(group) = group {
            self.groups.insert(
                group,
                GroupState {
                    unsent: parts.len(),
                    failed: false,
                },
            );
        }
        let messages: Vec<MessageId> = parts
            .iter()
            .map(|body| {
                let tracker = SmsTracker::new(group, &app, &destination, body, status_report);
                let id = tracker.id();
                self.trackers.insert(id, tracker);
                id
            })
            .collect();
        info!(%app, %destination, parts = messages.len(), ?group, "SMS submitted");

        let category = self.usage.check_destination(
            &destination,
            self.sim_country.as_deref(),
            self.network_country.as_deref(),
        );
        if category.needs_confirmation() && !self.premium_gate(&app, category, &messages) {
            return Submission { group, messages };
        }

        if !self.usage.check(&app, messages.len()) {
            self.request_confirmation(&messages, ConfirmationKind::SendLimitReached);
        } else {
            for id in &messages {
                self.send_part(*id);
            }
        }
        Submission { group, messages }
    }

    /// Returns `true` when the parts may go ahead right away
    fn premium_gate(&mut self, app: &str, category: SmsCategory, parts: &[MessageId]) -> bool {
        match self.usage.premium_permission(app) {
            PremiumPermission::AlwaysAllow => true,
            PremiumPermission::NeverAllow => {
                warn!(app, ?category, "App may never send to premium short codes");
                for id in parts {
                    self.finish_failed(*id, SmsFailure::ShortCodeNeverAllowed, None);
                }
                false
            }
            PremiumPermission::Unknown | PremiumPermission::AskUser => {
                let kind = if category == SmsCategory::PossiblePremiumShortCode {
                    ConfirmationKind::PossiblePremiumShortCode
                } else {
                    ConfirmationKind::PremiumShortCode
                };
                self.request_confirmation(parts, kind);
                false
            }
        }
    }

    fn request_confirmation(&mut self, parts: &[MessageId], kind: ConfirmationKind) {
        let Some(&lead) = parts.first() else {
            return;
        };
        if self.pending_confirmations.len() >= self.settings.max_pending_confirmations {
            warn!(
                message = %lead,
                pending = self.pending_confirmations.len(),
                "Confirmation queue full, denying message"
            );
            for id in parts {
                self.finish_failed(*id, SmsFailure::LimitExceeded, None);
            }
            return;
        }

        let Some(tracker) = self.trackers.get(&lead) else {
            return;
        };
        let request = ConfirmationRequest {
            message: lead,
            app: tracker.app().to_string(),
            destination: tracker.destination().to_string(),
            kind,
        };
        for id in parts {
            if let Some(tracker) = self.trackers.get_mut(id) {
                tracker.set_state(TrackerState::AwaitingConfirmation);
            }
        }
        self.pending_confirmations.insert(
            lead,
            PendingConfirmation {
                parts: parts.to_vec(),
                kind,
            },
        );
        info!(message = %lead, ?kind, "Asking user to confirm SMS");
        self.hub
            .notify(SmsEvent::ConfirmationRequired { message: lead, kind });
        self.prompter.prompt(&request);
    }

    /// Apply the user's answer for the submission led by `message`
    pub fn confirm(&mut self, message: MessageId, decision: ConfirmationDecision) -> SmsResult<()> {
        let Some(pending) = self.pending_confirmations.shift_remove(&message) else {
            return Err(if self.trackers.contains_key(&message) {
                SmsError::NotAwaitingConfirmation(message)
            } else {
                SmsError::UnknownMessage(message)
            });
        };
        let app = self
            .trackers
            .get(&message)
            .map(|t| t.app().to_string())
            .unwrap_or_default();
        let premium = pending.kind != ConfirmationKind::SendLimitReached;
        info!(%message, ?decision, kind = ?pending.kind, "SMS confirmation answered");

        match decision {
            ConfirmationDecision::Allow { remember } => {
                if remember && premium {
                    self.usage
                        .set_premium_permission(&app, PremiumPermission::AlwaysAllow);
                }
                for id in pending.parts {
                    self.send_part(id);
                }
            }
            ConfirmationDecision::Deny { remember } => {
                if remember && premium {
                    self.usage
                        .set_premium_permission(&app, PremiumPermission::NeverAllow);
                }
                let failure = if premium {
                    SmsFailure::ShortCodeNotAllowed
                } else {
                    SmsFailure::LimitExceeded
                };
                for id in pending.parts {
                    self.finish_failed(id, failure, None);
                }
            }
        }
        Ok(())
    }

    fn send_part(&mut self, id: MessageId) {
        let Some(tracker) = self.trackers.get_mut(&id) else {
            warn!(message = %id, "Send requested for unknown message");
            return;
        };
        tracker.set_state(TrackerState::Sending);
        let outgoing = tracker.outgoing();
        debug!(message = %id, retry = outgoing.retry, "Sending SMS part");
        self.transport.send(id, &outgoing);
    }

    /// Process one queued task
    pub fn handle_task(&mut self, task: SmsTask) {
        let span = self.log_context.span(Level::DEBUG);
        let _guard = span.enter();
        match task {
            SmsTask::SendComplete { message, result } => self.on_send_complete(message, result),
            SmsTask::Retry { message, timer } => self.on_retry_timer(message, timer),
            SmsTask::StatusReport {
                message_ref,
                status,
            } => self.on_status_report(message_ref, status),
        }
    }

    fn on_send_complete(&mut self, id: MessageId, result: Result<u32, SendFailure>) {
        let Some(tracker) = self.trackers.get_mut(&id) else {
            warn!(message = %id, "Send result for unknown message");
            return;
        };
        if tracker.state() != TrackerState::Sending {
            warn!(message = %id, state = ?tracker.state(), "Unexpected send result");
            return;
        }

        let failure = match result {
            Ok(message_ref) => {
                let awaiting_report = tracker.on_sent(message_ref);
                let group = tracker.group();
                info!(message = %id, message_ref, "SMS sent");
                self.hub.notify(SmsEvent::Sent {
                    message: id,
                    message_ref,
                });
                if !awaiting_report {
                    self.trackers.shift_remove(&id);
                }
                self.part_resolved(group, false);
                return;
            }
            Err(failure) => failure,
        };

        match self.service_state {
            ServiceState::InService => {}
            ServiceState::PowerOff => {
                self.finish_failed(id, SmsFailure::RadioOff, None);
                return;
            }
            ServiceState::OutOfService | ServiceState::EmergencyOnly => {
                self.finish_failed(id, SmsFailure::NoService, None);
                return;
            }
        }

        match tracker.on_send_failed(failure, self.settings.max_send_retries) {
            FailureOutcome::Retry => {
                let retry_count = tracker.retry_count();
                let armed = self
                    .queue
                    .post_delayed_with(self.settings.retry_delay(), move |timer| SmsTask::Retry {
                        message: id,
                        timer,
                    });
                match armed {
                    Ok(timer) => tracker.retry_timer = Some(timer),
                    Err(e) => {
                        warn!(message = %id, error = %e, "Retry timer unavailable");
                        self.finish_failed(id, SmsFailure::GenericFailure, None);
                        return;
                    }
                }
                info!(message = %id, retry_count, "SMS send failed, retrying");
                self.hub.notify(SmsEvent::RetryScheduled {
                    message: id,
                    retry_count,
                });
            }
            FailureOutcome::Fail(reason) => {
                let code = match failure {
                    SendFailure::Other(code) => code,
                    _ => None,
                };
                self.finish_failed(id, reason, code);
            }
        }
    }

    fn on_retry_timer(&mut self, id: MessageId, timer: TimerId) {
        let current = self
            .trackers
            .get(&id)
            .filter(|t| t.state() == TrackerState::RetryScheduled)
            .and_then(|t| t.retry_timer.as_ref())
            .map(|t| t.id());
        if current != Some(timer) {
            debug!(message = %id, %timer, "Ignoring stale retry timer");
            return;
        }
        self.send_part(id);
    }

    fn on_status_report(&mut self, message_ref: u32, status: DeliveryStatus) {
        let found = self
            .trackers
            .iter()
            .find(|(_, t)| {
                t.state() == TrackerState::AwaitingDelivery && t.message_ref() == Some(message_ref)
            })
            .map(|(id, _)| *id);
        let Some(id) = found else {
            warn!(message_ref, "Status report for unknown message");
            return;
        };

        match status {
            DeliveryStatus::Pending => {
                debug!(message = %id, message_ref, "Delivery still pending");
            }
            DeliveryStatus::Complete => {
                if let Some(mut tracker) = self.trackers.shift_remove(&id) {
                    tracker.set_state(TrackerState::Delivered);
                }
                info!(message = %id, message_ref, "SMS delivered");
                self.hub.notify(SmsEvent::Delivered { message: id });
            }
            DeliveryStatus::Failed => {
                self.trackers.shift_remove(&id);
                warn!(message = %id, message_ref, "SMS delivery failed");
                self.hub.notify(SmsEvent::DeliveryFailed { message: id });
            }
        }
    }

    fn finish_failed(&mut self, id: MessageId, failure: SmsFailure, error_code: Option<i32>) {
        let Some(mut tracker) = self.trackers.shift_remove(&id) else {
            return;
        };
        tracker.fail(failure);
        warn!(message = %id, ?failure, ?error_code, retry_count = tracker.retry_count(), "SMS failed");
        self.hub.notify(SmsEvent::SendFailed {
            message: id,
            failure,
            error_code,
            retry_count: tracker.retry_count(),
        });
        self.part_resolved(tracker.group(), true);
    }

    fn part_resolved(&mut self, group: Option<GroupId>, failed: bool) {
        let Some(group) = group else {
            return;
        };
        let Some(state) = self.groups.get_mut(&group) else {
            return;
        };
        state.unsent = state.unsent.saturating_sub(1);
        state.failed |= failed;
        if state.unsent == 0 {
            let failed = state.failed;
            self.groups.remove(&group);
            info!(%group, failed, "Multipart SMS complete");
            self.hub.notify(SmsEvent::MessageComplete { group, failed });
        }
    }
}
