//! Test doubles for the SMS transport and the confirmation prompt

use crate::dispatcher::{SmsDispatcher, SmsTask};
use crate::settings::SmsSettings;
use crate::transport::{ConfirmationPrompter, SmsTransport};
use crate::types::{ConfirmationRequest, MessageId, OutgoingSms};
use parking_lot::Mutex;
use std::sync::Arc;
use telephony_infra_common::TaskQueue;
use telephony_phone_core::ServiceState;

/// Transport that records every send and never answers on its own
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    log: Arc<Mutex<Vec<(MessageId, OutgoingSms)>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(MessageId, OutgoingSms)> {
        self.log.lock().clone()
    }

    /// Number of attempts made for `message`
    pub fn attempts(&self, message: MessageId) -> usize {
        self.log.lock().iter().filter(|(id, _)| *id == message).count()
    }

    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }
}

impl SmsTransport for RecordingTransport {
    fn send(&mut self, message: MessageId, sms: &OutgoingSms) {
        self.log.lock().push((message, sms.clone()));
    }
}

/// Prompter that records every question
#[derive(Debug, Clone, Default)]
pub struct RecordingPrompter {
    log: Arc<Mutex<Vec<ConfirmationRequest>>>,
}

impl RecordingPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<ConfirmationRequest> {
        self.log.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }
}

impl ConfirmationPrompter for RecordingPrompter {
    fn prompt(&mut self, request: &ConfirmationRequest) {
        self.log.lock().push(request.clone());
    }
}

/// An in-service dispatcher wired to recording doubles
pub fn dispatcher(
    settings: SmsSettings,
) -> (SmsDispatcher, RecordingTransport, RecordingPrompter, TaskQueue<SmsTask>) {
    let queue = TaskQueue::new("sms-test");
    let transport = RecordingTransport::new();
    let prompter = RecordingPrompter::new();
    let mut dispatcher = SmsDispatcher::new(
        settings,
        Box::new(transport.clone()),
        Box::new(prompter.clone()),
        queue.handle(),
    )
    .expect("default settings compile");
    dispatcher.set_service_state(ServiceState::InService);
    (dispatcher, transport, prompter, queue)
}
