//! Test doubles for the radio link

use crate::radio::{RadioEvent, RadioLink, RadioRequest, RequestToken};
use crate::session::{PhoneDispatch, PhoneSession};
use crate::settings::PhoneSettings;
use crate::types::{PhoneId, RadioClass, ServiceState, SubId};
use parking_lot::Mutex;
use std::sync::Arc;
use telephony_infra_common::TaskQueue;

/// Radio link that records every request and never answers on its own.
///
/// Clones share the same log, so a test keeps one clone while the session
/// owns the other.
#[derive(Debug, Clone, Default)]
pub struct RecordingRadio {
    log: Arc<Mutex<Vec<(RequestToken, RadioRequest)>>>,
}

impl RecordingRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request submitted so far
    pub fn requests(&self) -> Vec<RadioRequest> {
        self.log.lock().iter().map(|(_, r)| r.clone()).collect()
    }

    /// Drain the log
    pub fn take(&self) -> Vec<(RequestToken, RadioRequest)> {
        std::mem::take(&mut *self.log.lock())
    }

    pub fn last(&self) -> Option<(RequestToken, RadioRequest)> {
        self.log.lock().last().cloned()
    }

    pub fn last_token(&self) -> Option<RequestToken> {
        self.last().map(|(t, _)| t)
    }

    /// Token of the most recent request matching `pred`
    pub fn token_of(&self, pred: impl Fn(&RadioRequest) -> bool) -> Option<RequestToken> {
        self.log
            .lock()
            .iter()
            .rev()
            .find(|(_, r)| pred(r))
            .map(|(t, _)| *t)
    }

    pub fn count(&self, pred: impl Fn(&RadioRequest) -> bool) -> usize {
        self.log.lock().iter().filter(|(_, r)| pred(r)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }
}

impl RadioLink for RecordingRadio {
    fn submit(&mut self, token: RequestToken, request: RadioRequest) {
        self.log.lock().push((token, request));
    }
}

/// A lone in-service session wired to a recording radio
pub fn session(class: RadioClass) -> (PhoneSession, RecordingRadio, TaskQueue<PhoneDispatch>) {
    session_with(PhoneId(0), SubId(1), class, PhoneSettings::default())
}

pub fn session_with(
    id: PhoneId,
    sub: SubId,
    class: RadioClass,
    settings: PhoneSettings,
) -> (PhoneSession, RecordingRadio, TaskQueue<PhoneDispatch>) {
    let queue = TaskQueue::new(format!("test-{id}"));
    let radio = RecordingRadio::new();
    let mut session = PhoneSession::new(id, sub, class, Box::new(radio.clone()), queue.handle(), settings);
    session.handle_radio_event(RadioEvent::ServiceStateChanged(ServiceState::InService));
    (session, radio, queue)
}
