//! Supplementary-service and USSD sessions

use super::phone::{PhoneSession, RequestPurpose};
use crate::call::{CallSlot, CallState};
use crate::connection::ConnectionId;
use crate::error::{PhoneError, PhoneResult};
use crate::events::PhoneNotification;
use crate::mmi::{MmiCode, MmiId, MmiRequest, MmiState};
use crate::radio::{RadioRequest, UssdMode};
use crate::types::{SuppService, VideoState};
use tracing::{debug, info, warn};

impl PhoneSession {
    /// Track a parsed code, announce it and send it on its way
    pub(crate) fn start_mmi(&mut self, mmi: MmiCode) -> MmiId {
        let id = mmi.id();
        self.pending_mmis.insert(id, mmi);
        self.notify(PhoneNotification::MmiInitiate(id));
        self.process_mmi(id);
        id
    }

    fn process_mmi(&mut self, id: MmiId) {
        let Some(mmi) = self.pending_mmis.get_mut(&id) else {
            return;
        };
        match mmi.to_request() {
            Ok(MmiRequest::Ussd(text)) => {
                debug!(phone = %self.id, mmi = %id, "Sending USSD");
                mmi.set_pending_ussd(true);
                let _ = self.submit(RadioRequest::SendUssd(text), RequestPurpose::Ussd { mmi: id });
            }
            Ok(MmiRequest::Service(request)) => {
                debug!(phone = %self.id, mmi = %id, service = ?request.service, action = ?request.action, "Sending supplementary service request");
                let _ = self.submit(
                    RadioRequest::SupplementaryService(request),
                    RequestPurpose::Ss { mmi: id },
                );
            }
            Err(message) => {
                warn!(phone = %self.id, mmi = %id, %message, "Rejecting MMI code");
                self.mmi_done(id, MmiState::Failed, Some(message));
            }
        }
    }

    /// Finish a session and publish the result
    pub(crate) fn mmi_done(&mut self, id: MmiId, state: MmiState, message: Option<String>) {
        let Some(mut mmi) = self.pending_mmis.shift_remove(&id) else {
            debug!(phone = %self.id, mmi = %id, "MMI already finished");
            return;
        };
        mmi.finish(state, message);
        info!(phone = %self.id, mmi = %id, ?state, "MMI complete");
        self.publish_mmi_complete(&mmi);
    }

    fn publish_mmi_complete(&mut self, mmi: &MmiCode) {
        self.notify(PhoneNotification::MmiComplete {
            mmi: mmi.id(),
            state: mmi.state(),
            message: mmi.message().map(str::to_string),
            is_ussd_request: mmi.is_ussd_request(),
        });
    }

    /// Codes still waiting for an answer, oldest first
    pub fn pending_mmis(&self) -> impl Iterator<Item = &MmiCode> {
        self.pending_mmis.values()
    }

    pub fn mmi(&self, id: MmiId) -> Option<&MmiCode> {
        self.pending_mmis.get(&id)
    }

    /// Answer a network USSD request
    pub fn send_ussd_response(&mut self, text: &str) -> PhoneResult<MmiId> {
        if !self.class.handles_mmi() {
            return Err(PhoneError::unsupported("USSD", self.class));
        }
        // The request being answered is superseded by the reply session
        self.pending_mmis.retain(|_, m| !m.is_ussd_request());
        let mmi = MmiCode::from_ussd_user_input(text);
        let id = mmi.id();
        self.pending_mmis.insert(id, mmi);
        self.process_mmi(id);
        Ok(id)
    }

    /// Abort a pending session
    pub fn cancel_mmi(&mut self, id: MmiId) -> PhoneResult<()> {
        let mmi = self
            .pending_mmis
            .get(&id)
            .ok_or_else(|| PhoneError::call_state("no such MMI session"))?;
        if mmi.is_pending_ussd() {
            info!(phone = %self.id, mmi = %id, "Cancelling USSD session");
            let _ = self.submit(RadioRequest::CancelUssd, RequestPurpose::CancelUssd { mmi: id });
        } else {
            self.mmi_done(id, MmiState::Cancelled, None);
        }
        Ok(())
    }

    /// A USSD indication from the network
    pub(crate) fn on_incoming_ussd(&mut self, mode: UssdMode, message: Option<String>) {
        let is_error = matches!(mode, UssdMode::NotSupported | UssdMode::NetworkTimeout);
        let pending = self
            .pending_mmis
            .values()
            .find(|m| m.is_pending_ussd())
            .map(MmiCode::id);

        let Some(id) = pending else {
            if is_error || mode == UssdMode::NetworkRelease {
                debug!(phone = %self.id, ?mode, "USSD indication without a session");
                return;
            }
            let is_request = mode == UssdMode::Request;
            let mmi = MmiCode::network_initiated(message, is_request);
            info!(phone = %self.id, mmi = %mmi.id(), is_request, "Network initiated USSD");
            if is_request {
                let id = mmi.id();
                self.pending_mmis.insert(id, mmi);
                self.notify(PhoneNotification::MmiInitiate(id));
            } else {
                self.publish_mmi_complete(&mmi);
            }
            return;
        };

        match mode {
            UssdMode::NetworkRelease => self.mmi_done(id, MmiState::Cancelled, None),
            UssdMode::Notify | UssdMode::LocalClient => {
                let text = message.unwrap_or_else(|| "MMI complete".to_string());
                self.mmi_done(id, MmiState::Complete, Some(text));
            }
            UssdMode::Request => {
                // The session stays open for the user's answer
                if let Some(mmi) = self.pending_mmis.get_mut(&id) {
                    mmi.set_ussd_request(true);
                    mmi.finish(MmiState::Pending, message);
                    mmi.set_pending_ussd(true);
                }
                if let Some(mmi) = self.pending_mmis.get(&id).cloned() {
                    self.publish_mmi_complete(&mmi);
                }
            }
            UssdMode::NotSupported | UssdMode::NetworkTimeout => {
                self.mmi_done(id, MmiState::Failed, Some("USSD request failed".to_string()));
            }
        }
    }

    /// Call-control codes typed while in a call (`0`, `1`, `1x`, `2`, `2x`, `3`, `4`, `5`).
    ///
    /// Returns `false` when the string is not such a command and should be
    /// dialed normally.
    pub fn handle_in_call_mmi_commands(&mut self, dial: &str) -> bool {
        if !self.class.handles_mmi() || !self.is_in_call() || dial.is_empty() || dial.len() > 2 {
            return false;
        }
        let mut chars = dial.chars();
        let command = chars.next().unwrap_or_default();
        let index = chars.next().and_then(|c| c.to_digit(10));

        match command {
            '0' if dial.len() == 1 => {
                if self.ringing_call().is_ringing() || !self.background_call().is_idle() {
                    self.mark_ringing_or_background_hangup();
                    let _ = self.submit(
                        RadioRequest::HangupWaitingOrBackground,
                        RequestPurpose::SuppService(SuppService::Reject),
                    );
                    self.after_local_change();
                } else {
                    self.notify_supp_service_failed(SuppService::Reject);
                }
                true
            }
            '1' => {
                let result = match index {
                    Some(index) => self.hangup_foreground_index(index),
                    None if !self.foreground_call().is_idle() => {
                        self.hangup_call(CallSlot::Foreground).map(drop)
                    }
                    None => self.switch_holding_and_active().map(drop),
                };
                if let Err(err) = result {
                    debug!(phone = %self.id, %err, "In-call hangup command failed");
                    self.notify_supp_service_failed(SuppService::Hangup);
                }
                true
            }
            '2' => {
                let result = match index {
                    Some(index) => self.separate_foreground_index(index),
                    None if self.ringing_call().is_ringing() => {
                        self.accept_call(VideoState::AudioOnly).map(drop)
                    }
                    None => self.switch_holding_and_active().map(drop),
                };
                if let Err(err) = result {
                    debug!(phone = %self.id, %err, "In-call switch command failed");
                    let service = if index.is_some() {
                        SuppService::Separate
                    } else {
                        SuppService::Switch
                    };
                    self.notify_supp_service_failed(service);
                }
                true
            }
            '3' if dial.len() == 1 => {
                if self.conference().is_err() {
                    self.notify_supp_service_failed(SuppService::Conference);
                }
                true
            }
            '4' if dial.len() == 1 => {
                if self.explicit_call_transfer().is_err() {
                    self.notify_supp_service_failed(SuppService::Transfer);
                }
                true
            }
            '5' if dial.len() == 1 => {
                self.notify_supp_service_failed(SuppService::Unknown);
                true
            }
            _ => false,
        }
    }

    fn mark_ringing_or_background_hangup(&mut self) {
        let slot = if self.ringing_call().is_ringing() {
            CallSlot::Ringing
        } else {
            CallSlot::Background
        };
        for conn in self.call_mut(slot).connections_mut() {
            if conn.is_alive() {
                conn.on_hangup_local();
            }
        }
    }

    fn foreground_connection_with_index(&self, index: u32) -> PhoneResult<(ConnectionId, CallState)> {
        self.foreground_call()
            .live_connections()
            .find(|c| c.driver_index() == Some(index))
            .map(|c| (c.id(), c.state()))
            .ok_or_else(|| PhoneError::UnknownConnection(format!("call index {index}")))
    }

    fn hangup_foreground_index(&mut self, index: u32) -> PhoneResult<()> {
        let (id, _) = self.foreground_connection_with_index(index)?;
        self.hangup_connection(id).map(drop)
    }

    fn separate_foreground_index(&mut self, index: u32) -> PhoneResult<()> {
        let (id, state) = self.foreground_connection_with_index(index)?;
        if state != CallState::Active {
            return Err(PhoneError::call_state("connection is not active"));
        }
        self.separate(id).map(drop)
    }
}
