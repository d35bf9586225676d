//! Radio event handling

use super::phone::{PhoneSession, PhoneTask, RequestPurpose};
use crate::call::{CallSlot, CallState};
use crate::cause::{disconnect_cause_from_code, CallFailCause, DisconnectCause};
use crate::connection::{Connection, ConnectionId};
use crate::events::PhoneNotification;
use crate::mmi::MmiState;
use crate::radio::{
    DriverCall, RadioError, RadioEvent, RadioPowerState, RadioRequest, RadioResponse, RadioResult,
    RequestToken,
};
use crate::types::{PhoneState, RadioClass, ServiceState, SuppService};
use std::collections::HashSet;
use tracing::{debug, info, trace, warn};

const MMI_ERROR: &str = "Connection problem or invalid MMI code";
const MMI_FDN: &str = "Blocked by fixed dialing numbers";

impl PhoneSession {
    /// Entry point for everything queued for this phone
    pub fn handle_task(&mut self, task: PhoneTask) {
        match task {
            PhoneTask::Radio(event) => self.handle_radio_event(event),
            PhoneTask::EcmTimerExpired(timer) => self.on_ecm_timer_expired(timer),
            PhoneTask::PostDialPause { connection, timer } => {
                self.on_post_dial_pause_elapsed(connection, timer)
            }
        }
    }

    pub fn handle_radio_event(&mut self, event: RadioEvent) {
        trace!(phone = %self.id, ?event, "Radio event");
        match event {
            RadioEvent::Response { token, result } => self.on_response(token, result),
            RadioEvent::CallStateChanged { calls, fail_cause } => {
                self.handle_call_list(calls, fail_cause)
            }
            RadioEvent::CallRing => {
                if self.phone_state() == PhoneState::Ringing {
                    self.notify(PhoneNotification::IncomingRing);
                } else {
                    debug!(phone = %self.id, "Ignoring ring while not ringing");
                }
            }
            RadioEvent::CdmaCallWaiting { number } => self.on_cdma_call_waiting(&number),
            RadioEvent::Ussd { mode, message } => self.on_incoming_ussd(mode, message),
            RadioEvent::EmergencyCallbackModeEntered => self.enter_emergency_callback_mode(),
            RadioEvent::RadioPower(state) => self.on_radio_power(state),
            RadioEvent::ServiceStateChanged(state) => self.set_service_state(state),
            RadioEvent::VoiceRadioTechChanged(class) => self.on_voice_radio_tech_changed(class),
            RadioEvent::RingbackTone(on) => self.notify(PhoneNotification::RingbackTone(on)),
            RadioEvent::OnHoldTone(on) => self.notify(PhoneNotification::OnHoldTone(on)),
            RadioEvent::VoicePrivacy(true) => self.notify(PhoneNotification::InCallVoicePrivacyOn),
            RadioEvent::VoicePrivacy(false) => self.notify(PhoneNotification::InCallVoicePrivacyOff),
            RadioEvent::DisplayInfo(text) => self.notify(PhoneNotification::DisplayInfo(text)),
            RadioEvent::SignalInfo(info) => self.notify(PhoneNotification::SignalInfo(info)),
            RadioEvent::OtaProvisionStatus(status) => {
                self.notify(PhoneNotification::CdmaOtaStatusChange(status))
            }
            RadioEvent::ResendIncallMute => self.notify(PhoneNotification::ResendIncallMute),
            RadioEvent::TtyModeReceived(mode) => self.notify(PhoneNotification::TtyModeReceived(mode)),
            RadioEvent::SubscriptionInfoReady => self.notify(PhoneNotification::SubscriptionInfoReady),
            RadioEvent::Unsolicited { code } => {
                warn!(phone = %self.id, code, "Unhandled unsolicited radio indication");
            }
        }
    }

    fn on_response(&mut self, token: RequestToken, result: RadioResult) {
        let Some(pending) = self.pending_requests.remove(&token) else {
            warn!(phone = %self.id, %token, "Response for unknown request");
            return;
        };
        debug!(phone = %self.id, %token, ok = result.is_ok(), purpose = ?pending.purpose, "Radio response");

        match pending.purpose {
            RequestPurpose::Plain => {}
            RequestPurpose::Dial { connection } => {
                if let Err(err) = &result {
                    self.on_dial_failed(connection, err);
                }
            }
            RequestPurpose::CdmaThreeWay { connection } => {
                if self.pending_mo == Some(connection) {
                    self.pending_mo = None;
                }
                match &result {
                    Ok(_) => {
                        if let Some(conn) = self.connection_mut(connection) {
                            conn.set_state(CallState::Active);
                        }
                        self.after_local_change();
                        self.start_post_dial(connection);
                    }
                    Err(err) => self.on_dial_failed(connection, err),
                }
            }
            RequestPurpose::CdmaAcceptWaiting { connection } => {
                if result.is_ok() {
                    if let Some(conn) = self.connection_mut(connection) {
                        conn.set_state(CallState::Active);
                    }
                    self.move_connection(connection, CallSlot::Foreground);
                    self.after_local_change();
                }
            }
            RequestPurpose::SuppService(service) => {
                if let Err(err) = &result {
                    warn!(phone = %self.id, ?service, %err, "Supplementary service request rejected");
                    self.notify_supp_service_failed(service);
                }
            }
            RequestPurpose::PostDialDtmf { connection } => {
                self.continue_post_dial_after_dtmf(connection);
            }
            RequestPurpose::Ss { mmi } => {
                let (state, message) = match &result {
                    Ok(RadioResponse::ServiceInfo(text)) => (MmiState::Complete, text.clone()),
                    Ok(RadioResponse::Done) => {
                        let message = self
                            .pending_mmis
                            .get(&mmi)
                            .map(|m| m.success_message())
                            .unwrap_or("Request completed");
                        (MmiState::Complete, message.to_string())
                    }
                    Err(RadioError::FdnCheckFailure) => (MmiState::Failed, MMI_FDN.to_string()),
                    Err(_) => (MmiState::Failed, MMI_ERROR.to_string()),
                };
                self.mmi_done(mmi, state, Some(message));
            }
            RequestPurpose::Ussd { mmi } => {
                // Success means "sent"; the answer arrives as a USSD indication
                if result.is_err() {
                    self.mmi_done(mmi, MmiState::Failed, Some(MMI_ERROR.to_string()));
                }
            }
            RequestPurpose::CancelUssd { mmi } => {
                self.mmi_done(mmi, MmiState::Cancelled, None);
            }
            RequestPurpose::ExitEcm => self.on_exit_ecm_response(&result),
        }

        if let Some(reply) = pending.reply {
            let _ = reply.send(result);
        }
    }

    fn on_dial_failed(&mut self, connection: ConnectionId, err: &RadioError) {
        warn!(phone = %self.id, %connection, %err, "Dial failed");
        let cause = match err {
            RadioError::FdnCheckFailure => DisconnectCause::FdnBlocked,
            _ => disconnect_cause_from_code(CallFailCause::ERROR_UNSPECIFIED, self.service_state),
        };
        self.disconnect_local(connection, cause);
        self.after_local_change();
    }

    /// Reconcile our connections with the radio's call list
    pub(crate) fn handle_call_list(&mut self, calls: Vec<DriverCall>, fail_cause: Option<i32>) {
        let mut changed = false;
        let mut seen: HashSet<ConnectionId> = HashSet::new();
        let mut new_ringing = None;
        let mut unknown = Vec::new();
        let mut connected = Vec::new();

        for dc in &calls {
            let state = CallState::from(dc.state);

            if let Some(id) = self.connection_by_index(dc.index) {
                seen.insert(id);
                if self.apply_driver_state(id, state) {
                    changed = true;
                    if state == CallState::Active {
                        connected.push(id);
                    }
                }
                continue;
            }

            if !dc.is_mt {
                if let Some(mo) = self.pending_mo.take() {
                    seen.insert(mo);
                    changed = true;
                    if let Some(conn) = self.connection_mut(mo) {
                        conn.set_driver_index(dc.index);
                    }
                    debug!(phone = %self.id, connection = %mo, index = dc.index, "Pending dial reported by radio");
                    if self.hangup_pending_mo {
                        self.hangup_pending_mo = false;
                        debug!(phone = %self.id, connection = %mo, index = dc.index, "Hanging up dial ended before the radio reported it");
                        // The caller's completion already resolved; failure is reported on the hub
                        let _ = self.submit(
                            RadioRequest::HangupConnection { index: dc.index },
                            RequestPurpose::SuppService(SuppService::Hangup),
                        );
                    } else if self.apply_driver_state(mo, state) && state == CallState::Active {
                        connected.push(mo);
                    }
                    continue;
                }
            }

            let Some(slot) = CallSlot::for_state(state) else {
                continue;
            };
            let conn = if dc.is_mt {
                Connection::incoming(&dc.number, state, Some(dc.index))
            } else {
                Connection::unknown_outgoing(&dc.number, state, dc.index)
            };
            let id = conn.id();
            seen.insert(id);
            self.call_mut(slot).push(conn);
            changed = true;

            if dc.is_mt && state.is_ringing() {
                info!(phone = %self.id, connection = %id, "New ringing connection");
                new_ringing = Some(id);
            } else {
                info!(phone = %self.id, connection = %id, "Unknown connection reported by radio");
                unknown.push(id);
            }
        }

        // Anything the radio no longer reports has ended
        let radio_cause = disconnect_cause_from_code(
            fail_cause.unwrap_or(CallFailCause::NORMAL_CLEARING),
            self.service_state,
        );
        let everything_gone = calls.is_empty();
        let dropped: Vec<(ConnectionId, DisconnectCause)> = self
            .calls
            .iter()
            .flat_map(|call| call.connections())
            .filter(|c| c.state() != CallState::Disconnected && !seen.contains(&c.id()))
            .filter(|c| c.driver_index().is_some() || (everything_gone && self.pending_mo != Some(c.id())))
            .map(|c| (c.id(), c.dropped_cause(radio_cause)))
            .collect();
        for (id, cause) in dropped {
            debug!(phone = %self.id, connection = %id, ?cause, "Connection dropped");
            self.disconnect_local(id, cause);
            changed = true;
        }

        if let Some(id) = new_ringing {
            let connection = self.connection_ref(id);
            self.notify(PhoneNotification::NewRingingConnection(connection));
        }
        for id in unknown {
            let connection = self.connection_ref(id);
            self.notify(PhoneNotification::UnknownConnection(connection));
        }

        if changed {
            self.after_local_change();
        } else {
            self.update_phone_state();
        }

        for id in connected {
            self.start_post_dial(id);
        }
    }

    /// Apply a reported state, moving the connection between slots as needed
    fn apply_driver_state(&mut self, id: ConnectionId, state: CallState) -> bool {
        let Some(conn) = self.connection_mut(id) else {
            return false;
        };
        // Hung up locally: stays disconnecting until the radio drops it
        if conn.hangup_requested() {
            return false;
        }
        let changed = conn.set_state(state);
        if let Some(slot) = CallSlot::for_state(state) {
            self.move_connection(id, slot);
        }
        changed
    }

    fn on_cdma_call_waiting(&mut self, number: &str) {
        if self.class != RadioClass::Cdma {
            warn!(phone = %self.id, radio_class = %self.class, "CDMA call waiting on non-CDMA radio");
            return;
        }
        let conn = Connection::incoming(number, CallState::Waiting, None);
        let id = conn.id();
        self.call_mut(CallSlot::Ringing).push(conn);
        info!(phone = %self.id, connection = %id, "CDMA call waiting");
        self.update_phone_state();
        let connection = self.connection_ref(id);
        self.notify(PhoneNotification::CallWaiting(connection));
        self.notify(PhoneNotification::PreciseCallStateChanged);
    }

    pub(crate) fn set_service_state(&mut self, state: ServiceState) {
        if self.service_state == state {
            return;
        }
        info!(phone = %self.id, from = ?self.service_state, to = ?state, "Service state changed");
        self.service_state = state;
        self.notify(PhoneNotification::ServiceStateChanged(state));
    }

    fn on_radio_power(&mut self, state: RadioPowerState) {
        match state {
            RadioPowerState::On => debug!(phone = %self.id, "Radio on"),
            RadioPowerState::Off | RadioPowerState::Unavailable => {
                info!(phone = %self.id, ?state, "Radio down, dropping all calls");
                self.set_service_state(ServiceState::PowerOff);
                let cause = disconnect_cause_from_code(CallFailCause::NORMAL_CLEARING, self.service_state);
                self.drop_all_connections(cause);
            }
        }
    }

    /// Disconnect every live connection, including a pending dial
    pub(crate) fn drop_all_connections(&mut self, cause: DisconnectCause) {
        let live: Vec<(ConnectionId, DisconnectCause)> = self
            .calls
            .iter()
            .flat_map(|call| call.connections())
            .filter(|c| c.state() != CallState::Disconnected)
            .map(|c| (c.id(), c.dropped_cause(cause)))
            .collect();
        if live.is_empty() {
            return;
        }
        for (id, cause) in live {
            self.disconnect_local(id, cause);
        }
        self.pending_mo = None;
        self.hangup_pending_mo = false;
        self.after_local_change();
    }

    fn on_voice_radio_tech_changed(&mut self, class: RadioClass) {
        if !self.class.is_cs() || !class.is_cs() {
            warn!(phone = %self.id, from = %self.class, to = %class, "Ignoring radio technology change");
            return;
        }
        if class == self.class {
            return;
        }
        info!(phone = %self.id, from = %self.class, to = %class, "Voice radio technology changed");

        self.drop_all_connections(DisconnectCause::ErrorUnspecified);
        if self.class == RadioClass::Cdma && self.ecm.active {
            self.leave_ecm();
        }
        let stale: Vec<_> = self.pending_mmis.keys().copied().collect();
        for mmi in stale {
            self.mmi_done(mmi, MmiState::Cancelled, None);
        }

        self.class = class;
        self.notify(PhoneNotification::RadioTechnologyChanged(class));
        self.notify(PhoneNotification::PreciseCallStateChanged);
    }
}
