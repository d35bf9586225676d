//! Call-control operations

use super::phone::{DeferredDial, DialOutcome, PhoneSession, RequestPurpose};
use crate::call::{CallSlot, CallState};
use crate::cause::DisconnectCause;
use crate::connection::{Connection, ConnectionId};
use crate::dial_string;
use crate::error::{PhoneError, PhoneResult};
use crate::events::PhoneNotification;
use crate::mmi::MmiCode;
use crate::radio::{resolved, Completion, RadioError, RadioRequest, RadioResponse};
use crate::session::EcmTimerAction;
use crate::types::{ClirMode, PhoneState, RadioClass, ServiceState, SuppService, VideoState};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

impl PhoneSession {
    /// Place a call, or route the string to supplementary-service handling.
    ///
    /// Fails with a call-state error when the radio is powered off, a call is
    /// ringing, another outgoing call is still pending, or the foreground call
    /// is not active, idle, disconnected or alerting.
    pub fn dial(&mut self, dial_string: &str, video: VideoState) -> PhoneResult<DialOutcome> {
        let stripped = dial_string::strip_separators(dial_string);
        if stripped.is_empty() {
            return Err(PhoneError::call_state("empty dial string"));
        }
        let emergency = dial_string::is_emergency(&stripped, &self.settings.emergency_numbers);
        info!(phone = %self.id, emergency, "Dial requested");

        if self.class.handles_mmi() && !emergency {
            if self.handle_in_call_mmi_commands(&stripped) {
                return Ok(DialOutcome::InCallMmi);
            }

            let network = dial_string::network_portion(&stripped);
            let parsed = MmiCode::parse(network, self.is_in_call(), &self.settings.emergency_numbers);
            if let Some(mmi) = parsed {
                if mmi.is_temporary_mode_clir() {
                    let number = format!(
                        "{}{}",
                        mmi.dialing_number().unwrap_or_default(),
                        dial_string::post_dial_portion(&stripped)
                    );
                    return self.dial_connection(&number, mmi.clir_mode(), video, false);
                }
                let id = self.start_mmi(mmi);
                return Ok(DialOutcome::Mmi(id));
            }
        }

        self.dial_connection(&stripped, ClirMode::Default, video, emergency)
    }

    /// Local legality gate for a voice dial
    pub fn check_can_dial(&self) -> PhoneResult<()> {
        if self.service_state == ServiceState::PowerOff {
            return Err(PhoneError::call_state("radio is powered off"));
        }
        if self.ringing_call().is_ringing() {
            return Err(PhoneError::call_state("cannot dial while a call is ringing"));
        }
        if self.pending_mo.is_some() {
            return Err(PhoneError::call_state("another outgoing call is pending"));
        }
        match self.foreground_call().state() {
            CallState::Active | CallState::Idle | CallState::Disconnected | CallState::Alerting => Ok(()),
            state => Err(PhoneError::call_state(format!(
                "cannot dial while the foreground call is {}",
                state
            ))),
        }
    }

    pub(crate) fn dial_connection(
        &mut self,
        number: &str,
        clir: ClirMode,
        video: VideoState,
        emergency: bool,
    ) -> PhoneResult<DialOutcome> {
        self.clear_disconnected_calls();
        self.check_can_dial()?;

        if self.class == RadioClass::Cdma {
            return self.dial_cdma(number, clir, video, emergency);
        }

        if self.foreground_call().state() == CallState::Active {
            if !self.background_call().is_idle() {
                debug!(phone = %self.id, "Hanging up active call before dialing");
                self.hangup_all_connections(CallSlot::Foreground);
            } else {
                debug!(phone = %self.id, "Holding active call before dialing");
                let _ = self.submit(
                    RadioRequest::SwitchWaitingOrHoldingAndActive,
                    RequestPurpose::SuppService(SuppService::Switch),
                );
                self.fake_hold_foreground();
            }
        }

        let conn = Connection::outgoing(number, emergency, video);
        let id = conn.id();
        let request = RadioRequest::Dial {
            address: conn.address().to_string(),
            clir,
            video,
            emergency,
        };
        self.call_mut(CallSlot::Foreground).push(conn);
        self.pending_mo = Some(id);

        let completion = self.submit(request, RequestPurpose::Dial { connection: id });
        self.after_local_change();
        Ok(DialOutcome::Connection {
            connection: self.connection_ref(id),
            completion,
        })
    }

    fn dial_cdma(
        &mut self,
        number: &str,
        clir: ClirMode,
        video: VideoState,
        emergency: bool,
    ) -> PhoneResult<DialOutcome> {
        let three_way = self.foreground_call().state() == CallState::Active;
        if three_way && self.foreground_call().live_count() >= 2 {
            return Err(PhoneError::call_state("three-way call already in progress"));
        }
        if self.ecm.active && emergency {
            self.handle_ecm_timer(EcmTimerAction::Cancel);
        }

        let conn = Connection::outgoing(number, emergency, video);
        let id = conn.id();
        let address = conn.address().to_string();

        // Three-way calling: the second party is reached with a flash
        if three_way {
            self.call_mut(CallSlot::Foreground).push(conn);
            self.pending_mo = Some(id);
            let completion = self.submit(
                RadioRequest::SendCdmaFlash(address),
                RequestPurpose::CdmaThreeWay { connection: id },
            );
            self.after_local_change();
            return Ok(DialOutcome::Connection {
                connection: self.connection_ref(id),
                completion,
            });
        }

        self.call_mut(CallSlot::Foreground).push(conn);
        self.pending_mo = Some(id);
        let request = RadioRequest::Dial {
            address,
            clir,
            video,
            emergency,
        };

        let completion = if self.ecm.active && !emergency {
            info!(phone = %self.id, "Exiting emergency callback mode before dialing");
            let (tx, rx) = oneshot::channel();
            self.ecm.deferred_dial = Some(DeferredDial {
                connection: id,
                request,
                reply: tx,
            });
            self.submit_with(
                RadioRequest::ExitEmergencyCallbackMode,
                RequestPurpose::ExitEcm,
                None,
            );
            rx
        } else {
            self.submit(request, RequestPurpose::Dial { connection: id })
        };

        self.after_local_change();
        Ok(DialOutcome::Connection {
            connection: self.connection_ref(id),
            completion,
        })
    }

    /// Move the active call to the background ahead of the radio's report
    fn fake_hold_foreground(&mut self) {
        let moved = self.call_mut(CallSlot::Foreground).drain();
        for mut conn in moved {
            if conn.is_alive() {
                conn.set_state(CallState::Holding);
            }
            self.call_mut(CallSlot::Background).push(conn);
        }
    }

    /// Answer the ringing call
    pub fn accept_call(&mut self, video: VideoState) -> PhoneResult<Completion> {
        match self.ringing_call().state() {
            CallState::Incoming => {
                info!(phone = %self.id, ?video, "Accepting incoming call");
                self.set_mute_internal(false);
                Ok(self.submit(RadioRequest::AcceptCall, RequestPurpose::Plain))
            }
            CallState::Waiting if self.class == RadioClass::Cdma => {
                let waiting = self
                    .ringing_call()
                    .live_connections()
                    .next()
                    .map(Connection::id)
                    .ok_or_else(|| PhoneError::call_state("phone not ringing"))?;
                info!(phone = %self.id, "Accepting CDMA waiting call");
                Ok(self.submit(
                    RadioRequest::SendCdmaFlash(String::new()),
                    RequestPurpose::CdmaAcceptWaiting { connection: waiting },
                ))
            }
            CallState::Waiting => {
                info!(phone = %self.id, "Accepting waiting call");
                self.set_mute_internal(false);
                Ok(self.submit(
                    RadioRequest::SwitchWaitingOrHoldingAndActive,
                    RequestPurpose::SuppService(SuppService::Switch),
                ))
            }
            _ => Err(PhoneError::call_state("phone not ringing")),
        }
    }

    /// Reject the ringing call
    pub fn reject_call(&mut self) -> PhoneResult<Completion> {
        if !self.ringing_call().is_ringing() {
            return Err(PhoneError::call_state("phone not ringing"));
        }
        info!(phone = %self.id, "Rejecting ringing call");

        if let Some(completion) = self.disconnect_unindexed_ringing() {
            return Ok(completion);
        }

        for conn in self.call_mut(CallSlot::Ringing).connections_mut() {
            conn.on_hangup_local();
        }
        let completion = self.submit(
            RadioRequest::RejectCall,
            RequestPurpose::SuppService(SuppService::Reject),
        );
        self.after_local_change();
        Ok(completion)
    }

    /// CDMA call-waiting connections have no radio index; end them locally
    fn disconnect_unindexed_ringing(&mut self) -> Option<Completion> {
        let waiting: Vec<ConnectionId> = self
            .ringing_call()
            .live_connections()
            .filter(|c| c.driver_index().is_none())
            .map(Connection::id)
            .collect();
        if waiting.is_empty() {
            return None;
        }
        for id in waiting {
            self.disconnect_local(id, DisconnectCause::IncomingRejected);
        }
        self.after_local_change();
        Some(resolved(Ok(RadioResponse::Done)))
    }

    /// Swap the active and held calls.
    ///
    /// Illegal while a call is ringing or the foreground call is still
    /// dialing or alerting.
    pub fn switch_holding_and_active(&mut self) -> PhoneResult<Completion> {
        if self.ringing_call().is_ringing() {
            return Err(PhoneError::call_state("cannot switch while a call is ringing"));
        }
        if self.foreground_call().is_dialing_or_alerting() {
            return Err(PhoneError::call_state("cannot switch while dialing"));
        }
        let request = match self.class {
            RadioClass::Cdma => RadioRequest::SendCdmaFlash(String::new()),
            _ => RadioRequest::SwitchWaitingOrHoldingAndActive,
        };
        Ok(self.submit(request, RequestPurpose::SuppService(SuppService::Switch)))
    }

    /// Whether the active and held calls can be merged
    pub fn can_conference(&self) -> bool {
        let fg = self.foreground_call();
        let bg = self.background_call();
        let max = self.settings.max_connections_per_call;
        fg.state() == CallState::Active
            && bg.state() == CallState::Holding
            && fg.live_count() < max
            && bg.live_count() < max
    }

    /// Merge the held call into the active one.
    ///
    /// Never fails synchronously: an ineligible request raises a
    /// supplementary-service failure and resolves with a generic failure.
    pub fn conference(&mut self) -> PhoneResult<Completion> {
        let eligible = match self.class {
            RadioClass::Cdma => self.foreground_call().state() == CallState::Active,
            _ => self.can_conference(),
        };
        if !eligible {
            warn!(phone = %self.id, "Conference not possible in current state");
            self.notify_supp_service_failed(SuppService::Conference);
            return Ok(resolved(Err(RadioError::GenericFailure)));
        }
        let request = match self.class {
            RadioClass::Cdma => RadioRequest::SendCdmaFlash(String::new()),
            _ => RadioRequest::Conference,
        };
        Ok(self.submit(request, RequestPurpose::SuppService(SuppService::Conference)))
    }

    /// Split one party out of a multiparty foreground call
    pub fn separate(&mut self, connection: ConnectionId) -> PhoneResult<Completion> {
        if self.class == RadioClass::Cdma {
            return Err(PhoneError::unsupported("separate", self.class));
        }
        let (slot, conn) = self.require_connection(connection)?;
        if slot != CallSlot::Foreground || !conn.is_alive() {
            return Err(PhoneError::call_state(
                "connection does not belong to the active call",
            ));
        }
        let index = conn
            .driver_index()
            .ok_or_else(|| PhoneError::call_state("connection has no radio index yet"))?;
        Ok(self.submit(
            RadioRequest::SeparateConnection { index },
            RequestPurpose::SuppService(SuppService::Separate),
        ))
    }

    /// Whether this radio can connect its active and held parties
    pub fn can_transfer(&self) -> bool {
        matches!(self.class, RadioClass::Gsm | RadioClass::Ims)
            && self.foreground_call().state() == CallState::Active
            && self.background_call().state() == CallState::Holding
    }

    /// Connect the active and held parties and drop out
    pub fn explicit_call_transfer(&mut self) -> PhoneResult<Completion> {
        if matches!(self.class, RadioClass::Cdma | RadioClass::Sip) {
            warn!(phone = %self.id, radio_class = %self.class, "Transfer not supported");
            self.notify_supp_service_failed(SuppService::Transfer);
            return Ok(resolved(Err(RadioError::RequestNotSupported)));
        }
        if !self.can_transfer() {
            return Err(PhoneError::call_state(
                "transfer needs one active and one held call",
            ));
        }
        Ok(self.submit(
            RadioRequest::ExplicitCallTransfer,
            RequestPurpose::SuppService(SuppService::Transfer),
        ))
    }

    /// Hang up every connection of one call slot
    pub fn hangup_call(&mut self, slot: CallSlot) -> PhoneResult<Completion> {
        if self.call(slot).live_count() == 0 && !self.has_pending_mo_in(slot) {
            return Err(PhoneError::call_state("no connections in call"));
        }
        info!(phone = %self.id, ?slot, "Hanging up call");

        let completion = match slot {
            CallSlot::Ringing => {
                if let Some(completion) = self.disconnect_unindexed_ringing() {
                    return Ok(completion);
                }
                self.mark_slot_hangup(slot);
                self.submit(
                    RadioRequest::HangupWaitingOrBackground,
                    RequestPurpose::SuppService(SuppService::Hangup),
                )
            }
            CallSlot::Foreground => {
                if self.foreground_call().is_dialing_or_alerting() {
                    let first = self
                        .foreground_call()
                        .live_connections()
                        .next()
                        .map(Connection::id)
                        .ok_or_else(|| PhoneError::call_state("no connections in call"))?;
                    return self.hangup_connection(first);
                } else if self.class == RadioClass::Gsm && self.ringing_call().is_ringing() {
                    // Ending the active call must not answer the ringing one
                    self.hangup_all_connections(slot)
                } else {
                    self.mark_slot_hangup(slot);
                    self.submit(
                        RadioRequest::HangupForegroundResumeBackground,
                        RequestPurpose::SuppService(SuppService::Hangup),
                    )
                }
            }
            CallSlot::Background => {
                if self.ringing_call().is_ringing() {
                    self.hangup_all_connections(slot)
                } else {
                    self.mark_slot_hangup(slot);
                    self.submit(
                        RadioRequest::HangupWaitingOrBackground,
                        RequestPurpose::SuppService(SuppService::Hangup),
                    )
                }
            }
        };
        self.after_local_change();
        Ok(completion)
    }

    fn has_pending_mo_in(&self, slot: CallSlot) -> bool {
        self.pending_mo
            .and_then(|id| self.connection(id))
            .is_some_and(|(s, c)| s == slot && c.is_alive())
    }

    fn mark_slot_hangup(&mut self, slot: CallSlot) {
        for conn in self.call_mut(slot).connections_mut() {
            if conn.is_alive() {
                conn.on_hangup_local();
            }
        }
    }

    /// Hang up each indexed connection individually; resolves with the last request
    pub(crate) fn hangup_all_connections(&mut self, slot: CallSlot) -> Completion {
        let indexed: Vec<(ConnectionId, Option<u32>)> = self
            .call(slot)
            .live_connections()
            .map(|c| (c.id(), c.driver_index()))
            .collect();

        let mut last = None;
        for (id, index) in indexed {
            if let Some(conn) = self.connection_mut(id) {
                conn.on_hangup_local();
            }
            match index {
                Some(index) => {
                    last = Some(self.submit(
                        RadioRequest::HangupConnection { index },
                        RequestPurpose::SuppService(SuppService::Hangup),
                    ));
                }
                None if self.pending_mo == Some(id) => self.hangup_pending_mo = true,
                None => {}
            }
        }
        last.unwrap_or_else(|| resolved(Ok(RadioResponse::Done)))
    }

    /// Hang up a single connection
    pub fn hangup_connection(&mut self, connection: ConnectionId) -> PhoneResult<Completion> {
        let (slot, conn) = self.require_connection(connection)?;
        if !conn.is_alive() {
            return Err(PhoneError::call_state("connection already disconnected"));
        }
        let index = conn.driver_index();
        info!(phone = %self.id, %connection, ?slot, "Hanging up connection");

        let completion = match index {
            Some(index) => {
                if let Some(conn) = self.connection_mut(connection) {
                    conn.on_hangup_local();
                }
                self.submit(
                    RadioRequest::HangupConnection { index },
                    RequestPurpose::SuppService(SuppService::Hangup),
                )
            }
            None if self.pending_mo == Some(connection) => {
                // Hung up once the radio reports the call
                self.hangup_pending_mo = true;
                if let Some(conn) = self.connection_mut(connection) {
                    conn.on_hangup_local();
                }
                resolved(Ok(RadioResponse::Done))
            }
            None => {
                let cause = if slot == CallSlot::Ringing {
                    DisconnectCause::IncomingRejected
                } else {
                    DisconnectCause::Local
                };
                self.disconnect_local(connection, cause);
                resolved(Ok(RadioResponse::Done))
            }
        };
        self.after_local_change();
        Ok(completion)
    }

    /// Disconnect without radio involvement and notify
    pub(crate) fn disconnect_local(&mut self, id: ConnectionId, cause: DisconnectCause) {
        let disconnected = self
            .connection_mut(id)
            .map(|c| c.on_disconnect(cause))
            .unwrap_or(false);
        if disconnected {
            self.post_dial_timers.remove(&id);
            if self.pending_mo == Some(id) {
                self.pending_mo = None;
                self.hangup_pending_mo = false;
            }
            let connection = self.connection_ref(id);
            self.notify(PhoneNotification::Disconnect { connection, cause });
        }
    }

    pub fn send_dtmf(&mut self, c: char) -> PhoneResult<Completion> {
        if !dial_string::is_dtmf(c) {
            return Err(PhoneError::InvalidDtmf(c));
        }
        if self.phone_state() != PhoneState::OffHook {
            return Err(PhoneError::call_state("DTMF needs an active call"));
        }
        Ok(self.submit(RadioRequest::SendDtmf(c), RequestPurpose::Plain))
    }

    pub fn start_dtmf(&mut self, c: char) -> PhoneResult<Completion> {
        if !dial_string::is_extended_dtmf(c) {
            return Err(PhoneError::InvalidDtmf(c));
        }
        Ok(self.submit(RadioRequest::StartDtmf(c), RequestPurpose::Plain))
    }

    pub fn stop_dtmf(&mut self) -> Completion {
        self.submit(RadioRequest::StopDtmf, RequestPurpose::Plain)
    }

    /// CDMA burst DTMF; `None` lengths use the configured defaults
    pub fn send_burst_dtmf(
        &mut self,
        digits: &str,
        on_ms: Option<u32>,
        off_ms: Option<u32>,
    ) -> PhoneResult<Completion> {
        if self.class != RadioClass::Cdma {
            return Err(PhoneError::unsupported("burst DTMF", self.class));
        }
        if let Some(bad) = digits.chars().find(|c| !dial_string::is_dtmf(*c)) {
            return Err(PhoneError::InvalidDtmf(bad));
        }
        if self.phone_state() != PhoneState::OffHook || self.service_state != ServiceState::InService {
            return Err(PhoneError::call_state("burst DTMF needs an active call in service"));
        }
        let request = RadioRequest::SendBurstDtmf {
            digits: digits.to_string(),
            on_ms: on_ms.unwrap_or(self.settings.burst_dtmf_on_ms),
            off_ms: off_ms.unwrap_or(self.settings.burst_dtmf_off_ms),
        };
        Ok(self.submit(request, RequestPurpose::Plain))
    }

    pub fn set_mute(&mut self, muted: bool) -> Completion {
        self.set_mute_internal(muted)
    }

    fn set_mute_internal(&mut self, muted: bool) -> Completion {
        self.muted = muted;
        self.submit(RadioRequest::SetMute(muted), RequestPurpose::Plain)
    }

    /// Drop disconnected connections from every slot and notify
    pub fn clear_disconnected(&mut self) {
        self.clear_disconnected_calls();
        self.update_phone_state();
        self.notify(PhoneNotification::PreciseCallStateChanged);
    }

    pub(crate) fn clear_disconnected_calls(&mut self) -> usize {
        let removed: usize = self.calls.iter_mut().map(|c| c.clear_disconnected()).sum();
        if removed > 0 {
            debug!(phone = %self.id, removed, "Cleared disconnected connections");
        }
        removed
    }

    /// Publish a local state change
    pub(crate) fn after_local_change(&mut self) {
        self.update_phone_state();
        self.notify(PhoneNotification::PreciseCallStateChanged);
    }
}
