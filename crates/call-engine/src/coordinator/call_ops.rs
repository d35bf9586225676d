//! Cross-radio call control
//!
//! Every operation resolves which phone serves it, settles conflicts with
//! calls on other phones, then delegates to that phone's session. Errors
//! are the session's own [`PhoneError`]s, passed through unchanged.

use super::eligibility::{conference_path, supports_transfer};
use super::CallCoordinator;
use telephony_phone_core::dial_string;
use telephony_phone_core::radio::resolved;
use telephony_phone_core::{
    CallRef, CallSlot, CallState, Completion, ConnectionRef, DialOutcome, PhoneArena, PhoneError,
    PhoneEvent, PhoneId, PhoneNotification, PhoneResult, RadioError, ServiceState, SuppService,
    VideoState,
};
use tracing::{debug, info, warn};

impl CallCoordinator {
    /// Answer `ringing`, making room on the phone with the active call first.
    ///
    /// | active call on | held call there | action before accepting |
    /// |---|---|---|
    /// | ringing phone | yes | hang up the active call |
    /// | other phone | no | swap the other phone's calls |
    /// | other phone | yes | hang up the active call |
    /// | ringing phone | no | none |
    pub fn accept_call(
        &mut self,
        arena: &mut PhoneArena,
        ringing: CallRef,
        video: VideoState,
    ) -> PhoneResult<Completion> {
        self.require_slot(ringing, CallSlot::Ringing)?;

        if self.has_active_fg_call(arena) {
            if let Some(active) = self.active_fg_call(arena) {
                let session = arena.get_mut(active.phone)?;
                let has_bg_call = !session.background_call().is_idle();
                let same_phone = active.phone == ringing.phone;
                match (same_phone, has_bg_call) {
                    (_, true) => {
                        info!(active = %active.phone, ringing = %ringing.phone, "Hanging up active call to answer");
                        session.hangup_call(CallSlot::Foreground)?;
                    }
                    (false, false) => {
                        info!(active = %active.phone, ringing = %ringing.phone, "Holding active call to answer");
                        session.switch_holding_and_active()?;
                    }
                    (true, false) => {}
                }
            }
        }

        arena.get_mut(ringing.phone)?.accept_call(video)
    }

    pub fn reject_call(&mut self, arena: &mut PhoneArena, ringing: CallRef) -> PhoneResult<Completion> {
        self.require_slot(ringing, CallSlot::Ringing)?;
        arena.get_mut(ringing.phone)?.reject_call()
    }

    /// Whether `phone` may place a voice call right now.
    ///
    /// Only the target phone's own foreground call gates the dial, apart
    /// from a ringing call anywhere, which vetoes it. Calls on other phones,
    /// even on the same subscription, never block it; an active one is held
    /// or hung up by [`dial`](Self::dial).
    pub fn can_dial(&self, arena: &PhoneArena, phone: PhoneId) -> bool {
        let Ok(session) = arena.get(phone) else {
            return false;
        };
        let fg_state = session.foreground_call().state();
        session.service_state() != ServiceState::PowerOff
            && !self.has_active_ringing_call(arena)
            && matches!(
                fg_state,
                CallState::Active | CallState::Idle | CallState::Disconnected | CallState::Alerting
            )
    }

    /// Dial from `phone`.
    ///
    /// A call active on another phone is held, or hung up when that phone
    /// already has a held call. When the phone has an IMS overlay in
    /// service the dial goes out over the overlay.
    pub fn dial(
        &mut self,
        arena: &mut PhoneArena,
        phone: PhoneId,
        number: &str,
        video: VideoState,
    ) -> PhoneResult<DialOutcome> {
        if !self.is_registered(phone) {
            return Err(PhoneError::NotRegistered(phone));
        }
        if !self.can_dial(arena, phone) {
            let stripped = dial_string::strip_separators(number);
            if arena.get_mut(phone)?.handle_in_call_mmi_commands(&stripped) {
                return Ok(DialOutcome::InCallMmi);
            }
            return Err(PhoneError::call_state("cannot dial in current state"));
        }

        let target = self.dial_target(arena, phone)?;
        let sub = arena.get(phone)?.sub_id();
        if self.has_active_fg_call_for(arena, sub) {
            if let Some(active) = self.active_fg_call_for(arena, sub) {
                let other = active.phone != target && arena.call(active)?.state() == CallState::Active;
                if other {
                    let session = arena.get_mut(active.phone)?;
                    if session.background_call().is_idle() {
                        debug!(active = %active.phone, %target, "Holding call on other phone before dialing");
                        session.switch_holding_and_active()?;
                    } else {
                        debug!(active = %active.phone, %target, "Hanging up call on other phone before dialing");
                        session.hangup_call(CallSlot::Foreground)?;
                    }
                }
            }
        }

        arena.get_mut(target)?.dial(number, video)
    }

    fn dial_target(&self, arena: &PhoneArena, phone: PhoneId) -> PhoneResult<PhoneId> {
        let ims = arena.get(phone)?.ims_phone();
        let target = ims
            .filter(|ims| self.is_registered(*ims))
            .and_then(|ims| arena.get(ims).ok())
            .filter(|s| s.service_state() == ServiceState::InService)
            .map_or(phone, |s| s.id());
        if target != phone {
            debug!(%phone, ims = %target, "Routing dial over IMS");
        }
        Ok(target)
    }

    /// Swap active and held calls on the active phone and, when different,
    /// on the phone holding `held`.
    pub fn switch_holding_and_active(
        &mut self,
        arena: &mut PhoneArena,
        held: Option<CallRef>,
    ) -> PhoneResult<Vec<Completion>> {
        let active_phone = if self.has_active_fg_call(arena) {
            self.active_fg_call(arena).map(|c| c.phone)
        } else {
            None
        };
        let held_phone = held.map(|c| c.phone);
        if active_phone.is_none() && held_phone.is_none() {
            return Err(PhoneError::call_state("no call to switch"));
        }

        let mut completions = Vec::with_capacity(2);
        if let Some(phone) = active_phone {
            completions.push(arena.get_mut(phone)?.switch_holding_and_active()?);
        }
        if let Some(phone) = held_phone.filter(|p| Some(*p) != active_phone) {
            completions.push(arena.get_mut(phone)?.switch_holding_and_active()?);
        }
        Ok(completions)
    }

    /// Hang up the active call and bring `held` to the foreground
    pub fn hangup_foreground_resume_background(
        &mut self,
        arena: &mut PhoneArena,
        held: CallRef,
    ) -> PhoneResult<Vec<Completion>> {
        self.require_slot(held, CallSlot::Background)?;
        if !self.has_active_fg_call(arena) {
            return Err(PhoneError::call_state("no active call to hang up"));
        }
        let Some(active) = self.active_fg_call(arena) else {
            return Err(PhoneError::call_state("no active call to hang up"));
        };

        let mut completions = vec![arena.get_mut(active.phone)?.hangup_call(CallSlot::Foreground)?];
        if active.phone != held.phone {
            completions.extend(self.switch_holding_and_active(arena, Some(held))?);
        }
        Ok(completions)
    }

    /// Whether the active call and `held` can be merged
    pub fn can_conference(&self, arena: &PhoneArena, held: CallRef) -> bool {
        let Some(active) = self.active_fg_phone(arena) else {
            return false;
        };
        let (Ok(fg), Ok(bg)) = (arena.get(active), arena.get(held.phone)) else {
            return false;
        };
        conference_path(fg.radio_class(), bg.radio_class()).is_some()
    }

    /// Merge the active call with `held`.
    ///
    /// Ineligible pairs fail softly: a conference failure is published and
    /// the returned completion resolves with a generic failure.
    pub fn conference(&mut self, arena: &mut PhoneArena, held: CallRef) -> PhoneResult<Completion> {
        self.require_slot(held, CallSlot::Background)?;
        let sub = arena.get(held.phone)?.sub_id();
        let Some(fg_phone) = self.active_fg_call_for(arena, sub).map(|c| c.phone) else {
            return Ok(self.soft_fail(held.phone, SuppService::Conference));
        };

        let fg_class = arena.get(fg_phone)?.radio_class();
        let held_class = arena.get(held.phone)?.radio_class();
        match conference_path(fg_class, held_class) {
            Some(path) => {
                debug!(%fg_phone, held = %held, ?path, "Conferencing calls");
                arena.get_mut(fg_phone)?.conference()
            }
            None => {
                warn!(%fg_phone, %fg_class, %held_class, "Cannot conference calls on different radio classes");
                Ok(self.soft_fail(fg_phone, SuppService::Conference))
            }
        }
    }

    /// Whether the active call and `held` can be connected to each other
    pub fn can_transfer(&self, arena: &PhoneArena, held: CallRef) -> bool {
        let Some(active) = self.active_fg_phone(arena) else {
            return false;
        };
        active == held.phone
            && arena
                .get(held.phone)
                .is_ok_and(|s| supports_transfer(s.radio_class()))
    }

    /// Connect the active party with `held` and drop out
    pub fn explicit_call_transfer(&mut self, arena: &mut PhoneArena, held: CallRef) -> PhoneResult<Completion> {
        self.require_slot(held, CallSlot::Background)?;
        if !self.can_transfer(arena, held) {
            warn!(held = %held, "Transfer needs both calls on one phone that supports it");
            return Ok(self.soft_fail(held.phone, SuppService::Transfer));
        }
        arena.get_mut(held.phone)?.explicit_call_transfer()
    }

    /// Hang up every connection of one call
    pub fn hangup_call(&mut self, arena: &mut PhoneArena, call: CallRef) -> PhoneResult<Completion> {
        arena.get_mut(call.phone)?.hangup_call(call.slot)
    }

    pub fn hangup_connection(
        &mut self,
        arena: &mut PhoneArena,
        connection: ConnectionRef,
    ) -> PhoneResult<Completion> {
        arena
            .get_mut(connection.phone)?
            .hangup_connection(connection.connection)
    }

    /// Sweep disconnected connections off every phone
    pub fn clear_disconnected(&mut self, arena: &mut PhoneArena) {
        for phone in self.phones.clone() {
            if let Ok(session) = arena.get_mut(phone) {
                session.clear_disconnected();
            }
        }
    }

    /// Mute the phone carrying the active call, else the held call.
    ///
    /// Returns `None` when no phone has a call.
    pub fn set_mute(&mut self, arena: &mut PhoneArena, muted: bool) -> PhoneResult<Option<Completion>> {
        let phone = if self.has_active_fg_call(arena) {
            self.active_fg_call(arena).map(|c| c.phone)
        } else if self.has_active_bg_call(arena) {
            self.first_active_bg_call(arena).map(|c| c.phone)
        } else {
            None
        };
        match phone {
            Some(phone) => Ok(Some(arena.get_mut(phone)?.set_mute(muted))),
            None => Ok(None),
        }
    }

    /// Play a DTMF tone on the active call; `None` when there is none
    pub fn send_dtmf(&mut self, arena: &mut PhoneArena, c: char) -> PhoneResult<Option<Completion>> {
        match self.active_fg_phone(arena) {
            Some(phone) => arena.get_mut(phone)?.send_dtmf(c).map(Some),
            None => Ok(None),
        }
    }

    pub fn start_dtmf(&mut self, arena: &mut PhoneArena, c: char) -> PhoneResult<Option<Completion>> {
        match self.active_fg_phone(arena) {
            Some(phone) => arena.get_mut(phone)?.start_dtmf(c).map(Some),
            None => Ok(None),
        }
    }

    pub fn stop_dtmf(&mut self, arena: &mut PhoneArena) -> PhoneResult<Option<Completion>> {
        match self.active_fg_phone(arena) {
            Some(phone) => Ok(Some(arena.get_mut(phone)?.stop_dtmf())),
            None => Ok(None),
        }
    }

    pub fn send_burst_dtmf(
        &mut self,
        arena: &mut PhoneArena,
        digits: &str,
        on_ms: Option<u32>,
        off_ms: Option<u32>,
    ) -> PhoneResult<Option<Completion>> {
        match self.active_fg_phone(arena) {
            Some(phone) => arena
                .get_mut(phone)?
                .send_burst_dtmf(digits, on_ms, off_ms)
                .map(Some),
            None => Ok(None),
        }
    }

    fn active_fg_phone(&self, arena: &PhoneArena) -> Option<PhoneId> {
        if self.has_active_fg_call(arena) {
            self.active_fg_call(arena).map(|c| c.phone)
        } else {
            None
        }
    }

    fn require_slot(&self, call: CallRef, slot: CallSlot) -> PhoneResult<()> {
        if !self.is_registered(call.phone) {
            return Err(PhoneError::NotRegistered(call.phone));
        }
        if call.slot != slot {
            return Err(PhoneError::call_state(format!(
                "expected a {:?} call, got {}",
                slot, call
            )));
        }
        Ok(())
    }

    /// Publish a supplementary-service failure and resolve with a generic failure
    fn soft_fail(&mut self, phone: PhoneId, service: SuppService) -> Completion {
        self.hub.notify(PhoneEvent::new(
            phone,
            PhoneNotification::SuppServiceFailed(service),
        ));
        resolved(Err(RadioError::GenericFailure))
    }
}
