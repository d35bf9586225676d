//! Aggregate views across every registered phone
//!
//! All lookups read through the [`PhoneArena`]; nothing here mutates a
//! session. Calls are resolved from the flattened per-slot lists in
//! registration order.

use super::CallCoordinator;
use serde::Serialize;
use telephony_phone_core::{
    CallInfo, CallRef, CallState, ConnectionInfo, PhoneArena, PhoneId, PhoneResult, PhoneSession,
    PhoneState, RadioClass, ServiceState, SubId,
};

/// A call snapshot plus the radio it lives on
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallSnapshot {
    #[serde(flatten)]
    pub info: CallInfo,
    pub radio_class: RadioClass,
    pub sub: SubId,
}

/// SIP overlays answer to every subscription filter
fn matches_sub(session: &PhoneSession, sub: SubId) -> bool {
    session.sub_id() == sub || session.radio_class() == RadioClass::Sip
}

impl CallCoordinator {
    /// Combined coarse state: ringing beats off-hook beats idle
    pub fn get_state(&self, arena: &PhoneArena) -> PhoneState {
        combine_states(self.sessions(arena).map(PhoneSession::phone_state))
    }

    /// Combined coarse state of one subscription's phones
    pub fn get_state_for(&self, arena: &PhoneArena, sub: SubId) -> PhoneState {
        combine_states(
            self.sessions(arena)
                .filter(|s| s.sub_id() == sub)
                .map(PhoneSession::phone_state),
        )
    }

    /// Best service state across phones; out of service when none is registered
    pub fn get_service_state(&self, arena: &PhoneArena) -> ServiceState {
        combine_service(self.sessions(arena).map(PhoneSession::service_state))
    }

    pub fn get_service_state_for(&self, arena: &PhoneArena, sub: SubId) -> ServiceState {
        combine_service(
            self.sessions(arena)
                .filter(|s| s.sub_id() == sub)
                .map(PhoneSession::service_state),
        )
    }

    /// First non-idle foreground call, else the default phone's
    pub fn active_fg_call(&self, arena: &PhoneArena) -> Option<CallRef> {
        self.first_non_idle(arena, &self.foreground_calls, None)
            .or_else(|| self.fallback(arena, None, &self.foreground_calls))
    }

    pub fn active_fg_call_for(&self, arena: &PhoneArena, sub: SubId) -> Option<CallRef> {
        self.first_non_idle(arena, &self.foreground_calls, Some(sub))
            .or_else(|| self.fallback(arena, Some(sub), &self.foreground_calls))
    }

    /// First non-idle held call, else the default phone's
    pub fn first_active_bg_call(&self, arena: &PhoneArena) -> Option<CallRef> {
        self.first_non_idle(arena, &self.background_calls, None)
            .or_else(|| self.fallback(arena, None, &self.background_calls))
    }

    pub fn first_active_bg_call_for(&self, arena: &PhoneArena, sub: SubId) -> Option<CallRef> {
        self.first_non_idle(arena, &self.background_calls, Some(sub))
            .or_else(|| self.fallback(arena, Some(sub), &self.background_calls))
    }

    /// First non-idle ringing call, else the default phone's
    pub fn first_active_ringing_call(&self, arena: &PhoneArena) -> Option<CallRef> {
        self.first_non_idle(arena, &self.ringing_calls, None)
            .or_else(|| self.fallback(arena, None, &self.ringing_calls))
    }

    pub fn first_active_ringing_call_for(&self, arena: &PhoneArena, sub: SubId) -> Option<CallRef> {
        self.first_non_idle(arena, &self.ringing_calls, Some(sub))
            .or_else(|| self.fallback(arena, Some(sub), &self.ringing_calls))
    }

    pub fn active_fg_call_state(&self, arena: &PhoneArena) -> CallState {
        self.state_of(arena, self.active_fg_call(arena))
    }

    pub fn active_fg_call_state_for(&self, arena: &PhoneArena, sub: SubId) -> CallState {
        self.state_of(arena, self.active_fg_call_for(arena, sub))
    }

    /// Connections of the active foreground call
    pub fn fg_call_connections(&self, arena: &PhoneArena) -> Vec<ConnectionInfo> {
        self.connections_of(arena, self.active_fg_call(arena))
    }

    pub fn fg_call_connections_for(&self, arena: &PhoneArena, sub: SubId) -> Vec<ConnectionInfo> {
        self.connections_of(arena, self.active_fg_call_for(arena, sub))
    }

    pub fn has_active_fg_call(&self, arena: &PhoneArena) -> bool {
        self.first_alive(arena, &self.foreground_calls, None).is_some()
    }

    pub fn has_active_fg_call_for(&self, arena: &PhoneArena, sub: SubId) -> bool {
        self.first_alive(arena, &self.foreground_calls, Some(sub)).is_some()
    }

    pub fn has_active_bg_call(&self, arena: &PhoneArena) -> bool {
        self.first_alive(arena, &self.background_calls, None).is_some()
    }

    pub fn has_active_bg_call_for(&self, arena: &PhoneArena, sub: SubId) -> bool {
        self.first_alive(arena, &self.background_calls, Some(sub)).is_some()
    }

    pub fn has_active_ringing_call(&self, arena: &PhoneArena) -> bool {
        self.first_alive(arena, &self.ringing_calls, None).is_some()
    }

    pub fn has_active_ringing_call_for(&self, arena: &PhoneArena, sub: SubId) -> bool {
        self.first_alive(arena, &self.ringing_calls, Some(sub)).is_some()
    }

    /// Whether a foreground call of `sub` sits in the disconnected state
    pub fn has_disconnected_fg_call(&self, arena: &PhoneArena, sub: SubId) -> bool {
        self.first_call_of_state(arena, &self.foreground_calls, CallState::Disconnected, sub)
            .is_some()
    }

    pub fn has_disconnected_bg_call(&self, arena: &PhoneArena, sub: SubId) -> bool {
        self.first_call_of_state(arena, &self.background_calls, CallState::Disconnected, sub)
            .is_some()
    }

    /// Phone carrying the active foreground call
    pub fn fg_phone(&self, arena: &PhoneArena) -> Option<PhoneId> {
        self.active_fg_call(arena).map(|c| c.phone)
    }

    pub fn bg_phone(&self, arena: &PhoneArena) -> Option<PhoneId> {
        self.first_active_bg_call(arena).map(|c| c.phone)
    }

    pub fn ringing_phone(&self, arena: &PhoneArena) -> Option<PhoneId> {
        self.first_active_ringing_call(arena).map(|c| c.phone)
    }

    /// Mute state of the phone carrying the active call
    pub fn get_mute(&self, arena: &PhoneArena) -> bool {
        let call = if self.has_active_fg_call(arena) {
            self.active_fg_call(arena)
        } else if self.has_active_bg_call(arena) {
            self.first_active_bg_call(arena)
        } else {
            None
        };
        call.and_then(|c| arena.get(c.phone).ok())
            .is_some_and(PhoneSession::get_mute)
    }

    pub fn call_info(&self, arena: &PhoneArena, call: CallRef) -> PhoneResult<CallSnapshot> {
        let session = arena.get(call.phone)?;
        Ok(CallSnapshot {
            info: session.call(call.slot).info(call.phone),
            radio_class: session.radio_class(),
            sub: session.sub_id(),
        })
    }

    /// Registered phone serving `sub`, ignoring IMS overlays
    pub fn phone_for_sub(&self, arena: &PhoneArena, sub: SubId) -> Option<PhoneId> {
        self.sessions(arena)
            .find(|s| s.sub_id() == sub && s.radio_class() != RadioClass::Ims)
            .map(PhoneSession::id)
    }

    pub(crate) fn sessions<'a>(&'a self, arena: &'a PhoneArena) -> impl Iterator<Item = &'a PhoneSession> + 'a {
        self.phones.iter().filter_map(|p| arena.get(*p).ok())
    }

    /// Number of non-idle ringing calls on phones matching `sub`
    pub(crate) fn ringing_count_for(&self, arena: &PhoneArena, sub: SubId) -> usize {
        self.filtered(arena, &self.ringing_calls, Some(sub))
            .filter(|(_, state)| state.is_alive())
            .count()
    }

    fn filtered<'a>(
        &'a self,
        arena: &'a PhoneArena,
        calls: &'a [CallRef],
        sub: Option<SubId>,
    ) -> impl Iterator<Item = (CallRef, CallState)> + 'a {
        calls.iter().filter_map(move |call| {
            let session = arena.get(call.phone).ok()?;
            if sub.is_some_and(|sub| !matches_sub(session, sub)) {
                return None;
            }
            Some((*call, session.call(call.slot).state()))
        })
    }

    /// First live call, else the first call still tearing down
    fn first_non_idle(&self, arena: &PhoneArena, calls: &[CallRef], sub: Option<SubId>) -> Option<CallRef> {
        let mut lingering = None;
        for (call, state) in self.filtered(arena, calls, sub) {
            if state.is_alive() {
                return Some(call);
            }
            if state != CallState::Idle && lingering.is_none() {
                lingering = Some(call);
            }
        }
        lingering
    }

    fn first_alive(&self, arena: &PhoneArena, calls: &[CallRef], sub: Option<SubId>) -> Option<CallRef> {
        self.filtered(arena, calls, sub)
            .find(|(_, state)| state.is_alive())
            .map(|(call, _)| call)
    }

    fn first_call_of_state(
        &self,
        arena: &PhoneArena,
        calls: &[CallRef],
        wanted: CallState,
        sub: SubId,
    ) -> Option<CallRef> {
        calls
            .iter()
            .filter_map(|call| arena.get(call.phone).ok().map(|s| (*call, s)))
            .find(|(call, session)| {
                session.call(call.slot).state() == wanted && session.sub_id() == sub
            })
            .map(|(call, _)| call)
    }

    /// The idle call of the default phone, or of the phone serving `sub`
    fn fallback(
        &self,
        arena: &PhoneArena,
        sub: Option<SubId>,
        calls: &[CallRef],
    ) -> Option<CallRef> {
        let phone = match sub {
            Some(sub) => self.phone_for_sub(arena, sub)?,
            None => self.default_phone?,
        };
        calls.iter().find(|c| c.phone == phone).copied()
    }

    fn state_of(&self, arena: &PhoneArena, call: Option<CallRef>) -> CallState {
        call.and_then(|c| arena.call(c).ok())
            .map_or(CallState::Idle, |c| c.state())
    }

    fn connections_of(&self, arena: &PhoneArena, call: Option<CallRef>) -> Vec<ConnectionInfo> {
        call.and_then(|c| arena.call(c).ok())
            .map(|c| c.connections().iter().map(|conn| conn.info()).collect())
            .unwrap_or_default()
    }
}

fn combine_states(states: impl Iterator<Item = PhoneState>) -> PhoneState {
    let mut combined = PhoneState::Idle;
    for state in states {
        match state {
            PhoneState::Ringing => return PhoneState::Ringing,
            PhoneState::OffHook => combined = PhoneState::OffHook,
            PhoneState::Idle => {}
        }
    }
    combined
}

fn combine_service(states: impl Iterator<Item = ServiceState>) -> ServiceState {
    let mut combined = None;
    for state in states {
        if state == ServiceState::InService {
            return state;
        }
        let current = combined.get_or_insert(ServiceState::PowerOff);
        if state.rank() < current.rank() {
            *current = state;
        }
    }
    combined.unwrap_or(ServiceState::OutOfService)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_combine_states_prefers_ringing() {
        let states = [PhoneState::OffHook, PhoneState::Ringing, PhoneState::Idle];
        assert_eq!(combine_states(states.into_iter()), PhoneState::Ringing);
        let states = [PhoneState::Idle, PhoneState::OffHook];
        assert_eq!(combine_states(states.into_iter()), PhoneState::OffHook);
        assert_eq!(combine_states(std::iter::empty()), PhoneState::Idle);
    }

    #[test]
    fn test_combine_service_ranking() {
        use ServiceState::*;
        assert_eq!(combine_service([PowerOff, InService].into_iter()), InService);
        assert_eq!(combine_service([PowerOff, EmergencyOnly].into_iter()), EmergencyOnly);
        assert_eq!(combine_service([EmergencyOnly, OutOfService].into_iter()), OutOfService);
        assert_eq!(combine_service([PowerOff].into_iter()), PowerOff);
        assert_eq!(combine_service(std::iter::empty()), OutOfService);
    }
}
