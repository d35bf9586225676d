//! Calls: one slot's worth of connections on one phone

use crate::connection::{Connection, ConnectionId, ConnectionInfo};
use crate::types::PhoneId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a call or of a single connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    Idle,
    Active,
    Holding,
    Dialing,
    Alerting,
    Incoming,
    Waiting,
    Disconnected,
    Disconnecting,
}

impl CallState {
    /// Anything except idle and the two disconnect states
    pub fn is_alive(&self) -> bool {
        !matches!(
            self,
            CallState::Idle | CallState::Disconnected | CallState::Disconnecting
        )
    }

    pub fn is_ringing(&self) -> bool {
        matches!(self, CallState::Incoming | CallState::Waiting)
    }

    pub fn is_dialing(&self) -> bool {
        matches!(self, CallState::Dialing | CallState::Alerting)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One of the three call slots every phone owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallSlot {
    Ringing,
    Foreground,
    Background,
}

impl CallSlot {
    pub const ALL: [CallSlot; 3] = [CallSlot::Ringing, CallSlot::Foreground, CallSlot::Background];

    pub(crate) fn index(&self) -> usize {
        match self {
            CallSlot::Ringing => 0,
            CallSlot::Foreground => 1,
            CallSlot::Background => 2,
        }
    }

    /// Slot a connection in `state` belongs to, if the state implies one
    pub fn for_state(state: CallState) -> Option<CallSlot> {
        match state {
            CallState::Active | CallState::Dialing | CallState::Alerting => Some(CallSlot::Foreground),
            CallState::Holding => Some(CallSlot::Background),
            CallState::Incoming | CallState::Waiting => Some(CallSlot::Ringing),
            _ => None,
        }
    }
}

/// Non-owning handle to a call: the phone plus the slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallRef {
    pub phone: PhoneId,
    pub slot: CallSlot,
}

impl CallRef {
    pub fn new(phone: PhoneId, slot: CallSlot) -> Self {
        Self { phone, slot }
    }
}

impl fmt::Display for CallRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:?}", self.phone, self.slot)
    }
}

/// The connections occupying one slot.
///
/// The call's state is never stored; it is derived from its connections.
#[derive(Debug)]
pub struct Call {
    slot: CallSlot,
    connections: Vec<Connection>,
}

impl Call {
    pub(crate) fn new(slot: CallSlot) -> Self {
        Self {
            slot,
            connections: Vec::new(),
        }
    }

    pub fn slot(&self) -> CallSlot {
        self.slot
    }

    /// Derived state: idle when empty, the newest live connection's state
    /// while anything is alive, otherwise disconnecting or disconnected.
    pub fn state(&self) -> CallState {
        if self.connections.is_empty() {
            return CallState::Idle;
        }
        if let Some(live) = self.connections.iter().rev().find(|c| c.state().is_alive()) {
            return live.state();
        }
        if self.connections.iter().any(|c| c.state() == CallState::Disconnecting) {
            CallState::Disconnecting
        } else {
            CallState::Disconnected
        }
    }

    pub fn is_idle(&self) -> bool {
        !self.state().is_alive()
    }

    pub fn is_ringing(&self) -> bool {
        self.state().is_ringing()
    }

    pub fn is_dialing_or_alerting(&self) -> bool {
        self.state().is_dialing()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn live_connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(|c| c.state().is_alive())
    }

    pub fn live_count(&self) -> usize {
        self.live_connections().count()
    }

    pub fn is_multiparty(&self) -> bool {
        self.live_count() > 1
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.iter().find(|c| c.id() == id)
    }

    pub(crate) fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.iter_mut().find(|c| c.id() == id)
    }

    pub(crate) fn connections_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.connections.iter_mut()
    }

    pub(crate) fn push(&mut self, connection: Connection) {
        self.connections.push(connection);
    }

    pub(crate) fn take(&mut self, id: ConnectionId) -> Option<Connection> {
        let pos = self.connections.iter().position(|c| c.id() == id)?;
        Some(self.connections.remove(pos))
    }

    /// Move every connection out of this call
    pub(crate) fn drain(&mut self) -> Vec<Connection> {
        std::mem::take(&mut self.connections)
    }

    /// Drop disconnected connections; returns how many were removed
    pub(crate) fn clear_disconnected(&mut self) -> usize {
        let before = self.connections.len();
        self.connections
            .retain(|c| c.state() != CallState::Disconnected);
        before - self.connections.len()
    }

    pub fn info(&self, phone: PhoneId) -> CallInfo {
        CallInfo {
            call: CallRef::new(phone, self.slot),
            state: self.state(),
            connections: self.connections.iter().map(Connection::info).collect(),
        }
    }
}

/// Point-in-time copy of a call for external callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallInfo {
    pub call: CallRef,
    pub state: CallState,
    pub connections: Vec<ConnectionInfo>,
}
