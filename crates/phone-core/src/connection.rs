//! Connections: single call legs

use crate::call::CallState;
use crate::cause::DisconnectCause;
use crate::dial_string;
use crate::types::{PhoneId, VideoState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection id; never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        ConnectionId(NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn{}", self.0)
    }
}

/// Non-owning handle to a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionRef {
    pub phone: PhoneId,
    pub connection: ConnectionId,
}

impl ConnectionRef {
    pub fn new(phone: PhoneId, connection: ConnectionId) -> Self {
        Self { phone, connection }
    }
}

impl fmt::Display for ConnectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.phone, self.connection)
    }
}

/// Progress through the post-dial string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PostDialState {
    NotStarted,
    Started,
    /// Stopped at `;` until the user proceeds
    Wait,
    /// Stopped at `N` until the user supplies digits
    WildWait,
    /// Waiting out a `,` pause
    Pause,
    Complete,
    Cancelled,
}

/// One call leg, owned by the call of the slot it currently occupies
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    address: String,
    post_dial: String,
    post_dial_index: usize,
    post_dial_state: PostDialState,
    state: CallState,
    is_incoming: bool,
    driver_index: Option<u32>,
    cause: DisconnectCause,
    created_at: DateTime<Utc>,
    connected_at: Option<DateTime<Utc>>,
    disconnected_at: Option<DateTime<Utc>>,
    video: VideoState,
    is_emergency: bool,
    hangup_requested: bool,
}

impl Connection {
    fn base(address: String, state: CallState, is_incoming: bool) -> Self {
        Self {
            id: ConnectionId::next(),
            address,
            post_dial: String::new(),
            post_dial_index: 0,
            post_dial_state: PostDialState::NotStarted,
            state,
            is_incoming,
            driver_index: None,
            cause: DisconnectCause::NotDisconnected,
            created_at: Utc::now(),
            connected_at: None,
            disconnected_at: None,
            video: VideoState::AudioOnly,
            is_emergency: false,
            hangup_requested: false,
        }
    }

    /// A locally originated connection in the dialing state.
    ///
    /// Everything after the first pause, wait or wild character becomes the
    /// post-dial string.
    pub fn outgoing(dial_string: &str, is_emergency: bool, video: VideoState) -> Self {
        let stripped = dial_string::strip_separators(dial_string);
        let mut conn = Self::base(
            dial_string::network_portion(&stripped).to_string(),
            CallState::Dialing,
            false,
        );
        conn.post_dial = dial_string::post_dial_portion(&stripped).to_string();
        conn.is_emergency = is_emergency;
        conn.video = video;
        conn
    }

    /// A connection created from a radio report
    pub fn incoming(number: &str, state: CallState, driver_index: Option<u32>) -> Self {
        let mut conn = Self::base(number.to_string(), state, true);
        conn.driver_index = driver_index;
        conn
    }

    /// A locally originated connection the radio reported without us dialing
    pub(crate) fn unknown_outgoing(number: &str, state: CallState, driver_index: u32) -> Self {
        let mut conn = Self::base(number.to_string(), state, false);
        conn.driver_index = Some(driver_index);
        if state == CallState::Active {
            conn.connected_at = Some(Utc::now());
        }
        conn
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn is_alive(&self) -> bool {
        self.state.is_alive()
    }

    pub fn is_ringing(&self) -> bool {
        self.state.is_ringing()
    }

    pub fn is_incoming(&self) -> bool {
        self.is_incoming
    }

    pub fn is_emergency(&self) -> bool {
        self.is_emergency
    }

    pub fn driver_index(&self) -> Option<u32> {
        self.driver_index
    }

    pub fn cause(&self) -> DisconnectCause {
        self.cause
    }

    pub fn video_state(&self) -> VideoState {
        self.video
    }

    pub fn hangup_requested(&self) -> bool {
        self.hangup_requested
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.connected_at
    }

    pub fn disconnected_at(&self) -> Option<DateTime<Utc>> {
        self.disconnected_at
    }

    pub fn post_dial_state(&self) -> PostDialState {
        self.post_dial_state
    }

    /// Unprocessed part of the post-dial string
    pub fn remaining_post_dial(&self) -> &str {
        self.post_dial.get(self.post_dial_index..).unwrap_or("")
    }

    pub(crate) fn set_driver_index(&mut self, index: u32) {
        self.driver_index = Some(index);
    }

    /// Apply a radio-reported state; returns whether anything changed.
    /// Disconnected connections are never revived.
    pub(crate) fn set_state(&mut self, state: CallState) -> bool {
        if self.state == CallState::Disconnected || self.state == state {
            return false;
        }
        if state == CallState::Active && self.connected_at.is_none() {
            self.connected_at = Some(Utc::now());
        }
        self.state = state;
        true
    }

    /// Local hangup was requested; the radio confirms by dropping the call
    pub(crate) fn on_hangup_local(&mut self) {
        if self.state == CallState::Disconnected {
            return;
        }
        self.hangup_requested = true;
        self.cause = DisconnectCause::Local;
        self.state = CallState::Disconnecting;
    }

    /// Mark disconnected; returns false if it already was
    pub(crate) fn on_disconnect(&mut self, cause: DisconnectCause) -> bool {
        if self.state == CallState::Disconnected {
            return false;
        }
        self.cause = cause;
        self.state = CallState::Disconnected;
        self.disconnected_at = Some(Utc::now());
        if !matches!(self.post_dial_state, PostDialState::Complete | PostDialState::NotStarted) {
            self.post_dial_state = PostDialState::Cancelled;
        }
        true
    }

    /// Cause for a connection the radio dropped from its call list
    pub(crate) fn dropped_cause(&self, from_radio: DisconnectCause) -> DisconnectCause {
        if self.is_incoming && self.connected_at.is_none() {
            if self.hangup_requested {
                DisconnectCause::IncomingRejected
            } else {
                DisconnectCause::IncomingMissed
            }
        } else if self.hangup_requested {
            DisconnectCause::Local
        } else {
            from_radio
        }
    }

    /// Next unprocessed post-dial character, advancing the cursor
    pub(crate) fn next_post_dial_char(&mut self) -> Option<char> {
        let c = self.remaining_post_dial().chars().next()?;
        self.post_dial_index += c.len_utf8();
        Some(c)
    }

    pub(crate) fn set_post_dial_state(&mut self, state: PostDialState) {
        self.post_dial_state = state;
    }

    /// Insert `text` at the cursor (used to resume from a wild character)
    pub(crate) fn insert_post_dial(&mut self, text: &str) {
        let idx = self.post_dial_index.min(self.post_dial.len());
        self.post_dial.insert_str(idx, text);
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            address: self.address.clone(),
            state: self.state,
            is_incoming: self.is_incoming,
            is_emergency: self.is_emergency,
            cause: self.cause,
            post_dial_state: self.post_dial_state,
            remaining_post_dial: self.remaining_post_dial().to_string(),
            video: self.video,
            created_at: self.created_at,
            connected_at: self.connected_at,
            disconnected_at: self.disconnected_at,
        }
    }
}

/// Point-in-time copy of a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub address: String,
    pub state: CallState,
    pub is_incoming: bool,
    pub is_emergency: bool,
    pub cause: DisconnectCause,
    pub post_dial_state: PostDialState,
    pub remaining_post_dial: String,
    pub video: VideoState,
    pub created_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
    pub disconnected_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outgoing_splits_post_dial() {
        let conn = Connection::outgoing("(555) 100-2000,123;4", false, VideoState::AudioOnly);
        assert_eq!(conn.address(), "5551002000");
        assert_eq!(conn.remaining_post_dial(), ",123;4");
        assert_eq!(conn.state(), CallState::Dialing);
        assert!(!conn.is_incoming());
    }

    #[test]
    fn test_never_resurrected() {
        let mut conn = Connection::incoming("5551234", CallState::Incoming, Some(1));
        assert!(conn.on_disconnect(DisconnectCause::Normal));
        assert!(!conn.set_state(CallState::Active));
        assert!(!conn.on_disconnect(DisconnectCause::Busy));
        assert_eq!(conn.cause(), DisconnectCause::Normal);
    }

    #[test]
    fn test_dropped_cause() {
        let ringing = Connection::incoming("1", CallState::Incoming, Some(1));
        assert_eq!(ringing.dropped_cause(DisconnectCause::Normal), DisconnectCause::IncomingMissed);

        let mut rejected = Connection::incoming("1", CallState::Incoming, Some(1));
        rejected.on_hangup_local();
        assert_eq!(rejected.dropped_cause(DisconnectCause::Normal), DisconnectCause::IncomingRejected);

        let mut answered = Connection::incoming("1", CallState::Incoming, Some(1));
        answered.set_state(CallState::Active);
        assert_eq!(answered.dropped_cause(DisconnectCause::Busy), DisconnectCause::Busy);
    }

    #[test]
    fn test_wild_insert() {
        let mut conn = Connection::outgoing("100N9", false, VideoState::AudioOnly);
        assert_eq!(conn.next_post_dial_char(), Some('N'));
        conn.insert_post_dial("42");
        assert_eq!(conn.remaining_post_dial(), "429");
    }
}
