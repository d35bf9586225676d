//! Identifiers and small enums shared by every module

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a phone session in the [`PhoneArena`](crate::arena::PhoneArena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PhoneId(pub usize);

impl fmt::Display for PhoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phone{}", self.0)
    }
}

/// Subscription (SIM) identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubId(pub i32);

impl fmt::Display for SubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub{}", self.0)
    }
}

/// Radio personality of a phone session.
///
/// GSM and CDMA are mutually exclusive on one session and may switch at
/// runtime; IMS and SIP sessions are overlays that never switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RadioClass {
    Gsm,
    Cdma,
    Ims,
    Sip,
}

impl RadioClass {
    /// Circuit-switched personality
    pub fn is_cs(&self) -> bool {
        matches!(self, RadioClass::Gsm | RadioClass::Cdma)
    }

    /// Overlay personalities with their own conference path
    pub fn is_overlay(&self) -> bool {
        matches!(self, RadioClass::Ims | RadioClass::Sip)
    }

    /// Whether dial strings go through supplementary-service parsing
    pub fn handles_mmi(&self) -> bool {
        matches!(self, RadioClass::Gsm | RadioClass::Ims)
    }
}

impl fmt::Display for RadioClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RadioClass::Gsm => "GSM",
            RadioClass::Cdma => "CDMA",
            RadioClass::Ims => "IMS",
            RadioClass::Sip => "SIP",
        };
        f.write_str(name)
    }
}

/// Registration state of a radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceState {
    InService,
    OutOfService,
    EmergencyOnly,
    PowerOff,
}

impl ServiceState {
    /// Rank used when combining states; lower is better
    pub fn rank(&self) -> u8 {
        match self {
            ServiceState::InService => 0,
            ServiceState::OutOfService => 1,
            ServiceState::EmergencyOnly => 2,
            ServiceState::PowerOff => 3,
        }
    }
}

/// Coarse phone state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhoneState {
    Idle,
    Ringing,
    OffHook,
}

/// Supplementary service named in a failure notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SuppService {
    Unknown,
    Switch,
    Separate,
    Transfer,
    Conference,
    Reject,
    Hangup,
    Resume,
    Hold,
}

/// Video state requested for a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VideoState {
    #[default]
    AudioOnly,
    TxEnabled,
    RxEnabled,
    Bidirectional,
    Paused,
}

/// TTY mode reported by the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TtyMode {
    Off,
    Full,
    Hco,
    Vco,
}

/// Caller-id restriction mode for one dial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ClirMode {
    /// Use the subscription default
    #[default]
    Default,
    /// Restrict presentation for this call
    Invocation,
    /// Allow presentation for this call
    Suppression,
}
