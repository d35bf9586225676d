//! The contract between a phone session and its modem
//!
//! Requests go out through [`RadioLink::submit`] tagged with a
//! [`RequestToken`]; the modem driver reports the outcome later as a
//! [`RadioEvent::Response`] carrying the same token, posted onto the task
//! queue like every other radio event.

use crate::call::CallState;
use crate::mmi::SsRequest;
use crate::types::{ClirMode, RadioClass, ServiceState, TtyMode, VideoState};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::oneshot;

/// Correlates a request with its response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestToken(pub u64);

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req{}", self.0)
    }
}

/// Commands understood by a radio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioRequest {
    Dial {
        address: String,
        clir: ClirMode,
        video: VideoState,
        emergency: bool,
    },
    AcceptCall,
    RejectCall,
    HangupConnection {
        index: u32,
    },
    HangupWaitingOrBackground,
    HangupForegroundResumeBackground,
    SwitchWaitingOrHoldingAndActive,
    Conference,
    SeparateConnection {
        index: u32,
    },
    ExplicitCallTransfer,
    SendDtmf(char),
    StartDtmf(char),
    StopDtmf,
    SendBurstDtmf {
        digits: String,
        on_ms: u32,
        off_ms: u32,
    },
    /// CDMA flash with optional feature code or number
    SendCdmaFlash(String),
    SetMute(bool),
    SupplementaryService(SsRequest),
    SendUssd(String),
    CancelUssd,
    ExitEmergencyCallbackMode,
}

impl RadioRequest {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            RadioRequest::Dial { .. } => "dial",
            RadioRequest::AcceptCall => "accept",
            RadioRequest::RejectCall => "reject",
            RadioRequest::HangupConnection { .. } => "hangup_connection",
            RadioRequest::HangupWaitingOrBackground => "hangup_waiting_or_background",
            RadioRequest::HangupForegroundResumeBackground => "hangup_foreground_resume_background",
            RadioRequest::SwitchWaitingOrHoldingAndActive => "switch_waiting_or_holding_and_active",
            RadioRequest::Conference => "conference",
            RadioRequest::SeparateConnection { .. } => "separate_connection",
            RadioRequest::ExplicitCallTransfer => "explicit_call_transfer",
            RadioRequest::SendDtmf(_) => "send_dtmf",
            RadioRequest::StartDtmf(_) => "start_dtmf",
            RadioRequest::StopDtmf => "stop_dtmf",
            RadioRequest::SendBurstDtmf { .. } => "send_burst_dtmf",
            RadioRequest::SendCdmaFlash(_) => "send_cdma_flash",
            RadioRequest::SetMute(_) => "set_mute",
            RadioRequest::SupplementaryService(_) => "supplementary_service",
            RadioRequest::SendUssd(_) => "send_ussd",
            RadioRequest::CancelUssd => "cancel_ussd",
            RadioRequest::ExitEmergencyCallbackMode => "exit_emergency_callback_mode",
        }
    }
}

/// Failures a radio reports for a request
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RadioError {
    #[error("generic failure")]
    GenericFailure,
    #[error("radio not available")]
    RadioNotAvailable,
    #[error("request not supported")]
    RequestNotSupported,
    /// Network asked for the SMS to be retried
    #[error("SMS send failed, retry")]
    SmsFailRetry,
    #[error("blocked by fixed dialing numbers")]
    FdnCheckFailure,
    #[error("radio error code {0}")]
    Code(i32),
}

/// Successful outcome of a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioResponse {
    Done,
    /// Textual result of a supplementary-service interrogation
    ServiceInfo(String),
}

pub type RadioResult = Result<RadioResponse, RadioError>;

/// Receiving end for the outcome of one radio-facing operation.
///
/// Dropping it is fine; the outcome is then only visible through the hub.
pub type Completion = oneshot::Receiver<RadioResult>;

/// A completion that is already resolved
pub fn resolved(result: RadioResult) -> Completion {
    let (tx, rx) = oneshot::channel();
    let _ = tx.send(result);
    rx
}

/// State of one call as reported in the radio's call list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriverCallState {
    Active,
    Holding,
    Dialing,
    Alerting,
    Incoming,
    Waiting,
}

impl From<DriverCallState> for CallState {
    fn from(state: DriverCallState) -> Self {
        match state {
            DriverCallState::Active => CallState::Active,
            DriverCallState::Holding => CallState::Holding,
            DriverCallState::Dialing => CallState::Dialing,
            DriverCallState::Alerting => CallState::Alerting,
            DriverCallState::Incoming => CallState::Incoming,
            DriverCallState::Waiting => CallState::Waiting,
        }
    }
}

/// One entry of the radio's call list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverCall {
    /// Radio-assigned call index, 1-based
    pub index: u32,
    pub state: DriverCallState,
    pub number: String,
    /// Mobile-terminated
    pub is_mt: bool,
    pub is_multiparty: bool,
}

impl DriverCall {
    pub fn new(index: u32, state: DriverCallState, number: impl Into<String>, is_mt: bool) -> Self {
        Self {
            index,
            state,
            number: number.into(),
            is_mt,
            is_multiparty: false,
        }
    }
}

/// USSD indication type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UssdMode {
    /// Final network message
    Notify,
    /// Network expects a user response
    Request,
    NetworkRelease,
    LocalClient,
    NotSupported,
    NetworkTimeout,
}

/// Modem power state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RadioPowerState {
    On,
    Off,
    Unavailable,
}

/// CDMA signal information record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CdmaSignalInfo {
    pub is_present: bool,
    pub signal_type: u8,
    pub alert_pitch: u8,
    pub signal: u8,
}

/// Everything a radio can report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioEvent {
    /// Outcome of an earlier request
    Response {
        token: RequestToken,
        result: RadioResult,
    },
    /// Full call list snapshot; `fail_cause` explains calls that vanished
    CallStateChanged {
        calls: Vec<DriverCall>,
        fail_cause: Option<i32>,
    },
    CallRing,
    CdmaCallWaiting {
        number: String,
    },
    Ussd {
        mode: UssdMode,
        message: Option<String>,
    },
    EmergencyCallbackModeEntered,
    RadioPower(RadioPowerState),
    ServiceStateChanged(ServiceState),
    VoiceRadioTechChanged(RadioClass),
    RingbackTone(bool),
    OnHoldTone(bool),
    VoicePrivacy(bool),
    DisplayInfo(String),
    SignalInfo(CdmaSignalInfo),
    OtaProvisionStatus(i32),
    ResendIncallMute,
    TtyModeReceived(TtyMode),
    SubscriptionInfoReady,
    /// Indication this core has no handler for
    Unsolicited {
        code: i32,
    },
}

/// Command side of a modem.
///
/// Implementations must not call back into the session synchronously; the
/// response is posted onto the task queue as a [`RadioEvent::Response`].
pub trait RadioLink: Send {
    fn submit(&mut self, token: RequestToken, request: RadioRequest);
}
