//! Notifications published by phone sessions
//!
//! The coordinator re-publishes the same type, so subscribers see one event
//! shape whether they listen on a single phone or on the coordinator.

use crate::cause::DisconnectCause;
use crate::connection::{ConnectionRef, PostDialState};
use crate::mmi::{MmiId, MmiState};
use crate::radio::CdmaSignalInfo;
use crate::types::{PhoneId, RadioClass, ServiceState, SuppService, TtyMode};
use telephony_infra_common::Notification;

/// Category of a [`PhoneEvent`], the unit of subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PreciseCallStateChanged,
    NewRingingConnection,
    UnknownConnection,
    IncomingRing,
    Disconnect,
    RingbackTone,
    OnHoldTone,
    InCallVoicePrivacyOn,
    InCallVoicePrivacyOff,
    CallWaiting,
    DisplayInfo,
    SignalInfo,
    CdmaOtaStatusChange,
    ResendIncallMute,
    MmiInitiate,
    MmiComplete,
    EcmTimerReset,
    EmergencyCallbackModeChanged,
    SubscriptionInfoReady,
    SuppServiceFailed,
    ServiceStateChanged,
    PostDialCharacter,
    TtyModeReceived,
    RadioTechnologyChanged,
}

impl EventKind {
    pub const ALL: [EventKind; 24] = [
        EventKind::PreciseCallStateChanged,
        EventKind::NewRingingConnection,
        EventKind::UnknownConnection,
        EventKind::IncomingRing,
        EventKind::Disconnect,
        EventKind::RingbackTone,
        EventKind::OnHoldTone,
        EventKind::InCallVoicePrivacyOn,
        EventKind::InCallVoicePrivacyOff,
        EventKind::CallWaiting,
        EventKind::DisplayInfo,
        EventKind::SignalInfo,
        EventKind::CdmaOtaStatusChange,
        EventKind::ResendIncallMute,
        EventKind::MmiInitiate,
        EventKind::MmiComplete,
        EventKind::EcmTimerReset,
        EventKind::EmergencyCallbackModeChanged,
        EventKind::SubscriptionInfoReady,
        EventKind::SuppServiceFailed,
        EventKind::ServiceStateChanged,
        EventKind::PostDialCharacter,
        EventKind::TtyModeReceived,
        EventKind::RadioTechnologyChanged,
    ];
}

/// Payload of a phone notification
#[derive(Debug, Clone, PartialEq)]
pub enum PhoneNotification {
    PreciseCallStateChanged,
    NewRingingConnection(ConnectionRef),
    UnknownConnection(ConnectionRef),
    IncomingRing,
    Disconnect {
        connection: ConnectionRef,
        cause: DisconnectCause,
    },
    RingbackTone(bool),
    OnHoldTone(bool),
    InCallVoicePrivacyOn,
    InCallVoicePrivacyOff,
    CallWaiting(ConnectionRef),
    DisplayInfo(String),
    SignalInfo(CdmaSignalInfo),
    CdmaOtaStatusChange(i32),
    ResendIncallMute,
    MmiInitiate(MmiId),
    MmiComplete {
        mmi: MmiId,
        state: MmiState,
        message: Option<String>,
        is_ussd_request: bool,
    },
    /// `true` when the timer was cancelled, `false` when restarted
    EcmTimerReset(bool),
    EmergencyCallbackModeChanged(bool),
    SubscriptionInfoReady,
    SuppServiceFailed(SuppService),
    ServiceStateChanged(ServiceState),
    PostDialCharacter {
        connection: ConnectionRef,
        character: Option<char>,
        state: PostDialState,
    },
    TtyModeReceived(TtyMode),
    RadioTechnologyChanged(RadioClass),
}

impl PhoneNotification {
    pub fn kind(&self) -> EventKind {
        use PhoneNotification as N;
        match self {
            N::PreciseCallStateChanged => EventKind::PreciseCallStateChanged,
            N::NewRingingConnection(_) => EventKind::NewRingingConnection,
            N::UnknownConnection(_) => EventKind::UnknownConnection,
            N::IncomingRing => EventKind::IncomingRing,
            N::Disconnect { .. } => EventKind::Disconnect,
            N::RingbackTone(_) => EventKind::RingbackTone,
            N::OnHoldTone(_) => EventKind::OnHoldTone,
            N::InCallVoicePrivacyOn => EventKind::InCallVoicePrivacyOn,
            N::InCallVoicePrivacyOff => EventKind::InCallVoicePrivacyOff,
            N::CallWaiting(_) => EventKind::CallWaiting,
            N::DisplayInfo(_) => EventKind::DisplayInfo,
            N::SignalInfo(_) => EventKind::SignalInfo,
            N::CdmaOtaStatusChange(_) => EventKind::CdmaOtaStatusChange,
            N::ResendIncallMute => EventKind::ResendIncallMute,
            N::MmiInitiate(_) => EventKind::MmiInitiate,
            N::MmiComplete { .. } => EventKind::MmiComplete,
            N::EcmTimerReset(_) => EventKind::EcmTimerReset,
            N::EmergencyCallbackModeChanged(_) => EventKind::EmergencyCallbackModeChanged,
            N::SubscriptionInfoReady => EventKind::SubscriptionInfoReady,
            N::SuppServiceFailed(_) => EventKind::SuppServiceFailed,
            N::ServiceStateChanged(_) => EventKind::ServiceStateChanged,
            N::PostDialCharacter { .. } => EventKind::PostDialCharacter,
            N::TtyModeReceived(_) => EventKind::TtyModeReceived,
            N::RadioTechnologyChanged(_) => EventKind::RadioTechnologyChanged,
        }
    }
}

/// A notification plus the phone that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct PhoneEvent {
    pub phone: PhoneId,
    pub payload: PhoneNotification,
}

impl PhoneEvent {
    pub fn new(phone: PhoneId, payload: PhoneNotification) -> Self {
        Self { phone, payload }
    }
}

impl Notification for PhoneEvent {
    type Kind = EventKind;

    fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}
