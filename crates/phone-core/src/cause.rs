//! Call failure causes and their mapping to disconnect causes
//!
//! Numeric causes follow 3GPP TS 24.008 Annex H for GSM plus the
//! vendor range the modem uses for CDMA-specific outcomes.

use crate::types::ServiceState;
use serde::{Deserialize, Serialize};

/// Numeric call failure causes reported by the radio
pub struct CallFailCause;

impl CallFailCause {
    pub const UNOBTAINABLE_NUMBER: i32 = 1;
    pub const OPERATOR_DETERMINED_BARRING: i32 = 8;
    pub const NORMAL_CLEARING: i32 = 16;
    pub const USER_BUSY: i32 = 17;
    pub const NUMBER_CHANGED: i32 = 22;
    pub const STATUS_ENQUIRY: i32 = 30;
    pub const NORMAL_UNSPECIFIED: i32 = 31;
    pub const NO_CIRCUIT_AVAIL: i32 = 34;
    pub const TEMPORARY_FAILURE: i32 = 41;
    pub const SWITCHING_CONGESTION: i32 = 42;
    pub const CHANNEL_NOT_AVAIL: i32 = 44;
    pub const QOS_NOT_AVAIL: i32 = 49;
    pub const BEARER_NOT_AVAIL: i32 = 58;
    pub const ACM_LIMIT_EXCEEDED: i32 = 68;
    pub const CALL_BARRED: i32 = 240;
    pub const FDN_BLOCKED: i32 = 241;
    pub const DIAL_MODIFIED_TO_USSD: i32 = 244;
    pub const DIAL_MODIFIED_TO_SS: i32 = 245;
    pub const DIAL_MODIFIED_TO_DIAL: i32 = 246;
    pub const CDMA_LOCKED_UNTIL_POWER_CYCLE: i32 = 1000;
    pub const CDMA_DROP: i32 = 1001;
    pub const CDMA_INTERCEPT: i32 = 1002;
    pub const CDMA_REORDER: i32 = 1003;
    pub const CDMA_SO_REJECT: i32 = 1004;
    pub const CDMA_RETRY_ORDER: i32 = 1005;
    pub const CDMA_ACCESS_FAILURE: i32 = 1006;
    pub const CDMA_PREEMPTED: i32 = 1007;
    pub const CDMA_NOT_EMERGENCY: i32 = 1008;
    pub const CDMA_ACCESS_BLOCKED: i32 = 1009;
    pub const ERROR_UNSPECIFIED: i32 = 0xffff;
}

/// Why a connection ended, as presented to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisconnectCause {
    NotDisconnected,
    IncomingMissed,
    Normal,
    Local,
    Busy,
    Congestion,
    InvalidNumber,
    IncomingRejected,
    PowerOff,
    OutOfService,
    LimitExceeded,
    CallBarred,
    FdnBlocked,
    UnobtainableNumber,
    DialModifiedToUssd,
    DialModifiedToSs,
    DialModifiedToDial,
    CdmaLockedUntilPowerCycle,
    CdmaDrop,
    CdmaIntercept,
    CdmaReorder,
    CdmaSoReject,
    CdmaRetryOrder,
    CdmaAccessFailure,
    CdmaPreempted,
    CdmaNotEmergency,
    CdmaAccessBlocked,
    ErrorUnspecified,
}

/// Map a radio-reported failure cause to a disconnect cause.
///
/// Causes without a specific meaning (normal clearing, unspecified and
/// anything unknown) are interpreted against the current service state.
pub fn disconnect_cause_from_code(code: i32, service_state: ServiceState) -> DisconnectCause {
    use DisconnectCause as D;

    match code {
        CallFailCause::USER_BUSY => D::Busy,
        CallFailCause::NO_CIRCUIT_AVAIL
        | CallFailCause::TEMPORARY_FAILURE
        | CallFailCause::SWITCHING_CONGESTION
        | CallFailCause::CHANNEL_NOT_AVAIL
        | CallFailCause::QOS_NOT_AVAIL
        | CallFailCause::BEARER_NOT_AVAIL => D::Congestion,
        CallFailCause::ACM_LIMIT_EXCEEDED => D::LimitExceeded,
        CallFailCause::OPERATOR_DETERMINED_BARRING | CallFailCause::CALL_BARRED => D::CallBarred,
        CallFailCause::FDN_BLOCKED => D::FdnBlocked,
        CallFailCause::UNOBTAINABLE_NUMBER => D::UnobtainableNumber,
        CallFailCause::DIAL_MODIFIED_TO_USSD => D::DialModifiedToUssd,
        CallFailCause::DIAL_MODIFIED_TO_SS => D::DialModifiedToSs,
        CallFailCause::DIAL_MODIFIED_TO_DIAL => D::DialModifiedToDial,
        CallFailCause::CDMA_LOCKED_UNTIL_POWER_CYCLE => D::CdmaLockedUntilPowerCycle,
        CallFailCause::CDMA_DROP => D::CdmaDrop,
        CallFailCause::CDMA_INTERCEPT => D::CdmaIntercept,
        CallFailCause::CDMA_REORDER => D::CdmaReorder,
        CallFailCause::CDMA_SO_REJECT => D::CdmaSoReject,
        CallFailCause::CDMA_RETRY_ORDER => D::CdmaRetryOrder,
        CallFailCause::CDMA_ACCESS_FAILURE => D::CdmaAccessFailure,
        CallFailCause::CDMA_PREEMPTED => D::CdmaPreempted,
        CallFailCause::CDMA_NOT_EMERGENCY => D::CdmaNotEmergency,
        CallFailCause::CDMA_ACCESS_BLOCKED => D::CdmaAccessBlocked,
        _ => match service_state {
            ServiceState::PowerOff => D::PowerOff,
            ServiceState::OutOfService | ServiceState::EmergencyOnly => D::OutOfService,
            ServiceState::InService if code == CallFailCause::NORMAL_CLEARING => D::Normal,
            ServiceState::InService => D::ErrorUnspecified,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specific_causes_ignore_service_state() {
        assert_eq!(
            disconnect_cause_from_code(CallFailCause::USER_BUSY, ServiceState::PowerOff),
            DisconnectCause::Busy
        );
        assert_eq!(
            disconnect_cause_from_code(CallFailCause::BEARER_NOT_AVAIL, ServiceState::InService),
            DisconnectCause::Congestion
        );
        assert_eq!(
            disconnect_cause_from_code(CallFailCause::CDMA_DROP, ServiceState::InService),
            DisconnectCause::CdmaDrop
        );
    }

    #[test]
    fn test_generic_causes_follow_service_state() {
        let normal = CallFailCause::NORMAL_CLEARING;
        assert_eq!(disconnect_cause_from_code(normal, ServiceState::InService), DisconnectCause::Normal);
        assert_eq!(disconnect_cause_from_code(normal, ServiceState::PowerOff), DisconnectCause::PowerOff);
        assert_eq!(
            disconnect_cause_from_code(normal, ServiceState::EmergencyOnly),
            DisconnectCause::OutOfService
        );
        assert_eq!(
            disconnect_cause_from_code(CallFailCause::NORMAL_UNSPECIFIED, ServiceState::InService),
            DisconnectCause::ErrorUnspecified
        );
    }
}
