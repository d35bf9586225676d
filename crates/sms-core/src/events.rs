//! Notifications published by the SMS dispatcher

use crate::types::{ConfirmationKind, GroupId, MessageId, SmsFailure};
use telephony_infra_common::Notification;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmsEventKind {
    Sent,
    SendFailed,
    RetryScheduled,
    ConfirmationRequired,
    Delivered,
    DeliveryFailed,
    MessageComplete,
}

impl SmsEventKind {
    pub const ALL: [SmsEventKind; 7] = [
        SmsEventKind::Sent,
        SmsEventKind::SendFailed,
        SmsEventKind::RetryScheduled,
        SmsEventKind::ConfirmationRequired,
        SmsEventKind::Delivered,
        SmsEventKind::DeliveryFailed,
        SmsEventKind::MessageComplete,
    ];
}

#[derive(Debug, Clone, PartialEq)]
pub enum SmsEvent {
    Sent {
        message: MessageId,
        message_ref: u32,
    },
    SendFailed {
        message: MessageId,
        failure: SmsFailure,
        /// Radio error code, when the radio reported one
        error_code: Option<i32>,
        retry_count: u32,
    },
    RetryScheduled {
        message: MessageId,
        retry_count: u32,
    },
    ConfirmationRequired {
        message: MessageId,
        kind: ConfirmationKind,
    },
    Delivered {
        message: MessageId,
    },
    DeliveryFailed {
        message: MessageId,
    },
    /// Every part of a multipart message has resolved
    MessageComplete {
        group: GroupId,
        failed: bool,
    },
}

impl Notification for SmsEvent {
    type Kind = SmsEventKind;

    fn kind(&self) -> SmsEventKind {
        match self {
            SmsEvent::Sent { .. } => SmsEventKind::Sent,
            SmsEvent::SendFailed { .. } => SmsEventKind::SendFailed,
            SmsEvent::RetryScheduled { .. } => SmsEventKind::RetryScheduled,
            SmsEvent::ConfirmationRequired { .. } => SmsEventKind::ConfirmationRequired,
            SmsEvent::Delivered { .. } => SmsEventKind::Delivered,
            SmsEvent::DeliveryFailed { .. } => SmsEventKind::DeliveryFailed,
            SmsEvent::MessageComplete { .. } => SmsEventKind::MessageComplete,
        }
    }
}
