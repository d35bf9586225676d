//! Per-radio call control for the telephony framework
//!
//! This crate models one modem ("phone") at a time:
//!
//! - **[`session`]**: the [`PhoneSession`] state machine with its ringing,
//!   foreground and background calls, pending dial, MMI sessions, emergency
//!   callback mode and post-dial processing
//! - **[`radio`]**: the [`RadioLink`] request contract and the
//!   [`RadioEvent`]s a modem reports back
//! - **[`arena`]**: the [`PhoneArena`] that owns every session and resolves
//!   [`PhoneId`]s
//! - **[`events`]**: notifications published on each session's hub
//! - **[`mmi`]** and **[`dial_string`]**: dial string parsing
//!
//! # Ownership
//!
//! Sessions own their calls and calls own their connections. Everything
//! outside a session holds ids ([`PhoneId`], [`CallRef`], [`ConnectionRef`])
//! and resolves them through the arena, so no handle can outlive the state it
//! names.
//!
//! # Concurrency
//!
//! Nothing here locks. All mutation happens on the task that drains the
//! [`TaskQueue`](telephony_infra_common::TaskQueue) of [`PhoneDispatch`]
//! items; radio drivers and timers only post onto it.

pub mod arena;
pub mod call;
pub mod cause;
pub mod connection;
pub mod dial_string;
pub mod error;
pub mod events;
pub mod mmi;
pub mod radio;
pub mod session;
pub mod settings;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use arena::PhoneArena;
pub use call::{Call, CallInfo, CallRef, CallSlot, CallState};
pub use cause::{CallFailCause, DisconnectCause};
pub use connection::{Connection, ConnectionId, ConnectionInfo, ConnectionRef, PostDialState};
pub use error::{PhoneError, PhoneResult};
pub use events::{EventKind, PhoneEvent, PhoneNotification};
pub use mmi::{MmiCode, MmiId, MmiState};
pub use radio::{
    Completion, DriverCall, DriverCallState, RadioError, RadioEvent, RadioLink, RadioRequest,
    RadioResponse, RadioResult, RequestToken,
};
pub use session::{DialOutcome, EcmTimerAction, PhoneDispatch, PhoneSession, PhoneTask};
pub use settings::PhoneSettings;
pub use types::{
    ClirMode, PhoneId, PhoneState, RadioClass, ServiceState, SubId, SuppService, TtyMode,
    VideoState,
};
