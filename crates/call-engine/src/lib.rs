//! # Telephony call engine
//!
//! Cross-radio call coordination on top of [`telephony_phone_core`]:
//!
//! - **[`coordinator`]**: the [`CallCoordinator`], which aggregates every
//!   registered phone's calls, arbitrates dial/answer/swap/conference/transfer
//!   between radios and re-publishes phone events on one hub
//! - **[`service`]**: the [`TelephonyService`] event loop that owns the
//!   phone arena, the task queues and the SMS dispatcher
//! - **[`config`]**: [`TelephonyConfig`], loaded from TOML and `TELEPHONY__*`
//!   environment variables
//!
//! ## Quick start
//!
//! ```no_run
//! use telephony_call_engine::{TelephonyConfig, TelephonyService};
//! use telephony_phone_core::{RadioClass, SubId, VideoState};
//! # use telephony_phone_core::{RadioLink, RadioRequest, RequestToken};
//! # struct Modem;
//! # impl RadioLink for Modem { fn submit(&mut self, _: RequestToken, _: RadioRequest) {} }
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut service = TelephonyService::new(TelephonyConfig::default())?;
//! let phone = service.add_phone(SubId(1), RadioClass::Gsm, Box::new(Modem))?;
//!
//! let (coordinator, arena) = service.parts_mut();
//! coordinator.dial(arena, phone, "+15551234567", VideoState::AudioOnly)?;
//! service.process_pending();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod service;

pub use config::TelephonyConfig;
pub use coordinator::{CallCoordinator, CallSnapshot, ConferencePath};
pub use error::{EngineError, EngineResult};
pub use service::{TelephonyService, TelephonyServiceBuilder};

/// Commonly used types
pub mod prelude {
    pub use crate::{
        CallCoordinator, CallSnapshot, EngineError, EngineResult, TelephonyConfig,
        TelephonyService, TelephonyServiceBuilder,
    };
    pub use telephony_phone_core::{
        CallRef, CallSlot, CallState, ConnectionRef, EventKind, PhoneError, PhoneEvent, PhoneId,
        PhoneResult, PhoneState, RadioClass, ServiceState, SubId, VideoState,
    };
}
