//! Service configuration
//!
//! ```toml
//! [logging]
//! level = "debug"
//!
//! [phone]
//! ecm_exit_timer_secs = 120
//!
//! [sms]
//! max_send_retries = 2
//! ```
//!
//! Any key may also come from the environment, e.g.
//! `TELEPHONY__SMS__MAX_SEND_RETRIES=5`.

use crate::error::{EngineError, EngineResult};
use serde::Deserialize;
use std::path::Path;
use telephony_infra_common::config::load_config;
use telephony_infra_common::errors::{ErrorContext, ErrorExt};
use telephony_infra_common::logging::LoggingConfig;
use telephony_phone_core::PhoneSettings;
use telephony_sms_core::SmsSettings;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "TELEPHONY";

/// Everything a [`TelephonyService`](crate::TelephonyService) is built from
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelephonyConfig {
    pub logging: LoggingConfig,
    pub phone: PhoneSettings,
    pub sms: SmsSettings,
}

impl TelephonyConfig {
    /// Load from an optional TOML file plus `TELEPHONY__*` environment
    /// overrides. A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> EngineResult<Self> {
        let config: Self = load_config(path, ENV_PREFIX).map_err(|e| {
            let ctx = ErrorContext::new("telephony-config", "load");
            let ctx = match path {
                Some(path) => ctx.with_details(path.display().to_string()),
                None => ctx,
            };
            e.context(ctx)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> EngineResult<()> {
        if self.phone.max_connections_per_call == 0 {
            return Err(EngineError::configuration(
                "phone.max_connections_per_call must be at least 1",
            ));
        }
        if self.sms.max_pending_confirmations == 0 {
            return Err(EngineError::configuration(
                "sms.max_pending_confirmations must be at least 1",
            ));
        }
        Ok(())
    }
}
