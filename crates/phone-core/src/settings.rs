//! Per-phone tunables

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings shared by every phone session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhoneSettings {
    /// Emergency callback mode auto-exit delay, seconds
    pub ecm_exit_timer_secs: u64,
    /// Maximum live connections in one call (conference size)
    pub max_connections_per_call: usize,
    /// Post-dial `,` pause on GSM/IMS/SIP radios, milliseconds
    pub gsm_pause_delay_ms: u64,
    /// Post-dial `,` pause on CDMA radios, milliseconds
    pub cdma_pause_delay_ms: u64,
    /// Numbers dialed as emergency calls
    pub emergency_numbers: Vec<String>,
    /// Burst DTMF tone on/off lengths, milliseconds
    pub burst_dtmf_on_ms: u32,
    pub burst_dtmf_off_ms: u32,
}

impl Default for PhoneSettings {
    fn default() -> Self {
        Self {
            ecm_exit_timer_secs: 300,
            max_connections_per_call: 5,
            gsm_pause_delay_ms: 3000,
            cdma_pause_delay_ms: 2000,
            emergency_numbers: vec!["112".to_string(), "911".to_string()],
            burst_dtmf_on_ms: 95,
            burst_dtmf_off_ms: 60,
        }
    }
}

impl PhoneSettings {
    pub fn ecm_exit_delay(&self) -> Duration {
        Duration::from_secs(self.ecm_exit_timer_secs)
    }
}
