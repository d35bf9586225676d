//! SMS dispatch tunables

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Which country codes the premium short-code check consults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PremiumRule {
    #[default]
    Sim,
    Network,
    /// Both, keeping the more restrictive category
    Both,
}

/// Regular expressions classifying one country's short codes.
///
/// Each pattern must match the whole destination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountryPatterns {
    pub free: Option<String>,
    pub standard: Option<String>,
    pub premium: Option<String>,
    pub short_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsSettings {
    /// Retries after a network "retry" failure before giving up
    pub max_send_retries: u32,
    /// Delay before each retry, milliseconds
    pub send_retry_delay_ms: u64,
    /// Messages that may wait for user confirmation at once
    pub max_pending_confirmations: usize,
    /// Messages one app may send per window before confirmation is needed
    pub rate_limit_max_count: usize,
    pub rate_limit_window_secs: u64,
    pub premium_rule: PremiumRule,
    /// Disables short-code classification entirely
    pub check_short_codes: bool,
    /// Destinations never treated as short codes
    pub emergency_numbers: Vec<String>,
    /// Short-code patterns keyed by lower-case ISO country code
    pub short_code_patterns: HashMap<String, CountryPatterns>,
}

impl Default for SmsSettings {
    fn default() -> Self {
        Self {
            max_send_retries: 3,
            send_retry_delay_ms: 2000,
            max_pending_confirmations: 5,
            rate_limit_max_count: 30,
            rate_limit_window_secs: 30 * 60,
            premium_rule: PremiumRule::Sim,
            check_short_codes: true,
            emergency_numbers: vec!["112".to_string(), "911".to_string()],
            short_code_patterns: HashMap::new(),
        }
    }
}

impl SmsSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.send_retry_delay_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}
