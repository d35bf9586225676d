//! Per-app send accounting and premium permissions

use crate::error::SmsResult;
use crate::settings::{PremiumRule, SmsSettings};
use crate::short_code::{merge_categories, ShortCodeClassifier};
use crate::types::{PremiumPermission, SmsCategory};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

/// Tracks how many messages each app sent recently and which apps may
/// send to premium short codes. Permissions live in memory only.
#[derive(Debug)]
pub struct SmsUsageMonitor {
    max_count: usize,
    window: Duration,
    sent: HashMap<String, VecDeque<DateTime<Utc>>>,
    permissions: HashMap<String, PremiumPermission>,
    classifier: ShortCodeClassifier,
    premium_rule: PremiumRule,
}

impl SmsUsageMonitor {
    pub fn new(settings: &SmsSettings) -> SmsResult<Self> {
        let window = Duration::from_std(settings.rate_limit_window()).unwrap_or_else(|_| Duration::weeks(52));
        Ok(Self {
            max_count: settings.rate_limit_max_count,
            window,
            sent: HashMap::new(),
            permissions: HashMap::new(),
            classifier: ShortCodeClassifier::new(settings)?,
            premium_rule: settings.premium_rule,
        })
    }

    /// Account for `count` messages from `app`; `false` when that would
    /// exceed the limit, in which case nothing is recorded
    pub fn check(&mut self, app: &str, count: usize) -> bool {
        self.check_at(app, count, Utc::now())
    }

    pub fn check_at(&mut self, app: &str, count: usize, now: DateTime<Utc>) -> bool {
        let sent = self.sent.entry(app.to_string()).or_default();
        let cutoff = now - self.window;
        while sent.front().is_some_and(|t| *t < cutoff) {
            sent.pop_front();
        }
        if sent.len() + count > self.max_count {
            debug!(app, recent = sent.len(), count, limit = self.max_count, "Send limit reached");
            return false;
        }
        sent.extend(std::iter::repeat(now).take(count));
        true
    }

    /// Messages from `app` still inside the window
    pub fn recent_count(&self, app: &str) -> usize {
        self.sent.get(app).map_or(0, VecDeque::len)
    }

    pub fn premium_permission(&self, app: &str) -> PremiumPermission {
        self.permissions.get(app).copied().unwrap_or_default()
    }

    pub fn set_premium_permission(&mut self, app: &str, permission: PremiumPermission) {
        info!(app, ?permission, "Premium SMS permission changed");
        self.permissions.insert(app.to_string(), permission);
    }

    /// Category of `destination` under the configured premium rule
    pub fn check_destination(
        &self,
        destination: &str,
        sim_country: Option<&str>,
        network_country: Option<&str>,
    ) -> SmsCategory {
        let mut category = SmsCategory::NotShortCode;
        if matches!(self.premium_rule, PremiumRule::Sim | PremiumRule::Both) {
            category = self.classifier.classify(destination, sim_country);
        }
        if matches!(self.premium_rule, PremiumRule::Network | PremiumRule::Both) {
            category = merge_categories(category, self.classifier.classify(destination, network_country));
        }
        category
    }
}
