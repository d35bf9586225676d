//! Destination classification for premium short-code gating
//!
//! A destination is checked against the country's patterns in the order
//! free, standard, premium, short code; the first match decides. Countries
//! without patterns fall back to a length rule: five characters or fewer is a
//! possible premium short code.

use crate::error::{SmsError, SmsResult};
use crate::settings::{CountryPatterns, SmsSettings};
use crate::types::SmsCategory;
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

/// Destinations up to this length are possible premium short codes when no
/// country patterns are configured
pub const GENERIC_SHORT_CODE_MAX_LEN: usize = 5;

#[derive(Debug)]
struct CompiledPatterns {
    free: Option<Regex>,
    standard: Option<Regex>,
    premium: Option<Regex>,
    short_code: Option<Regex>,
}

impl CompiledPatterns {
    fn compile(country: &str, patterns: &CountryPatterns) -> SmsResult<Self> {
        let compile = |pattern: &Option<String>| -> SmsResult<Option<Regex>> {
            pattern
                .as_deref()
                .map(|p| {
                    Regex::new(&format!("^(?:{p})$"))
                        .map_err(|e| SmsError::invalid_pattern(country, p, e))
                })
                .transpose()
        };
        Ok(Self {
            free: compile(&patterns.free)?,
            standard: compile(&patterns.standard)?,
            premium: compile(&patterns.premium)?,
            short_code: compile(&patterns.short_code)?,
        })
    }

    fn category(&self, destination: &str) -> SmsCategory {
        let matches = |re: &Option<Regex>| re.as_ref().is_some_and(|re| re.is_match(destination));
        if matches(&self.free) {
            SmsCategory::FreeShortCode
        } else if matches(&self.standard) {
            SmsCategory::StandardShortCode
        } else if matches(&self.premium) {
            SmsCategory::PremiumShortCode
        } else if matches(&self.short_code) {
            SmsCategory::PossiblePremiumShortCode
        } else {
            SmsCategory::NotShortCode
        }
    }
}

#[derive(Debug)]
pub struct ShortCodeClassifier {
    enabled: bool,
    emergency_numbers: Vec<String>,
    countries: HashMap<String, CompiledPatterns>,
}

impl ShortCodeClassifier {
    /// Compile every configured pattern up front
    pub fn new(settings: &SmsSettings) -> SmsResult<Self> {
        let mut countries = HashMap::with_capacity(settings.short_code_patterns.len());
        for (country, patterns) in &settings.short_code_patterns {
            countries.insert(
                country.to_ascii_lowercase(),
                CompiledPatterns::compile(country, patterns)?,
            );
        }
        Ok(Self {
            enabled: settings.check_short_codes,
            emergency_numbers: settings.emergency_numbers.clone(),
            countries,
        })
    }

    /// Category of `destination` under `country`'s rules
    pub fn classify(&self, destination: &str, country: Option<&str>) -> SmsCategory {
        if self.emergency_numbers.iter().any(|n| n == destination) || !self.enabled {
            return SmsCategory::NotShortCode;
        }
        let patterns = country.and_then(|c| self.countries.get(&c.to_ascii_lowercase()));
        let category = match patterns {
            Some(patterns) => patterns.category(destination),
            None if destination.chars().count() <= GENERIC_SHORT_CODE_MAX_LEN => {
                SmsCategory::PossiblePremiumShortCode
            }
            None => SmsCategory::NotShortCode,
        };
        debug!(destination, ?country, ?category, "Classified SMS destination");
        category
    }
}

/// Keep the more restrictive of two categories
pub fn merge_categories(a: SmsCategory, b: SmsCategory) -> SmsCategory {
    a.max(b)
}
