//! Event settings stored as a flat key/value table.
//!
//! Every key has a default and a validation rule. Values are kept as strings in the
//! store and parsed into [`EventSettings`] when an operation needs them.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

use crate::errors::AppError;

pub const MAX_TEAM_SIZE: &str = "max_team_size";
pub const MIN_TEAM_SIZE: &str = "min_team_size";
pub const MAX_TOTAL_PARTICIPANTS: &str = "max_total_participants";
pub const PRICE_TIER1: &str = "price_tier1";
pub const PRICE_TIER2: &str = "price_tier2";
pub const TIER1_CUTOFF_DAYS: &str = "tier1_cutoff_days";
pub const REGISTRATION_DEADLINE: &str = "registration_deadline";
pub const PAYMENT_ENABLED: &str = "payment_enabled";
pub const PRICE_ASSO_MEMBER: &str = "price_asso_member";
pub const PRICE_NON_MEMBER: &str = "price_non_member";
pub const PRICE_LATE: &str = "price_late";
pub const LATE_CUTOFF_TIME: &str = "late_cutoff_time";
pub const GDPR_RETENTION_YEARS: &str = "gdpr_retention_years";

const MAX_PRICE: i64 = 1_000_000;

/// Value rule for a settings key.
#[derive(Debug, Clone, Copy)]
enum Rule {
    Int { min: i64, max: i64 },
    Bool,
    Time,
    OptionalDate,
}

/// Known keys with their defaults and rules.
const DEFINITIONS: &[(&str, &str, Rule)] = &[
    (MAX_TEAM_SIZE, "6", Rule::Int { min: 1, max: 100 }),
    (MIN_TEAM_SIZE, "1", Rule::Int { min: 1, max: 100 }),
    (MAX_TOTAL_PARTICIPANTS, "100", Rule::Int { min: 1, max: 100_000 }),
    (PRICE_TIER1, "500", Rule::Int { min: 0, max: MAX_PRICE }),
    (PRICE_TIER2, "800", Rule::Int { min: 0, max: MAX_PRICE }),
    (TIER1_CUTOFF_DAYS, "7", Rule::Int { min: 0, max: 365 }),
    (REGISTRATION_DEADLINE, "", Rule::OptionalDate),
    (PAYMENT_ENABLED, "false", Rule::Bool),
    (PRICE_ASSO_MEMBER, "500", Rule::Int { min: 0, max: MAX_PRICE }),
    (PRICE_NON_MEMBER, "800", Rule::Int { min: 0, max: MAX_PRICE }),
    (PRICE_LATE, "1000", Rule::Int { min: 0, max: MAX_PRICE }),
    (LATE_CUTOFF_TIME, "20:00", Rule::Time),
    (GDPR_RETENTION_YEARS, "3", Rule::Int { min: 1, max: 50 }),
];

/// Default key/value pairs seeded by the migrations.
pub fn defaults() -> impl Iterator<Item = (&'static str, &'static str)> {
    DEFINITIONS.iter().map(|(key, value, _)| (*key, *value))
}

/// Validate and normalize a single raw settings value.
pub fn normalize(key: &str, raw: &serde_json::Value) -> Result<String, AppError> {
    let rule = DEFINITIONS
        .iter()
        .find(|(k, _, _)| *k == key)
        .map(|(_, _, rule)| *rule)
        .ok_or_else(|| AppError::Validation(format!("Unknown setting '{}'", key)))?;

    let text = match raw {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => String::new(),
        _ => {
            return Err(AppError::Validation(format!(
                "Setting '{}' must be a scalar value",
                key
            )))
        }
    };

    match rule {
        Rule::Int { min, max } => {
            let value: i64 = text.parse().map_err(|_| {
                AppError::Validation(format!("Setting '{}' must be an integer", key))
            })?;
            if value < min || value > max {
                return Err(AppError::Validation(format!(
                    "Setting '{}' must be between {} and {}",
                    key, min, max
                )));
            }
            Ok(value.to_string())
        }
        Rule::Bool => match text.as_str() {
            "true" | "1" => Ok("true".to_string()),
            "false" | "0" => Ok("false".to_string()),
            _ => Err(AppError::Validation(format!(
                "Setting '{}' must be a boolean",
                key
            ))),
        },
        Rule::Time => parse_hh_mm(&text)
            .map(|t| t.format("%H:%M").to_string())
            .ok_or_else(|| {
                AppError::Validation(format!("Setting '{}' must be a time in HH:MM format", key))
            }),
        Rule::OptionalDate => {
            if text.is_empty() {
                return Ok(text);
            }
            NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                .map(|d| d.format("%Y-%m-%d").to_string())
                .map_err(|_| {
                    AppError::Validation(format!(
                        "Setting '{}' must be a date in YYYY-MM-DD format",
                        key
                    ))
                })
        }
    }
}

/// Strict `HH:MM` parser (two digits each).
pub fn parse_hh_mm(text: &str) -> Option<NaiveTime> {
    let (h, m) = text.split_once(':')?;
    if h.len() != 2 || m.len() != 2 {
        return None;
    }
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Typed view over the settings table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSettings {
    pub max_team_size: i64,
    pub min_team_size: i64,
    pub max_total_participants: i64,
    pub price_tier1: i64,
    pub price_tier2: i64,
    pub tier1_cutoff_days: i64,
    pub registration_deadline: Option<NaiveDate>,
    pub payment_enabled: bool,
    pub price_asso_member: i64,
    pub price_non_member: i64,
    pub price_late: i64,
    pub late_cutoff_time: NaiveTime,
    pub gdpr_retention_years: i64,
}

impl EventSettings {
    /// Build from stored pairs. Missing or unparsable values fall back to defaults.
    pub fn from_pairs(pairs: &BTreeMap<String, String>) -> Self {
        let int = |key: &str| -> i64 {
            pairs
                .get(key)
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| default_of(key).parse().unwrap_or(0))
        };
        let text = |key: &str| -> String {
            pairs
                .get(key)
                .cloned()
                .unwrap_or_else(|| default_of(key).to_string())
        };

        Self {
            max_team_size: int(MAX_TEAM_SIZE),
            min_team_size: int(MIN_TEAM_SIZE),
            max_total_participants: int(MAX_TOTAL_PARTICIPANTS),
            price_tier1: int(PRICE_TIER1),
            price_tier2: int(PRICE_TIER2),
            tier1_cutoff_days: int(TIER1_CUTOFF_DAYS),
            registration_deadline: NaiveDate::parse_from_str(
                &text(REGISTRATION_DEADLINE),
                "%Y-%m-%d",
            )
            .ok(),
            payment_enabled: matches!(text(PAYMENT_ENABLED).as_str(), "true" | "1"),
            price_asso_member: int(PRICE_ASSO_MEMBER),
            price_non_member: int(PRICE_NON_MEMBER),
            price_late: int(PRICE_LATE),
            late_cutoff_time: parse_hh_mm(&text(LATE_CUTOFF_TIME))
                .or_else(|| parse_hh_mm(default_of(LATE_CUTOFF_TIME)))
                .unwrap_or(NaiveTime::MIN),
            gdpr_retention_years: int(GDPR_RETENTION_YEARS),
        }
    }
}

impl Default for EventSettings {
    fn default() -> Self {
        Self::from_pairs(&BTreeMap::new())
    }
}

fn default_of(key: &str) -> &'static str {
    DEFINITIONS
        .iter()
        .find(|(k, _, _)| *k == key)
        .map(|(_, value, _)| *value)
        .unwrap_or("")
}
