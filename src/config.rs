//! Environment configuration

use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

/// Referral depth is never allowed past this many levels.
pub const MAX_REFERRAL_DEPTH: usize = 3;

/// Upper bound for `GROUP_TTL_HOURS`: one year.
pub const MAX_GROUP_TTL_HOURS: i64 = 24 * 365;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub port: u16,
    pub nats_url: Option<String>,
    pub nats_subject_prefix: String,
    /// Commission percentage per referral level, nearest referrer first.
    pub commission_rates: Vec<Decimal>,
    pub group_ttl_hours: i64,
    pub points_rate_percent: Decimal,
    pub order_number_prefix: String,
    pub seed_demo: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            port: 8083,
            nats_url: None,
            nats_subject_prefix: "commerce".to_string(),
            commission_rates: vec![Decimal::from(5), Decimal::from(3), Decimal::from(1)],
            group_ttl_hours: 24,
            points_rate_percent: Decimal::ONE,
            order_number_prefix: "ORD".to_string(),
            seed_demo: false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("COMMISSION_RATES supports at most 3 levels, got {0}")]
    TooManyLevels(usize),
}

impl EngineConfig {
    /// Reads configuration from the process environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let commission_rates = match lookup("COMMISSION_RATES") {
            Some(raw) => parse_rates(&raw)?,
            None => defaults.commission_rates,
        };
        if commission_rates.len() > MAX_REFERRAL_DEPTH {
            return Err(ConfigError::TooManyLevels(commission_rates.len()));
        }
        let group_ttl_hours = parse_or(&lookup, "GROUP_TTL_HOURS", defaults.group_ttl_hours)?;
        if !(1..=MAX_GROUP_TTL_HOURS).contains(&group_ttl_hours) {
            return Err(ConfigError::Invalid { key: "GROUP_TTL_HOURS", value: group_ttl_hours.to_string() });
        }
        Ok(Self {
            port: parse_or(&lookup, "PORT", defaults.port)?,
            nats_url: lookup("NATS_URL").filter(|v| !v.is_empty()),
            nats_subject_prefix: lookup("NATS_SUBJECT_PREFIX").unwrap_or(defaults.nats_subject_prefix),
            commission_rates,
            group_ttl_hours,
            points_rate_percent: parse_or(&lookup, "POINTS_RATE_PERCENT", defaults.points_rate_percent)?,
            order_number_prefix: lookup("ORDER_NUMBER_PREFIX").unwrap_or(defaults.order_number_prefix),
            seed_demo: parse_or(&lookup, "SEED_DEMO", defaults.seed_demo)?,
        })
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

fn parse_rates(raw: &str) -> Result<Vec<Decimal>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Decimal::from_str(s)
                .ok()
                .filter(|d| !d.is_sign_negative())
                .ok_or_else(|| ConfigError::Invalid { key: "COMMISSION_RATES", value: raw.to_string() })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.port, 8083);
        assert_eq!(cfg.commission_rates, vec![Decimal::from(5), Decimal::from(3), Decimal::from(1)]);
        assert_eq!(cfg.group_ttl_hours, 24);
    }

    #[test]
    fn test_overrides() {
        let cfg = EngineConfig::from_lookup(lookup(&[("PORT", "9000"), ("COMMISSION_RATES", "10, 2"), ("SEED_DEMO", "true")])).unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.commission_rates, vec![Decimal::from(10), Decimal::from(2)]);
        assert!(cfg.seed_demo);
    }

    #[test]
    fn test_rejects_deep_chain_and_garbage() {
        assert!(matches!(EngineConfig::from_lookup(lookup(&[("COMMISSION_RATES", "5,3,1,1")])), Err(ConfigError::TooManyLevels(4))));
        assert!(matches!(EngineConfig::from_lookup(lookup(&[("PORT", "http")])), Err(ConfigError::Invalid { key: "PORT", .. })));
    }

    #[test]
    fn test_group_ttl_must_be_positive_and_bounded() {
        for raw in ["0", "-5", "8761", "9223372036854775807"] {
            assert!(matches!(
                EngineConfig::from_lookup(lookup(&[("GROUP_TTL_HOURS", raw)])),
                Err(ConfigError::Invalid { key: "GROUP_TTL_HOURS", .. })
            ), "{raw} accepted");
        }
        assert_eq!(EngineConfig::from_lookup(lookup(&[("GROUP_TTL_HOURS", "8760")])).unwrap().group_ttl_hours, MAX_GROUP_TTL_HOURS);
    }
}
