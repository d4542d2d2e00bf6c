// config.rs
use std::env;
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::str::FromStr;

use chrono::Duration;

use crate::errors::{AppError, Result};
use crate::services::sweep::SweepPolicy;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_name: String,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    pub mongo_transactions: bool,
    pub sweep_interval_secs: u64,
    pub guest_upload_timeout_hours: i64,
    pub owner_verification_timeout_hours: i64,
    pub id_retention_days: i64,
    pub sweep_max_attempts: u32,
    pub sweep_backoff_secs: i64,
    pub reconcile_every_ticks: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. Durations are bounded so the
    /// sweep policy can always be constructed from them.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config = AppConfig {
            database_url: required(&lookup, "DATABASE_URL")?,
            database_name: lookup("DATABASE_NAME").unwrap_or_else(|| "hotel-booking".to_string()),
            jwt_secret: required(&lookup, "JWT_SECRET")?,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed(&lookup, "PORT", 7000)?,
            mongo_transactions: parsed(&lookup, "MONGO_TRANSACTIONS", false)?,
            sweep_interval_secs: parsed(&lookup, "SWEEP_INTERVAL_SECS", 900)?,
            guest_upload_timeout_hours: parsed(&lookup, "GUEST_UPLOAD_TIMEOUT_HOURS", 6)?,
            owner_verification_timeout_hours: parsed(
                &lookup,
                "OWNER_VERIFICATION_TIMEOUT_HOURS",
                24,
            )?,
            id_retention_days: parsed(&lookup, "ID_RETENTION_DAYS", 7)?,
            sweep_max_attempts: parsed(&lookup, "SWEEP_MAX_ATTEMPTS", 5)?,
            sweep_backoff_secs: parsed(&lookup, "SWEEP_BACKOFF_SECS", 60)?,
            reconcile_every_ticks: parsed(&lookup, "RECONCILE_EVERY_TICKS", 4)?,
        };

        within("SWEEP_INTERVAL_SECS", config.sweep_interval_secs, 1..=86_400)?;
        within("GUEST_UPLOAD_TIMEOUT_HOURS", config.guest_upload_timeout_hours, 1..=8_760)?;
        within(
            "OWNER_VERIFICATION_TIMEOUT_HOURS",
            config.owner_verification_timeout_hours,
            1..=8_760,
        )?;
        within("ID_RETENTION_DAYS", config.id_retention_days, 1..=3_650)?;
        within("SWEEP_MAX_ATTEMPTS", config.sweep_max_attempts, 1..=100)?;
        within("SWEEP_BACKOFF_SECS", config.sweep_backoff_secs, 1..=3_600)?;

        Ok(config)
    }

    pub fn sweep_policy(&self) -> SweepPolicy {
        SweepPolicy {
            guest_upload_timeout: Duration::hours(self.guest_upload_timeout_hours),
            owner_verification_timeout: Duration::hours(self.owner_verification_timeout_hours),
            id_retention: Duration::days(self.id_retention_days),
            max_attempts: self.sweep_max_attempts,
            backoff_base: Duration::seconds(self.sweep_backoff_secs),
        }
    }

    pub fn get_config_info(&self) -> serde_json::Value {
        serde_json::json!({
            "database_name": self.database_name,
            "jwt_secret_set": !self.jwt_secret.is_empty(),
            "mongo_transactions": self.mongo_transactions,
            "sweep_interval_secs": self.sweep_interval_secs,
            "guest_upload_timeout_hours": self.guest_upload_timeout_hours,
            "owner_verification_timeout_hours": self.owner_verification_timeout_hours,
            "id_retention_days": self.id_retention_days,
            "port": self.port,
            "host": self.host,
        })
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::configuration(format!("{} must be set", key)))
}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::configuration(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}

fn within<T>(key: &str, value: T, range: RangeInclusive<T>) -> Result<()>
where
    T: PartialOrd + Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(AppError::configuration(format!(
            "{} must be between {} and {}, got {}",
            key,
            range.start(),
            range.end(),
            value
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let mut vars: HashMap<String, String> = [
            ("DATABASE_URL", "mongodb://localhost:27017"),
            ("JWT_SECRET", "secret"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (key, value) in pairs {
            vars.insert(key.to_string(), value.to_string());
        }
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_build_a_sweep_policy() {
        let config = load(&[]).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.database_name, "hotel-booking");

        let policy = config.sweep_policy();
        assert_eq!(policy.guest_upload_timeout, Duration::hours(6));
        assert_eq!(policy.owner_verification_timeout, Duration::hours(24));
        assert_eq!(policy.id_retention, Duration::days(7));
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff_base, Duration::seconds(60));
    }

    #[test]
    fn out_of_range_durations_are_rejected() {
        let cases = [
            ("GUEST_UPLOAD_TIMEOUT_HOURS", "-6"),
            ("GUEST_UPLOAD_TIMEOUT_HOURS", "0"),
            ("OWNER_VERIFICATION_TIMEOUT_HOURS", "9223372036854775807"),
            ("ID_RETENTION_DAYS", "-1"),
            ("ID_RETENTION_DAYS", "1000000000000"),
            ("SWEEP_BACKOFF_SECS", "0"),
            ("SWEEP_MAX_ATTEMPTS", "0"),
            ("SWEEP_INTERVAL_SECS", "0"),
        ];

        for (key, value) in cases {
            let err = load(&[(key, value)]).unwrap_err();
            assert!(
                matches!(&err, AppError::ConfigurationError(msg) if msg.contains(key)),
                "{}={} gave {:?}",
                key,
                value,
                err
            );
        }
    }

    #[test]
    fn unparsable_and_missing_values_are_rejected() {
        assert!(matches!(
            load(&[("PORT", "seventy")]),
            Err(AppError::ConfigurationError(_))
        ));

        let err = AppConfig::from_lookup(|key| (key == "JWT_SECRET").then(|| "s".to_string()))
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigurationError(msg) if msg.contains("DATABASE_URL")));
    }

    #[test]
    fn upper_bounds_are_accepted() {
        let config = load(&[
            ("GUEST_UPLOAD_TIMEOUT_HOURS", "8760"),
            ("ID_RETENTION_DAYS", "3650"),
        ])
        .unwrap();
        assert_eq!(config.sweep_policy().id_retention, Duration::days(3_650));
    }
}
