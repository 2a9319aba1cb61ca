//! Server configuration
//!
//! `ServerConfig` is built by the binary from CLI flags / environment and
//! handed to [`crate::state::AppState`]. Durations serialize as plain
//! seconds so the config can be dumped and reloaded by tooling.

use crate::rule_engine::RateLimitConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Used when no `JWT_SECRET` is configured. Development only.
pub const DEV_JWT_SECRET: &str = "edupulse-dev-secret-change-me";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HMAC secret for access tokens
    pub jwt_secret: String,
    #[serde(with = "seconds_serde")]
    pub access_token_ttl: Duration,
    #[serde(with = "seconds_serde")]
    pub refresh_token_ttl: Duration,
    /// Base URL of the AI tutor service (tutoring disabled when unset)
    pub tutor_service_url: Option<String>,
    #[serde(with = "seconds_serde")]
    pub tutor_timeout: Duration,
    pub rate_limit: RateLimitConfig,
    pub fraud: FraudConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            access_token_ttl: Duration::from_secs(15 * 60),
            refresh_token_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            tutor_service_url: None,
            tutor_timeout: Duration::from_secs(60),
            rate_limit: RateLimitConfig::default(),
            fraud: FraudConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

/// Thresholds for the points fraud detector
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FraudConfig {
    /// Scores at or above this are written to the fraud log
    pub flag_threshold: u32,
    /// Scores at or above this refuse the award
    pub block_threshold: u32,
    /// Maximum points a user can earn per UTC day from learner actions
    pub daily_points_cap: i64,
    /// Awards per hour considered normal
    pub max_awards_per_hour: i64,
    /// Single awards above this are unusual for learner actions
    pub large_award: i64,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            flag_threshold: 40,
            block_threshold: 70,
            daily_points_cap: 1000,
            max_awards_per_hour: 20,
            large_award: 200,
        }
    }
}

pub(crate) mod seconds_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.access_token_ttl, Duration::from_secs(900));
        assert_eq!(config.refresh_token_ttl, Duration::from_secs(2_592_000));
        assert!(config.tutor_service_url.is_none());
        assert!(config.uses_dev_secret());
        assert_eq!(config.fraud.block_threshold, 70);
    }

    #[test]
    fn test_config_serializes_durations_as_seconds() {
        let config = ServerConfig {
            jwt_secret: "s3cret".into(),
            tutor_service_url: Some("http://tutor:9000".into()),
            ..Default::default()
        };

        let json = serde_json::to_value(&config).expect("serialize config");
        assert_eq!(json["access_token_ttl"], 900);
        assert_eq!(json["rate_limit"]["window_duration"], 60);

        let round_trip: ServerConfig = serde_json::from_value(json).expect("deserialize");
        assert_eq!(round_trip.access_token_ttl, Duration::from_secs(900));
        assert_eq!(round_trip.fraud, FraudConfig::default());
        assert!(!round_trip.uses_dev_secret());
    }

    #[test]
    fn test_negative_durations_rejected() {
        let err = serde_json::from_value::<RateLimitConfig>(serde_json::json!({
            "max_requests": 5,
            "window_duration": -1
        }))
        .expect_err("negative durations rejected");
        assert!(err.to_string().contains("invalid value"));
    }
}
