//! Rule Engine - server-side rate limiting
//!
//! Learner actions that earn points are throttled per (user, action) with a
//! fixed window. Counters live in memory; a periodic cleanup drops windows
//! that have expired.

use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    /// Maximum requests per window
    pub max_requests: u32,
    /// Window duration
    #[serde(with = "crate::config::seconds_serde")]
    pub window_duration: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window_duration: Duration::from_secs(60),
        }
    }
}

pub struct RuleEngine {
    /// Rate limit tracking per key
    rate_limits: RwLock<HashMap<String, RateLimitEntry>>,
    config: RateLimitConfig,
}

struct RateLimitEntry {
    count: u32,
    window_start: Instant,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::with_config(RateLimitConfig::default())
    }

    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            rate_limits: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Check rate limit for a key
    /// Returns Ok(()) if allowed, Err if rate limited
    pub fn check_rate_limit(&self, key: &str) -> Result<()> {
        let mut limits = self.rate_limits.write();
        let now = Instant::now();

        let entry = limits.entry(key.to_string()).or_insert(RateLimitEntry {
            count: 0,
            window_start: now,
        });

        // Reset window if expired
        if now.duration_since(entry.window_start) > self.config.window_duration {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count >= self.config.max_requests {
            warn!(key = %key, "Rate limit exceeded");
            return Err(anyhow!("Rate limit exceeded. Try again later."));
        }

        entry.count += 1;
        Ok(())
    }

    /// Rate limit a points-earning action for one user
    pub fn check_action(&self, user_id: &str, action: &str) -> Result<()> {
        self.check_rate_limit(&format!("{}:{}", user_id, action))
    }

    /// Clean up expired rate limit entries
    pub fn cleanup_expired(&self) -> usize {
        let mut limits = self.rate_limits.write();
        let now = Instant::now();
        let before = limits.len();
        limits.retain(|_, entry| {
            now.duration_since(entry.window_start) <= self.config.window_duration
        });
        let removed = before - limits.len();
        if removed > 0 {
            debug!(removed, "Expired rate limit windows dropped");
        }
        removed
    }

    pub fn tracked_keys(&self) -> usize {
        self.rate_limits.read().len()
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit() {
        let engine = RuleEngine::with_config(RateLimitConfig {
            max_requests: 3,
            window_duration: Duration::from_secs(60),
        });

        assert!(engine.check_rate_limit("user-1").is_ok());
        assert!(engine.check_rate_limit("user-1").is_ok());
        assert!(engine.check_rate_limit("user-1").is_ok());

        // 4th request should fail
        assert!(engine.check_rate_limit("user-1").is_err());
    }

    #[test]
    fn test_rate_limit_is_per_user_and_action() {
        let engine = RuleEngine::with_config(RateLimitConfig {
            max_requests: 1,
            window_duration: Duration::from_secs(60),
        });

        assert!(engine.check_action("alice", "milestone_completed").is_ok());
        assert!(engine.check_action("alice", "checkpoint_completed").is_ok());
        assert!(engine.check_action("bob", "milestone_completed").is_ok());

        assert!(engine.check_action("alice", "milestone_completed").is_err());
    }

    #[test]
    fn test_window_resets_after_expiry() {
        let engine = RuleEngine::with_config(RateLimitConfig {
            max_requests: 1,
            window_duration: Duration::from_millis(10),
        });

        assert!(engine.check_rate_limit("k").is_ok());
        assert!(engine.check_rate_limit("k").is_err());
        std::thread::sleep(Duration::from_millis(25));
        assert!(engine.check_rate_limit("k").is_ok());
    }

    #[test]
    fn test_cleanup_expired() {
        let engine = RuleEngine::with_config(RateLimitConfig {
            max_requests: 5,
            window_duration: Duration::from_millis(10),
        });

        engine.check_rate_limit("a").unwrap();
        engine.check_rate_limit("b").unwrap();
        assert_eq!(engine.tracked_keys(), 2);

        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(engine.cleanup_expired(), 2);
        assert_eq!(engine.tracked_keys(), 0);
    }
}
