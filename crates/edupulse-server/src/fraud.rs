//! Points fraud detection
//!
//! Scores a pending award against the learner's recent activity. The score
//! is additive over independent signals and clamped to 0..=100.

use crate::config::FraudConfig;
use serde::{Deserialize, Serialize};

/// Recent activity for the user receiving an award
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivitySnapshot {
    /// Awards recorded in the past hour
    pub awards_last_hour: i64,
    /// Earlier awards for the same action and source
    pub duplicate_source_awards: i64,
    /// Points earned from learner actions since UTC midnight
    pub earned_today: i64,
    /// Hours since registration
    pub account_age_hours: i64,
    /// Amount about to be awarded
    pub amount: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FraudReason {
    HighVelocity,
    ElevatedVelocity,
    DuplicateSource,
    DailyCapExceeded,
    NewAccountBurst,
    LargeAmount,
}

impl FraudReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FraudReason::HighVelocity => "high_velocity",
            FraudReason::ElevatedVelocity => "elevated_velocity",
            FraudReason::DuplicateSource => "duplicate_source",
            FraudReason::DailyCapExceeded => "daily_cap_exceeded",
            FraudReason::NewAccountBurst => "new_account_burst",
            FraudReason::LargeAmount => "large_amount",
        }
    }

    fn weight(&self) -> u32 {
        match self {
            FraudReason::HighVelocity => 40,
            FraudReason::ElevatedVelocity => 15,
            FraudReason::DuplicateSource => 50,
            FraudReason::DailyCapExceeded => 20,
            FraudReason::NewAccountBurst => 15,
            FraudReason::LargeAmount => 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FraudVerdict {
    Clear,
    Flagged,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FraudAssessment {
    pub score: u32,
    pub reasons: Vec<FraudReason>,
    pub verdict: FraudVerdict,
}

impl FraudAssessment {
    pub fn reason_strings(&self) -> Vec<String> {
        self.reasons.iter().map(|r| r.as_str().to_string()).collect()
    }
}

pub struct FraudDetector {
    config: FraudConfig,
}

impl FraudDetector {
    pub fn new(config: FraudConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FraudConfig {
        &self.config
    }

    pub fn assess(&self, activity: &ActivitySnapshot) -> FraudAssessment {
        let mut reasons = Vec::new();

        if activity.awards_last_hour >= self.config.max_awards_per_hour {
            reasons.push(FraudReason::HighVelocity);
        } else if activity.awards_last_hour >= self.config.max_awards_per_hour / 2 {
            reasons.push(FraudReason::ElevatedVelocity);
        }

        if activity.duplicate_source_awards > 0 {
            reasons.push(FraudReason::DuplicateSource);
        }

        if activity.earned_today + activity.amount > self.config.daily_points_cap {
            reasons.push(FraudReason::DailyCapExceeded);
        }

        if activity.account_age_hours < 1 && activity.awards_last_hour >= 5 {
            reasons.push(FraudReason::NewAccountBurst);
        }

        if activity.amount > self.config.large_award {
            reasons.push(FraudReason::LargeAmount);
        }

        let score = reasons.iter().map(FraudReason::weight).sum::<u32>().min(100);
        let verdict = if score >= self.config.block_threshold {
            FraudVerdict::Blocked
        } else if score >= self.config.flag_threshold {
            FraudVerdict::Flagged
        } else {
            FraudVerdict::Clear
        };

        FraudAssessment {
            score,
            reasons,
            verdict,
        }
    }

    /// Portion of `amount` that still fits under today's cap
    pub fn capped_amount(&self, earned_today: i64, amount: i64) -> i64 {
        let remaining = (self.config.daily_points_cap - earned_today).max(0);
        amount.min(remaining).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> FraudDetector {
        FraudDetector::new(FraudConfig::default())
    }

    fn normal() -> ActivitySnapshot {
        ActivitySnapshot {
            awards_last_hour: 2,
            duplicate_source_awards: 0,
            earned_today: 120,
            account_age_hours: 72,
            amount: 15,
        }
    }

    #[test]
    fn test_normal_activity_is_clear() {
        let assessment = detector().assess(&normal());
        assert_eq!(assessment.score, 0);
        assert!(assessment.reasons.is_empty());
        assert_eq!(assessment.verdict, FraudVerdict::Clear);
    }

    #[test]
    fn test_high_velocity_is_flagged() {
        let assessment = detector().assess(&ActivitySnapshot {
            awards_last_hour: 25,
            ..normal()
        });
        assert_eq!(assessment.reasons, vec![FraudReason::HighVelocity]);
        assert_eq!(assessment.score, 40);
        assert_eq!(assessment.verdict, FraudVerdict::Flagged);
    }

    #[test]
    fn test_elevated_velocity_alone_stays_clear() {
        let assessment = detector().assess(&ActivitySnapshot {
            awards_last_hour: 10,
            ..normal()
        });
        assert_eq!(assessment.reasons, vec![FraudReason::ElevatedVelocity]);
        assert_eq!(assessment.verdict, FraudVerdict::Clear);
    }

    #[test]
    fn test_duplicate_source_with_velocity_is_blocked() {
        let assessment = detector().assess(&ActivitySnapshot {
            awards_last_hour: 30,
            duplicate_source_awards: 1,
            ..normal()
        });
        assert_eq!(assessment.score, 90);
        assert_eq!(assessment.verdict, FraudVerdict::Blocked);
        assert_eq!(
            assessment.reason_strings(),
            vec!["high_velocity".to_string(), "duplicate_source".to_string()]
        );
    }

    #[test]
    fn test_score_is_clamped() {
        let assessment = detector().assess(&ActivitySnapshot {
            awards_last_hour: 50,
            duplicate_source_awards: 3,
            earned_today: 2000,
            account_age_hours: 0,
            amount: 500,
        });
        assert_eq!(assessment.score, 100);
        assert_eq!(assessment.verdict, FraudVerdict::Blocked);
    }

    #[test]
    fn test_new_account_burst() {
        let assessment = detector().assess(&ActivitySnapshot {
            awards_last_hour: 5,
            account_age_hours: 0,
            ..normal()
        });
        assert!(assessment.reasons.contains(&FraudReason::NewAccountBurst));
    }

    #[test]
    fn test_capped_amount() {
        let d = detector();
        assert_eq!(d.capped_amount(0, 50), 50);
        assert_eq!(d.capped_amount(980, 50), 20);
        assert_eq!(d.capped_amount(1000, 50), 0);
        assert_eq!(d.capped_amount(1500, 50), 0);
    }
}
