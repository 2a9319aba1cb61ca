//! Points service
//!
//! Every learner-driven award runs through the same pipeline:
//! rate limit, fraud assessment, daily cap, ledger write, achievement
//! evaluation, notification.

use crate::achievements;
use crate::db::queries;
use crate::error::{ApiError, ApiResult};
use crate::fraud::{ActivitySnapshot, FraudAssessment, FraudDetector, FraudVerdict};
use crate::models::{AwardOutcome, PointsAction, PointsTransaction};
use crate::observability::{AuditEntry, AuditEventType, AuditLogger};
use crate::state::AppState;
use serde::Serialize;
use tracing::{info, warn};

/// Points earned by a request whose primary effect is already saved.
///
/// A refused award (rate limit, fraud block) does not undo the saved work,
/// so refusals are reported alongside the result instead of failing it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PointsReceipt {
    pub awarded: i64,
    pub outcomes: Vec<AwardOutcome>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub refused: Vec<String>,
}

impl PointsReceipt {
    pub fn record(&mut self, result: ApiResult<AwardOutcome>) {
        match result {
            Ok(outcome) => {
                self.awarded += outcome.awarded;
                self.outcomes.push(outcome);
            }
            Err(ApiError::Internal(e)) => {
                warn!(error = %e, "Points award failed");
                self.refused.push("Points could not be recorded".to_string());
            }
            Err(e) => self.refused.push(e.to_string()),
        }
    }
}

/// What the award pipeline does with one request. Stages run in order:
/// rate limit, fraud score, daily cap.
#[derive(Debug, Clone, PartialEq)]
pub enum AwardDecision {
    RateLimited,
    Blocked(FraudAssessment),
    /// Credit `amount` (0 when the daily cap is used up). A flagged
    /// assessment is logged for review but does not stop the award.
    Credit {
        amount: i64,
        flagged: Option<FraudAssessment>,
    },
}

pub fn decide_award(
    detector: &FraudDetector,
    within_rate_limit: bool,
    activity: &ActivitySnapshot,
) -> AwardDecision {
    if !within_rate_limit {
        return AwardDecision::RateLimited;
    }

    let assessment = detector.assess(activity);
    match assessment.verdict {
        FraudVerdict::Blocked => AwardDecision::Blocked(assessment),
        verdict => AwardDecision::Credit {
            amount: detector.capped_amount(activity.earned_today, activity.amount),
            flagged: (verdict == FraudVerdict::Flagged).then_some(assessment),
        },
    }
}

/// Award points for a learner action.
///
/// `source_id` identifies the thing being rewarded (submission, milestone,
/// checkpoint ...) and feeds duplicate detection.
pub async fn award(
    state: &AppState,
    user_id: &str,
    action: PointsAction,
    amount: i64,
    source_id: Option<&str>,
    description: Option<&str>,
) -> ApiResult<AwardOutcome> {
    if amount <= 0 {
        return Err(ApiError::bad_request("Award amount must be positive"));
    }

    let within_rate_limit =
        !action.is_user_driven() || state.rule_engine.check_action(user_id, action.as_str()).is_ok();
    let activity = if within_rate_limit {
        load_activity(state, user_id, action, source_id, amount).await?
    } else {
        ActivitySnapshot {
            amount,
            ..Default::default()
        }
    };

    let (awarded, flagged) = match decide_award(&state.fraud, within_rate_limit, &activity) {
        AwardDecision::RateLimited => {
            AuditLogger::security(
                state,
                AuditEventType::RateLimitExceeded,
                user_id,
                action.as_str(),
            )
            .await;
            return Err(ApiError::TooManyRequests(
                "Rate limit exceeded. Try again later.".to_string(),
            ));
        }
        AwardDecision::Blocked(assessment) => {
            log_fraud(state, user_id, action, amount, &assessment, true).await?;
            AuditLogger::security(
                state,
                AuditEventType::AwardBlocked,
                user_id,
                &format!("score {} for {}", assessment.score, action.as_str()),
            )
            .await;
            return Err(ApiError::forbidden("Points award blocked pending review"));
        }
        AwardDecision::Credit { amount, flagged } => (amount, flagged),
    };

    if let Some(assessment) = flagged {
        log_fraud(state, user_id, action, amount, &assessment, false).await?;
    }

    if awarded == 0 {
        info!(user = %user_id, action = action.as_str(), "Daily points cap reached");
        return Ok(AwardOutcome {
            transaction: None,
            requested: amount,
            awarded: 0,
            capped: true,
            unlocked: Vec::new(),
        });
    }

    let tx = queries::record_points(
        &state.db,
        user_id,
        action,
        awarded,
        source_id,
        description,
    )
    .await?;
    state.notify_points(&tx);

    info!(
        user = %user_id,
        action = action.as_str(),
        amount = awarded,
        balance = tx.balance_after,
        "Points awarded"
    );

    let unlocked = unlock_quietly(state, user_id).await;

    Ok(AwardOutcome {
        transaction: Some(tx),
        requested: amount,
        awarded,
        capped: awarded < amount,
        unlocked,
    })
}

async fn log_fraud(
    state: &AppState,
    user_id: &str,
    action: PointsAction,
    amount: i64,
    assessment: &FraudAssessment,
    blocked: bool,
) -> ApiResult<()> {
    queries::create_fraud_log(
        &state.db,
        user_id,
        action,
        amount,
        assessment.score as i32,
        &assessment.reason_strings(),
        blocked,
    )
    .await?;

    AuditLogger::log(
        state,
        AuditEntry::new(AuditEventType::FraudFlagged)
            .entity("user", user_id)
            .with_payload(serde_json::json!({
                "action": action.as_str(),
                "amount": amount,
                "score": assessment.score,
                "reasons": assessment.reason_strings(),
                "blocked": blocked,
            })),
    )
    .await;
    Ok(())
}

/// Award the standard amount for `action`
pub async fn award_standard(
    state: &AppState,
    user_id: &str,
    action: PointsAction,
    source_id: Option<&str>,
    description: Option<&str>,
) -> ApiResult<AwardOutcome> {
    let amount = action
        .base_points()
        .ok_or_else(|| anyhow::anyhow!("{} has no standard amount", action.as_str()))?;
    award(state, user_id, action, amount, source_id, description).await
}

/// Staff grant. Skips rate limiting and fraud scoring but is audited.
pub async fn manual_award(
    state: &AppState,
    granted_by: &str,
    user_id: &str,
    amount: i64,
    reason: &str,
) -> ApiResult<AwardOutcome> {
    let tx = queries::record_points(
        &state.db,
        user_id,
        PointsAction::ManualAward,
        amount,
        Some(granted_by),
        Some(reason),
    )
    .await?;
    state.notify_points(&tx);

    AuditLogger::log(
        state,
        AuditEntry::new(AuditEventType::PointsGranted)
            .entity("user", user_id)
            .actor(granted_by, Some("staff"))
            .with_payload(serde_json::json!({ "amount": amount, "reason": reason })),
    )
    .await;

    let unlocked = unlock_quietly(state, user_id).await;

    Ok(AwardOutcome {
        transaction: Some(tx),
        requested: amount,
        awarded: amount,
        capped: false,
        unlocked,
    })
}

/// Spend points. Fails with 400 when the balance does not cover `amount`.
pub async fn redeem(
    state: &AppState,
    user_id: &str,
    amount: i64,
    reward: &str,
) -> ApiResult<PointsTransaction> {
    let tx = queries::spend_points(&state.db, user_id, amount, reward)
        .await?
        .ok_or_else(|| ApiError::bad_request("Insufficient points balance"))?;

    info!(user = %user_id, amount, reward = %reward, "Points redeemed");
    state.notify_points(&tx);
    Ok(tx)
}

async fn load_activity(
    state: &AppState,
    user_id: &str,
    action: PointsAction,
    source_id: Option<&str>,
    amount: i64,
) -> ApiResult<ActivitySnapshot> {
    let stats = queries::get_award_activity(&state.db, user_id, action, source_id).await?;
    Ok(ActivitySnapshot {
        awards_last_hour: stats.awards_last_hour,
        duplicate_source_awards: stats.duplicate_source_awards,
        earned_today: stats.earned_today,
        account_age_hours: stats.account_age_hours,
        amount,
    })
}

/// Evaluate achievements after saved progress. Failures are logged only,
/// since the progress itself must not be rolled back.
pub async fn unlock_quietly(state: &AppState, user_id: &str) -> Vec<crate::models::Achievement> {
    match achievements::evaluate_and_unlock(state, user_id).await {
        Ok(unlocked) => unlocked,
        Err(e) => {
            warn!(user = %user_id, error = %e, "Achievement evaluation failed");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FraudConfig;

    fn outcome(awarded: i64) -> AwardOutcome {
        AwardOutcome {
            transaction: None,
            requested: awarded,
            awarded,
            capped: false,
            unlocked: Vec::new(),
        }
    }

    #[test]
    fn test_receipt_sums_awards() {
        let mut receipt = PointsReceipt::default();
        receipt.record(Ok(outcome(50)));
        receipt.record(Ok(outcome(25)));

        assert_eq!(receipt.awarded, 75);
        assert_eq!(receipt.outcomes.len(), 2);
        assert!(receipt.refused.is_empty());
    }

    #[test]
    fn test_receipt_keeps_refusals() {
        let mut receipt = PointsReceipt::default();
        receipt.record(Err(ApiError::TooManyRequests("Rate limit exceeded".into())));
        receipt.record(Err(ApiError::Internal(anyhow::anyhow!("connection reset"))));

        assert_eq!(receipt.awarded, 0);
        assert_eq!(
            receipt.refused,
            vec![
                "Rate limit exceeded".to_string(),
                "Points could not be recorded".to_string()
            ]
        );

        let json = serde_json::to_value(&receipt).unwrap();
        assert_eq!(json["refused"].as_array().unwrap().len(), 2);
    }

    fn detector() -> FraudDetector {
        FraudDetector::new(FraudConfig::default())
    }

    fn quiet(earned_today: i64, amount: i64) -> ActivitySnapshot {
        ActivitySnapshot {
            awards_last_hour: 1,
            duplicate_source_awards: 0,
            earned_today,
            account_age_hours: 240,
            amount,
        }
    }

    #[test]
    fn test_clean_award_is_credited_in_full() {
        assert_eq!(
            decide_award(&detector(), true, &quiet(0, 50)),
            AwardDecision::Credit {
                amount: 50,
                flagged: None
            }
        );
    }

    #[test]
    fn test_rate_limit_is_checked_before_fraud() {
        let abusive = ActivitySnapshot {
            awards_last_hour: 100,
            duplicate_source_awards: 5,
            ..quiet(5000, 50)
        };
        assert_eq!(
            decide_award(&detector(), false, &abusive),
            AwardDecision::RateLimited
        );
        assert!(matches!(
            decide_award(&detector(), true, &abusive),
            AwardDecision::Blocked(_)
        ));
    }

    #[test]
    fn test_block_wins_over_remaining_cap() {
        // duplicate source (50) + high velocity (40) blocks even with cap room left
        let activity = ActivitySnapshot {
            awards_last_hour: 25,
            duplicate_source_awards: 1,
            ..quiet(0, 50)
        };
        match decide_award(&detector(), true, &activity) {
            AwardDecision::Blocked(a) => assert!(a.score >= 70),
            other => panic!("expected block, got {:?}", other),
        }
    }

    #[test]
    fn test_flagged_award_still_credited() {
        let activity = ActivitySnapshot {
            duplicate_source_awards: 1,
            ..quiet(0, 15)
        };
        match decide_award(&detector(), true, &activity) {
            AwardDecision::Credit {
                amount,
                flagged: Some(a),
            } => {
                assert_eq!(amount, 15);
                assert_eq!(a.verdict, FraudVerdict::Flagged);
            }
            other => panic!("expected flagged credit, got {:?}", other),
        }
    }

    #[test]
    fn test_daily_cap_trims_then_stops_awards() {
        match decide_award(&detector(), true, &quiet(980, 50)) {
            AwardDecision::Credit { amount, .. } => assert_eq!(amount, 20),
            other => panic!("expected capped credit, got {:?}", other),
        }
        match decide_award(&detector(), true, &quiet(1000, 50)) {
            AwardDecision::Credit { amount, .. } => assert_eq!(amount, 0),
            other => panic!("expected empty credit, got {:?}", other),
        }
    }

    #[test]
    fn test_receipt_omits_empty_refusals() {
        let json = serde_json::to_value(PointsReceipt::default()).unwrap();
        assert!(json.get("refused").is_none());
    }
}
