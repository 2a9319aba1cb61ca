//! Observability - Sentry integration and audit trail
//!
//! Provides:
//! - Sentry error tracking (enabled via SENTRY_DSN env var)
//! - Structured audit logging for security- and privacy-relevant actions

use crate::db::queries;
use crate::state::AppState;
use serde::{Deserialize, Serialize};
use tracing::{error, info, span, warn, Instrument, Level};

/// Initialize Sentry if SENTRY_DSN is set
pub fn init_sentry() -> Option<sentry::ClientInitGuard> {
    let dsn = std::env::var("SENTRY_DSN").ok()?;

    if dsn.is_empty() {
        info!("Sentry DSN is empty, error tracking disabled");
        return None;
    }

    let guard = sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: std::env::var("ENVIRONMENT").ok().map(|s| s.into()),
            traces_sample_rate: 0.1,
            ..Default::default()
        },
    ));

    info!("Sentry initialized for error tracking");
    Some(guard)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Authentication
    UserRegistered,
    AuthSuccess,
    AuthFailed,
    SessionRefreshed,
    SessionRevoked,

    // Points economy
    PointsGranted,
    PointsRedeemed,
    FraudFlagged,
    AwardBlocked,
    AchievementUnlocked,

    // Academic integrity
    IntegrityReportOpened,
    IntegrityReportUpdated,
    SubmissionGraded,

    // Privacy
    ConsentChanged,
    DataExported,
    AccountErased,

    // Security
    RateLimitExceeded,
    UnauthorizedAccess,
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_string(self).unwrap_or_else(|_| "unknown".to_string());
        write!(f, "{}", s.trim_matches('"'))
    }
}

/// Structured audit entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub event_type: AuditEventType,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub actor_id: Option<String>,
    pub actor_role: Option<String>,
    pub payload: Option<serde_json::Value>,
    pub success: bool,
    pub error_message: Option<String>,
}

impl AuditEntry {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_type,
            entity_type: None,
            entity_id: None,
            actor_id: None,
            actor_role: None,
            payload: None,
            success: true,
            error_message: None,
        }
    }

    pub fn entity(mut self, entity_type: &str, entity_id: &str) -> Self {
        self.entity_type = Some(entity_type.to_string());
        self.entity_id = Some(entity_id.to_string());
        self
    }

    pub fn actor(mut self, actor_id: &str, role: Option<&str>) -> Self {
        self.actor_id = Some(actor_id.to_string());
        self.actor_role = role.map(|s| s.to_string());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn failed(mut self, error: &str) -> Self {
        self.success = false;
        self.error_message = Some(error.to_string());
        self
    }

    /// Payload persisted to the events table, including failure details
    pub fn stored_payload(&self) -> Option<serde_json::Value> {
        match (&self.payload, &self.error_message) {
            (payload, None) => payload.clone(),
            (None, Some(msg)) => Some(serde_json::json!({ "error": msg })),
            (Some(p), Some(msg)) => Some(serde_json::json!({ "data": p, "error": msg })),
        }
    }
}

pub struct AuditLogger;

impl AuditLogger {
    /// Log an audit event to both tracing and database
    pub async fn log(state: &AppState, entry: AuditEntry) {
        let span = span!(
            Level::INFO,
            "audit",
            event_type = %entry.event_type,
            entity_type = ?entry.entity_type,
            entity_id = ?entry.entity_id,
            actor = ?entry.actor_id,
            success = entry.success,
        );
        span.in_scope(|| {
            if entry.success {
                info!(
                    event = %entry.event_type,
                    entity = ?entry.entity_id,
                    actor = ?entry.actor_id,
                    "Audit event"
                );
            } else {
                warn!(
                    event = %entry.event_type,
                    entity = ?entry.entity_id,
                    actor = ?entry.actor_id,
                    error = ?entry.error_message,
                    "Audit event failed"
                );

                if let Some(ref msg) = entry.error_message {
                    sentry::capture_message(
                        &format!("{}: {}", entry.event_type, msg),
                        sentry::Level::Warning,
                    );
                }
            }
        });

        if let Err(e) = queries::log_event(
            &state.db,
            &entry.event_type.to_string(),
            entry.entity_type.as_deref(),
            entry.entity_id.as_deref(),
            entry.stored_payload().as_ref(),
            entry.actor_id.as_deref(),
        )
        .instrument(span)
        .await
        {
            error!(error = %e, "Failed to persist audit event");
        }
    }

    /// Log authentication event
    pub async fn auth(state: &AppState, user_ref: &str, success: bool, error: Option<&str>) {
        let mut entry = AuditEntry::new(if success {
            AuditEventType::AuthSuccess
        } else {
            AuditEventType::AuthFailed
        })
        .actor(user_ref, None);

        if let Some(e) = error {
            entry = entry.failed(e);
        }

        Self::log(state, entry).await;
    }

    /// Log privacy workflow event
    pub async fn privacy(state: &AppState, event: AuditEventType, user_id: &str, payload: serde_json::Value) {
        let entry = AuditEntry::new(event)
            .entity("user", user_id)
            .actor(user_id, None)
            .with_payload(payload);

        Self::log(state, entry).await;
    }

    /// Log security event
    pub async fn security(state: &AppState, event: AuditEventType, user_id: &str, details: &str) {
        let event_str = event.to_string();
        let entry = AuditEntry::new(event).actor(user_id, None).failed(details);

        Self::log(state, entry).await;

        sentry::capture_message(
            &format!("Security event: {} - {} - {}", event_str, user_id, details),
            sentry::Level::Warning,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_entry_builder() {
        let entry = AuditEntry::new(AuditEventType::PointsGranted)
            .entity("user", "user-123")
            .actor("teacher-1", Some("staff"))
            .with_payload(serde_json::json!({"amount": 25}));

        assert!(entry.success);
        assert_eq!(entry.entity_id, Some("user-123".to_string()));
        assert_eq!(entry.actor_id, Some("teacher-1".to_string()));
        assert_eq!(entry.stored_payload().unwrap()["amount"], 25);
    }

    #[test]
    fn test_audit_entry_failed() {
        let entry = AuditEntry::new(AuditEventType::AuthFailed)
            .actor("ada@example.com", None)
            .failed("Invalid credentials");

        assert!(!entry.success);
        assert_eq!(entry.error_message, Some("Invalid credentials".to_string()));
        assert_eq!(
            entry.stored_payload().unwrap()["error"],
            "Invalid credentials"
        );
    }

    #[test]
    fn test_event_type_display() {
        assert_eq!(AuditEventType::FraudFlagged.to_string(), "fraud_flagged");
        assert_eq!(AuditEventType::AccountErased.to_string(), "account_erased");
    }
}
