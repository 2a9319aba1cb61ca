//! Consent bookkeeping and erasure helpers

use crate::models::{ConsentPurpose, ConsentRecord, ConsentState};

/// Latest record per purpose wins; purposes never recorded are not granted.
///
/// `history` must be oldest first, as `queries::list_consents` returns it.
/// Timestamps are whole seconds, so several records can share one.
pub fn current_consents(history: &[ConsentRecord]) -> Vec<ConsentState> {
    ConsentPurpose::ALL
        .iter()
        .map(|purpose| {
            let latest = history.iter().rev().find(|r| r.purpose == *purpose);
            ConsentState {
                purpose: *purpose,
                granted: latest.map(|r| r.granted).unwrap_or(false),
                updated_at: latest.map(|r| r.created_at),
            }
        })
        .collect()
}

pub fn is_granted(history: &[ConsentRecord], purpose: ConsentPurpose) -> bool {
    current_consents(history)
        .into_iter()
        .any(|c| c.purpose == purpose && c.granted)
}

/// Placeholder identity written over an erased account
pub fn anonymized_email(user_id: &str) -> String {
    format!("deleted-{}@invalid.local", user_id)
}

pub const ANONYMIZED_NAME: &str = "Deleted user";

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, purpose: ConsentPurpose, granted: bool, at: i64) -> ConsentRecord {
        ConsentRecord {
            id: id.to_string(),
            user_id: "u1".to_string(),
            purpose,
            granted,
            created_at: at,
        }
    }

    #[test]
    fn test_defaults_to_not_granted() {
        let states = current_consents(&[]);
        assert_eq!(states.len(), 4);
        assert!(states.iter().all(|s| !s.granted && s.updated_at.is_none()));
    }

    #[test]
    fn test_latest_record_wins() {
        let history = vec![
            record("a", ConsentPurpose::AiTutoring, true, 100),
            record("b", ConsentPurpose::AiTutoring, false, 200),
            record("c", ConsentPurpose::Analytics, true, 150),
        ];

        assert!(!is_granted(&history, ConsentPurpose::AiTutoring));
        assert!(is_granted(&history, ConsentPurpose::Analytics));
        assert!(!is_granted(&history, ConsentPurpose::Research));

        let tutoring = current_consents(&history)
            .into_iter()
            .find(|s| s.purpose == ConsentPurpose::AiTutoring)
            .unwrap();
        assert_eq!(tutoring.updated_at, Some(200));
    }

    #[test]
    fn test_regrant_after_revoke() {
        let history = vec![
            record("a", ConsentPurpose::Research, true, 100),
            record("b", ConsentPurpose::Research, false, 200),
            record("c", ConsentPurpose::Research, true, 300),
        ];
        assert!(is_granted(&history, ConsentPurpose::Research));
    }

    #[test]
    fn test_revoke_in_same_second_as_grant() {
        let history = vec![
            record("ffffffff-0000-4000-8000-000000000000", ConsentPurpose::AiTutoring, true, 500),
            record("00000000-0000-4000-8000-000000000000", ConsentPurpose::AiTutoring, false, 500),
        ];
        assert!(!is_granted(&history, ConsentPurpose::AiTutoring));

        let regranted = vec![
            record("00000000-0000-4000-8000-000000000000", ConsentPurpose::AiTutoring, false, 500),
            record("ffffffff-0000-4000-8000-000000000000", ConsentPurpose::AiTutoring, true, 500),
        ];
        assert!(is_granted(&regranted, ConsentPurpose::AiTutoring));
    }

    #[test]
    fn test_anonymized_email_is_unique_per_user() {
        assert_ne!(anonymized_email("a"), anonymized_email("b"));
        assert!(anonymized_email("a").ends_with("@invalid.local"));
    }
}
