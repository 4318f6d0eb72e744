//! History reconstruction
//!
//! The trail is derived from the reference's fixed timestamp columns on
//! every call; nothing is stored. It therefore holds at most three entries
//! and cannot represent repeated submit/reject cycles.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::model::AchievementReference;
use super::status::AchievementStatus;

/// Role that performed a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Student,
    Supervisor,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub status: AchievementStatus,
    pub timestamp: DateTime<Utc>,
    pub actor: ActorRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Project a reference into its history.
pub fn reconstruct(reference: &AchievementReference) -> Vec<HistoryEntry> {
    let mut entries = Vec::with_capacity(3);

    entries.push(HistoryEntry {
        status: AchievementStatus::Draft,
        timestamp: reference.created_at,
        actor: ActorRole::Student,
        actor_id: None,
        note: None,
    });

    if let Some(at) = reference.submitted_at {
        entries.push(HistoryEntry {
            status: AchievementStatus::Submitted,
            timestamp: at,
            actor: ActorRole::Student,
            actor_id: None,
            note: None,
        });
    }

    if let Some(at) = reference.verified_at {
        let rejected = reference.status == AchievementStatus::Rejected;
        entries.push(HistoryEntry {
            status: if rejected {
                AchievementStatus::Rejected
            } else {
                AchievementStatus::Verified
            },
            timestamp: at,
            actor: ActorRole::Supervisor,
            actor_id: reference.verified_by.clone(),
            note: if rejected {
                reference.rejection_note.clone()
            } else {
                None
            },
        });
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::model::{now_micros, DetailRef};

    fn draft() -> AchievementReference {
        AchievementReference::new_draft("stu-1".into(), DetailRef("d".into()), now_micros())
    }

    #[test]
    fn test_draft_has_one_entry() {
        let history = reconstruct(&draft());
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, AchievementStatus::Draft);
        assert_eq!(history[0].actor, ActorRole::Student);
    }

    #[test]
    fn test_submitted_has_two_entries() {
        let mut r = draft();
        r.status = AchievementStatus::Submitted;
        r.submitted_at = Some(now_micros());

        let history = reconstruct(&r);
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].status, AchievementStatus::Submitted);
        assert!(history.iter().all(|e| e.note.is_none()));
    }

    #[test]
    fn test_verified_has_three_entries_without_note() {
        let mut r = draft();
        r.status = AchievementStatus::Verified;
        r.submitted_at = Some(now_micros());
        r.verified_at = Some(now_micros());
        r.verified_by = Some("lect-user".into());

        let history = reconstruct(&r);
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].status, AchievementStatus::Verified);
        assert_eq!(history[2].actor, ActorRole::Supervisor);
        assert_eq!(history[2].actor_id.as_deref(), Some("lect-user"));
        assert!(history[2].note.is_none());
    }

    #[test]
    fn test_rejected_carries_note() {
        let mut r = draft();
        r.status = AchievementStatus::Rejected;
        r.submitted_at = Some(now_micros());
        r.verified_at = Some(now_micros());
        r.verified_by = Some("lect-user".into());
        r.rejection_note = Some("incomplete evidence".into());

        let history = reconstruct(&r);
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].status, AchievementStatus::Rejected);
        assert_eq!(history[2].note.as_deref(), Some("incomplete evidence"));
    }
}
