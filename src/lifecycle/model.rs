//! Achievement records as they live in the two stores
//!
//! - [`AchievementReference`]: relational row, authoritative for status
//! - [`AchievementDetail`]: document, authoritative for content
//!
//! Request payloads ([`NewAchievement`], [`AchievementUpdate`]) validate and
//! normalise themselves before the engine touches a store.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use super::status::AchievementStatus;
use crate::types::{AccoladeError, Result};

/// Opaque pointer from a reference to its detail document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetailRef(pub String);

impl DetailRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DetailRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DetailRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Relational reference record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementReference {
    pub id: Uuid,
    pub student_id: String,
    pub detail_ref: DetailRef,
    pub status: AchievementStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<String>,
    pub rejection_note: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AchievementReference {
    /// Fresh draft pointing at an already-written detail
    pub fn new_draft(student_id: String, detail_ref: DetailRef, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id,
            detail_ref,
            status: AchievementStatus::Draft,
            submitted_at: None,
            verified_at: None,
            verified_by: None,
            rejection_note: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Cross-field invariants every stored row must satisfy.
    pub fn is_consistent(&self) -> bool {
        let reviewed = matches!(
            self.status,
            AchievementStatus::Verified | AchievementStatus::Rejected
        );
        self.verified_at.is_some() == reviewed
            && self.verified_by.is_some() == reviewed
            && self.rejection_note.is_some() == (self.status == AchievementStatus::Rejected)
            && self.deleted_at.is_some() == (self.status == AchievementStatus::Deleted)
    }
}

/// File attached to an achievement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    pub file_url: String,
    pub file_type: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Document-store content of an achievement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementDetail {
    pub student_id: String,
    pub achievement_type: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub details: Map<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub points: i64,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of a create request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAchievement {
    /// Defaults to the caller's own student id
    #[serde(default)]
    pub student_id: Option<String>,
    pub achievement_type: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub details: Map<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub points: i64,
}

impl NewAchievement {
    pub fn validate(&self) -> Result<()> {
        if self.achievement_type.trim().is_empty() {
            return Err(AccoladeError::ValidationFailed(
                "achievement_type is required".into(),
            ));
        }
        if self.title.trim().is_empty() {
            return Err(AccoladeError::ValidationFailed("title is required".into()));
        }
        if self.points < 0 {
            return Err(AccoladeError::ValidationFailed(
                "points must not be negative".into(),
            ));
        }
        Ok(())
    }

    /// Build the detail document for `student_id`.
    pub fn into_detail(self, student_id: String, now: DateTime<Utc>) -> AchievementDetail {
        AchievementDetail {
            student_id,
            achievement_type: self.achievement_type.trim().to_string(),
            title: self.title.trim().to_string(),
            description: self.description,
            details: self.details,
            tags: normalize_tags(self.tags),
            points: self.points,
            attachments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Body of an edit request; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AchievementUpdate {
    pub achievement_type: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub details: Option<Map<String, Value>>,
    pub tags: Option<Vec<String>>,
    pub points: Option<i64>,
}

impl AchievementUpdate {
    pub fn is_empty(&self) -> bool {
        self.achievement_type.is_none()
            && self.title.is_none()
            && self.description.is_none()
            && self.details.is_none()
            && self.tags.is_none()
            && self.points.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(AccoladeError::ValidationFailed("no fields to update".into()));
        }
        if matches!(&self.achievement_type, Some(t) if t.trim().is_empty()) {
            return Err(AccoladeError::ValidationFailed(
                "achievement_type must not be empty".into(),
            ));
        }
        if matches!(&self.title, Some(t) if t.trim().is_empty()) {
            return Err(AccoladeError::ValidationFailed("title must not be empty".into()));
        }
        if matches!(self.points, Some(p) if p < 0) {
            return Err(AccoladeError::ValidationFailed(
                "points must not be negative".into(),
            ));
        }
        Ok(())
    }

    /// Overwrite the supplied fields on `detail`.
    pub fn apply_to(&self, detail: &mut AchievementDetail, now: DateTime<Utc>) {
        if let Some(t) = &self.achievement_type {
            detail.achievement_type = t.trim().to_string();
        }
        if let Some(t) = &self.title {
            detail.title = t.trim().to_string();
        }
        if let Some(d) = &self.description {
            detail.description = d.clone();
        }
        if let Some(d) = &self.details {
            detail.details = d.clone();
        }
        if let Some(tags) = &self.tags {
            detail.tags = normalize_tags(tags.clone());
        }
        if let Some(p) = self.points {
            detail.points = p;
        }
        detail.updated_at = now;
    }
}

/// Uploaded file on its way to an attachment
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub file_type: String,
    pub bytes: bytes::Bytes,
}

/// Reference plus whatever detail could be read for it
#[derive(Debug, Clone, Serialize)]
pub struct AchievementView {
    pub reference: AchievementReference,
    pub detail: Option<AchievementDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Result of a successful create
#[derive(Debug, Clone, Serialize)]
pub struct CreatedAchievement {
    pub id: Uuid,
    pub detail_ref: DetailRef,
    pub reference: AchievementReference,
}

/// Trimmed, de-duplicated tags in first-seen order
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// Current time at the precision the relational store keeps
pub fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Timestamp strictly after `previous`, following the wall clock when it
/// has moved on.
pub fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = now_micros();
    if now > previous {
        now
    } else {
        previous + chrono::Duration::microseconds(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_reference() -> AchievementReference {
        AchievementReference::new_draft("stu-1".into(), DetailRef("d1".into()), now_micros())
    }

    #[test]
    fn test_new_draft_is_consistent() {
        let r = sample_reference();
        assert_eq!(r.status, AchievementStatus::Draft);
        assert_eq!(r.created_at, r.updated_at);
        assert!(r.is_consistent());
    }

    #[test]
    fn test_inconsistent_reviewed_without_actor() {
        let mut r = sample_reference();
        r.status = AchievementStatus::Verified;
        r.verified_at = Some(now_micros());
        assert!(!r.is_consistent());

        r.verified_by = Some("user-9".into());
        assert!(r.is_consistent());
    }

    #[test]
    fn test_next_timestamp_strictly_increases() {
        let future = Utc::now() + chrono::Duration::seconds(60);
        let next = next_timestamp(future);
        assert_eq!(next - future, chrono::Duration::microseconds(1));

        let past = Utc::now() - chrono::Duration::seconds(60);
        assert!(next_timestamp(past) > past);
    }

    #[test]
    fn test_normalize_tags() {
        let tags = vec![
            " robotics ".to_string(),
            "national".to_string(),
            "robotics".to_string(),
            "".to_string(),
        ];
        assert_eq!(normalize_tags(tags), vec!["robotics", "national"]);
    }

    #[test]
    fn test_new_achievement_validation() {
        let mut input = NewAchievement {
            achievement_type: "competition".into(),
            title: "Regional robotics".into(),
            points: 50,
            ..Default::default()
        };
        assert!(input.validate().is_ok());

        input.title = "   ".into();
        assert!(matches!(
            input.validate(),
            Err(AccoladeError::ValidationFailed(_))
        ));

        input.title = "ok".into();
        input.points = -1;
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_update_applies_only_present_fields() {
        let now = now_micros();
        let mut detail = NewAchievement {
            achievement_type: "competition".into(),
            title: "Old".into(),
            description: "desc".into(),
            points: 10,
            ..Default::default()
        }
        .into_detail("stu-1".into(), now);

        let update = AchievementUpdate {
            title: Some("New".into()),
            points: Some(20),
            ..Default::default()
        };
        assert!(update.validate().is_ok());
        update.apply_to(&mut detail, now);

        assert_eq!(detail.title, "New");
        assert_eq!(detail.points, 20);
        assert_eq!(detail.description, "desc");
        assert_eq!(detail.achievement_type, "competition");
    }

    #[test]
    fn test_empty_update_rejected() {
        assert!(AchievementUpdate::default().validate().is_err());
    }
}
