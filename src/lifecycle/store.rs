//! Collaborator interfaces the lifecycle engine is built against
//!
//! Production implementations live in `crate::db` (SQLite references and
//! directory, MongoDB details) and `crate::uploads`; `super::memory` holds
//! the in-process detail store used by tests and development mode.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::access::Principal;
use super::model::{
    AchievementDetail, AchievementReference, AchievementUpdate, Attachment, DetailRef,
};
use super::status::AchievementStatus;
use crate::types::Result;

/// Which references a listing may return
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListScope {
    /// All non-deleted references of one student
    Student(String),
    /// Non-draft, non-deleted references of a lecturer's advisees
    Advisees(String),
    /// Every non-deleted reference
    All,
}

/// Relational store of achievement references
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    /// Insert a new reference. Duplicate ids surface as
    /// `UniqueConstraintViolation`.
    async fn insert(&self, reference: &AchievementReference) -> Result<()>;

    /// Fetch a reference by id, including soft-deleted ones.
    async fn get(&self, id: Uuid) -> Result<Option<AchievementReference>>;

    /// Overwrite the mutable columns of `next` only if the stored row still
    /// carries the status and `updated_at` of `observed`. Returns `false`
    /// when another writer got there first.
    async fn update_if_unchanged(
        &self,
        next: &AchievementReference,
        observed: &AchievementReference,
    ) -> Result<bool>;

    /// List references visible in `scope`, newest first.
    async fn list(&self, scope: &ListScope) -> Result<Vec<AchievementReference>>;

    /// Number of references per status, deleted excluded.
    async fn count_by_status(&self) -> Result<Vec<(AchievementStatus, u64)>>;
}

/// Document store of achievement details
#[async_trait]
pub trait DetailStore: Send + Sync {
    async fn create(&self, detail: &AchievementDetail) -> Result<DetailRef>;

    async fn get(&self, detail_ref: &DetailRef) -> Result<Option<AchievementDetail>>;

    /// Set only the fields `update` supplies and return the stored document.
    async fn apply_update(
        &self,
        detail_ref: &DetailRef,
        update: &AchievementUpdate,
        updated_at: DateTime<Utc>,
    ) -> Result<AchievementDetail>;

    async fn append_attachment(&self, detail_ref: &DetailRef, attachment: &Attachment) -> Result<()>;

    async fn delete(&self, detail_ref: &DetailRef) -> Result<()>;

    /// Achievement counts per type across the given documents.
    async fn count_by_type(&self, refs: &[DetailRef]) -> Result<Vec<(String, u64)>>;

    /// Sum of points across the given documents.
    async fn total_points(&self, refs: &[DetailRef]) -> Result<i64>;

    /// Short backend name for health reporting
    fn backend(&self) -> &'static str;
}

/// Stored credentials for login
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user_id: String,
    pub username: String,
    pub full_name: String,
    pub password_hash: String,
    pub role_id: String,
    pub is_active: bool,
}

/// Student as the reports see them
#[derive(Debug, Clone, Serialize)]
pub struct StudentProfile {
    pub id: String,
    pub user_id: String,
    pub student_number: String,
    pub full_name: String,
    pub program_study: String,
    pub academic_year: String,
    pub advisor_id: Option<String>,
}

/// Headcount for statistics
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Population {
    pub students: u64,
    pub lecturers: u64,
}

/// Identity and permission directory
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Resolve a token's user and role into a principal. Unknown or inactive
    /// users are `Unauthorized`.
    async fn resolve_principal(&self, user_id: &str, role_id: &str) -> Result<Principal>;

    /// Lecturer id recorded as the student's advisor.
    async fn advisor_of(&self, student_id: &str) -> Result<Option<String>>;

    async fn student_profile(&self, student_id: &str) -> Result<Option<StudentProfile>>;

    /// Look up a login by username or email.
    async fn find_credentials(&self, login: &str) -> Result<Option<Credentials>>;

    /// Permission names granted to a role.
    async fn role_permissions(&self, role_id: &str) -> Result<Vec<String>>;

    async fn population(&self) -> Result<Population>;
}

/// Where attachment bytes go
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Persist `bytes` and return the locator clients use to fetch them.
    async fn store(&self, file_name: &str, bytes: Bytes) -> Result<String>;
}
