//! Who may do what to an achievement
//!
//! A request's [`Principal`] is resolved once by the identity directory.
//! Against a particular reference it then maps to exactly one
//! [`Relationship`], checked in order: owner, supervisor of the owner,
//! administrator. The first match wins, so a principal never holds two
//! relationships to the same record.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::model::AchievementReference;
use super::status::Transition;
use super::store::IdentityDirectory;
use crate::types::{AccoladeError, Result};

/// Permission that grants the administrative override
pub const PERMISSION_MANAGE: &str = "achievements:manage";
pub const PERMISSION_CREATE: &str = "achievements:create";
pub const PERMISSION_READ: &str = "achievements:read";
pub const PERMISSION_VERIFY: &str = "achievements:verify";

/// Role-specific identity of a principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PrincipalKind {
    Student { student_id: String },
    Supervisor { lecturer_id: String },
    Admin,
}

/// Authenticated caller, resolved once per request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub role: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(flatten)]
    pub kind: PrincipalKind,
}

impl Principal {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    /// Admins always hold the override; other roles only if granted it.
    pub fn is_admin(&self) -> bool {
        matches!(self.kind, PrincipalKind::Admin) || self.has_permission(PERMISSION_MANAGE)
    }

    pub fn student_id(&self) -> Option<&str> {
        match &self.kind {
            PrincipalKind::Student { student_id } => Some(student_id),
            _ => None,
        }
    }

    pub fn lecturer_id(&self) -> Option<&str> {
        match &self.kind {
            PrincipalKind::Supervisor { lecturer_id } => Some(lecturer_id),
            _ => None,
        }
    }
}

/// How a principal relates to one achievement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    Owner,
    SupervisorOfOwner,
    Administrator,
}

impl Relationship {
    /// Relationships a transition's guard accepts
    pub fn permits(self, transition: Transition) -> bool {
        use Relationship::*;
        use Transition::*;

        match transition {
            Edit | Submit | AttachFile => self == Owner,
            Delete => matches!(self, Owner | Administrator),
            Verify | Reject => matches!(self, SupervisorOfOwner | Administrator),
        }
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owner => write!(f, "owner"),
            Self::SupervisorOfOwner => write!(f, "supervisor"),
            Self::Administrator => write!(f, "administrator"),
        }
    }
}

/// Resolve the relationship of `principal` to `reference`.
///
/// Returns `None` when the principal has no standing on the record. The
/// directory is only consulted when the principal is not the owner.
pub async fn resolve_relationship(
    directory: &dyn IdentityDirectory,
    principal: &Principal,
    reference: &AchievementReference,
) -> Result<Option<Relationship>> {
    if principal.student_id() == Some(reference.student_id.as_str()) {
        return Ok(Some(Relationship::Owner));
    }

    if let Some(lecturer_id) = principal.lecturer_id() {
        let advisor = directory.advisor_of(&reference.student_id).await?;
        if advisor.as_deref() == Some(lecturer_id) {
            return Ok(Some(Relationship::SupervisorOfOwner));
        }
    }

    if principal.is_admin() {
        return Ok(Some(Relationship::Administrator));
    }

    Ok(None)
}

/// Fail with `Forbidden` unless `relationship` may perform `transition`.
pub fn authorize(relationship: Option<Relationship>, transition: Transition) -> Result<Relationship> {
    match relationship {
        Some(rel) if rel.permits(transition) => Ok(rel),
        Some(rel) => Err(AccoladeError::Forbidden(format!(
            "{} may not {} this achievement",
            rel, transition
        ))),
        None => Err(AccoladeError::Forbidden(
            "no relationship to this achievement".into(),
        )),
    }
}
