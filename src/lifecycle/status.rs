//! Achievement status and the transition table
//!
//! The reference record's `status` column is the only place the workflow
//! state lives. Every mutation names a [`Transition`]; [`AchievementStatus::apply`]
//! is the single table deciding whether it is allowed from the current state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Workflow state of an achievement reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AchievementStatus {
    Draft,
    Submitted,
    Verified,
    Rejected,
    Deleted,
}

impl AchievementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
            Self::Deleted => "deleted",
        }
    }

    /// No transition leaves a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified | Self::Rejected | Self::Deleted)
    }

    /// Target state for `transition` from `self`, or `None` if the table has
    /// no such edge.
    pub fn apply(self, transition: Transition) -> Option<AchievementStatus> {
        use AchievementStatus::*;
        use Transition::*;

        match (self, transition) {
            (Draft, Edit) => Some(Draft),
            (Draft, AttachFile) => Some(Draft),
            (Draft, Submit) => Some(Submitted),
            (Draft, Delete) => Some(Deleted),
            (Submitted, Verify) => Some(Verified),
            (Submitted, Reject) => Some(Rejected),
            _ => None,
        }
    }

    pub fn all() -> [AchievementStatus; 5] {
        [
            Self::Draft,
            Self::Submitted,
            Self::Verified,
            Self::Rejected,
            Self::Deleted,
        ]
    }
}

impl fmt::Display for AchievementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AchievementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "submitted" => Ok(Self::Submitted),
            "verified" => Ok(Self::Verified),
            "rejected" => Ok(Self::Rejected),
            "deleted" => Ok(Self::Deleted),
            other => Err(format!("unknown achievement status '{}'", other)),
        }
    }
}

/// A requested lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Edit,
    AttachFile,
    Submit,
    Delete,
    Verify,
    Reject,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::AttachFile => "attach a file to",
            Self::Submit => "submit",
            Self::Delete => "delete",
            Self::Verify => "verify",
            Self::Reject => "reject",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
