//! MongoDB document schemas

mod achievement;
mod metadata;

pub use achievement::{AchievementDoc, AttachmentDoc, ACHIEVEMENT_COLLECTION};
pub use metadata::Metadata;
