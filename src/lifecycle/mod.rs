//! Achievement lifecycle
//!
//! Provides:
//! - The status state machine and transition table
//! - Relationship-based authorization (owner, supervisor, administrator)
//! - The engine coordinating reference and detail writes
//! - History reconstruction from reference timestamps

pub mod access;
pub mod engine;
pub mod history;
pub mod memory;
pub mod model;
pub mod status;
pub mod store;

pub use access::{Principal, PrincipalKind, Relationship, PERMISSION_MANAGE};
pub use engine::LifecycleEngine;
pub use history::{reconstruct, ActorRole, HistoryEntry};
pub use memory::{DetailOp, InMemoryDetailStore};
pub use model::{
    AchievementDetail, AchievementReference, AchievementUpdate, AchievementView, Attachment,
    AttachmentUpload, CreatedAchievement, DetailRef, NewAchievement,
};
pub use status::{AchievementStatus, Transition};
pub use store::{
    Credentials, DetailStore, FileStorage, IdentityDirectory, ListScope, Population,
    ReferenceStore, StudentProfile,
};
