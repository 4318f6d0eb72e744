//! Achievement lifecycle engine
//!
//! Owns the workflow: loads the reference, resolves the caller's
//! relationship, checks the transition table, then issues the writes in a
//! fixed order across the two stores.
//!
//! ## Write choreography
//!
//! - Create: detail, then reference. A failed reference write triggers a
//!   best-effort delete of the new detail. A timed-out reference write has
//!   an unknown outcome, so the detail is kept.
//! - Edit / attach: reference `updated_at` bump (conditional on the
//!   observed status and `updated_at`), then a field-level detail write.
//! - Submit / verify / reject / delete: one conditional reference update.
//!
//! Every store call runs under `store_timeout`; expiry is reported as
//! `StoreUnavailable`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::access::{authorize, resolve_relationship, Principal, PrincipalKind, Relationship};
use super::history::{reconstruct, HistoryEntry};
use super::model::{
    next_timestamp, now_micros, AchievementReference, AchievementUpdate, AchievementView,
    Attachment, AttachmentUpload, CreatedAchievement, NewAchievement,
};
use super::status::{AchievementStatus, Transition};
use super::store::{DetailStore, FileStorage, IdentityDirectory, ListScope, ReferenceStore};
use crate::types::{AccoladeError, Result};

/// Default per-call store timeout
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct LifecycleEngine {
    references: Arc<dyn ReferenceStore>,
    details: Arc<dyn DetailStore>,
    directory: Arc<dyn IdentityDirectory>,
    files: Arc<dyn FileStorage>,
    store_timeout: Duration,
}

impl LifecycleEngine {
    pub fn new(
        references: Arc<dyn ReferenceStore>,
        details: Arc<dyn DetailStore>,
        directory: Arc<dyn IdentityDirectory>,
        files: Arc<dyn FileStorage>,
    ) -> Self {
        Self {
            references,
            details,
            directory,
            files,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn references(&self) -> &Arc<dyn ReferenceStore> {
        &self.references
    }

    pub fn details(&self) -> &Arc<dyn DetailStore> {
        &self.details
    }

    pub fn directory(&self) -> &Arc<dyn IdentityDirectory> {
        &self.directory
    }

    /// Run one store call under the configured timeout.
    pub async fn bounded<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(self.timed_out(what)),
        }
    }

    fn timed_out(&self, what: &str) -> AccoladeError {
        AccoladeError::StoreUnavailable(format!(
            "{} timed out after {}ms",
            what,
            self.store_timeout.as_millis()
        ))
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Record a new achievement as a draft owned by the calling student.
    pub async fn create(&self, principal: &Principal, input: NewAchievement) -> Result<CreatedAchievement> {
        let own_id = principal.student_id().ok_or_else(|| {
            AccoladeError::Forbidden("only students can record achievements".into())
        })?;
        let student_id = match input.student_id.as_deref() {
            Some(requested) if requested != own_id => {
                return Err(AccoladeError::Forbidden(
                    "students can only record their own achievements".into(),
                ));
            }
            _ => own_id.to_string(),
        };
        input.validate()?;

        let now = now_micros();
        let detail = input.into_detail(student_id.clone(), now);
        let detail_ref = self
            .bounded("detail create", self.details.create(&detail))
            .await?;

        let reference = AchievementReference::new_draft(student_id, detail_ref.clone(), now);
        let inserted =
            tokio::time::timeout(self.store_timeout, self.references.insert(&reference)).await;
        match inserted {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(
                    detail_ref = %detail_ref,
                    error = %e,
                    "Reference write failed, removing orphaned detail"
                );
                if let Err(cleanup) = self
                    .bounded("detail compensation", self.details.delete(&detail_ref))
                    .await
                {
                    warn!(
                        detail_ref = %detail_ref,
                        error = %cleanup,
                        "Compensating detail delete failed, orphan left behind"
                    );
                }
                return Err(e);
            }
            Err(_) => {
                // The blocking insert may still commit; deleting the detail
                // could leave a reference pointing at nothing.
                warn!(
                    id = %reference.id,
                    detail_ref = %detail_ref,
                    "Reference write timed out, keeping detail"
                );
                return Err(self.timed_out("reference insert"));
            }
        }

        info!(
            id = %reference.id,
            student_id = %reference.student_id,
            "Achievement created as draft"
        );

        Ok(CreatedAchievement {
            id: reference.id,
            detail_ref,
            reference,
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Reference plus detail. A missing or unreadable detail yields a warning,
    /// not an error.
    pub async fn get(&self, principal: &Principal, id: Uuid) -> Result<AchievementView> {
        let reference = self.load_visible(principal, id).await?;
        Ok(self.with_detail(reference).await)
    }

    /// Achievements visible to the caller, details attached where readable.
    pub async fn list(&self, principal: &Principal) -> Result<Vec<AchievementView>> {
        let scope = Self::scope_for(principal);
        debug!(user_id = %principal.user_id, ?scope, "Listing achievements");

        let references = self
            .bounded("reference list", self.references.list(&scope))
            .await?;
        Ok(join_all(references.into_iter().map(|r| self.with_detail(r))).await)
    }

    /// Listing scope for a principal.
    pub fn scope_for(principal: &Principal) -> ListScope {
        match &principal.kind {
            PrincipalKind::Student { student_id } => ListScope::Student(student_id.clone()),
            PrincipalKind::Supervisor { .. } if principal.is_admin() => ListScope::All,
            PrincipalKind::Supervisor { lecturer_id } => ListScope::Advisees(lecturer_id.clone()),
            PrincipalKind::Admin => ListScope::All,
        }
    }

    pub async fn history(&self, principal: &Principal, id: Uuid) -> Result<Vec<HistoryEntry>> {
        let reference = self.load_visible(principal, id).await?;
        Ok(reconstruct(&reference))
    }

    // =========================================================================
    // Draft edits
    // =========================================================================

    pub async fn edit(
        &self,
        principal: &Principal,
        id: Uuid,
        update: AchievementUpdate,
    ) -> Result<AchievementView> {
        let (reference, _) = self.guard(principal, id, Transition::Edit).await?;
        update.validate()?;

        let next = self.commit(&reference, Transition::Edit, |next| next).await?;
        let detail = self
            .bounded(
                "detail update",
                self.details.apply_update(&reference.detail_ref, &update, next.updated_at),
            )
            .await?;

        info!(id = %id, user_id = %principal.user_id, "Achievement edited");
        Ok(AchievementView {
            reference: next,
            detail: Some(detail),
            warning: None,
        })
    }

    /// Store an uploaded file and append it to the draft's attachments.
    pub async fn attach(
        &self,
        principal: &Principal,
        id: Uuid,
        upload: AttachmentUpload,
    ) -> Result<Attachment> {
        let (reference, _) = self.guard(principal, id, Transition::AttachFile).await?;
        if upload.bytes.is_empty() {
            return Err(AccoladeError::ValidationFailed("file is empty".into()));
        }
        if upload.file_name.trim().is_empty() {
            return Err(AccoladeError::ValidationFailed("file name is required".into()));
        }

        let next = self
            .commit(&reference, Transition::AttachFile, |next| next)
            .await?;

        let file_url = self
            .bounded("file store", self.files.store(&upload.file_name, upload.bytes))
            .await?;
        let attachment = Attachment {
            file_name: upload.file_name,
            file_url,
            file_type: upload.file_type,
            uploaded_at: next.updated_at,
        };
        self.bounded(
            "detail append",
            self.details.append_attachment(&reference.detail_ref, &attachment),
        )
        .await?;

        info!(
            id = %id,
            file = %attachment.file_name,
            "Attachment added"
        );
        Ok(attachment)
    }

    // =========================================================================
    // Status transitions
    // =========================================================================

    pub async fn submit(&self, principal: &Principal, id: Uuid) -> Result<AchievementReference> {
        let (reference, _) = self.guard(principal, id, Transition::Submit).await?;
        self.commit(&reference, Transition::Submit, |mut next| {
            next.submitted_at = Some(next.updated_at);
            next
        })
        .await
    }

    pub async fn verify(&self, principal: &Principal, id: Uuid) -> Result<AchievementReference> {
        let (reference, _) = self.guard(principal, id, Transition::Verify).await?;
        let actor = principal.user_id.clone();
        self.commit(&reference, Transition::Verify, move |mut next| {
            next.verified_at = Some(next.updated_at);
            next.verified_by = Some(actor);
            next
        })
        .await
    }

    pub async fn reject(
        &self,
        principal: &Principal,
        id: Uuid,
        note: &str,
    ) -> Result<AchievementReference> {
        let (reference, _) = self.guard(principal, id, Transition::Reject).await?;
        let note = note.trim();
        if note.is_empty() {
            return Err(AccoladeError::ValidationFailed(
                "rejection_note is required".into(),
            ));
        }
        let actor = principal.user_id.clone();
        let note = note.to_string();
        self.commit(&reference, Transition::Reject, move |mut next| {
            next.verified_at = Some(next.updated_at);
            next.verified_by = Some(actor);
            next.rejection_note = Some(note);
            next
        })
        .await
    }

    /// Soft delete: the reference becomes `deleted`, the detail is kept.
    pub async fn delete(&self, principal: &Principal, id: Uuid) -> Result<AchievementReference> {
        let (reference, _) = self.guard(principal, id, Transition::Delete).await?;
        self.commit(&reference, Transition::Delete, |mut next| {
            next.deleted_at = Some(next.updated_at);
            next
        })
        .await
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Load a live reference; soft-deleted ones read as missing.
    async fn load(&self, id: Uuid) -> Result<AchievementReference> {
        match self.bounded("reference read", self.references.get(id)).await? {
            Some(r) if r.status != AchievementStatus::Deleted => Ok(r),
            _ => Err(AccoladeError::NotFound(format!("achievement {}", id))),
        }
    }

    /// Load a reference the caller may read. Supervisors see the same
    /// records their listing shows, so an advisee's draft reads as missing.
    async fn load_visible(&self, principal: &Principal, id: Uuid) -> Result<AchievementReference> {
        let reference = self.load(id).await?;
        let relationship = self
            .bounded(
                "relationship lookup",
                resolve_relationship(self.directory.as_ref(), principal, &reference),
            )
            .await?
            .ok_or_else(|| {
                AccoladeError::Forbidden("no relationship to this achievement".into())
            })?;
        if relationship == Relationship::SupervisorOfOwner
            && reference.status == AchievementStatus::Draft
        {
            return Err(AccoladeError::NotFound(format!("achievement {}", id)));
        }
        Ok(reference)
    }

    /// Load, authorize and state-check before any write.
    async fn guard(
        &self,
        principal: &Principal,
        id: Uuid,
        transition: Transition,
    ) -> Result<(AchievementReference, Relationship)> {
        let reference = self.load(id).await?;
        let relationship = self
            .bounded(
                "relationship lookup",
                resolve_relationship(self.directory.as_ref(), principal, &reference),
            )
            .await?;
        let relationship = authorize(relationship, transition)?;

        if reference.status.apply(transition).is_none() {
            return Err(AccoladeError::invalid_state(reference.status, transition));
        }
        Ok((reference, relationship))
    }

    /// Write the transition as one conditional update against the status and
    /// `updated_at` the guard observed.
    async fn commit<F>(
        &self,
        current: &AchievementReference,
        transition: Transition,
        fill: F,
    ) -> Result<AchievementReference>
    where
        F: FnOnce(AchievementReference) -> AchievementReference,
    {
        let target = current
            .status
            .apply(transition)
            .ok_or_else(|| AccoladeError::invalid_state(current.status, transition))?;

        let mut next = current.clone();
        next.status = target;
        next.updated_at = next_timestamp(current.updated_at);
        let next = fill(next);
        debug_assert!(next.is_consistent());

        let applied = self
            .bounded(
                "reference update",
                self.references.update_if_unchanged(&next, current),
            )
            .await?;
        if !applied {
            warn!(
                id = %current.id,
                expected = %current.status,
                requested = %transition,
                "Concurrent transition won the race"
            );
            return Err(AccoladeError::Conflict(format!(
                "achievement {} changed while trying to {} it",
                current.id, transition
            )));
        }

        if current.status != target {
            info!(
                id = %current.id,
                from = %current.status,
                to = %target,
                "Achievement status changed"
            );
        }
        Ok(next)
    }

    /// Attach the detail to a reference, degrading to a warning.
    async fn with_detail(&self, reference: AchievementReference) -> AchievementView {
        let outcome = self
            .bounded("detail read", self.details.get(&reference.detail_ref))
            .await;
        let (detail, warning) = match outcome {
            Ok(Some(detail)) => (Some(detail), None),
            Ok(None) => {
                warn!(id = %reference.id, detail_ref = %reference.detail_ref, "Achievement detail missing");
                (None, Some("achievement detail not found".to_string()))
            }
            Err(e) => {
                warn!(id = %reference.id, error = %e, "Achievement detail unavailable");
                (None, Some(format!("achievement detail unavailable: {}", e)))
            }
        };
        AchievementView {
            reference,
            detail,
            warning,
        }
    }
}
