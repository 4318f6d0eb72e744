//! In-process detail store
//!
//! Backs development mode when MongoDB is unreachable and doubles as the
//! test fake. Faults can be switched on per operation to exercise the
//! engine's degraded paths (compensation, warnings, timeouts).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::model::{AchievementDetail, AchievementUpdate, Attachment, DetailRef};
use super::store::DetailStore;
use crate::types::{AccoladeError, Result};

/// Operations a fault can be injected into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailOp {
    Create,
    Get,
    Update,
    Append,
    Delete,
}

#[derive(Default)]
struct Faults {
    create: AtomicBool,
    get: AtomicBool,
    update: AtomicBool,
    append: AtomicBool,
    delete: AtomicBool,
}

impl Faults {
    fn flag(&self, op: DetailOp) -> &AtomicBool {
        match op {
            DetailOp::Create => &self.create,
            DetailOp::Get => &self.get,
            DetailOp::Update => &self.update,
            DetailOp::Append => &self.append,
            DetailOp::Delete => &self.delete,
        }
    }
}

/// Detail store held in a `HashMap`
#[derive(Default)]
pub struct InMemoryDetailStore {
    docs: Mutex<HashMap<String, AchievementDetail>>,
    faults: Faults,
    delay_ms: AtomicU64,
}

impl InMemoryDetailStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `op` fail with `StoreUnavailable` until cleared.
    pub fn fail(&self, op: DetailOp, enabled: bool) {
        self.faults.flag(op).store(enabled, Ordering::SeqCst);
    }

    /// Sleep before every operation (simulates a slow backend).
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.docs.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn enter(&self, op: DetailOp) -> Result<()> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.faults.flag(op).load(Ordering::SeqCst) {
            return Err(AccoladeError::StoreUnavailable(format!(
                "injected {:?} failure",
                op
            )));
        }
        Ok(())
    }

    fn with_docs<T>(&self, f: impl FnOnce(&mut HashMap<String, AchievementDetail>) -> T) -> Result<T> {
        let mut docs = self
            .docs
            .lock()
            .map_err(|e| AccoladeError::Internal(format!("Lock poisoned: {}", e)))?;
        Ok(f(&mut docs))
    }

    fn selected(&self, refs: &[DetailRef]) -> Result<Vec<AchievementDetail>> {
        self.with_docs(|docs| {
            refs.iter()
                .filter_map(|r| docs.get(r.as_str()).cloned())
                .collect()
        })
    }
}

#[async_trait]
impl DetailStore for InMemoryDetailStore {
    async fn create(&self, detail: &AchievementDetail) -> Result<DetailRef> {
        self.enter(DetailOp::Create).await?;
        let id = bson::oid::ObjectId::new().to_hex();
        self.with_docs(|docs| {
            docs.insert(id.clone(), detail.clone());
        })?;
        Ok(DetailRef(id))
    }

    async fn get(&self, detail_ref: &DetailRef) -> Result<Option<AchievementDetail>> {
        self.enter(DetailOp::Get).await?;
        self.with_docs(|docs| docs.get(detail_ref.as_str()).cloned())
    }

    async fn apply_update(
        &self,
        detail_ref: &DetailRef,
        update: &AchievementUpdate,
        updated_at: DateTime<Utc>,
    ) -> Result<AchievementDetail> {
        self.enter(DetailOp::Update).await?;
        self.with_docs(|docs| {
            docs.get_mut(detail_ref.as_str()).map(|existing| {
                update.apply_to(existing, updated_at);
                existing.clone()
            })
        })?
        .ok_or_else(|| AccoladeError::NotFound(format!("detail {}", detail_ref)))
    }

    async fn append_attachment(&self, detail_ref: &DetailRef, attachment: &Attachment) -> Result<()> {
        self.enter(DetailOp::Append).await?;
        let found = self.with_docs(|docs| match docs.get_mut(detail_ref.as_str()) {
            Some(existing) => {
                existing.attachments.push(attachment.clone());
                existing.updated_at = attachment.uploaded_at;
                true
            }
            None => false,
        })?;
        if found {
            Ok(())
        } else {
            Err(AccoladeError::NotFound(format!("detail {}", detail_ref)))
        }
    }

    async fn delete(&self, detail_ref: &DetailRef) -> Result<()> {
        self.enter(DetailOp::Delete).await?;
        self.with_docs(|docs| {
            docs.remove(detail_ref.as_str());
        })
    }

    async fn count_by_type(&self, refs: &[DetailRef]) -> Result<Vec<(String, u64)>> {
        self.enter(DetailOp::Get).await?;
        let mut counts: Vec<(String, u64)> = Vec::new();
        for detail in self.selected(refs)? {
            match counts.iter_mut().find(|(t, _)| *t == detail.achievement_type) {
                Some((_, n)) => *n += 1,
                None => counts.push((detail.achievement_type, 1)),
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(counts)
    }

    async fn total_points(&self, refs: &[DetailRef]) -> Result<i64> {
        self.enter(DetailOp::Get).await?;
        Ok(self.selected(refs)?.iter().map(|d| d.points).sum())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
