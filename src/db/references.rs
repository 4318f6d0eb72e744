//! SQLite reference store
//!
//! Every change is a single conditional `UPDATE ... WHERE id = ? AND
//! status = ? AND updated_at = ?`. The observed `updated_at` acts as the
//! row version, so two concurrent writers on one achievement cannot both
//! apply, even when neither changes the status.

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;
use uuid::Uuid;

use super::{format_ts, parse_opt_ts, parse_ts, SqliteDb};
use crate::lifecycle::model::{AchievementReference, DetailRef};
use crate::lifecycle::status::AchievementStatus;
use crate::lifecycle::store::{ListScope, ReferenceStore};
use crate::types::Result;

const COLUMNS: &str = "ar.id, ar.student_id, ar.mongo_achievement_id, ar.status, ar.submitted_at, \
     ar.verified_at, ar.verified_by, ar.rejection_note, ar.deleted_at, ar.created_at, ar.updated_at";

pub struct SqliteReferenceStore {
    db: Arc<SqliteDb>,
}

impl SqliteReferenceStore {
    pub fn new(db: Arc<SqliteDb>) -> Self {
        Self { db }
    }
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
}

fn row_to_reference(row: &Row) -> rusqlite::Result<AchievementReference> {
    let id: String = row.get(0)?;
    let status: String = row.get(3)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;

    Ok(AchievementReference {
        id: Uuid::parse_str(&id).map_err(|e| conversion_error(0, e.to_string()))?,
        student_id: row.get(1)?,
        detail_ref: DetailRef(row.get(2)?),
        status: status
            .parse::<AchievementStatus>()
            .map_err(|e| conversion_error(3, e))?,
        submitted_at: parse_opt_ts(4, row.get(4)?)?,
        verified_at: parse_opt_ts(5, row.get(5)?)?,
        verified_by: row.get(6)?,
        rejection_note: row.get(7)?,
        deleted_at: parse_opt_ts(8, row.get(8)?)?,
        created_at: parse_ts(9, &created_at)?,
        updated_at: parse_ts(10, &updated_at)?,
    })
}

#[async_trait]
impl ReferenceStore for SqliteReferenceStore {
    async fn insert(&self, reference: &AchievementReference) -> Result<()> {
        let r = reference.clone();
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO achievement_references
                     (id, student_id, mongo_achievement_id, status, submitted_at, verified_at,
                      verified_by, rejection_note, deleted_at, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        r.id.to_string(),
                        r.student_id,
                        r.detail_ref.as_str(),
                        r.status.as_str(),
                        r.submitted_at.as_ref().map(format_ts),
                        r.verified_at.as_ref().map(format_ts),
                        r.verified_by,
                        r.rejection_note,
                        r.deleted_at.as_ref().map(format_ts),
                        format_ts(&r.created_at),
                        format_ts(&r.updated_at),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    async fn get(&self, id: Uuid) -> Result<Option<AchievementReference>> {
        self.db
            .call(move |conn| {
                let sql = format!("SELECT {} FROM achievement_references ar WHERE ar.id = ?1", COLUMNS);
                Ok(conn
                    .query_row(&sql, [id.to_string()], row_to_reference)
                    .optional()?)
            })
            .await
    }

    async fn update_if_unchanged(
        &self,
        next: &AchievementReference,
        observed: &AchievementReference,
    ) -> Result<bool> {
        let r = next.clone();
        let expected_status = observed.status;
        let expected_version = format_ts(&observed.updated_at);
        self.db
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE achievement_references
                     SET status = ?1, submitted_at = ?2, verified_at = ?3, verified_by = ?4,
                         rejection_note = ?5, deleted_at = ?6, updated_at = ?7
                     WHERE id = ?8 AND status = ?9 AND updated_at = ?10",
                    params![
                        r.status.as_str(),
                        r.submitted_at.as_ref().map(format_ts),
                        r.verified_at.as_ref().map(format_ts),
                        r.verified_by,
                        r.rejection_note,
                        r.deleted_at.as_ref().map(format_ts),
                        format_ts(&r.updated_at),
                        r.id.to_string(),
                        expected_status.as_str(),
                        expected_version,
                    ],
                )?;
                Ok(changed == 1)
            })
            .await
    }

    async fn list(&self, scope: &ListScope) -> Result<Vec<AchievementReference>> {
        let scope = scope.clone();
        self.db
            .call(move |conn| {
                let (sql, arg) = match &scope {
                    ListScope::Student(student_id) => (
                        format!(
                            "SELECT {} FROM achievement_references ar
                             WHERE ar.student_id = ?1 AND ar.status != 'deleted'
                             ORDER BY ar.created_at DESC",
                            COLUMNS
                        ),
                        Some(student_id.clone()),
                    ),
                    ListScope::Advisees(lecturer_id) => (
                        format!(
                            "SELECT {} FROM achievement_references ar
                             JOIN students s ON s.id = ar.student_id
                             WHERE s.advisor_id = ?1 AND ar.status NOT IN ('draft', 'deleted')
                             ORDER BY ar.created_at DESC",
                            COLUMNS
                        ),
                        Some(lecturer_id.clone()),
                    ),
                    ListScope::All => (
                        format!(
                            "SELECT {} FROM achievement_references ar
                             WHERE ar.status != 'deleted'
                             ORDER BY ar.created_at DESC",
                            COLUMNS
                        ),
                        None,
                    ),
                };

                let mut stmt = conn.prepare(&sql)?;
                let rows = match arg {
                    Some(arg) => stmt
                        .query_map([arg], row_to_reference)?
                        .collect::<rusqlite::Result<Vec<_>>>()?,
                    None => stmt
                        .query_map([], row_to_reference)?
                        .collect::<rusqlite::Result<Vec<_>>>()?,
                };
                Ok(rows)
            })
            .await
    }

    async fn count_by_status(&self) -> Result<Vec<(AchievementStatus, u64)>> {
        self.db
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT status, COUNT(*) FROM achievement_references
                     WHERE status != 'deleted'
                     GROUP BY status",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        let status: String = row.get(0)?;
                        let count: i64 = row.get(1)?;
                        let status = status
                            .parse::<AchievementStatus>()
                            .map_err(|e| conversion_error(0, e))?;
                        Ok((status, count as u64))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                // Every live status is reported, zero or not
                let counts = AchievementStatus::all()
                    .into_iter()
                    .filter(|s| *s != AchievementStatus::Deleted)
                    .map(|s| {
                        let n = rows.iter().find(|(st, _)| *st == s).map_or(0, |(_, n)| *n);
                        (s, n)
                    })
                    .collect();
                Ok(counts)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::directory::tests::seed_pair;
    use crate::lifecycle::model::{next_timestamp, now_micros};

    async fn store_with_student() -> (SqliteReferenceStore, String, String) {
        let db = Arc::new(SqliteDb::open_in_memory().unwrap());
        let (student_id, lecturer_id) = seed_pair(&db).await;
        (SqliteReferenceStore::new(db), student_id, lecturer_id)
    }

    fn draft(student_id: &str, detail: &str) -> AchievementReference {
        AchievementReference::new_draft(student_id.into(), DetailRef(detail.into()), now_micros())
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let (store, student_id, _) = store_with_student().await;
        let r = draft(&student_id, "d1");
        store.insert(&r).await.unwrap();

        let loaded = store.get(r.id).await.unwrap().unwrap();
        assert_eq!(loaded, r);
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_detail_ref_is_unique_violation() {
        let (store, student_id, _) = store_with_student().await;
        store.insert(&draft(&student_id, "same")).await.unwrap();

        let err = store.insert(&draft(&student_id, "same")).await.unwrap_err();
        assert!(matches!(
            err,
            crate::types::AccoladeError::UniqueConstraintViolation(_)
        ));
    }

    #[tokio::test]
    async fn test_conditional_update_applies_once() {
        let (store, student_id, _) = store_with_student().await;
        let r = draft(&student_id, "d1");
        store.insert(&r).await.unwrap();

        let mut next = r.clone();
        next.status = AchievementStatus::Submitted;
        next.updated_at = next_timestamp(r.updated_at);
        next.submitted_at = Some(next.updated_at);

        assert!(store.update_if_unchanged(&next, &r).await.unwrap());
        // Second writer still expecting draft loses
        assert!(!store.update_if_unchanged(&next, &r).await.unwrap());

        let loaded = store.get(r.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, AchievementStatus::Submitted);
        assert_eq!(loaded.submitted_at, next.submitted_at);
    }

    #[tokio::test]
    async fn test_stale_version_loses_without_status_change() {
        let (store, student_id, _) = store_with_student().await;
        let r = draft(&student_id, "d1");
        store.insert(&r).await.unwrap();

        // Two draft edits observed the same row
        let mut first = r.clone();
        first.updated_at = next_timestamp(r.updated_at);
        let mut second = r.clone();
        second.updated_at = next_timestamp(first.updated_at);

        assert!(store.update_if_unchanged(&first, &r).await.unwrap());
        assert!(!store.update_if_unchanged(&second, &r).await.unwrap());

        let loaded = store.get(r.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, AchievementStatus::Draft);
        assert_eq!(loaded.updated_at, first.updated_at);
    }

    #[tokio::test]
    async fn test_list_scopes() {
        let (store, student_id, lecturer_id) = store_with_student().await;
        let drafted = draft(&student_id, "d1");
        let submitted = draft(&student_id, "d2");
        let deleted = draft(&student_id, "d3");
        for r in [&drafted, &submitted, &deleted] {
            store.insert(r).await.unwrap();
        }

        let mut next = submitted.clone();
        next.status = AchievementStatus::Submitted;
        next.submitted_at = Some(next_timestamp(submitted.updated_at));
        next.updated_at = next.submitted_at.unwrap();
        store.update_if_unchanged(&next, &submitted).await.unwrap();

        let mut gone = deleted.clone();
        gone.status = AchievementStatus::Deleted;
        gone.deleted_at = Some(next_timestamp(deleted.updated_at));
        gone.updated_at = gone.deleted_at.unwrap();
        store.update_if_unchanged(&gone, &deleted).await.unwrap();

        let own = store.list(&ListScope::Student(student_id.clone())).await.unwrap();
        assert_eq!(own.len(), 2);

        let advisees = store.list(&ListScope::Advisees(lecturer_id)).await.unwrap();
        assert_eq!(advisees.len(), 1);
        assert_eq!(advisees[0].id, submitted.id);

        let other = store
            .list(&ListScope::Advisees("someone-else".into()))
            .await
            .unwrap();
        assert!(other.is_empty());

        assert_eq!(store.list(&ListScope::All).await.unwrap().len(), 2);

        let counts = store.count_by_status().await.unwrap();
        assert_eq!(counts.len(), 4);
        assert!(counts.contains(&(AchievementStatus::Draft, 1)));
        assert!(counts.contains(&(AchievementStatus::Submitted, 1)));
        assert!(counts.contains(&(AchievementStatus::Verified, 0)));
    }
}
