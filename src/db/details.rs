//! MongoDB detail store

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, DateTime, Document};
use tracing::debug;

use super::mongo::{MongoClient, MongoCollection};
use super::schemas::{AchievementDoc, AttachmentDoc, ACHIEVEMENT_COLLECTION};
use crate::lifecycle::model::{AchievementDetail, AchievementUpdate, Attachment, DetailRef};
use crate::lifecycle::store::DetailStore;
use crate::types::{AccoladeError, Result};

pub struct MongoDetailStore {
    collection: MongoCollection<AchievementDoc>,
}

impl MongoDetailStore {
    pub async fn new(client: &MongoClient) -> Result<Self> {
        let collection = client.collection(ACHIEVEMENT_COLLECTION).await?;
        Ok(Self { collection })
    }
}

fn object_id(detail_ref: &DetailRef) -> Result<ObjectId> {
    Ok(ObjectId::parse_str(detail_ref.as_str())?)
}

fn object_ids(refs: &[DetailRef]) -> Vec<ObjectId> {
    refs.iter()
        .filter_map(|r| ObjectId::parse_str(r.as_str()).ok())
        .collect()
}

/// Integer from an aggregation result, whichever width the server chose
fn as_count(value: Option<&Bson>) -> i64 {
    match value {
        Some(Bson::Int32(n)) => *n as i64,
        Some(Bson::Int64(n)) => *n,
        Some(Bson::Double(n)) => *n as i64,
        _ => 0,
    }
}

#[async_trait]
impl DetailStore for MongoDetailStore {
    async fn create(&self, detail: &AchievementDetail) -> Result<DetailRef> {
        let oid = self
            .collection
            .insert_one(AchievementDoc::from_detail(detail)?)
            .await?;
        debug!(detail_ref = %oid, "Achievement detail inserted");
        Ok(DetailRef(oid.to_hex()))
    }

    async fn get(&self, detail_ref: &DetailRef) -> Result<Option<AchievementDetail>> {
        let Ok(oid) = ObjectId::parse_str(detail_ref.as_str()) else {
            return Ok(None);
        };
        let found = self.collection.find_one(doc! { "_id": oid }).await?;
        Ok(found.map(AchievementDoc::into_detail))
    }

    async fn apply_update(
        &self,
        detail_ref: &DetailRef,
        update: &AchievementUpdate,
        updated_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<AchievementDetail> {
        let oid = object_id(detail_ref)?;
        let stored = self
            .collection
            .find_one_and_update(doc! { "_id": oid }, AchievementDoc::update_set(update, updated_at)?)
            .await?
            .ok_or_else(|| AccoladeError::NotFound(format!("detail {}", detail_ref)))?;
        Ok(stored.into_detail())
    }

    async fn append_attachment(&self, detail_ref: &DetailRef, attachment: &Attachment) -> Result<()> {
        let oid = object_id(detail_ref)?;
        let entry = bson::to_bson(&AttachmentDoc::from_attachment(attachment))
            .map_err(|e| AccoladeError::Internal(format!("attachment encoding: {}", e)))?;
        let result = self
            .collection
            .update_one(
                doc! { "_id": oid },
                doc! {
                    "$push": { "attachments": entry },
                    "$set": { "metadata.updated_at": DateTime::from_chrono(attachment.uploaded_at) },
                },
            )
            .await?;
        if result.matched_count == 0 {
            return Err(AccoladeError::NotFound(format!("detail {}", detail_ref)));
        }
        Ok(())
    }

    async fn delete(&self, detail_ref: &DetailRef) -> Result<()> {
        let oid = object_id(detail_ref)?;
        self.collection.delete_one(doc! { "_id": oid }).await?;
        Ok(())
    }

    async fn count_by_type(&self, refs: &[DetailRef]) -> Result<Vec<(String, u64)>> {
        let pipeline: Vec<Document> = vec![
            doc! { "$match": { "_id": { "$in": object_ids(refs) } } },
            doc! { "$group": { "_id": "$achievementType", "count": { "$sum": 1 } } },
            doc! { "$sort": { "count": -1, "_id": 1 } },
        ];
        let rows = self.collection.aggregate(pipeline).await?;
        Ok(rows
            .iter()
            .map(|row| {
                let kind = row.get_str("_id").unwrap_or("unknown").to_string();
                (kind, as_count(row.get("count")).max(0) as u64)
            })
            .collect())
    }

    async fn total_points(&self, refs: &[DetailRef]) -> Result<i64> {
        let pipeline: Vec<Document> = vec![
            doc! { "$match": { "_id": { "$in": object_ids(refs) } } },
            doc! { "$group": { "_id": Bson::Null, "total": { "$sum": "$points" } } },
        ];
        let rows = self.collection.aggregate(pipeline).await?;
        Ok(rows.first().map_or(0, |row| as_count(row.get("total"))))
    }

    fn backend(&self) -> &'static str {
        "mongodb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_ref_is_skipped_in_aggregates() {
        let refs = vec![
            DetailRef("not-an-object-id".into()),
            DetailRef(ObjectId::new().to_hex()),
        ];
        assert_eq!(object_ids(&refs).len(), 1);
        assert!(object_id(&refs[0]).is_err());
    }

    #[test]
    fn test_as_count_widths() {
        assert_eq!(as_count(Some(&Bson::Int32(3))), 3);
        assert_eq!(as_count(Some(&Bson::Int64(7))), 7);
        assert_eq!(as_count(Some(&Bson::Double(2.0))), 2);
        assert_eq!(as_count(None), 0);
    }
}
