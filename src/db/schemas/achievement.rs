//! Achievement detail document schema
//!
//! Field names follow the collection's established camelCase layout
//! (`studentId`, `achievementType`, `fileUrl`, ...).

use bson::{doc, oid::ObjectId, Bson, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::lifecycle::model::{normalize_tags, AchievementDetail, AchievementUpdate, Attachment};
use crate::types::{AccoladeError, Result};

/// Collection name for achievement details
pub const ACHIEVEMENT_COLLECTION: &str = "achievements";

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentDoc {
    pub file_name: String,
    pub file_url: String,
    pub file_type: String,
    pub uploaded_at: Option<DateTime>,
}

/// Achievement detail stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct AchievementDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    #[serde(rename = "studentId")]
    pub student_id: String,

    #[serde(rename = "achievementType")]
    pub achievement_type: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Free-form key/value details (competition level, publisher, ...)
    #[serde(default)]
    pub details: Document,

    #[serde(default)]
    pub attachments: Vec<AttachmentDoc>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub points: i64,
}

impl AttachmentDoc {
    pub fn from_attachment(a: &Attachment) -> Self {
        Self {
            file_name: a.file_name.clone(),
            file_url: a.file_url.clone(),
            file_type: a.file_type.clone(),
            uploaded_at: Some(DateTime::from_chrono(a.uploaded_at)),
        }
    }

    fn into_attachment(self) -> Attachment {
        Attachment {
            file_name: self.file_name,
            file_url: self.file_url,
            file_type: self.file_type,
            uploaded_at: self.uploaded_at.unwrap_or(DateTime::MIN).to_chrono(),
        }
    }
}

impl AchievementDoc {
    pub fn from_detail(detail: &AchievementDetail) -> Result<Self> {
        Ok(Self {
            id: None,
            metadata: Metadata::at(
                DateTime::from_chrono(detail.created_at),
                DateTime::from_chrono(detail.updated_at),
            ),
            student_id: detail.student_id.clone(),
            achievement_type: detail.achievement_type.clone(),
            title: detail.title.clone(),
            description: detail.description.clone(),
            details: details_to_document(&detail.details)?,
            attachments: detail
                .attachments
                .iter()
                .map(AttachmentDoc::from_attachment)
                .collect(),
            tags: detail.tags.clone(),
            points: detail.points,
        })
    }

    pub fn into_detail(self) -> AchievementDetail {
        let created_at = self.metadata.created_at.unwrap_or(DateTime::MIN).to_chrono();
        let updated_at = self
            .metadata
            .updated_at
            .map(|t| t.to_chrono())
            .unwrap_or(created_at);

        let details = match Bson::Document(self.details).into_relaxed_extjson() {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };

        AchievementDetail {
            student_id: self.student_id,
            achievement_type: self.achievement_type,
            title: self.title,
            description: self.description,
            details,
            tags: self.tags,
            points: self.points,
            attachments: self
                .attachments
                .into_iter()
                .map(AttachmentDoc::into_attachment)
                .collect(),
            created_at,
            updated_at,
        }
    }

    /// `$set` body for an edit. Only the supplied fields are written, so
    /// concurrent edits of different fields do not overwrite each other.
    pub fn update_set(
        update: &AchievementUpdate,
        updated_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Document> {
        let mut set = doc! { "metadata.updated_at": DateTime::from_chrono(updated_at) };
        if let Some(t) = &update.achievement_type {
            set.insert("achievementType", t.trim());
        }
        if let Some(t) = &update.title {
            set.insert("title", t.trim());
        }
        if let Some(d) = &update.description {
            set.insert("description", d.as_str());
        }
        if let Some(d) = &update.details {
            set.insert("details", details_to_document(d)?);
        }
        if let Some(tags) = &update.tags {
            set.insert("tags", normalize_tags(tags.clone()));
        }
        if let Some(p) = update.points {
            set.insert("points", p);
        }
        Ok(doc! { "$set": set })
    }
}

fn details_to_document(details: &serde_json::Map<String, serde_json::Value>) -> Result<Document> {
    bson::to_document(details)
        .map_err(|e| AccoladeError::ValidationFailed(format!("details not storable: {}", e)))
}

impl IntoIndexes for AchievementDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "studentId": 1 },
                Some(
                    IndexOptions::builder()
                        .name("student_id_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "achievementType": 1 },
                Some(
                    IndexOptions::builder()
                        .name("achievement_type_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for AchievementDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::model::NewAchievement;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn sample_detail() -> AchievementDetail {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 8, 30, 0).unwrap();
        let details = json!({ "level": "national", "rank": 2 });
        let mut detail = NewAchievement {
            achievement_type: "competition".into(),
            title: "Programming contest".into(),
            description: "Second place".into(),
            details: details.as_object().unwrap().clone(),
            tags: vec!["coding".into()],
            points: 50,
            ..Default::default()
        }
        .into_detail("stu-1".into(), at);
        detail.attachments.push(Attachment {
            file_name: "cert.pdf".into(),
            file_url: "/uploads/1_cert.pdf".into(),
            file_type: "application/pdf".into(),
            uploaded_at: at,
        });
        detail
    }

    #[test]
    fn test_document_uses_camel_case_fields() {
        let doc = bson::to_document(&AchievementDoc::from_detail(&sample_detail()).unwrap()).unwrap();
        assert_eq!(doc.get_str("studentId").unwrap(), "stu-1");
        assert_eq!(doc.get_str("achievementType").unwrap(), "competition");
        assert!(!doc.contains_key("_id"));

        let attachment = doc.get_array("attachments").unwrap()[0].as_document().unwrap();
        assert_eq!(attachment.get_str("fileUrl").unwrap(), "/uploads/1_cert.pdf");
    }

    #[test]
    fn test_detail_survives_document_mapping() {
        let detail = sample_detail();
        let back = AchievementDoc::from_detail(&detail).unwrap().into_detail();
        assert_eq!(back, detail);
    }

    #[test]
    fn test_update_set_only_supplied_fields() {
        let update = AchievementUpdate {
            title: Some("  Juara 1  ".into()),
            ..Default::default()
        };
        let doc = AchievementDoc::update_set(&update, chrono::Utc::now()).unwrap();
        let set = doc.get_document("$set").unwrap();
        assert_eq!(set.get_str("title").unwrap(), "Juara 1");
        assert!(set.contains_key("metadata.updated_at"));
        assert!(!set.contains_key("points"));
        assert!(!set.contains_key("attachments"));
    }
}
