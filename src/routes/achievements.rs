//! Achievement endpoints
//!
//! - `GET    /api/v1/achievements`                 - list visible achievements
//! - `POST   /api/v1/achievements`                 - record a draft
//! - `GET    /api/v1/achievements/:id`             - reference plus detail
//! - `PUT    /api/v1/achievements/:id`             - edit a draft
//! - `DELETE /api/v1/achievements/:id`             - soft delete a draft
//! - `POST   /api/v1/achievements/:id/submit`      - submit for verification
//! - `POST   /api/v1/achievements/:id/verify`      - supervisor verification
//! - `POST   /api/v1/achievements/:id/reject`      - supervisor rejection
//! - `GET    /api/v1/achievements/:id/history`     - status history
//! - `POST   /api/v1/achievements/:id/attachments` - multipart file upload (`file` field)

use bytes::Bytes;
use hyper::body::Body;
use hyper::header::{HeaderMap, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use std::convert::Infallible;
use uuid::Uuid;

use super::response::{created, ok, with_message, FullBody};
use super::{authenticate, read_body, read_json};
use crate::lifecycle::{AchievementUpdate, AttachmentUpload, NewAchievement};
use crate::server::AppState;
use crate::types::{AccoladeError, Result};

/// Form field carrying the uploaded file
pub const FILE_FIELD: &str = "file";

/// Room for multipart boundaries and part headers on top of the file limit
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub rejection_note: String,
}

fn multipart_error(e: multer::Error) -> AccoladeError {
    AccoladeError::BadRequest(format!("Invalid multipart body: {}", e))
}

/// Pull the `file` part out of a `multipart/form-data` body.
///
/// The part's file name and content type become the attachment's name and
/// type; other fields are ignored.
pub async fn parse_upload(headers: &HeaderMap, body: Bytes) -> Result<AttachmentUpload> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AccoladeError::BadRequest("Content-Type header is required".into()))?;
    let boundary = multer::parse_boundary(content_type).map_err(|_| {
        AccoladeError::BadRequest("Expected a multipart/form-data body".into())
    })?;

    let stream = futures::stream::once(async move { Ok::<_, Infallible>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AccoladeError::ValidationFailed("file name is required".into()))?;
        let file_type = field
            .content_type()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let bytes = field.bytes().await.map_err(multipart_error)?;

        return Ok(AttachmentUpload {
            file_name,
            file_type,
            bytes,
        });
    }

    Err(AccoladeError::ValidationFailed(format!(
        "multipart field '{}' is required",
        FILE_FIELD
    )))
}

/// Split `/achievements/<id>[/<action>]` into id and action.
///
/// A malformed id reads as a missing achievement.
pub fn parse_achievement_path(rest: &str) -> Result<(Uuid, Option<&str>)> {
    let mut parts = rest.trim_end_matches('/').splitn(2, '/');
    let raw_id = parts.next().unwrap_or_default();
    let id = Uuid::parse_str(raw_id)
        .map_err(|_| AccoladeError::NotFound(format!("achievement {}", raw_id)))?;
    Ok((id, parts.next()))
}

pub async fn list<B>(state: &AppState, req: Request<B>) -> Result<Response<FullBody>> {
    let principal = authenticate(state, req.headers()).await?;
    let views = state.engine.list(&principal).await?;
    Ok(ok(views))
}

pub async fn create<B>(state: &AppState, req: Request<B>) -> Result<Response<FullBody>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let principal = authenticate(state, req.headers()).await?;
    let input: NewAchievement = read_json(req.into_body()).await?;
    let created_achievement = state.engine.create(&principal, input).await?;
    Ok(created(created_achievement))
}

pub async fn get<B>(state: &AppState, req: Request<B>, id: Uuid) -> Result<Response<FullBody>> {
    let principal = authenticate(state, req.headers()).await?;
    Ok(ok(state.engine.get(&principal, id).await?))
}

pub async fn update<B>(state: &AppState, req: Request<B>, id: Uuid) -> Result<Response<FullBody>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let principal = authenticate(state, req.headers()).await?;
    let update: AchievementUpdate = read_json(req.into_body()).await?;
    let view = state.engine.edit(&principal, id, update).await?;
    Ok(with_message(StatusCode::OK, Some("Achievement updated"), view))
}

pub async fn delete<B>(state: &AppState, req: Request<B>, id: Uuid) -> Result<Response<FullBody>> {
    let principal = authenticate(state, req.headers()).await?;
    let reference = state.engine.delete(&principal, id).await?;
    Ok(with_message(StatusCode::OK, Some("Achievement deleted"), reference))
}

pub async fn submit<B>(state: &AppState, req: Request<B>, id: Uuid) -> Result<Response<FullBody>> {
    let principal = authenticate(state, req.headers()).await?;
    let reference = state.engine.submit(&principal, id).await?;
    Ok(with_message(StatusCode::OK, Some("Achievement submitted"), reference))
}

pub async fn verify<B>(state: &AppState, req: Request<B>, id: Uuid) -> Result<Response<FullBody>> {
    let principal = authenticate(state, req.headers()).await?;
    let reference = state.engine.verify(&principal, id).await?;
    Ok(with_message(StatusCode::OK, Some("Achievement verified"), reference))
}

pub async fn reject<B>(state: &AppState, req: Request<B>, id: Uuid) -> Result<Response<FullBody>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let principal = authenticate(state, req.headers()).await?;
    let body: RejectRequest = read_json(req.into_body()).await?;
    let reference = state
        .engine
        .reject(&principal, id, &body.rejection_note)
        .await?;
    Ok(with_message(StatusCode::OK, Some("Achievement rejected"), reference))
}

pub async fn history<B>(state: &AppState, req: Request<B>, id: Uuid) -> Result<Response<FullBody>> {
    let principal = authenticate(state, req.headers()).await?;
    Ok(ok(state.engine.history(&principal, id).await?))
}

pub async fn attach<B>(state: &AppState, req: Request<B>, id: Uuid) -> Result<Response<FullBody>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let principal = authenticate(state, req.headers()).await?;
    let (parts, body) = req.into_parts();
    let limit = state.args.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES);
    let upload = parse_upload(&parts.headers, read_body(body, limit).await?).await?;
    if upload.bytes.len() > state.args.max_upload_bytes {
        return Err(AccoladeError::ValidationFailed(format!(
            "file exceeds {} bytes",
            state.args.max_upload_bytes
        )));
    }

    let attachment = state.engine.attach(&principal, id, upload).await?;
    Ok(created(attachment))
}
