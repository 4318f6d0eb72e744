//! Report endpoints
//!
//! - `GET /api/v1/reports/statistics`  - system-wide counts (admin)
//! - `GET /api/v1/reports/student/:id` - one student's achievements and points

use hyper::{Request, Response};

use super::authenticate;
use super::response::{ok, FullBody};
use crate::reports;
use crate::server::AppState;
use crate::types::Result;

pub async fn statistics<B>(state: &AppState, req: Request<B>) -> Result<Response<FullBody>> {
    let principal = authenticate(state, req.headers()).await?;
    Ok(ok(reports::statistics(&state.engine, &principal).await?))
}

pub async fn student<B>(
    state: &AppState,
    req: Request<B>,
    student_id: &str,
) -> Result<Response<FullBody>> {
    let principal = authenticate(state, req.headers()).await?;
    Ok(ok(
        reports::student_report(&state.engine, &principal, student_id).await?,
    ))
}
