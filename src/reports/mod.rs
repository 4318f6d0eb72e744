//! Achievement reports
//!
//! Read-only aggregation over both stores: status counts come from the
//! reference store, type counts and point sums from the detail store.
//! Soft-deleted achievements never contribute.

use futures::future::join_all;
use serde::Serialize;
use tracing::warn;

use crate::lifecycle::{
    AchievementStatus, DetailRef, LifecycleEngine, ListScope, Population, Principal,
};
use crate::types::{AccoladeError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct StatusCount {
    pub status: AchievementStatus,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeCount {
    pub achievement_type: String,
    pub count: u64,
}

/// System-wide statistics
#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub total_students: u64,
    pub total_lecturers: u64,
    pub total_achievements: u64,
    pub by_status: Vec<StatusCount>,
    pub by_type: Vec<TypeCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentAchievementItem {
    pub id: uuid::Uuid,
    pub title: String,
    pub achievement_type: String,
    pub status: AchievementStatus,
    pub points: i64,
}

/// Per-student report
#[derive(Debug, Clone, Serialize)]
pub struct StudentReport {
    pub student_id: String,
    pub student_number: String,
    pub full_name: String,
    pub program_study: String,
    pub total_achievements: u64,
    pub total_points: i64,
    pub achievements: Vec<StudentAchievementItem>,
}

/// Statistics across all students; requires the administrative override.
pub async fn statistics(engine: &LifecycleEngine, principal: &Principal) -> Result<Statistics> {
    if !principal.is_admin() {
        return Err(AccoladeError::Forbidden(
            "statistics require administrative access".into(),
        ));
    }

    let Population {
        students,
        lecturers,
    } = engine
        .bounded("population", engine.directory().population())
        .await?;

    let by_status: Vec<StatusCount> = engine
        .bounded("status counts", engine.references().count_by_status())
        .await?
        .into_iter()
        .map(|(status, count)| StatusCount { status, count })
        .collect();
    let total_achievements = by_status.iter().map(|s| s.count).sum();

    let refs: Vec<DetailRef> = engine
        .bounded("reference list", engine.references().list(&ListScope::All))
        .await?
        .into_iter()
        .map(|r| r.detail_ref)
        .collect();

    let (by_type, warning) = match engine
        .bounded("type counts", engine.details().count_by_type(&refs))
        .await
    {
        Ok(counts) => (
            counts
                .into_iter()
                .map(|(achievement_type, count)| TypeCount {
                    achievement_type,
                    count,
                })
                .collect(),
            None,
        ),
        Err(e) => {
            warn!(error = %e, "Type breakdown unavailable");
            (Vec::new(), Some(format!("type breakdown unavailable: {}", e)))
        }
    };

    Ok(Statistics {
        total_students: students,
        total_lecturers: lecturers,
        total_achievements,
        by_status,
        by_type,
        warning,
    })
}

/// Report for one student: the student, their advisor, or an admin.
pub async fn student_report(
    engine: &LifecycleEngine,
    principal: &Principal,
    student_id: &str,
) -> Result<StudentReport> {
    let profile = engine
        .bounded("student lookup", engine.directory().student_profile(student_id))
        .await?
        .ok_or_else(|| AccoladeError::NotFound(format!("student {}", student_id)))?;

    let allowed = principal.student_id() == Some(profile.id.as_str())
        || (principal.lecturer_id().is_some()
            && principal.lecturer_id() == profile.advisor_id.as_deref())
        || principal.is_admin();
    if !allowed {
        return Err(AccoladeError::Forbidden(
            "no relationship to this student".into(),
        ));
    }

    let references = engine
        .bounded(
            "reference list",
            engine
                .references()
                .list(&ListScope::Student(profile.id.clone())),
        )
        .await?;
    let refs: Vec<DetailRef> = references.iter().map(|r| r.detail_ref.clone()).collect();

    let details = join_all(
        references
            .iter()
            .map(|r| engine.bounded("detail read", engine.details().get(&r.detail_ref))),
    )
    .await;

    let achievements: Vec<StudentAchievementItem> = references
        .iter()
        .zip(details)
        .map(|(r, detail)| {
            let detail = detail.ok().flatten();
            StudentAchievementItem {
                id: r.id,
                title: detail.as_ref().map(|d| d.title.clone()).unwrap_or_default(),
                achievement_type: detail
                    .as_ref()
                    .map(|d| d.achievement_type.clone())
                    .unwrap_or_default(),
                status: r.status,
                points: detail.map_or(0, |d| d.points),
            }
        })
        .collect();

    let total_points = match engine
        .bounded("point total", engine.details().total_points(&refs))
        .await
    {
        Ok(total) => total,
        Err(e) => {
            warn!(student_id = %profile.id, error = %e, "Point total unavailable, summing readable details");
            achievements.iter().map(|a| a.points).sum()
        }
    };

    Ok(StudentReport {
        student_id: profile.id,
        student_number: profile.student_number,
        full_name: profile.full_name,
        program_study: profile.program_study,
        total_achievements: achievements.len() as u64,
        total_points,
        achievements,
    })
}
