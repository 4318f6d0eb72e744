//! Demo accounts for development mode
//!
//! On an empty database, creates one admin, one lecturer and one student
//! advised by that lecturer so the API can be exercised right away.

use tracing::info;

use super::directory::{NewUser, SqliteDirectory};
use super::schema::{ROLE_ADMIN, ROLE_LECTURER, ROLE_STUDENT};
use crate::auth::hash_password;
use crate::types::Result;

/// Password shared by all demo accounts
pub const DEMO_PASSWORD: &str = "accolade-demo";

/// Returns `false` when the database already had users.
pub async fn seed_demo_accounts(directory: &SqliteDirectory) -> Result<bool> {
    if directory.user_count().await? > 0 {
        return Ok(false);
    }

    let password_hash = hash_password(DEMO_PASSWORD)?;
    let account = |username: &str, full_name: &str, role_id: &str| NewUser {
        username: username.to_string(),
        email: format!("{}@accolade.local", username),
        password_hash: password_hash.clone(),
        full_name: full_name.to_string(),
        role_id: role_id.to_string(),
    };

    directory
        .create_user(account("admin", "Demo Administrator", ROLE_ADMIN))
        .await?;

    let lecturer_user = directory
        .create_user(account("lecturer", "Demo Lecturer", ROLE_LECTURER))
        .await?;
    let lecturer_id = directory
        .create_lecturer(&lecturer_user, "LEC-0001", "Computer Science")
        .await?;

    let student_user = directory
        .create_user(account("student", "Demo Student", ROLE_STUDENT))
        .await?;
    directory
        .create_student(
            &student_user,
            "STU-0001",
            "Computer Science",
            "2024/2025",
            Some(&lecturer_id),
        )
        .await?;

    info!(
        "Seeded demo accounts admin/lecturer/student (password: {})",
        DEMO_PASSWORD
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteDb;
    use crate::lifecycle::store::IdentityDirectory;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_seed_once() {
        let db = Arc::new(SqliteDb::open_in_memory().unwrap());
        let dir = SqliteDirectory::new(db);

        assert!(seed_demo_accounts(&dir).await.unwrap());
        assert!(!seed_demo_accounts(&dir).await.unwrap());

        let student = dir.find_credentials("student").await.unwrap().unwrap();
        let principal = dir
            .resolve_principal(&student.user_id, &student.role_id)
            .await
            .unwrap();
        let student_id = principal.student_id().unwrap().to_string();

        let lecturer = dir.find_credentials("lecturer").await.unwrap().unwrap();
        let supervisor = dir
            .resolve_principal(&lecturer.user_id, &lecturer.role_id)
            .await
            .unwrap();
        assert_eq!(
            dir.advisor_of(&student_id).await.unwrap().as_deref(),
            supervisor.lecturer_id()
        );
    }
}
