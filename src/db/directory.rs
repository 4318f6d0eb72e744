//! SQLite identity directory
//!
//! Maps authenticated users onto principals (student, supervisor, admin),
//! answers advisor lookups for the lifecycle engine and provides the login
//! lookups behind `/auth`. Account registration is limited to what demo
//! seeding and tests need.

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::schema::{ROLE_NAME_ADMIN, ROLE_NAME_LECTURER, ROLE_NAME_STUDENT};
use super::{format_ts, SqliteDb};
use crate::lifecycle::access::{Principal, PrincipalKind};
use crate::lifecycle::model::now_micros;
use crate::lifecycle::store::{Credentials, IdentityDirectory, Population, StudentProfile};
use crate::types::{AccoladeError, Result};

/// Input for registering an account
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role_id: String,
}

pub struct SqliteDirectory {
    db: Arc<SqliteDb>,
}

impl SqliteDirectory {
    pub fn new(db: Arc<SqliteDb>) -> Self {
        Self { db }
    }

    /// Register an account; returns the new user id.
    pub async fn create_user(&self, user: NewUser) -> Result<String> {
        self.db
            .call(move |conn| {
                let id = Uuid::new_v4().to_string();
                let now = format_ts(&now_micros());
                conn.execute(
                    "INSERT INTO users
                     (id, username, email, password_hash, full_name, role_id, is_active, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)",
                    params![
                        id,
                        user.username,
                        user.email,
                        user.password_hash,
                        user.full_name,
                        user.role_id,
                        now
                    ],
                )?;
                Ok(id)
            })
            .await
    }

    /// Attach a lecturer profile to a user; returns the lecturer id.
    pub async fn create_lecturer(
        &self,
        user_id: &str,
        lecturer_number: &str,
        department: &str,
    ) -> Result<String> {
        let (user_id, lecturer_number, department) =
            (user_id.to_string(), lecturer_number.to_string(), department.to_string());
        self.db
            .call(move |conn| {
                let id = Uuid::new_v4().to_string();
                conn.execute(
                    "INSERT INTO lecturers (id, user_id, lecturer_id, department, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![id, user_id, lecturer_number, department, format_ts(&now_micros())],
                )?;
                Ok(id)
            })
            .await
    }

    /// Attach a student profile to a user; returns the student id.
    pub async fn create_student(
        &self,
        user_id: &str,
        student_number: &str,
        program_study: &str,
        academic_year: &str,
        advisor_id: Option<&str>,
    ) -> Result<String> {
        let (user_id, student_number, program_study, academic_year) = (
            user_id.to_string(),
            student_number.to_string(),
            program_study.to_string(),
            academic_year.to_string(),
        );
        let advisor_id = advisor_id.map(str::to_string);
        self.db
            .call(move |conn| {
                let id = Uuid::new_v4().to_string();
                conn.execute(
                    "INSERT INTO students
                     (id, user_id, student_id, program_study, academic_year, advisor_id, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        id,
                        user_id,
                        student_number,
                        program_study,
                        academic_year,
                        advisor_id,
                        format_ts(&now_micros())
                    ],
                )?;
                Ok(id)
            })
            .await
    }

    /// Enable or disable login for a user.
    pub async fn set_active(&self, user_id: &str, active: bool) -> Result<()> {
        let user_id = user_id.to_string();
        self.db
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE users SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
                    params![active, format_ts(&now_micros()), user_id],
                )?;
                if changed == 0 {
                    return Err(AccoladeError::NotFound(format!("user {}", user_id)));
                }
                Ok(())
            })
            .await
    }

    pub async fn user_count(&self) -> Result<u64> {
        self.db
            .call(|conn| {
                let n: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
                Ok(n as u64)
            })
            .await
    }
}

#[async_trait]
impl IdentityDirectory for SqliteDirectory {
    async fn resolve_principal(&self, user_id: &str, role_id: &str) -> Result<Principal> {
        let (user_id, role_id) = (user_id.to_string(), role_id.to_string());
        self.db
            .call(move |conn| {
                let user: Option<(String, String, bool)> = conn
                    .query_row(
                        "SELECT u.role_id, r.name, u.is_active
                         FROM users u JOIN roles r ON r.id = u.role_id
                         WHERE u.id = ?1",
                        [&user_id],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                    )
                    .optional()?;

                let (stored_role, role_name, active) = user
                    .ok_or_else(|| AccoladeError::Unauthorized("unknown user".into()))?;
                if !active {
                    return Err(AccoladeError::Unauthorized("account is inactive".into()));
                }
                if stored_role != role_id {
                    return Err(AccoladeError::Unauthorized(
                        "role changed since token was issued".into(),
                    ));
                }

                let mut stmt = conn.prepare(
                    "SELECT p.name FROM role_permissions rp
                     JOIN permissions p ON p.id = rp.permission_id
                     WHERE rp.role_id = ?1 ORDER BY p.name",
                )?;
                let permissions = stmt
                    .query_map([&role_id], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                let kind = match role_name.as_str() {
                    ROLE_NAME_STUDENT => {
                        let student_id: Option<String> = conn
                            .query_row("SELECT id FROM students WHERE user_id = ?1", [&user_id], |row| {
                                row.get(0)
                            })
                            .optional()?;
                        PrincipalKind::Student {
                            student_id: student_id.ok_or_else(|| {
                                AccoladeError::Forbidden("no student profile for this user".into())
                            })?,
                        }
                    }
                    ROLE_NAME_LECTURER => {
                        let lecturer_id: Option<String> = conn
                            .query_row("SELECT id FROM lecturers WHERE user_id = ?1", [&user_id], |row| {
                                row.get(0)
                            })
                            .optional()?;
                        PrincipalKind::Supervisor {
                            lecturer_id: lecturer_id.ok_or_else(|| {
                                AccoladeError::Forbidden("no lecturer profile for this user".into())
                            })?,
                        }
                    }
                    ROLE_NAME_ADMIN => PrincipalKind::Admin,
                    other => {
                        return Err(AccoladeError::Forbidden(format!(
                            "role '{}' has no access to achievements",
                            other
                        )))
                    }
                };

                debug!(user_id = %user_id, role = %role_name, "Resolved principal");
                Ok(Principal {
                    user_id,
                    role: role_name,
                    permissions,
                    kind,
                })
            })
            .await
    }

    async fn advisor_of(&self, student_id: &str) -> Result<Option<String>> {
        let student_id = student_id.to_string();
        self.db
            .call(move |conn| {
                let advisor: Option<Option<String>> = conn
                    .query_row(
                        "SELECT advisor_id FROM students WHERE id = ?1",
                        [&student_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(advisor.flatten())
            })
            .await
    }

    async fn student_profile(&self, student_id: &str) -> Result<Option<StudentProfile>> {
        let student_id = student_id.to_string();
        self.db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT s.id, s.user_id, s.student_id, u.full_name, s.program_study,
                                s.academic_year, s.advisor_id
                         FROM students s JOIN users u ON u.id = s.user_id
                         WHERE s.id = ?1",
                        [&student_id],
                        |row| {
                            Ok(StudentProfile {
                                id: row.get(0)?,
                                user_id: row.get(1)?,
                                student_number: row.get(2)?,
                                full_name: row.get(3)?,
                                program_study: row.get(4)?,
                                academic_year: row.get(5)?,
                                advisor_id: row.get(6)?,
                            })
                        },
                    )
                    .optional()?)
            })
            .await
    }

    async fn find_credentials(&self, login: &str) -> Result<Option<Credentials>> {
        let login = login.to_string();
        self.db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT id, username, full_name, password_hash, role_id, is_active
                         FROM users WHERE username = ?1 OR email = ?1",
                        [&login],
                        |row| {
                            Ok(Credentials {
                                user_id: row.get(0)?,
                                username: row.get(1)?,
                                full_name: row.get(2)?,
                                password_hash: row.get(3)?,
                                role_id: row.get(4)?,
                                is_active: row.get(5)?,
                            })
                        },
                    )
                    .optional()?)
            })
            .await
    }

    async fn role_permissions(&self, role_id: &str) -> Result<Vec<String>> {
        let role_id = role_id.to_string();
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT p.name FROM role_permissions rp
                     JOIN permissions p ON p.id = rp.permission_id
                     WHERE rp.role_id = ?1 ORDER BY p.name",
                )?;
                let names = stmt
                    .query_map([&role_id], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(names)
            })
            .await
    }

    async fn population(&self) -> Result<Population> {
        self.db
            .call(|conn| {
                let students: i64 =
                    conn.query_row("SELECT COUNT(*) FROM students", [], |row| row.get(0))?;
                let lecturers: i64 =
                    conn.query_row("SELECT COUNT(*) FROM lecturers", [], |row| row.get(0))?;
                Ok(Population {
                    students: students as u64,
                    lecturers: lecturers as u64,
                })
            })
            .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::schema::{ROLE_ADMIN, ROLE_LECTURER, ROLE_STUDENT};
    use crate::lifecycle::access::PERMISSION_MANAGE;

    fn user(name: &str, role_id: &str) -> NewUser {
        NewUser {
            username: name.into(),
            email: format!("{}@campus.test", name),
            password_hash: "$argon2id$placeholder".into(),
            full_name: name.to_uppercase(),
            role_id: role_id.into(),
        }
    }

    /// One lecturer advising one student; returns (student_id, lecturer_id).
    pub(crate) async fn seed_pair(db: &Arc<SqliteDb>) -> (String, String) {
        let dir = SqliteDirectory::new(Arc::clone(db));
        let lecturer_user = dir.create_user(user("dosen", ROLE_LECTURER)).await.unwrap();
        let lecturer_id = dir
            .create_lecturer(&lecturer_user, "L-001", "Informatics")
            .await
            .unwrap();
        let student_user = dir.create_user(user("mhs", ROLE_STUDENT)).await.unwrap();
        let student_id = dir
            .create_student(&student_user, "S-001", "Informatics", "2024", Some(&lecturer_id))
            .await
            .unwrap();
        (student_id, lecturer_id)
    }

    #[tokio::test]
    async fn test_resolve_student_and_supervisor() {
        let db = Arc::new(SqliteDb::open_in_memory().unwrap());
        let (student_id, lecturer_id) = seed_pair(&db).await;
        let dir = SqliteDirectory::new(db);

        let creds = dir.find_credentials("mhs").await.unwrap().unwrap();
        let p = dir
            .resolve_principal(&creds.user_id, ROLE_STUDENT)
            .await
            .unwrap();
        assert_eq!(p.student_id(), Some(student_id.as_str()));
        assert!(!p.is_admin());

        let creds = dir.find_credentials("dosen@campus.test").await.unwrap().unwrap();
        let p = dir
            .resolve_principal(&creds.user_id, ROLE_LECTURER)
            .await
            .unwrap();
        assert_eq!(p.lecturer_id(), Some(lecturer_id.as_str()));

        assert_eq!(
            dir.advisor_of(&student_id).await.unwrap(),
            Some(lecturer_id)
        );
        assert_eq!(dir.advisor_of("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_resolve_admin_has_override() {
        let db = Arc::new(SqliteDb::open_in_memory().unwrap());
        let dir = SqliteDirectory::new(db);
        let id = dir.create_user(user("root", ROLE_ADMIN)).await.unwrap();

        let p = dir.resolve_principal(&id, ROLE_ADMIN).await.unwrap();
        assert_eq!(p.kind, PrincipalKind::Admin);
        assert!(p.has_permission(PERMISSION_MANAGE));
    }

    #[tokio::test]
    async fn test_inactive_and_stale_role_rejected() {
        let db = Arc::new(SqliteDb::open_in_memory().unwrap());
        let dir = SqliteDirectory::new(db);
        let id = dir.create_user(user("root", ROLE_ADMIN)).await.unwrap();

        let err = dir.resolve_principal(&id, ROLE_STUDENT).await.unwrap_err();
        assert!(matches!(err, AccoladeError::Unauthorized(_)));

        dir.set_active(&id, false).await.unwrap();
        let err = dir.resolve_principal(&id, ROLE_ADMIN).await.unwrap_err();
        assert!(matches!(err, AccoladeError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_student_without_profile_is_forbidden() {
        let db = Arc::new(SqliteDb::open_in_memory().unwrap());
        let dir = SqliteDirectory::new(db);
        let id = dir.create_user(user("ghost", ROLE_STUDENT)).await.unwrap();

        let err = dir.resolve_principal(&id, ROLE_STUDENT).await.unwrap_err();
        assert!(matches!(err, AccoladeError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_duplicate_username_is_unique_violation() {
        let db = Arc::new(SqliteDb::open_in_memory().unwrap());
        let dir = SqliteDirectory::new(db);
        dir.create_user(user("same", ROLE_ADMIN)).await.unwrap();

        let err = dir.create_user(user("same", ROLE_ADMIN)).await.unwrap_err();
        assert!(matches!(err, AccoladeError::UniqueConstraintViolation(_)));
    }

    #[tokio::test]
    async fn test_profile_and_population() {
        let db = Arc::new(SqliteDb::open_in_memory().unwrap());
        let (student_id, _) = seed_pair(&db).await;
        let dir = SqliteDirectory::new(db);

        let profile = dir.student_profile(&student_id).await.unwrap().unwrap();
        assert_eq!(profile.student_number, "S-001");
        assert_eq!(profile.full_name, "MHS");

        let population = dir.population().await.unwrap();
        assert_eq!(population.students, 1);
        assert_eq!(population.lecturers, 1);
        assert_eq!(dir.user_count().await.unwrap(), 2);
    }
}
