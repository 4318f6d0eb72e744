//! Shared fixture: in-memory SQLite, in-memory details, temp upload dir,
//! and one principal per role.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

use accolade::auth::hash_password;
use accolade::db::schema::{ROLE_ADMIN, ROLE_LECTURER, ROLE_STUDENT};
use accolade::db::{NewUser, SqliteDb, SqliteDirectory, SqliteReferenceStore};
use accolade::lifecycle::{
    AchievementReference, AchievementStatus, IdentityDirectory, InMemoryDetailStore,
    LifecycleEngine, ListScope, NewAchievement, Principal, ReferenceStore,
};
use accolade::types::{AccoladeError, Result};
use accolade::uploads::LocalFileStorage;

pub const PASSWORD: &str = "correct horse battery";

/// Reference store wrapper that can be told to fail inserts or stall writes
pub struct FlakyReferences {
    inner: SqliteReferenceStore,
    fail_insert: AtomicBool,
    write_delay_ms: AtomicU64,
}

impl FlakyReferences {
    pub fn fail_insert(&self, enabled: bool) {
        self.fail_insert.store(enabled, Ordering::SeqCst);
    }

    /// Sleep before every insert and conditional update.
    pub fn delay_writes(&self, delay: Duration) {
        self.write_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    async fn stall(&self) {
        let delay = self.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
}

#[async_trait]
impl ReferenceStore for FlakyReferences {
    async fn insert(&self, reference: &AchievementReference) -> Result<()> {
        self.stall().await;
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(AccoladeError::StoreUnavailable("injected insert failure".into()));
        }
        self.inner.insert(reference).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<AchievementReference>> {
        self.inner.get(id).await
    }

    async fn update_if_unchanged(
        &self,
        next: &AchievementReference,
        observed: &AchievementReference,
    ) -> Result<bool> {
        self.stall().await;
        self.inner.update_if_unchanged(next, observed).await
    }

    async fn list(&self, scope: &ListScope) -> Result<Vec<AchievementReference>> {
        self.inner.list(scope).await
    }

    async fn count_by_status(&self) -> Result<Vec<(AchievementStatus, u64)>> {
        self.inner.count_by_status().await
    }
}

pub struct Fixture {
    pub db: Arc<SqliteDb>,
    pub directory: Arc<SqliteDirectory>,
    pub references: Arc<FlakyReferences>,
    pub details: Arc<InMemoryDetailStore>,
    pub engine: Arc<LifecycleEngine>,
    pub uploads: TempDir,
    /// Student advised by `advisor`
    pub student: Principal,
    /// Second student, also advised by `advisor`
    pub classmate: Principal,
    pub advisor: Principal,
    /// Lecturer with no advisees
    pub stranger: Principal,
    pub admin: Principal,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_timeout(Duration::from_secs(5)).await
    }

    pub async fn with_timeout(timeout: Duration) -> Self {
        let db = Arc::new(SqliteDb::open_in_memory().unwrap());
        let directory = Arc::new(SqliteDirectory::new(Arc::clone(&db)));
        let references = Arc::new(FlakyReferences {
            inner: SqliteReferenceStore::new(Arc::clone(&db)),
            fail_insert: AtomicBool::new(false),
            write_delay_ms: AtomicU64::new(0),
        });
        let details = Arc::new(InMemoryDetailStore::new());
        let uploads = TempDir::new().unwrap();
        let files = Arc::new(LocalFileStorage::new(uploads.path(), 1024 * 1024));

        let password_hash = hash_password(PASSWORD).unwrap();
        let user = |name: &str, role_id: &str| NewUser {
            username: name.to_string(),
            email: format!("{}@kampus.test", name),
            password_hash: password_hash.clone(),
            full_name: format!("{} (test)", name),
            role_id: role_id.to_string(),
        };

        let advisor_user = directory.create_user(user("pembimbing", ROLE_LECTURER)).await.unwrap();
        let advisor_id = directory
            .create_lecturer(&advisor_user, "L-100", "Informatics")
            .await
            .unwrap();
        let stranger_user = directory.create_user(user("dosenlain", ROLE_LECTURER)).await.unwrap();
        directory
            .create_lecturer(&stranger_user, "L-200", "Physics")
            .await
            .unwrap();

        let student_user = directory.create_user(user("budi", ROLE_STUDENT)).await.unwrap();
        directory
            .create_student(&student_user, "S-100", "Informatics", "2023", Some(&advisor_id))
            .await
            .unwrap();
        let classmate_user = directory.create_user(user("siti", ROLE_STUDENT)).await.unwrap();
        directory
            .create_student(&classmate_user, "S-101", "Informatics", "2023", Some(&advisor_id))
            .await
            .unwrap();
        let admin_user = directory.create_user(user("admin", ROLE_ADMIN)).await.unwrap();

        let resolve = |user_id: String, role_id: &'static str| {
            let directory = Arc::clone(&directory);
            async move { directory.resolve_principal(&user_id, role_id).await.unwrap() }
        };
        let student = resolve(student_user, ROLE_STUDENT).await;
        let classmate = resolve(classmate_user, ROLE_STUDENT).await;
        let advisor = resolve(advisor_user, ROLE_LECTURER).await;
        let stranger = resolve(stranger_user, ROLE_LECTURER).await;
        let admin = resolve(admin_user, ROLE_ADMIN).await;

        let engine = Arc::new(
            LifecycleEngine::new(
                references.clone(),
                details.clone(),
                directory.clone(),
                files,
            )
            .with_store_timeout(timeout),
        );

        Self {
            db,
            directory,
            references,
            details,
            engine,
            uploads,
            student,
            classmate,
            advisor,
            stranger,
            admin,
        }
    }

    /// A second engine over the same stores, for wiring into `AppState`.
    pub fn engine_copy(&self) -> LifecycleEngine {
        LifecycleEngine::new(
            self.references.clone(),
            self.details.clone(),
            self.directory.clone(),
            Arc::new(LocalFileStorage::new(self.uploads.path(), 1024 * 1024)),
        )
    }

    /// Draft owned by `self.student`; returns its id.
    pub async fn draft(&self, title: &str, points: i64) -> Uuid {
        self.engine
            .create(&self.student, achievement(title, points))
            .await
            .unwrap()
            .id
    }

    /// Submitted achievement owned by `self.student`.
    pub async fn submitted(&self, title: &str, points: i64) -> Uuid {
        let id = self.draft(title, points).await;
        self.engine.submit(&self.student, id).await.unwrap();
        id
    }

    pub async fn reference(&self, id: Uuid) -> AchievementReference {
        self.references.get(id).await.unwrap().unwrap()
    }
}

pub fn achievement(title: &str, points: i64) -> NewAchievement {
    NewAchievement {
        achievement_type: "competition".into(),
        title: title.into(),
        description: "National programming contest".into(),
        tags: vec!["programming".into()],
        points,
        ..Default::default()
    }
}
