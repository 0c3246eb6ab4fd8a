//! Reference store over the SQLite database

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::references::{self, AchievementReference};
use crate::db::ReferenceDb;
use crate::error::StoreError;
use crate::store::ReferenceStore;
use crate::types::AchievementStatus;

pub struct SqliteReferenceStore {
    db: Arc<ReferenceDb>,
}

impl SqliteReferenceStore {
    pub fn new(db: Arc<ReferenceDb>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReferenceStore for SqliteReferenceStore {
    async fn insert(
        &self,
        student_id: &str,
        content_id: &str,
    ) -> Result<AchievementReference, StoreError> {
        self.db
            .with_conn(|conn| references::insert_reference(conn, student_id, content_id))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<AchievementReference>, StoreError> {
        self.db.with_conn(|conn| references::get_reference(conn, id))
    }

    async fn find_by_content_id(
        &self,
        content_id: &str,
    ) -> Result<Option<AchievementReference>, StoreError> {
        self.db
            .with_conn(|conn| references::get_by_content_id(conn, content_id))
    }

    async fn update_status(
        &self,
        id: &str,
        expected: AchievementStatus,
        status: AchievementStatus,
        submitted_at: Option<DateTime<Utc>>,
    ) -> Result<AchievementReference, StoreError> {
        self.db.with_conn(|conn| {
            references::update_status(conn, id, expected, status, submitted_at)
        })
    }

    async fn touch(&self, id: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| references::touch_reference(conn, id))
    }

    async fn mark_verified(
        &self,
        id: &str,
        verifier_id: &str,
    ) -> Result<AchievementReference, StoreError> {
        self.db
            .with_conn(|conn| references::mark_verified(conn, id, verifier_id))
    }

    async fn mark_rejected(&self, id: &str, note: &str) -> Result<AchievementReference, StoreError> {
        self.db
            .with_conn(|conn| references::mark_rejected(conn, id, note))
    }

    async fn find_by_student_id(
        &self,
        student_id: &str,
    ) -> Result<Vec<AchievementReference>, StoreError> {
        let ids = [student_id.to_string()];
        self.db
            .with_conn(|conn| references::list_references(conn, Some(&ids)))
    }

    async fn find_by_student_ids(
        &self,
        student_ids: &[String],
    ) -> Result<Vec<AchievementReference>, StoreError> {
        self.db
            .with_conn(|conn| references::list_references(conn, Some(student_ids)))
    }

    async fn find_all(&self) -> Result<Vec<AchievementReference>, StoreError> {
        self.db.with_conn(|conn| references::list_references(conn, None))
    }

    async fn count_by_status(
        &self,
        student_ids: Option<&[String]>,
    ) -> Result<HashMap<AchievementStatus, u64>, StoreError> {
        self.db
            .with_conn(|conn| references::count_by_status(conn, student_ids))
    }

    async fn find_content_ids_by_status(
        &self,
        status: AchievementStatus,
        student_ids: Option<&[String]>,
    ) -> Result<Vec<String>, StoreError> {
        self.db
            .with_conn(|conn| references::content_ids_by_status(conn, status, student_ids))
    }
}
