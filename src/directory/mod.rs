//! Directory resolver
//!
//! Maps student and lecturer identities to display data. Statistics and
//! reports must still render when the directory is incomplete, so
//! [`Directory::student_display`] degrades to a sentinel instead of failing.

pub mod cache;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::db::students::{self, LecturerRow, StudentRow};
use crate::db::ReferenceDb;
use crate::error::StoreError;

pub use cache::{spawn_cleanup_task, CachedDirectory, DirectoryCacheConfig};

/// Display data for a student
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDisplay {
    pub name: String,
    pub student_number: String,
    pub program_study: String,
}

impl StudentDisplay {
    /// Sentinel for students the directory cannot resolve
    pub fn unknown() -> Self {
        Self {
            name: "Unknown".to_string(),
            student_number: "-".to_string(),
            program_study: String::new(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        *self == Self::unknown()
    }
}

impl From<StudentRow> for StudentDisplay {
    fn from(row: StudentRow) -> Self {
        Self {
            name: row.full_name,
            student_number: row.student_number,
            program_study: row.program_study,
        }
    }
}

pub type StudentProfile = StudentRow;
pub type LecturerProfile = LecturerRow;

#[async_trait]
pub trait Directory: Send + Sync {
    /// Display data for a student id; never fails
    async fn student_display(&self, student_id: &str) -> StudentDisplay;

    /// Student profile linked to an authenticated user
    async fn student_for_user(&self, user_id: &str) -> Result<Option<StudentProfile>, StoreError>;

    /// Lecturer profile linked to an authenticated user
    async fn lecturer_for_user(&self, user_id: &str)
        -> Result<Option<LecturerProfile>, StoreError>;

    /// Students advised by a lecturer
    async fn advisee_ids(&self, lecturer_id: &str) -> Result<Vec<String>, StoreError>;
}

/// Directory over the `students` and `lecturers` tables
pub struct SqliteDirectory {
    db: Arc<ReferenceDb>,
}

impl SqliteDirectory {
    pub fn new(db: Arc<ReferenceDb>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Directory for SqliteDirectory {
    async fn student_display(&self, student_id: &str) -> StudentDisplay {
        match self.db.with_conn(|conn| students::get_student(conn, student_id)) {
            Ok(Some(row)) => row.into(),
            Ok(None) => {
                warn!(student_id, "Student not found in directory");
                StudentDisplay::unknown()
            }
            Err(e) => {
                warn!(student_id, error = %e, "Directory lookup failed");
                StudentDisplay::unknown()
            }
        }
    }

    async fn student_for_user(&self, user_id: &str) -> Result<Option<StudentProfile>, StoreError> {
        self.db
            .with_conn(|conn| students::get_student_by_user(conn, user_id))
    }

    async fn lecturer_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<LecturerProfile>, StoreError> {
        self.db
            .with_conn(|conn| students::get_lecturer_by_user(conn, user_id))
    }

    async fn advisee_ids(&self, lecturer_id: &str) -> Result<Vec<String>, StoreError> {
        self.db
            .with_conn(|conn| students::advisee_ids(conn, lecturer_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_display_falls_back_to_sentinel() {
        let db = Arc::new(ReferenceDb::open_in_memory().unwrap());
        db.with_conn(|conn| {
            students::upsert_student(
                conn,
                &StudentRow {
                    id: "s1".into(),
                    user_id: "u1".into(),
                    student_number: "2101001".into(),
                    full_name: "Ayu Lestari".into(),
                    program_study: "Informatics".into(),
                    advisor_id: None,
                },
            )
        })
        .unwrap();

        let directory = SqliteDirectory::new(db);

        let known = directory.student_display("s1").await;
        assert_eq!(known.name, "Ayu Lestari");
        assert_eq!(known.student_number, "2101001");

        let missing = directory.student_display("ghost").await;
        assert!(missing.is_unknown());
        assert_eq!(missing.student_number, "-");

        assert_eq!(directory.student_for_user("u1").await.unwrap().unwrap().id, "s1");
        assert!(directory.lecturer_for_user("u1").await.unwrap().is_none());
    }
}
