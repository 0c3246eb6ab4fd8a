//! Store adapters
//!
//! The lifecycle and aggregation engines only see these two traits. Content
//! lives in a document store ([`MongoContentStore`], [`MemoryContentStore`]),
//! workflow rows in a relational store ([`SqliteReferenceStore`]). Neither
//! trait offers a transaction spanning both.

pub mod memory;
pub mod mongo;
pub mod sqlite;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::str::FromStr;

use crate::db::references::AchievementReference;
use crate::db::schemas::{AchievementDetails, AchievementDoc, AchievementType, Attachment};
use crate::error::StoreError;
use crate::types::AchievementStatus;

pub use memory::MemoryContentStore;
pub use mongo::MongoContentStore;
pub use sqlite::SqliteReferenceStore;

// =============================================================================
// Content store
// =============================================================================

/// Predicate over active content documents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentFilter {
    /// Restrict to these owners; `Some(empty)` matches nothing
    pub student_ids: Option<Vec<String>>,
    /// Restrict to these content ids; `Some(empty)` matches nothing
    pub content_ids: Option<Vec<String>>,
    pub achievement_type: Option<AchievementType>,
    /// Inclusive lower bound on creation time
    pub created_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on creation time
    pub created_to: Option<DateTime<Utc>>,
}

impl ContentFilter {
    pub fn for_students(student_ids: Option<&[String]>) -> Self {
        Self {
            student_ids: student_ids.map(|ids| ids.to_vec()),
            ..Default::default()
        }
    }

    /// Whether the filter can only match the empty set
    pub fn is_empty_set(&self) -> bool {
        matches!(&self.student_ids, Some(ids) if ids.is_empty())
            || matches!(&self.content_ids, Some(ids) if ids.is_empty())
    }

    /// Evaluate against a document. Soft-deletion is not considered here.
    pub fn matches(&self, doc: &AchievementDoc) -> bool {
        if let Some(ids) = &self.student_ids {
            if !ids.iter().any(|id| *id == doc.student_id) {
                return false;
            }
        }
        if let Some(ids) = &self.content_ids {
            let id = doc.id();
            if !ids.iter().any(|c| *c == id) {
                return false;
            }
        }
        if let Some(ty) = self.achievement_type {
            if doc.achievement_type != ty {
                return false;
            }
        }

        let created = doc.metadata.created_at.map(|t| t.to_chrono());
        if let Some(from) = self.created_from {
            if !matches!(created, Some(c) if c >= from) {
                return false;
            }
        }
        if let Some(to) = self.created_to {
            if !matches!(created, Some(c) if c <= to) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    CreatedAt,
    UpdatedAt,
    Title,
    Points,
}

impl SortKey {
    /// Document field path in the content collection
    pub fn field(&self) -> &'static str {
        match self {
            Self::CreatedAt => "metadata.createdAt",
            Self::UpdatedAt => "metadata.updatedAt",
            Self::Title => "title",
            Self::Points => "points",
        }
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "createdAt" | "created_at" => Ok(Self::CreatedAt),
            "updatedAt" | "updated_at" => Ok(Self::UpdatedAt),
            "title" => Ok(Self::Title),
            "points" => Ok(Self::Points),
            other => Err(format!("unknown sort key '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!("unknown sort order '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentSort {
    pub key: SortKey,
    pub order: SortOrder,
}

/// Grouping dimension for aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    AchievementType,
    /// Competition documents only; documents without a level are skipped
    CompetitionLevel,
    StudentId,
}

/// One group of an aggregation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupTally {
    pub key: String,
    pub count: u64,
    pub points: i64,
}

/// Field changes applied by an update. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub details: Option<AchievementDetails>,
    pub tags: Option<Vec<String>>,
    pub points: Option<i64>,
}

/// Document store holding achievement content
#[async_trait::async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert a new document; returns it with id and timestamps assigned
    async fn insert(&self, doc: AchievementDoc) -> Result<AchievementDoc, StoreError>;

    /// Find by hex id. Malformed ids resolve to `None`.
    async fn find_by_id(
        &self,
        id: &str,
        include_deleted: bool,
    ) -> Result<Option<AchievementDoc>, StoreError>;

    /// Apply a patch to an active document and refresh its update time
    async fn update_fields(&self, id: &str, patch: ContentPatch) -> Result<(), StoreError>;

    /// Flag a document as deleted
    async fn soft_delete(&self, id: &str) -> Result<(), StoreError>;

    /// Append an attachment; `uploaded_at` is assigned by the store
    async fn append_attachment(&self, id: &str, attachment: Attachment) -> Result<(), StoreError>;

    /// One page of active documents plus the total match count before paging
    async fn find_many(
        &self,
        filter: &ContentFilter,
        sort: ContentSort,
        skip: u64,
        limit: u64,
    ) -> Result<(Vec<AchievementDoc>, u64), StoreError>;

    /// Count and point sum of active documents per group
    async fn aggregate_by_group(
        &self,
        filter: &ContentFilter,
        key: GroupKey,
    ) -> Result<Vec<GroupTally>, StoreError>;

    /// Sum of `points` over active documents
    async fn sum_points(&self, filter: &ContentFilter) -> Result<i64, StoreError>;
}

// =============================================================================
// Reference store
// =============================================================================

/// Relational store holding one workflow row per content document
#[async_trait::async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn insert(
        &self,
        student_id: &str,
        content_id: &str,
    ) -> Result<AchievementReference, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<AchievementReference>, StoreError>;

    async fn find_by_content_id(
        &self,
        content_id: &str,
    ) -> Result<Option<AchievementReference>, StoreError>;

    /// Compare-and-set status write
    async fn update_status(
        &self,
        id: &str,
        expected: AchievementStatus,
        status: AchievementStatus,
        submitted_at: Option<DateTime<Utc>>,
    ) -> Result<AchievementReference, StoreError>;

    /// Refresh the mutation timestamp without touching status
    async fn touch(&self, id: &str) -> Result<(), StoreError>;

    /// submitted → verified
    async fn mark_verified(
        &self,
        id: &str,
        verifier_id: &str,
    ) -> Result<AchievementReference, StoreError>;

    /// submitted → rejected
    async fn mark_rejected(&self, id: &str, note: &str) -> Result<AchievementReference, StoreError>;

    async fn find_by_student_id(
        &self,
        student_id: &str,
    ) -> Result<Vec<AchievementReference>, StoreError>;

    async fn find_by_student_ids(
        &self,
        student_ids: &[String],
    ) -> Result<Vec<AchievementReference>, StoreError>;

    async fn find_all(&self) -> Result<Vec<AchievementReference>, StoreError>;

    /// Non-deleted rows per status, optionally scoped to students
    async fn count_by_status(
        &self,
        student_ids: Option<&[String]>,
    ) -> Result<HashMap<AchievementStatus, u64>, StoreError>;

    async fn find_content_ids_by_status(
        &self,
        status: AchievementStatus,
        student_ids: Option<&[String]>,
    ) -> Result<Vec<String>, StoreError>;
}
