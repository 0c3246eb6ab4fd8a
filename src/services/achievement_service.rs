//! Achievement lifecycle service
//!
//! Drives every achievement through the status state machine by composing
//! the content store and the reference store. The two stores share no
//! transaction, so every multi-step operation writes in a fixed order:
//!
//! - create: content insert, then reference insert
//! - update: content patch, then reference timestamp
//! - delete: content soft delete, then reference status
//!
//! A failure on the second step is reported as `Persistence` naming the
//! committed first step; nothing is rolled back or retried. Reads tolerate
//! the resulting inconsistencies: references whose content is missing or
//! soft-deleted are skipped by listings and are `NotFound` for `get`.
//!
//! Input validation, ownership and status checks all happen before the
//! first write.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::db::references::AchievementReference;
use crate::db::schemas::{
    AchievementDetails, AchievementDoc, AchievementType, Attachment, Metadata,
};
use crate::error::{AchievementError, Result, StoreError};
use crate::services::view::{compose, AchievementView};
use crate::store::{ContentFilter, ContentPatch, ContentSort, ContentStore, ReferenceStore};
use crate::types::AchievementStatus;

pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Upper bound on the points of one achievement
pub const MAX_POINTS: i64 = 1_000_000;

// =============================================================================
// Inputs
// =============================================================================

/// Creation request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAchievement {
    #[serde(default)]
    pub achievement_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub details: AchievementDetails,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub points: i64,
}

/// Update request; absent fields keep their value
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub details: Option<AchievementDetails>,
    pub tags: Option<Vec<String>>,
    pub points: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInput {
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub file_url: String,
    #[serde(default)]
    pub file_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationAction {
    Verify,
    Reject,
}

impl VerificationAction {
    fn operation(&self) -> &'static str {
        match self {
            Self::Verify => "verify",
            Self::Reject => "reject",
        }
    }
}

impl FromStr for VerificationAction {
    type Err = AchievementError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "verify" => Ok(Self::Verify),
            "reject" => Ok(Self::Reject),
            other => Err(AchievementError::Validation(format!(
                "invalid action '{}' (expected verify or reject)",
                other
            ))),
        }
    }
}

/// Criteria for the filtered, paginated listing
#[derive(Debug, Clone, Default)]
pub struct ListCriteria {
    pub status: Option<AchievementStatus>,
    pub achievement_type: Option<AchievementType>,
    pub student_id: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub sort: ContentSort,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementPage {
    pub items: Vec<AchievementView>,
    /// Matches before paging
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

// =============================================================================
// Service
// =============================================================================

pub struct AchievementService {
    content: Arc<dyn ContentStore>,
    references: Arc<dyn ReferenceStore>,
    max_page_size: u64,
}

impl AchievementService {
    pub fn new(
        content: Arc<dyn ContentStore>,
        references: Arc<dyn ReferenceStore>,
        max_page_size: u64,
    ) -> Self {
        Self {
            content,
            references,
            max_page_size: max_page_size.max(1),
        }
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Create a draft achievement owned by `student_id`
    pub async fn create(&self, student_id: &str, input: NewAchievement) -> Result<AchievementView> {
        if student_id.trim().is_empty() {
            return Err(AchievementError::Validation("student id is required".into()));
        }
        if input.achievement_type.trim().is_empty() {
            return Err(AchievementError::Validation("achievement type is required".into()));
        }
        let achievement_type: AchievementType = input
            .achievement_type
            .parse()
            .map_err(AchievementError::Validation)?;
        let title = required_title(&input.title)?;
        check_points(input.points)?;
        let details = input
            .details
            .normalized_for(achievement_type)
            .map_err(AchievementError::Validation)?;

        let doc = AchievementDoc {
            _id: None,
            metadata: Metadata::new(),
            student_id: student_id.to_string(),
            achievement_type,
            title,
            description: input.description,
            details,
            attachments: vec![],
            tags: normalize_tags(input.tags),
            points: input.points,
        };

        let content = self
            .content
            .insert(doc)
            .await
            .map_err(|e| AchievementError::persistence("content insert", e))?;
        let content_id = content.id();

        let reference = match self.references.insert(student_id, &content_id).await {
            Ok(reference) => reference,
            Err(e) => {
                error!(
                    content_id = %content_id,
                    student_id,
                    error = %e,
                    "Reference insert failed; content document is orphaned"
                );
                return Err(AchievementError::partial(
                    "reference insert",
                    e,
                    format!("content {} inserted without a reference", content_id),
                ));
            }
        };

        info!(reference_id = %reference.id, content_id = %content_id, student_id, "Achievement created");
        Ok(compose(content, reference))
    }

    /// Change content fields of a draft
    pub async fn update(
        &self,
        ref_id: &str,
        caller_student_id: &str,
        changes: AchievementChanges,
    ) -> Result<AchievementView> {
        let title = changes.title.as_deref().map(required_title).transpose()?;
        if let Some(points) = changes.points {
            check_points(points)?;
        }

        let reference = self.load_owned(ref_id, caller_student_id, "update").await?;
        require_status(&reference, AchievementStatus::Draft, "update")?;
        let content = self.resolve_content(&reference).await?;

        let details = changes
            .details
            .map(|d| d.normalized_for(content.achievement_type))
            .transpose()
            .map_err(AchievementError::Validation)?;

        let patch = ContentPatch {
            title,
            description: changes.description,
            details,
            tags: changes.tags.map(normalize_tags),
            points: changes.points,
        };

        self.content
            .update_fields(&reference.content_id, patch)
            .await
            .map_err(|e| AchievementError::persistence("content update", e))?;

        if let Err(e) = self.references.touch(&reference.id).await {
            error!(reference_id = %reference.id, error = %e, "Reference timestamp refresh failed after content update");
            return Err(AchievementError::partial(
                "reference timestamp",
                e,
                format!("content {} updated", reference.content_id),
            ));
        }

        info!(reference_id = %reference.id, "Achievement updated");
        self.get(ref_id).await
    }

    /// draft → submitted
    pub async fn submit(&self, ref_id: &str, caller_student_id: &str) -> Result<AchievementView> {
        let reference = self.load_owned(ref_id, caller_student_id, "submit").await?;
        require_status(&reference, AchievementStatus::Draft, "submit")?;
        let content = self.resolve_content(&reference).await?;

        let updated = match self
            .references
            .update_status(
                &reference.id,
                AchievementStatus::Draft,
                AchievementStatus::Submitted,
                Some(Utc::now()),
            )
            .await
        {
            Ok(updated) => updated,
            Err(e) => return Err(self.status_write_failed(&reference.id, "submit", e).await),
        };

        info!(reference_id = %updated.id, "Achievement submitted");
        Ok(compose(content, updated))
    }

    /// submitted → verified | rejected
    ///
    /// Ownership is not checked; verification authority is decided by the
    /// caller's role before this is reached.
    pub async fn review(
        &self,
        ref_id: &str,
        verifier_id: &str,
        action: &str,
        note: Option<&str>,
    ) -> Result<AchievementView> {
        let action: VerificationAction = action.parse()?;
        let note = note.map(str::trim).filter(|n| !n.is_empty());
        if action == VerificationAction::Reject && note.is_none() {
            return Err(AchievementError::Validation(
                "a rejection note is required".into(),
            ));
        }
        if verifier_id.trim().is_empty() {
            return Err(AchievementError::Validation("verifier id is required".into()));
        }

        let reference = self.load(ref_id).await?;
        require_status(&reference, AchievementStatus::Submitted, action.operation())?;
        let content = self.resolve_content(&reference).await?;

        let result = match (action, note) {
            (VerificationAction::Verify, _) => {
                self.references.mark_verified(&reference.id, verifier_id).await
            }
            (VerificationAction::Reject, Some(note)) => {
                self.references.mark_rejected(&reference.id, note).await
            }
            (VerificationAction::Reject, None) => {
                return Err(AchievementError::Validation(
                    "a rejection note is required".into(),
                ))
            }
        };
        let updated = match result {
            Ok(updated) => updated,
            Err(e) => {
                return Err(self
                    .status_write_failed(&reference.id, action.operation(), e)
                    .await)
            }
        };

        info!(
            reference_id = %updated.id,
            verifier_id,
            status = %updated.status,
            "Achievement reviewed"
        );
        Ok(compose(content, updated))
    }

    /// draft → deleted, soft-deleting the content first
    pub async fn delete(&self, ref_id: &str, caller_student_id: &str) -> Result<()> {
        let reference = self.load_owned(ref_id, caller_student_id, "delete").await?;
        require_status(&reference, AchievementStatus::Draft, "delete")?;

        let content = self
            .content
            .find_by_id(&reference.content_id, true)
            .await
            .map_err(|e| AchievementError::persistence("content lookup", e))?
            .ok_or_else(|| {
                AchievementError::NotFound(format!("content of achievement {}", ref_id))
            })?;

        // Content may already be soft-deleted by an earlier delete whose
        // reference update failed; only the reference is left to do then.
        let content_written = !content.is_deleted();
        if content_written {
            self.content
                .soft_delete(&reference.content_id)
                .await
                .map_err(|e| AchievementError::persistence("content soft delete", e))?;
        }

        if let Err(e) = self
            .references
            .update_status(
                &reference.id,
                AchievementStatus::Draft,
                AchievementStatus::Deleted,
                None,
            )
            .await
        {
            if !content_written {
                return Err(self.status_write_failed(&reference.id, "delete", e).await);
            }
            error!(
                reference_id = %reference.id,
                content_id = %reference.content_id,
                error = %e,
                "Reference status update failed after content soft delete"
            );
            return Err(AchievementError::partial(
                "reference status update",
                e,
                format!("content {} soft-deleted", reference.content_id),
            ));
        }

        info!(reference_id = %reference.id, content_id = %reference.content_id, "Achievement deleted");
        Ok(())
    }

    /// Append an attachment; allowed in any status
    pub async fn add_attachment(
        &self,
        ref_id: &str,
        caller_student_id: &str,
        input: AttachmentInput,
    ) -> Result<()> {
        let attachment = Attachment {
            file_name: required_field(&input.file_name, "file name")?,
            file_url: required_field(&input.file_url, "file URL")?,
            file_type: required_field(&input.file_type, "file type")?,
            uploaded_at: bson::DateTime::now(),
        };

        let reference = self.load_owned(ref_id, caller_student_id, "attach").await?;
        self.resolve_content(&reference).await?;

        self.content
            .append_attachment(&reference.content_id, attachment)
            .await
            .map_err(|e| AchievementError::persistence("attachment append", e))?;

        info!(reference_id = %reference.id, file_name = %input.file_name, "Attachment added");
        Ok(())
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub async fn get(&self, ref_id: &str) -> Result<AchievementView> {
        let reference = self.load(ref_id).await?;
        let content = self.resolve_content(&reference).await?;
        Ok(compose(content, reference))
    }

    pub async fn list_by_student(&self, student_id: &str) -> Result<Vec<AchievementView>> {
        let refs = self
            .references
            .find_by_student_id(student_id)
            .await
            .map_err(|e| AchievementError::persistence("reference listing", e))?;
        Ok(self.resolve_all(refs).await)
    }

    pub async fn list_by_students(&self, student_ids: &[String]) -> Result<Vec<AchievementView>> {
        if student_ids.is_empty() {
            return Ok(vec![]);
        }
        let refs = self
            .references
            .find_by_student_ids(student_ids)
            .await
            .map_err(|e| AchievementError::persistence("reference listing", e))?;
        Ok(self.resolve_all(refs).await)
    }

    pub async fn list_all(&self) -> Result<Vec<AchievementView>> {
        let refs = self
            .references
            .find_all()
            .await
            .map_err(|e| AchievementError::persistence("reference listing", e))?;
        Ok(self.resolve_all(refs).await)
    }

    /// Filtered, sorted, paginated listing driven by the content store
    pub async fn list_with_filter(&self, criteria: ListCriteria) -> Result<AchievementPage> {
        let page = criteria.page.unwrap_or(1);
        if page == 0 {
            return Err(AchievementError::Validation("page must be 1 or greater".into()));
        }
        let limit = criteria.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if limit == 0 {
            return Err(AchievementError::Validation("limit must be 1 or greater".into()));
        }
        let limit = limit.min(self.max_page_size);
        if let (Some(from), Some(to)) = (criteria.date_from, criteria.date_to) {
            if from > to {
                return Err(AchievementError::Validation(
                    "date range starts after it ends".into(),
                ));
            }
        }

        let student_ids = criteria.student_id.map(|id| vec![id]);
        let mut filter = ContentFilter {
            student_ids: student_ids.clone(),
            content_ids: None,
            achievement_type: criteria.achievement_type,
            created_from: criteria.date_from,
            created_to: criteria.date_to,
        };

        if let Some(status) = criteria.status {
            let ids = self
                .references
                .find_content_ids_by_status(status, student_ids.as_deref())
                .await
                .map_err(|e| AchievementError::persistence("status filter", e))?;
            filter.content_ids = Some(ids);
        }

        let skip = (page - 1)
            .checked_mul(limit)
            .ok_or_else(|| AchievementError::Validation("page out of range".into()))?;

        let (docs, total) = self
            .content
            .find_many(&filter, criteria.sort, skip, limit)
            .await
            .map_err(|e| AchievementError::persistence("content query", e))?;

        let lookups = docs.into_iter().map(|doc| async move {
            let content_id = doc.id();
            match self.references.find_by_content_id(&content_id).await {
                Ok(Some(reference)) if reference.status != AchievementStatus::Deleted => {
                    Some(compose(doc, reference))
                }
                Ok(Some(_)) => {
                    warn!(content_id = %content_id, "Skipping active content with a deleted reference");
                    None
                }
                Ok(None) => {
                    warn!(content_id = %content_id, "Skipping content without a reference");
                    None
                }
                Err(e) => {
                    warn!(content_id = %content_id, error = %e, "Skipping content; reference lookup failed");
                    None
                }
            }
        });
        let items = join_all(lookups).await.into_iter().flatten().collect();

        Ok(AchievementPage {
            items,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        })
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn load(&self, ref_id: &str) -> Result<AchievementReference> {
        self.references
            .find_by_id(ref_id)
            .await
            .map_err(|e| AchievementError::persistence("reference lookup", e))?
            .ok_or_else(|| AchievementError::NotFound(format!("achievement {}", ref_id)))
    }

    async fn load_owned(
        &self,
        ref_id: &str,
        caller_student_id: &str,
        operation: &str,
    ) -> Result<AchievementReference> {
        let reference = self.load(ref_id).await?;
        if reference.student_id != caller_student_id {
            warn!(reference_id = %ref_id, caller = caller_student_id, operation, "Ownership check failed");
            return Err(AchievementError::Unauthorized(format!(
                "you can only {} your own achievements",
                operation
            )));
        }
        Ok(reference)
    }

    /// Active content behind a reference
    async fn resolve_content(&self, reference: &AchievementReference) -> Result<AchievementDoc> {
        self.content
            .find_by_id(&reference.content_id, false)
            .await
            .map_err(|e| AchievementError::persistence("content lookup", e))?
            .ok_or_else(|| {
                AchievementError::NotFound(format!("content of achievement {}", reference.id))
            })
    }

    /// Resolve each reference to a view, skipping any that cannot be
    async fn resolve_all(&self, refs: Vec<AchievementReference>) -> Vec<AchievementView> {
        let lookups = refs
            .into_iter()
            .filter(|r| r.status != AchievementStatus::Deleted)
            .map(|reference| async move {
                match self.content.find_by_id(&reference.content_id, false).await {
                    Ok(Some(content)) => Some(compose(content, reference)),
                    Ok(None) => {
                        warn!(
                            reference_id = %reference.id,
                            content_id = %reference.content_id,
                            "Skipping reference with missing or deleted content"
                        );
                        None
                    }
                    Err(e) => {
                        warn!(reference_id = %reference.id, error = %e, "Skipping reference; content lookup failed");
                        None
                    }
                }
            });

        join_all(lookups).await.into_iter().flatten().collect()
    }

    /// Map a failed compare-and-set with no prior write in this operation
    async fn status_write_failed(
        &self,
        ref_id: &str,
        operation: &'static str,
        err: StoreError,
    ) -> AchievementError {
        match err {
            StoreError::StatusConflict { .. } => match self.references.find_by_id(ref_id).await {
                Ok(Some(current)) => {
                    warn!(reference_id = %ref_id, status = %current.status, operation, "Status changed concurrently");
                    AchievementError::InvalidState {
                        operation,
                        status: current.status,
                    }
                }
                Ok(None) => AchievementError::NotFound(format!("achievement {}", ref_id)),
                Err(e) => AchievementError::persistence("reference lookup", e),
            },
            StoreError::NoMatch(_) => AchievementError::NotFound(format!("achievement {}", ref_id)),
            other => AchievementError::persistence("reference status update", other),
        }
    }
}

fn require_status(
    reference: &AchievementReference,
    expected: AchievementStatus,
    operation: &'static str,
) -> Result<()> {
    if reference.status != expected {
        return Err(AchievementError::InvalidState {
            operation,
            status: reference.status,
        });
    }
    Ok(())
}

fn required_title(title: &str) -> Result<String> {
    required_field(title, "title")
}

fn required_field(value: &str, name: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AchievementError::Validation(format!("{} is required", name)));
    }
    Ok(trimmed.to_string())
}

fn check_points(points: i64) -> Result<()> {
    if points < 0 {
        return Err(AchievementError::Validation("points must not be negative".into()));
    }
    if points > MAX_POINTS {
        return Err(AchievementError::Validation(format!(
            "points must not exceed {}",
            MAX_POINTS
        )));
    }
    Ok(())
}

/// Trim, drop empties, dedupe keeping first occurrence
fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}
