//! Presentation composer
//!
//! Overlays the reference-owned workflow fields onto a content document.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::references::AchievementReference;
use crate::db::schemas::{AchievementDetails, AchievementDoc, AchievementType, Attachment};
use crate::types::AchievementStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentView {
    pub file_name: String,
    pub file_url: String,
    pub file_type: String,
    pub uploaded_at: DateTime<Utc>,
}

impl From<Attachment> for AttachmentView {
    fn from(a: Attachment) -> Self {
        Self {
            file_name: a.file_name,
            file_url: a.file_url,
            file_type: a.file_type,
            uploaded_at: a.uploaded_at.to_chrono(),
        }
    }
}

/// One achievement as callers see it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementView {
    /// Reference id; the handle every lifecycle operation takes
    pub id: String,
    pub content_id: String,
    pub student_id: String,
    pub achievement_type: AchievementType,
    pub title: String,
    pub description: String,
    pub details: AchievementDetails,
    pub attachments: Vec<AttachmentView>,
    pub tags: Vec<String>,
    pub points: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,

    pub status: AchievementStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<String>,
    pub rejection_note: Option<String>,
}

/// Merge a content document with its reference row
pub fn compose(content: AchievementDoc, reference: AchievementReference) -> AchievementView {
    let content_id = content.id();
    AchievementView {
        id: reference.id,
        content_id,
        student_id: content.student_id,
        achievement_type: content.achievement_type,
        title: content.title,
        description: content.description,
        details: content.details,
        attachments: content.attachments.into_iter().map(Into::into).collect(),
        tags: content.tags,
        points: content.points,
        created_at: content.metadata.created_at.map(|t| t.to_chrono()),
        updated_at: content.metadata.updated_at.map(|t| t.to_chrono()),
        status: reference.status,
        submitted_at: reference.submitted_at,
        verified_at: reference.verified_at,
        verified_by: reference.verified_by,
        rejection_note: reference.rejection_note,
    }
}
