//! Achievement content document schema
//!
//! The free-form half of an achievement: everything a student describes about
//! it. Workflow state (status, verifier, timestamps of review) lives in the
//! reference store, see `crate::db::references`.

use bson::{doc, oid::ObjectId, DateTime, Document};
use chrono::Utc;
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for achievement content
pub const ACHIEVEMENT_COLLECTION: &str = "achievements";

/// Kind of achievement
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AchievementType {
    Academic,
    Competition,
    Organization,
    Publication,
    Certification,
    #[default]
    Other,
}

impl AchievementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Academic => "academic",
            Self::Competition => "competition",
            Self::Organization => "organization",
            Self::Publication => "publication",
            Self::Certification => "certification",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for AchievementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AchievementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "academic" => Ok(Self::Academic),
            "competition" => Ok(Self::Competition),
            "organization" => Ok(Self::Organization),
            "publication" => Ok(Self::Publication),
            "certification" => Ok(Self::Certification),
            "other" => Ok(Self::Other),
            other => Err(format!(
                "unknown achievement type '{}' (expected academic, competition, organization, publication, certification or other)",
                other
            )),
        }
    }
}

/// Competition tier
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CompetitionLevel {
    International,
    National,
    Regional,
    Local,
}

/// Publication venue kind
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PublicationType {
    Journal,
    Conference,
    Book,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompetitionDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competition_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competition_level: Option<CompetitionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medal_type: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicationDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_type: Option<PublicationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issn: Option<String>,
}

/// Start/end of an organizational role
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Period {
    pub start: chrono::DateTime<Utc>,
    pub end: chrono::DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<Period>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertificationDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certification_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certification_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<chrono::DateTime<Utc>>,
}

/// Type-specific part of the detail payload, keyed by achievement type
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TypeDetails {
    Academic,
    Competition(CompetitionDetails),
    Organization(OrganizationDetails),
    Publication(PublicationDetails),
    Certification(CertificationDetails),
    #[default]
    Other,
}

impl TypeDetails {
    pub fn achievement_type(&self) -> AchievementType {
        match self {
            Self::Academic => AchievementType::Academic,
            Self::Competition(_) => AchievementType::Competition,
            Self::Organization(_) => AchievementType::Organization,
            Self::Publication(_) => AchievementType::Publication,
            Self::Certification(_) => AchievementType::Certification,
            Self::Other => AchievementType::Other,
        }
    }

    /// Empty variant for a declared type
    pub fn empty_for(ty: AchievementType) -> Self {
        match ty {
            AchievementType::Academic => Self::Academic,
            AchievementType::Competition => Self::Competition(CompetitionDetails::default()),
            AchievementType::Organization => Self::Organization(OrganizationDetails::default()),
            AchievementType::Publication => Self::Publication(PublicationDetails::default()),
            AchievementType::Certification => Self::Certification(CertificationDetails::default()),
            AchievementType::Other => Self::Other,
        }
    }
}

/// Detail payload: fields common to every type plus the typed variant
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AchievementDetails {
    #[serde(default)]
    pub specific: TypeDetails,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Open extension map for fields no variant models yet
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_fields: BTreeMap<String, serde_json::Value>,
}

impl AchievementDetails {
    /// Check the payload against the declared type.
    ///
    /// An `Other` variant means "not given" and is replaced by the declared
    /// type's empty variant. Only the fields of the declared variant are
    /// checked.
    pub fn normalized_for(mut self, ty: AchievementType) -> Result<Self, String> {
        if self.specific == TypeDetails::Other && ty != AchievementType::Other {
            self.specific = TypeDetails::empty_for(ty);
        }

        let declared = self.specific.achievement_type();
        if declared != ty {
            return Err(format!(
                "details describe a {} achievement but the achievement type is {}",
                declared, ty
            ));
        }

        match &self.specific {
            TypeDetails::Competition(c) => {
                if matches!(c.rank, Some(rank) if rank < 1) {
                    return Err("rank must be 1 or greater".into());
                }
            }
            TypeDetails::Organization(o) => {
                if let Some(period) = &o.period {
                    if period.end < period.start {
                        return Err("organization period ends before it starts".into());
                    }
                }
            }
            TypeDetails::Publication(p) => {
                if p.authors.iter().any(|a| a.trim().is_empty()) {
                    return Err("publication authors must not be blank".into());
                }
            }
            _ => {}
        }

        if let Some(score) = self.score {
            if !score.is_finite() {
                return Err("score must be a finite number".into());
            }
        }

        Ok(self)
    }

    pub fn competition_level(&self) -> Option<CompetitionLevel> {
        match &self.specific {
            TypeDetails::Competition(c) => c.competition_level,
            _ => None,
        }
    }
}

/// File attached to an achievement
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub file_name: String,
    pub file_url: String,
    pub file_type: String,
    /// Assigned by the store when the attachment is appended
    pub uploaded_at: DateTime,
}

/// Achievement content document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AchievementDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Owning student
    pub student_id: String,

    pub achievement_type: AchievementType,

    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub details: AchievementDetails,

    #[serde(default)]
    pub attachments: Vec<Attachment>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub points: i64,
}

impl AchievementDoc {
    /// Hex form of the document ID, empty until inserted
    pub fn id(&self) -> String {
        self._id.map(|oid| oid.to_hex()).unwrap_or_default()
    }

    pub fn is_deleted(&self) -> bool {
        self.metadata.is_deleted
    }
}

impl IntoIndexes for AchievementDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "studentId": 1, "metadata.isDeleted": 1 },
                Some(
                    IndexOptions::builder()
                        .name("student_active_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "achievementType": 1 },
                Some(
                    IndexOptions::builder()
                        .name("achievement_type_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "metadata.createdAt": -1 },
                Some(
                    IndexOptions::builder()
                        .name("created_at_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for AchievementDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
