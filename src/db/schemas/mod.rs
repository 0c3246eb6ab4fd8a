//! Document schemas for the content store
//!
//! Defines the MongoDB document structure for achievement content.

mod achievement;
mod metadata;

pub use achievement::{
    AchievementDetails, AchievementDoc, AchievementType, Attachment, CertificationDetails,
    CompetitionDetails, CompetitionLevel, OrganizationDetails, Period, PublicationDetails,
    PublicationType, TypeDetails, ACHIEVEMENT_COLLECTION,
};
pub use metadata::Metadata;
