//! Service layer for achievement-ledger
//!
//! Services hold the business rules between the HTTP handlers and the
//! store adapters.
//!
//! ## Architecture
//!
//! ```text
//! HTTP Handlers (thin)
//!     ↓
//! AchievementService / ReportService
//!     ↓
//! ContentStore (MongoDB)    ReferenceStore (SQLite)    Directory
//! ```

pub mod achievement_service;
pub mod report_service;
pub mod view;

pub use achievement_service::{
    AchievementChanges, AchievementPage, AchievementService, AttachmentInput, ListCriteria,
    NewAchievement, VerificationAction,
};
pub use report_service::{AchievementStatistics, ReportService, StudentReport, TopStudent};
pub use view::{compose, AchievementView, AttachmentView};

use std::sync::Arc;

use crate::directory::Directory;
use crate::store::{ContentStore, ReferenceStore};

/// Tunables passed down from configuration
#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub max_page_size: u64,
    pub top_students_limit: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            max_page_size: 100,
            top_students_limit: 10,
        }
    }
}

/// Service container for dependency injection
pub struct Services {
    pub achievements: Arc<AchievementService>,
    pub reports: Arc<ReportService>,
    pub directory: Arc<dyn Directory>,
}

impl Services {
    pub fn new(
        content: Arc<dyn ContentStore>,
        references: Arc<dyn ReferenceStore>,
        directory: Arc<dyn Directory>,
        settings: ServiceSettings,
    ) -> Self {
        let achievements = Arc::new(AchievementService::new(
            content.clone(),
            references.clone(),
            settings.max_page_size,
        ));
        let reports = Arc::new(ReportService::new(
            content,
            references,
            directory.clone(),
            achievements.clone(),
            settings.top_students_limit,
        ));

        Self {
            achievements,
            reports,
            directory,
        }
    }
}
