//! Reporting service
//!
//! Read-only aggregates over both stores. Content-side breakdowns (type,
//! competition level, points, top students) and the reference-side status
//! breakdown are queried separately and combined here; there is no join
//! across the two stores.

use futures_util::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::directory::Directory;
use crate::error::{AchievementError, Result};
use crate::services::achievement_service::AchievementService;
use crate::services::view::AchievementView;
use crate::store::{ContentFilter, ContentStore, GroupKey, GroupTally, ReferenceStore};
use crate::types::AchievementStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopStudent {
    pub student_id: String,
    pub student_name: String,
    pub student_number: String,
    pub achievement_count: u64,
    pub total_points: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementStatistics {
    pub total_achievements: u64,
    pub by_type: BTreeMap<String, u64>,
    pub by_status: BTreeMap<String, u64>,
    pub by_competition_level: BTreeMap<String, u64>,
    pub top_students: Vec<TopStudent>,
    /// Count of `verified` references
    pub recent_verified: u64,
    /// Count of `submitted` references
    pub pending_verification: u64,
    pub total_points: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReport {
    pub student_id: String,
    pub student_name: String,
    pub student_number: String,
    pub program_study: String,
    pub total_achievements: u64,
    pub total_points: i64,
    pub by_type: BTreeMap<String, u64>,
    pub by_status: BTreeMap<String, u64>,
    pub achievements: Vec<AchievementView>,
}

pub struct ReportService {
    content: Arc<dyn ContentStore>,
    references: Arc<dyn ReferenceStore>,
    directory: Arc<dyn Directory>,
    achievements: Arc<AchievementService>,
    top_students_limit: usize,
}

impl ReportService {
    pub fn new(
        content: Arc<dyn ContentStore>,
        references: Arc<dyn ReferenceStore>,
        directory: Arc<dyn Directory>,
        achievements: Arc<AchievementService>,
        top_students_limit: usize,
    ) -> Self {
        Self {
            content,
            references,
            directory,
            achievements,
            top_students_limit,
        }
    }

    /// Statistics over active achievements; `None` covers every student
    pub async fn statistics(&self, student_ids: Option<&[String]>) -> Result<AchievementStatistics> {
        let filter = ContentFilter::for_students(student_ids);

        let (by_type, by_level, by_student, total_points, status_counts) = tokio::try_join!(
            self.group(&filter, GroupKey::AchievementType),
            self.group(&filter, GroupKey::CompetitionLevel),
            self.group(&filter, GroupKey::StudentId),
            async {
                self.content
                    .sum_points(&filter)
                    .await
                    .map_err(|e| AchievementError::persistence("points sum", e))
            },
            async {
                self.references
                    .count_by_status(student_ids)
                    .await
                    .map_err(|e| AchievementError::persistence("status count", e))
            },
        )?;

        let mut by_status: BTreeMap<String, u64> = AchievementStatus::ALL
            .iter()
            .filter(|s| **s != AchievementStatus::Deleted)
            .map(|s| (s.to_string(), 0))
            .collect();
        for (status, count) in &status_counts {
            by_status.insert(status.to_string(), *count);
        }

        let top_students = self.top_students(by_student).await;

        debug!(
            scoped = student_ids.is_some(),
            groups = by_type.len(),
            "Computed achievement statistics"
        );

        Ok(AchievementStatistics {
            total_achievements: by_type.iter().map(|g| g.count).sum(),
            by_type: counts(&by_type),
            by_status,
            by_competition_level: counts(&by_level),
            top_students,
            recent_verified: status_counts
                .get(&AchievementStatus::Verified)
                .copied()
                .unwrap_or(0),
            pending_verification: status_counts
                .get(&AchievementStatus::Submitted)
                .copied()
                .unwrap_or(0),
            total_points,
        })
    }

    /// One student's achievements with totals and breakdowns
    pub async fn student_report(&self, student_id: &str) -> Result<StudentReport> {
        let achievements = self.achievements.list_by_student(student_id).await?;
        let display = self.directory.student_display(student_id).await;

        let mut by_type = BTreeMap::new();
        let mut by_status = BTreeMap::new();
        for view in &achievements {
            *by_type.entry(view.achievement_type.to_string()).or_insert(0) += 1;
            *by_status.entry(view.status.to_string()).or_insert(0) += 1;
        }

        Ok(StudentReport {
            student_id: student_id.to_string(),
            student_name: display.name,
            student_number: display.student_number,
            program_study: display.program_study,
            total_achievements: achievements.len() as u64,
            total_points: achievements
                .iter()
                .fold(0i64, |total, v| total.saturating_add(v.points)),
            by_type,
            by_status,
            achievements,
        })
    }

    async fn group(&self, filter: &ContentFilter, key: GroupKey) -> Result<Vec<GroupTally>> {
        self.content
            .aggregate_by_group(filter, key)
            .await
            .map_err(|e| AchievementError::persistence("content aggregation", e))
    }

    /// Count desc, then points desc, then student id asc
    async fn top_students(&self, mut tallies: Vec<GroupTally>) -> Vec<TopStudent> {
        tallies.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| b.points.cmp(&a.points))
                .then_with(|| a.key.cmp(&b.key))
        });
        tallies.truncate(self.top_students_limit);

        let lookups = tallies.into_iter().map(|tally| async move {
            let display = self.directory.student_display(&tally.key).await;
            TopStudent {
                student_id: tally.key,
                student_name: display.name,
                student_number: display.student_number,
                achievement_count: tally.count,
                total_points: tally.points,
            }
        });
        join_all(lookups).await
    }
}

fn counts(tallies: &[GroupTally]) -> BTreeMap<String, u64> {
    tallies.iter().map(|g| (g.key.clone(), g.count)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{
        AchievementDetails, AchievementDoc, AchievementType, CompetitionDetails, CompetitionLevel,
        TypeDetails,
    };
    use crate::db::students::{upsert_student, StudentRow};
    use crate::db::ReferenceDb;
    use crate::directory::SqliteDirectory;
    use crate::services::achievement_service::NewAchievement;
    use crate::store::{MemoryContentStore, SqliteReferenceStore};

    struct Harness {
        content: Arc<dyn ContentStore>,
        references: Arc<dyn ReferenceStore>,
        achievements: Arc<AchievementService>,
        reports: ReportService,
    }

    fn harness() -> Harness {
        let db = Arc::new(ReferenceDb::open_in_memory().unwrap());
        db.with_conn(|conn| {
            upsert_student(
                conn,
                &StudentRow {
                    id: "s1".into(),
                    user_id: "u1".into(),
                    student_number: "2101001".into(),
                    full_name: "Ayu Lestari".into(),
                    program_study: "Informatics".into(),
                    advisor_id: Some("l1".into()),
                },
            )
        })
        .unwrap();

        let content: Arc<dyn ContentStore> = Arc::new(MemoryContentStore::new());
        let references: Arc<dyn ReferenceStore> = Arc::new(SqliteReferenceStore::new(db.clone()));
        let directory: Arc<dyn Directory> = Arc::new(SqliteDirectory::new(db));
        let achievements = Arc::new(AchievementService::new(content.clone(), references.clone(), 100));
        let reports = ReportService::new(
            content.clone(),
            references.clone(),
            directory,
            achievements.clone(),
            2,
        );

        Harness {
            content,
            references,
            achievements,
            reports,
        }
    }

    fn new_achievement(ty: &str, points: i64) -> NewAchievement {
        NewAchievement {
            achievement_type: ty.into(),
            title: format!("{} achievement", ty),
            points,
            ..Default::default()
        }
    }

    fn competition(level: CompetitionLevel, points: i64) -> NewAchievement {
        NewAchievement {
            details: AchievementDetails {
                specific: TypeDetails::Competition(CompetitionDetails {
                    competition_level: Some(level),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..new_achievement("competition", points)
        }
    }

    #[tokio::test]
    async fn test_student_report_totals() {
        let h = harness();
        h.achievements.create("s1", new_achievement("competition", 100)).await.unwrap();
        h.achievements.create("s1", new_achievement("academic", 50)).await.unwrap();
        h.achievements.create("s2", new_achievement("academic", 999)).await.unwrap();

        let report = h.reports.student_report("s1").await.unwrap();

        assert_eq!(report.total_achievements, 2);
        assert_eq!(report.total_points, 150);
        assert_eq!(report.by_type.get("competition"), Some(&1));
        assert_eq!(report.by_type.get("academic"), Some(&1));
        assert_eq!(report.by_status.get("draft"), Some(&2));
        assert_eq!(report.student_name, "Ayu Lestari");
        assert_eq!(report.student_number, "2101001");
        assert_eq!(report.program_study, "Informatics");
    }

    #[tokio::test]
    async fn test_oversized_points_saturate_totals() {
        let h = harness();
        // Written straight to the stores, as a migration or import would
        for title in ["import a", "import b"] {
            let doc = h
                .content
                .insert(AchievementDoc {
                    student_id: "s1".into(),
                    achievement_type: AchievementType::Academic,
                    title: title.into(),
                    points: i64::MAX,
                    ..Default::default()
                })
                .await
                .unwrap();
            h.references.insert("s1", &doc.id()).await.unwrap();
        }

        let report = h.reports.student_report("s1").await.unwrap();
        assert_eq!(report.total_achievements, 2);
        assert_eq!(report.total_points, i64::MAX);

        let stats = h.reports.statistics(None).await.unwrap();
        assert_eq!(stats.total_points, i64::MAX);
        assert_eq!(stats.top_students[0].total_points, i64::MAX);
        assert_eq!(stats.top_students[0].achievement_count, 2);
    }

    #[tokio::test]
    async fn test_report_for_unknown_student_uses_sentinel() {
        let h = harness();
        let report = h.reports.student_report("ghost").await.unwrap();

        assert_eq!(report.total_achievements, 0);
        assert_eq!(report.student_name, "Unknown");
        assert_eq!(report.student_number, "-");
    }

    #[tokio::test]
    async fn test_statistics_combine_both_stores() {
        let h = harness();
        let a = h.achievements.create("s1", competition(CompetitionLevel::National, 100)).await.unwrap();
        let b = h.achievements.create("s1", competition(CompetitionLevel::Regional, 40)).await.unwrap();
        h.achievements.create("s2", new_achievement("academic", 30)).await.unwrap();
        let gone = h.achievements.create("s3", new_achievement("academic", 500)).await.unwrap();

        h.achievements.submit(&a.id, "s1").await.unwrap();
        h.achievements.submit(&b.id, "s1").await.unwrap();
        h.achievements.review(&b.id, "l1", "verify", None).await.unwrap();
        h.achievements.delete(&gone.id, "s3").await.unwrap();

        let stats = h.reports.statistics(None).await.unwrap();

        assert_eq!(stats.total_achievements, 3);
        assert_eq!(stats.total_points, 170);
        assert_eq!(stats.by_type.get("competition"), Some(&2));
        assert_eq!(stats.by_type.get("academic"), Some(&1));
        assert_eq!(stats.by_competition_level.get("national"), Some(&1));
        assert_eq!(stats.by_competition_level.get("regional"), Some(&1));
        assert_eq!(stats.pending_verification, 1);
        assert_eq!(stats.recent_verified, 1);
        assert_eq!(stats.by_status.get("draft"), Some(&1));
        assert_eq!(stats.by_status.get("rejected"), Some(&0));
        assert!(stats.by_status.get("deleted").is_none());

        assert_eq!(stats.top_students.len(), 2);
        assert_eq!(stats.top_students[0].student_id, "s1");
        assert_eq!(stats.top_students[0].student_name, "Ayu Lestari");
        assert_eq!(stats.top_students[0].achievement_count, 2);
        assert_eq!(stats.top_students[1].student_id, "s2");
        assert_eq!(stats.top_students[1].student_name, "Unknown");
    }

    #[tokio::test]
    async fn test_statistics_scoped_to_students() {
        let h = harness();
        h.achievements.create("s1", new_achievement("academic", 10)).await.unwrap();
        h.achievements.create("s2", new_achievement("academic", 20)).await.unwrap();

        let scoped = h.reports.statistics(Some(&["s2".to_string()])).await.unwrap();
        assert_eq!(scoped.total_achievements, 1);
        assert_eq!(scoped.total_points, 20);
        assert_eq!(scoped.by_status.get("draft"), Some(&1));

        let empty = h.reports.statistics(Some(&[])).await.unwrap();
        assert_eq!(empty.total_achievements, 0);
        assert!(empty.top_students.is_empty());
        assert_eq!(empty.by_status.get("submitted"), Some(&0));
    }

    #[tokio::test]
    async fn test_top_student_ties_break_on_points_then_id() {
        let h = harness();
        h.achievements.create("s3", new_achievement("academic", 10)).await.unwrap();
        h.achievements.create("s2", new_achievement("academic", 10)).await.unwrap();
        h.achievements.create("s4", new_achievement("academic", 90)).await.unwrap();

        let stats = h.reports.statistics(None).await.unwrap();
        let ids: Vec<_> = stats.top_students.iter().map(|t| t.student_id.as_str()).collect();
        assert_eq!(ids, vec!["s4", "s2"]);
    }
}
