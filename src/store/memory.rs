//! In-memory content store
//!
//! Same contract as the MongoDB store. Used in development mode when no
//! MongoDB is reachable, and by the engine tests.

use async_trait::async_trait;
use bson::{oid::ObjectId, DateTime};
use dashmap::DashMap;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::db::schemas::{AchievementDoc, Attachment, Metadata};
use crate::error::StoreError;
use crate::store::{
    ContentFilter, ContentPatch, ContentSort, ContentStore, GroupKey, GroupTally, SortKey,
    SortOrder,
};

#[derive(Default)]
pub struct MemoryContentStore {
    docs: DashMap<String, AchievementDoc>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    fn active(&self, filter: &ContentFilter) -> Vec<AchievementDoc> {
        if filter.is_empty_set() {
            return vec![];
        }
        self.docs
            .iter()
            .filter(|entry| !entry.value().is_deleted() && filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Run `f` on an active document
    fn modify<F>(&self, id: &str, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut AchievementDoc),
    {
        match self.docs.get_mut(id) {
            Some(mut entry) if !entry.is_deleted() => {
                f(entry.value_mut());
                Ok(())
            }
            _ => Err(StoreError::NoMatch(format!("content {}", id))),
        }
    }
}

fn compare(a: &AchievementDoc, b: &AchievementDoc, sort: ContentSort) -> Ordering {
    let by_key = match sort.key {
        SortKey::CreatedAt => a.metadata.created_at.cmp(&b.metadata.created_at),
        SortKey::UpdatedAt => a.metadata.updated_at.cmp(&b.metadata.updated_at),
        SortKey::Title => a.title.cmp(&b.title),
        SortKey::Points => a.points.cmp(&b.points),
    };
    let ordering = by_key.then_with(|| a._id.cmp(&b._id));
    match sort.order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn insert(&self, mut doc: AchievementDoc) -> Result<AchievementDoc, StoreError> {
        let id = ObjectId::new();
        doc._id = Some(id);
        doc.metadata = Metadata::new();
        self.docs.insert(id.to_hex(), doc.clone());
        Ok(doc)
    }

    async fn find_by_id(
        &self,
        id: &str,
        include_deleted: bool,
    ) -> Result<Option<AchievementDoc>, StoreError> {
        Ok(self
            .docs
            .get(id)
            .map(|entry| entry.value().clone())
            .filter(|doc| include_deleted || !doc.is_deleted()))
    }

    async fn update_fields(&self, id: &str, patch: ContentPatch) -> Result<(), StoreError> {
        self.modify(id, |doc| {
            if let Some(title) = patch.title {
                doc.title = title;
            }
            if let Some(description) = patch.description {
                doc.description = description;
            }
            if let Some(details) = patch.details {
                doc.details = details;
            }
            if let Some(tags) = patch.tags {
                doc.tags = tags;
            }
            if let Some(points) = patch.points {
                doc.points = points;
            }
            doc.metadata.touch();
        })
    }

    async fn soft_delete(&self, id: &str) -> Result<(), StoreError> {
        self.modify(id, |doc| doc.metadata.mark_deleted())
    }

    async fn append_attachment(
        &self,
        id: &str,
        mut attachment: Attachment,
    ) -> Result<(), StoreError> {
        attachment.uploaded_at = DateTime::now();
        self.modify(id, |doc| {
            doc.attachments.push(attachment);
            doc.metadata.touch();
        })
    }

    async fn find_many(
        &self,
        filter: &ContentFilter,
        sort: ContentSort,
        skip: u64,
        limit: u64,
    ) -> Result<(Vec<AchievementDoc>, u64), StoreError> {
        let mut docs = self.active(filter);
        let total = docs.len() as u64;

        docs.sort_by(|a, b| compare(a, b, sort));
        let page = docs
            .into_iter()
            .skip(skip as usize)
            .take(limit as usize)
            .collect();

        Ok((page, total))
    }

    async fn aggregate_by_group(
        &self,
        filter: &ContentFilter,
        key: GroupKey,
    ) -> Result<Vec<GroupTally>, StoreError> {
        let mut groups: BTreeMap<String, (u64, i64)> = BTreeMap::new();

        for doc in self.active(filter) {
            let group = match key {
                GroupKey::AchievementType => Some(doc.achievement_type.to_string()),
                GroupKey::StudentId => Some(doc.student_id.clone()),
                GroupKey::CompetitionLevel => doc
                    .details
                    .competition_level()
                    .and_then(|level| serde_json::to_value(level).ok())
                    .and_then(|v| v.as_str().map(String::from)),
            };
            if let Some(group) = group {
                let entry = groups.entry(group).or_default();
                entry.0 += 1;
                entry.1 = entry.1.saturating_add(doc.points);
            }
        }

        Ok(groups
            .into_iter()
            .map(|(key, (count, points))| GroupTally { key, count, points })
            .collect())
    }

    async fn sum_points(&self, filter: &ContentFilter) -> Result<i64, StoreError> {
        Ok(self
            .active(filter)
            .iter()
            .fold(0i64, |total, doc| total.saturating_add(doc.points)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{
        AchievementDetails, AchievementType, CompetitionDetails, CompetitionLevel, TypeDetails,
    };

    fn doc(student: &str, ty: AchievementType, title: &str, points: i64) -> AchievementDoc {
        AchievementDoc {
            student_id: student.into(),
            achievement_type: ty,
            title: title.into(),
            points,
            ..Default::default()
        }
    }

    fn competition(student: &str, level: Option<CompetitionLevel>, points: i64) -> AchievementDoc {
        AchievementDoc {
            details: AchievementDetails {
                specific: TypeDetails::Competition(CompetitionDetails {
                    competition_level: level,
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..doc(student, AchievementType::Competition, "c", points)
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_metadata() {
        let store = MemoryContentStore::new();
        let stored = store.insert(doc("s1", AchievementType::Academic, "a", 10)).await.unwrap();

        assert!(stored._id.is_some());
        assert!(stored.metadata.created_at.is_some());
        assert!(!stored.is_deleted());
        assert_eq!(store.find_by_id(&stored.id(), false).await.unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn test_malformed_id_is_not_found() {
        let store = MemoryContentStore::new();
        assert!(store.find_by_id("not-hex", false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_soft_delete_hides_document() {
        let store = MemoryContentStore::new();
        let stored = store.insert(doc("s1", AchievementType::Academic, "a", 10)).await.unwrap();
        let id = stored.id();

        store.soft_delete(&id).await.unwrap();

        assert!(store.find_by_id(&id, false).await.unwrap().is_none());
        assert!(store.find_by_id(&id, true).await.unwrap().unwrap().is_deleted());
        assert_eq!(store.sum_points(&ContentFilter::default()).await.unwrap(), 0);
        assert!(matches!(
            store.update_fields(&id, ContentPatch::default()).await,
            Err(StoreError::NoMatch(_))
        ));
    }

    #[tokio::test]
    async fn test_patch_only_touches_given_fields() {
        let store = MemoryContentStore::new();
        let stored = store.insert(doc("s1", AchievementType::Academic, "a", 10)).await.unwrap();

        store
            .update_fields(
                &stored.id(),
                ContentPatch {
                    points: Some(25),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let updated = store.find_by_id(&stored.id(), false).await.unwrap().unwrap();
        assert_eq!(updated.points, 25);
        assert_eq!(updated.title, "a");
        assert_eq!(updated.metadata.created_at, stored.metadata.created_at);
    }

    #[tokio::test]
    async fn test_find_many_sorts_and_pages() {
        let store = MemoryContentStore::new();
        for (title, points) in [("b", 30), ("a", 10), ("c", 20)] {
            store.insert(doc("s1", AchievementType::Academic, title, points)).await.unwrap();
        }

        let sort = ContentSort {
            key: SortKey::Points,
            order: SortOrder::Desc,
        };
        let (page, total) = store.find_many(&ContentFilter::default(), sort, 1, 1).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].points, 20);

        let by_title = ContentSort {
            key: SortKey::Title,
            order: SortOrder::Asc,
        };
        let (all, _) = store.find_many(&ContentFilter::default(), by_title, 0, 10).await.unwrap();
        let titles: Vec<_> = all.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_aggregate_by_group() {
        let store = MemoryContentStore::new();
        store.insert(competition("s1", Some(CompetitionLevel::National), 100)).await.unwrap();
        store.insert(competition("s2", Some(CompetitionLevel::National), 50)).await.unwrap();
        store.insert(competition("s2", None, 5)).await.unwrap();
        store.insert(doc("s1", AchievementType::Academic, "a", 10)).await.unwrap();

        let levels = store
            .aggregate_by_group(&ContentFilter::default(), GroupKey::CompetitionLevel)
            .await
            .unwrap();
        assert_eq!(
            levels,
            vec![GroupTally {
                key: "national".into(),
                count: 2,
                points: 150
            }]
        );

        let types = store
            .aggregate_by_group(&ContentFilter::default(), GroupKey::AchievementType)
            .await
            .unwrap();
        assert_eq!(types.len(), 2);
        assert_eq!(types[0].key, "academic");
        assert_eq!(types[1].count, 3);

        let scoped = ContentFilter::for_students(Some(&["s2".to_string()]));
        assert_eq!(store.sum_points(&scoped).await.unwrap(), 55);
    }

    #[tokio::test]
    async fn test_point_totals_saturate() {
        let store = MemoryContentStore::new();
        store.insert(doc("s1", AchievementType::Academic, "a", i64::MAX)).await.unwrap();
        store.insert(doc("s1", AchievementType::Academic, "b", i64::MAX)).await.unwrap();

        assert_eq!(store.sum_points(&ContentFilter::default()).await.unwrap(), i64::MAX);

        let students = store
            .aggregate_by_group(&ContentFilter::default(), GroupKey::StudentId)
            .await
            .unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].count, 2);
        assert_eq!(students[0].points, i64::MAX);
    }

    #[tokio::test]
    async fn test_attachment_gets_server_timestamp() {
        let store = MemoryContentStore::new();
        let stored = store.insert(doc("s1", AchievementType::Academic, "a", 0)).await.unwrap();

        let attachment = Attachment {
            file_name: "cert.pdf".into(),
            file_url: "https://files.example.org/cert.pdf".into(),
            file_type: "application/pdf".into(),
            uploaded_at: DateTime::from_millis(0),
        };
        store.append_attachment(&stored.id(), attachment).await.unwrap();

        let updated = store.find_by_id(&stored.id(), false).await.unwrap().unwrap();
        assert_eq!(updated.attachments.len(), 1);
        assert!(updated.attachments[0].uploaded_at.timestamp_millis() > 0);
    }
}
