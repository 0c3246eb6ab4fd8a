//! Content store over MongoDB

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, DateTime, Document};
use tracing::warn;

use crate::db::mongo::{active_only, MongoClient, MongoCollection};
use crate::db::schemas::{AchievementDoc, Attachment, ACHIEVEMENT_COLLECTION};
use crate::error::StoreError;
use crate::store::{
    ContentFilter, ContentPatch, ContentSort, ContentStore, GroupKey, GroupTally, SortOrder,
};

pub struct MongoContentStore {
    collection: MongoCollection<AchievementDoc>,
}

impl MongoContentStore {
    pub async fn new(client: &MongoClient) -> Result<Self, StoreError> {
        let collection = client
            .collection::<AchievementDoc>(ACHIEVEMENT_COLLECTION)
            .await?;
        Ok(Self { collection })
    }
}

fn id_filter(id: &str) -> Option<Document> {
    ObjectId::parse_str(id).ok().map(|oid| doc! { "_id": oid })
}

fn to_bson<T: serde::Serialize>(value: &T) -> Result<Bson, StoreError> {
    bson::to_bson(value).map_err(|e| StoreError::Database(format!("Serialize failed: {}", e)))
}

/// Translate a content filter into a query document
fn filter_document(filter: &ContentFilter) -> Document {
    let mut query = Document::new();

    if let Some(ids) = &filter.student_ids {
        query.insert("studentId", doc! { "$in": ids.clone() });
    }
    if let Some(ids) = &filter.content_ids {
        // Malformed ids can never match a document
        let oids: Vec<ObjectId> = ids.iter().filter_map(|id| ObjectId::parse_str(id).ok()).collect();
        query.insert("_id", doc! { "$in": oids });
    }
    if let Some(ty) = filter.achievement_type {
        query.insert("achievementType", ty.as_str());
    }

    let mut created = Document::new();
    if let Some(from) = filter.created_from {
        created.insert("$gte", DateTime::from_chrono(from));
    }
    if let Some(to) = filter.created_to {
        created.insert("$lte", DateTime::from_chrono(to));
    }
    if !created.is_empty() {
        query.insert("metadata.createdAt", created);
    }

    query
}

fn sort_document(sort: ContentSort) -> Document {
    let direction = match sort.order {
        SortOrder::Asc => 1,
        SortOrder::Desc => -1,
    };
    let mut sort_doc = Document::new();
    sort_doc.insert(sort.key.field(), direction);
    sort_doc.insert("_id", direction);
    sort_doc
}

fn group_field(key: GroupKey) -> &'static str {
    match key {
        GroupKey::AchievementType => "$achievementType",
        GroupKey::CompetitionLevel => "$details.specific.competitionLevel",
        GroupKey::StudentId => "$studentId",
    }
}

#[async_trait]
impl ContentStore for MongoContentStore {
    async fn insert(&self, doc: AchievementDoc) -> Result<AchievementDoc, StoreError> {
        let (id, mut stored) = self.collection.insert_one(doc).await?;
        stored._id = Some(id);
        Ok(stored)
    }

    async fn find_by_id(
        &self,
        id: &str,
        include_deleted: bool,
    ) -> Result<Option<AchievementDoc>, StoreError> {
        match id_filter(id) {
            Some(filter) => self.collection.find_one(filter, include_deleted).await,
            None => Ok(None),
        }
    }

    async fn update_fields(&self, id: &str, patch: ContentPatch) -> Result<(), StoreError> {
        let filter = id_filter(id).ok_or_else(|| StoreError::NoMatch(format!("content {}", id)))?;

        let mut set = doc! { "metadata.updatedAt": DateTime::now() };
        if let Some(title) = &patch.title {
            set.insert("title", title.as_str());
        }
        if let Some(description) = &patch.description {
            set.insert("description", description.as_str());
        }
        if let Some(details) = &patch.details {
            set.insert("details", to_bson(details)?);
        }
        if let Some(tags) = &patch.tags {
            set.insert("tags", tags.clone());
        }
        if let Some(points) = patch.points {
            set.insert("points", points);
        }

        let result = self
            .collection
            .update_one(active_only(filter), doc! { "$set": set })
            .await?;
        if result.matched_count == 0 {
            return Err(StoreError::NoMatch(format!("content {}", id)));
        }
        Ok(())
    }

    async fn soft_delete(&self, id: &str) -> Result<(), StoreError> {
        let filter = id_filter(id).ok_or_else(|| StoreError::NoMatch(format!("content {}", id)))?;

        let result = self.collection.soft_delete(active_only(filter)).await?;
        if result.matched_count == 0 {
            return Err(StoreError::NoMatch(format!("content {}", id)));
        }
        Ok(())
    }

    async fn append_attachment(
        &self,
        id: &str,
        mut attachment: Attachment,
    ) -> Result<(), StoreError> {
        let filter = id_filter(id).ok_or_else(|| StoreError::NoMatch(format!("content {}", id)))?;

        let now = DateTime::now();
        attachment.uploaded_at = now;
        let update = doc! {
            "$push": { "attachments": to_bson(&attachment)? },
            "$set": { "metadata.updatedAt": now },
        };

        let result = self.collection.update_one(active_only(filter), update).await?;
        if result.matched_count == 0 {
            return Err(StoreError::NoMatch(format!("content {}", id)));
        }
        Ok(())
    }

    async fn find_many(
        &self,
        filter: &ContentFilter,
        sort: ContentSort,
        skip: u64,
        limit: u64,
    ) -> Result<(Vec<AchievementDoc>, u64), StoreError> {
        if filter.is_empty_set() {
            return Ok((vec![], 0));
        }

        let query = filter_document(filter);
        let total = self.collection.count(query.clone()).await?;
        let docs = self
            .collection
            .find_page(query, sort_document(sort), skip, limit as i64)
            .await?;

        Ok((docs, total))
    }

    async fn aggregate_by_group(
        &self,
        filter: &ContentFilter,
        key: GroupKey,
    ) -> Result<Vec<GroupTally>, StoreError> {
        if filter.is_empty_set() {
            return Ok(vec![]);
        }

        let mut matched = active_only(filter_document(filter));
        if key == GroupKey::CompetitionLevel {
            matched.insert("achievementType", "competition");
        }

        let pipeline = vec![
            doc! { "$match": matched },
            doc! { "$group": {
                "_id": group_field(key),
                "count": { "$sum": 1 },
                "points": { "$sum": "$points" },
            }},
            doc! { "$sort": { "_id": 1 } },
        ];

        let rows = self.collection.aggregate(pipeline).await?;

        let mut tallies = Vec::with_capacity(rows.len());
        for row in rows {
            let group = match row.get("_id") {
                Some(Bson::String(s)) if !s.is_empty() => s.clone(),
                // Documents without the grouped field
                Some(Bson::String(_)) | Some(Bson::Null) | None => continue,
                Some(other) => {
                    warn!("Skipping aggregation group with unexpected key {:?}", other);
                    continue;
                }
            };
            tallies.push(GroupTally {
                key: group,
                count: bson_int(row.get("count")).max(0) as u64,
                points: bson_int(row.get("points")),
            });
        }

        Ok(tallies)
    }

    async fn sum_points(&self, filter: &ContentFilter) -> Result<i64, StoreError> {
        if filter.is_empty_set() {
            return Ok(0);
        }

        let pipeline = vec![
            doc! { "$match": active_only(filter_document(filter)) },
            doc! { "$group": { "_id": Bson::Null, "total": { "$sum": "$points" } } },
        ];

        let rows = self.collection.aggregate(pipeline).await?;
        Ok(rows.first().map(|row| bson_int(row.get("total"))).unwrap_or(0))
    }
}

/// `$sum` yields Int32 or Int64 depending on magnitude
fn bson_int(value: Option<&Bson>) -> i64 {
    match value {
        Some(Bson::Int32(n)) => i64::from(*n),
        Some(Bson::Int64(n)) => *n,
        Some(Bson::Double(n)) => *n as i64,
        _ => 0,
    }
}
