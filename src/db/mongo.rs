//! MongoDB client and collection wrapper
//!
//! Every typed collection applies its schema's indexes on open and hides
//! soft-deleted documents from reads unless asked otherwise.

use bson::{doc, oid::ObjectId, DateTime, Document};
use futures_util::{StreamExt, TryStreamExt};
use mongodb::{
    options::{IndexOptions, UpdateModifications},
    results::UpdateResult,
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, info};

use crate::db::schemas::Metadata;
use crate::error::StoreError;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and ping the database
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, StoreError> {
        info!("Connecting to MongoDB at {}", uri);

        // Fail fast instead of hanging on an unreachable server
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StoreError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, StoreError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
{
    /// Open a collection and apply indexes
    pub async fn new(
        client: &Client,
        db_name: &str,
        collection_name: &str,
    ) -> Result<Self, StoreError> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    async fn apply_indexes(&self) -> Result<(), StoreError> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Insert a document, stamping fresh metadata. Returns the stored copy.
    pub async fn insert_one(&self, mut item: T) -> Result<(ObjectId, T), StoreError> {
        *item.mut_metadata() = Metadata::new();

        let result = self
            .inner
            .insert_one(&item)
            .await
            .map_err(|e| StoreError::Database(format!("Insert failed: {}", e)))?;

        let id = result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| StoreError::Database("Failed to get inserted ID".into()))?;

        Ok((id, item))
    }

    /// Find one document by filter
    pub async fn find_one(
        &self,
        filter: Document,
        include_deleted: bool,
    ) -> Result<Option<T>, StoreError> {
        let filter = if include_deleted { filter } else { active_only(filter) };

        self.inner
            .find_one(filter)
            .await
            .map_err(|e| StoreError::Database(format!("Find failed: {}", e)))
    }

    /// Find one page of active documents
    pub async fn find_page(
        &self,
        filter: Document,
        sort: Document,
        skip: u64,
        limit: i64,
    ) -> Result<Vec<T>, StoreError> {
        let cursor = self
            .inner
            .find(active_only(filter))
            .sort(sort)
            .skip(skip)
            .limit(limit)
            .await
            .map_err(|e| StoreError::Database(format!("Find failed: {}", e)))?;

        // A single undecodable document is logged and skipped
        let results: Vec<T> = cursor
            .filter_map(|doc| async {
                match doc {
                    Ok(d) => Some(d),
                    Err(e) => {
                        error!("Error reading document: {}", e);
                        None
                    }
                }
            })
            .collect()
            .await;

        Ok(results)
    }

    /// Count active documents
    pub async fn count(&self, filter: Document) -> Result<u64, StoreError> {
        self.inner
            .count_documents(active_only(filter))
            .await
            .map_err(|e| StoreError::Database(format!("Count failed: {}", e)))
    }

    /// Run an aggregation pipeline; the first stage must do its own filtering
    pub async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>, StoreError> {
        let cursor = self
            .inner
            .aggregate(pipeline)
            .await
            .map_err(|e| StoreError::Database(format!("Aggregate failed: {}", e)))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| StoreError::Database(format!("Aggregate cursor failed: {}", e)))
    }

    /// Update one document
    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<UpdateResult, StoreError> {
        self.inner
            .update_one(filter, update.into())
            .await
            .map_err(|e| StoreError::Database(format!("Update failed: {}", e)))
    }

    /// Soft delete a document
    pub async fn soft_delete(&self, filter: Document) -> Result<UpdateResult, StoreError> {
        let now = DateTime::now();
        let update = doc! {
            "$set": {
                "metadata.isDeleted": true,
                "metadata.deletedAt": now,
                "metadata.updatedAt": now,
            }
        };

        self.update_one(filter, update).await
    }
}

/// Add the not-deleted condition to a filter
pub fn active_only(mut filter: Document) -> Document {
    filter.insert("metadata.isDeleted", doc! { "$ne": true });
    filter
}
