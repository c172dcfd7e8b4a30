//! MongoDB-backed record store

use async_trait::async_trait;
use bson::{doc, DateTime, Document};
use futures::TryStreamExt;
use mongodb::options::FindOptions;
use tracing::{debug, warn};

use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::query::{FacetBucket, FacetField, Page, RecordPage, RecordQuery, RecordSort};
use crate::db::schemas::{HabitatRecord, RECORD_COLLECTION};
use crate::db::store::RecordStore;
use crate::types::{BiotopError, Result};

pub struct MongoRecordStore {
    records: MongoCollection<HabitatRecord>,
}

impl MongoRecordStore {
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        let records = mongo.collection::<HabitatRecord>(RECORD_COLLECTION).await?;
        Ok(Self { records })
    }
}

#[async_trait]
impl RecordStore for MongoRecordStore {
    async fn find_one(&self, record_id: &str) -> Result<Option<HabitatRecord>> {
        self.records.find_one(doc! { "recordId": record_id }).await
    }

    async fn replace_if_unchanged(
        &self,
        record_id: &str,
        expected_updated_at: DateTime,
        replacement: &HabitatRecord,
    ) -> Result<bool> {
        let filter = doc! {
            "recordId": record_id,
            "deleted": { "$ne": true },
            "updatedAt": expected_updated_at,
        };

        let result = self
            .records
            .inner()
            .replace_one(filter, replacement)
            .await
            .map_err(|e| {
                warn!(record_id, error = %e, "Conditional replace failed");
                BiotopError::Database(format!("Replace failed: {}", e))
            })?;

        debug!(record_id, matched = result.matched_count, "Conditional replace");
        Ok(result.matched_count == 1)
    }

    async fn find(&self, query: &RecordQuery, sort: RecordSort, page: Page) -> Result<RecordPage> {
        let filter = query.to_document();

        let total = self
            .records
            .inner()
            .count_documents(filter.clone())
            .await?;

        let options = FindOptions::builder()
            .sort(sort.to_document())
            .skip(page.skip())
            .limit(page.limit as i64)
            .build();

        let cursor = self
            .records
            .inner()
            .find(filter)
            .with_options(options)
            .await?;
        let records: Vec<HabitatRecord> = cursor.try_collect().await?;

        Ok(RecordPage {
            records,
            total,
            page: page.page,
            limit: page.limit,
        })
    }

    async fn aggregate_distinct(
        &self,
        field: FacetField,
        query: &RecordQuery,
    ) -> Result<Vec<FacetBucket>> {
        let cursor = self
            .records
            .inner()
            .aggregate(field.pipeline(query))
            .await?;
        let groups: Vec<Document> = cursor.try_collect().await?;

        groups.into_iter().map(bucket_from_group).collect()
    }
}

fn bucket_from_group(group: Document) -> Result<FacetBucket> {
    let value = group
        .get_str("_id")
        .map_err(|e| BiotopError::Database(format!("Malformed facet group: {}", e)))?
        .to_string();

    let count = match group.get("count") {
        Some(bson::Bson::Int32(n)) => *n as u64,
        Some(bson::Bson::Int64(n)) => *n as u64,
        _ => 0,
    };

    let author_emails = group
        .get_array("authorEmails")
        .map(|emails| {
            let mut emails: Vec<String> = emails
                .iter()
                .filter_map(|e| e.as_str().map(str::to_string))
                .collect();
            emails.sort();
            emails
        })
        .unwrap_or_default();

    Ok(FacetBucket {
        value,
        count,
        author_emails,
    })
}
