//! In-memory record store
//!
//! Used by tests and by dev mode when no MongoDB is configured. The
//! conditional replace holds the `DashMap` entry lock for the compare and the
//! swap, matching the single-document atomicity of the MongoDB store.

use async_trait::async_trait;
use bson::DateTime;
use dashmap::DashMap;

use crate::db::query::{
    collect_buckets, FacetBucket, FacetField, Page, RecordPage, RecordQuery, RecordSort,
};
use crate::db::schemas::HabitatRecord;
use crate::db::store::RecordStore;
use crate::types::{BiotopError, Result};

#[derive(Default)]
pub struct InMemoryRecordStore {
    records: DashMap<String, HabitatRecord>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record; fails if the id is taken
    pub fn insert(&self, record: HabitatRecord) -> Result<()> {
        match self.records.entry(record.record_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(BiotopError::Conflict(format!(
                "Record {} already exists",
                record.record_id
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn matching(&self, query: &RecordQuery) -> Vec<HabitatRecord> {
        self.records
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn find_one(&self, record_id: &str) -> Result<Option<HabitatRecord>> {
        Ok(self.records.get(record_id).map(|r| r.value().clone()))
    }

    async fn replace_if_unchanged(
        &self,
        record_id: &str,
        expected_updated_at: DateTime,
        replacement: &HabitatRecord,
    ) -> Result<bool> {
        let Some(mut current) = self.records.get_mut(record_id) else {
            return Ok(false);
        };
        if current.deleted || current.updated_at != expected_updated_at {
            return Ok(false);
        }
        *current = replacement.clone();
        Ok(true)
    }

    async fn find(&self, query: &RecordQuery, sort: RecordSort, page: Page) -> Result<RecordPage> {
        let mut records = self.matching(query);
        records.sort_by(|a, b| sort.compare(a, b));
        let total = records.len() as u64;

        let records = records
            .into_iter()
            .skip(usize::try_from(page.skip()).unwrap_or(usize::MAX))
            .take(usize::try_from(page.limit).unwrap_or(usize::MAX))
            .collect();

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
        let records = self.matching(query);
        Ok(collect_buckets(field, records.iter()))
    }
}
