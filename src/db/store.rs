//! Record persistence port

use async_trait::async_trait;
use bson::DateTime;

use crate::db::query::{FacetBucket, FacetField, Page, RecordPage, RecordQuery, RecordSort};
use crate::db::schemas::HabitatRecord;
use crate::types::Result;

/// Storage for habitat records.
///
/// Writers never update fields in place: they read a record, build the next
/// version in memory and swap it in with `replace_if_unchanged`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch by record id, deleted records included
    async fn find_one(&self, record_id: &str) -> Result<Option<HabitatRecord>>;

    /// Replace the record if it is not deleted and still carries
    /// `expected_updated_at`. Returns `false` when the condition failed.
    async fn replace_if_unchanged(
        &self,
        record_id: &str,
        expected_updated_at: DateTime,
        replacement: &HabitatRecord,
    ) -> Result<bool>;

    /// One sorted page of matching records and the total match count
    async fn find(&self, query: &RecordQuery, sort: RecordSort, page: Page) -> Result<RecordPage>;

    /// Distinct facet values over matching records, sorted by value
    async fn aggregate_distinct(
        &self,
        field: FacetField,
        query: &RecordQuery,
    ) -> Result<Vec<FacetBucket>>;
}
