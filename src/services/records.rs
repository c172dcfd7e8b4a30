//! Record reads: listings, lookups, facets and exports
//!
//! Every read goes through `auth::visibility` first. State changes live in
//! `services::verification`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use bson::DateTime;
use serde::Serialize;
use tracing::debug;

use crate::auth::visibility::{build_filter, build_public_filter, can_read_record, is_name_visible};
use crate::auth::Caller;
use crate::db::query::{
    FacetBucket, FacetField, Page, RecordFilters, RecordPage, RecordQuery, RecordSort,
    SortDirection, SortField, MAX_PAGE_SIZE,
};
use crate::db::schemas::{HabitatRecord, ProtectionStatus, UserDoc};
use crate::db::store::RecordStore;
use crate::services::catalog::HabitatCatalog;
use crate::services::classifier::Classifier;
use crate::services::users::UserDirectory;
use crate::types::{BiotopError, Result};

/// Entry point for every record operation
pub struct RecordService {
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) users: Arc<dyn UserDirectory>,
    pub(crate) catalog: Arc<dyn HabitatCatalog>,
    pub(crate) classifier: Option<Arc<dyn Classifier>>,
    /// An `analyzing` marker older than this may be taken over
    pub(crate) analysis_stale_after: Duration,
    max_page_size: u64,
}

/// Default window before an unfinished re-analysis counts as abandoned
pub const DEFAULT_ANALYSIS_STALE_AFTER: Duration = Duration::from_secs(300);

/// Record as shown on the public map. Never carries e-mail addresses.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicRecord {
    pub record_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemeinde: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flurname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub habitattyp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub habitatfamilie: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protection_status: Option<ProtectionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<String>,
    /// Only present when the author's name visibility allows it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicRecordPage {
    pub records: Vec<PublicRecord>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

impl RecordService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        users: Arc<dyn UserDirectory>,
        catalog: Arc<dyn HabitatCatalog>,
    ) -> Self {
        Self {
            store,
            users,
            catalog,
            classifier: None,
            analysis_stale_after: DEFAULT_ANALYSIS_STALE_AFTER,
            max_page_size: MAX_PAGE_SIZE,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_analysis_stale_after(mut self, stale_after: Duration) -> Self {
        self.analysis_stale_after = stale_after;
        self
    }

    pub fn with_max_page_size(mut self, max_page_size: u64) -> Self {
        self.max_page_size = max_page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Page request clamped to the configured maximum
    pub fn page(&self, page: u64, limit: u64) -> Page {
        Page::new(page, limit, self.max_page_size)
    }

    /// Records visible to `caller`
    pub async fn list_records(
        &self,
        caller: &Caller,
        filters: &RecordFilters,
        sort: RecordSort,
        page: Page,
    ) -> Result<RecordPage> {
        let query = build_filter(caller, filters);
        let page = self.page(page.page, page.limit);
        self.store.find(&query, sort, page).await
    }

    /// Direct lookup by id, deleted records included for authorized callers
    pub async fn get_record(&self, caller: &Caller, record_id: &str) -> Result<HabitatRecord> {
        let record = self
            .store
            .find_one(record_id)
            .await?
            .ok_or_else(|| not_found(record_id))?;

        if !can_read_record(caller, &record) {
            return Err(BiotopError::Forbidden(format!(
                "No access to record {}",
                record_id
            )));
        }

        Ok(record)
    }

    /// Distinct values of `field` over the records `caller` may list
    pub async fn list_facet_values(
        &self,
        caller: &Caller,
        field: FacetField,
    ) -> Result<Vec<FacetBucket>> {
        let query = build_filter(caller, &RecordFilters::default());
        self.store.aggregate_distinct(field, &query).await
    }

    /// Every record `caller` may list, oldest first
    pub async fn export_records(
        &self,
        caller: &Caller,
        filters: &RecordFilters,
    ) -> Result<Vec<HabitatRecord>> {
        let query = build_filter(caller, filters);
        let sort = RecordSort::new(SortField::CreatedAt, SortDirection::Asc);

        let mut exported = Vec::new();
        let mut page = Page::new(1, MAX_PAGE_SIZE, MAX_PAGE_SIZE);
        loop {
            let batch = self.store.find(&query, sort, page).await?;
            let fetched = batch.records.len() as u64;
            exported.extend(batch.records);
            if fetched < page.limit || exported.len() as u64 >= batch.total {
                break;
            }
            page.page += 1;
        }

        debug!(caller = %caller.email, count = exported.len(), "Exported records");
        Ok(exported)
    }

    /// Verified records for the public map
    pub async fn list_public_records(
        &self,
        viewer: Option<&Caller>,
        filters: &RecordFilters,
        sort: RecordSort,
        page: Page,
    ) -> Result<PublicRecordPage> {
        let page = self.page(page.page, page.limit);
        let mut query = build_public_filter(filters);

        if let Some(person) = filters.person.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            if !self.is_public_person_visible(viewer, &query, person).await? {
                debug!(person, "Public person filter names a hidden person");
                return Ok(PublicRecordPage {
                    records: Vec::new(),
                    total: 0,
                    page: page.page,
                    limit: page.limit,
                });
            }
            query.person = Some(person.to_string());
        }

        let found = self.store.find(&query, sort, page).await?;
        let identities = self.identities_by_email(&found.records).await?;

        let records = found
            .records
            .iter()
            .map(|record| {
                let author = identities
                    .get(&record.author_email)
                    .map(std::slice::from_ref)
                    .unwrap_or(&[]);
                let show_name = is_name_visible(viewer, author);
                to_public_record(record, show_name)
            })
            .collect();

        Ok(PublicRecordPage {
            records,
            total: found.total,
            page: found.page,
            limit: found.limit,
        })
    }

    /// Public facets; person buckets only for visible names and never e-mails
    pub async fn list_public_facet_values(
        &self,
        viewer: Option<&Caller>,
        field: FacetField,
    ) -> Result<Vec<FacetBucket>> {
        let query = build_public_filter(&RecordFilters::default());
        let buckets = self.store.aggregate_distinct(field, &query).await?;

        if field != FacetField::Person {
            return Ok(buckets);
        }

        let emails: Vec<String> = buckets
            .iter()
            .flat_map(|b| b.author_emails.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let users = self.users.find_by_emails(&emails).await?;

        Ok(buckets
            .into_iter()
            .filter(|bucket| !bucket.author_emails.contains(&bucket.value))
            .filter(|bucket| {
                let identities: Vec<UserDoc> = users
                    .iter()
                    .filter(|u| bucket.author_emails.contains(&u.email))
                    .cloned()
                    .collect();
                is_name_visible(viewer, &identities)
            })
            .map(|mut bucket| {
                bucket.author_emails.clear();
                bucket
            })
            .collect())
    }

    async fn is_public_person_visible(
        &self,
        viewer: Option<&Caller>,
        query: &RecordQuery,
        person: &str,
    ) -> Result<bool> {
        let mut by_person = query.clone();
        by_person.person = Some(person.to_string());
        let buckets = self.store.aggregate_distinct(FacetField::Person, &by_person).await?;

        let emails: Vec<String> = buckets
            .into_iter()
            .flat_map(|b| b.author_emails)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if emails.is_empty() {
            return Ok(false);
        }

        let identities = self.users.find_by_emails(&emails).await?;
        Ok(is_name_visible(viewer, &identities))
    }

    async fn identities_by_email(
        &self,
        records: &[HabitatRecord],
    ) -> Result<HashMap<String, UserDoc>> {
        let emails: Vec<String> = records
            .iter()
            .map(|r| r.author_email.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let users = self.users.find_by_emails(&emails).await?;
        Ok(users.into_iter().map(|u| (u.email.clone(), u)).collect())
    }
}

fn to_public_record(record: &HabitatRecord, show_name: bool) -> PublicRecord {
    let result = record.effective_result();
    PublicRecord {
        record_id: record.record_id.clone(),
        gemeinde: record.location.gemeinde.clone(),
        flurname: record.location.flurname.clone(),
        latitude: record.location.latitude,
        longitude: record.location.longitude,
        habitattyp: record.effective_habitat().map(str::to_string),
        habitatfamilie: result.and_then(|r| r.habitatfamilie.clone()),
        protection_status: record.protection_status,
        verified_at: record.verified_at.and_then(rfc3339),
        author_name: record
            .author_name
            .clone()
            .filter(|name| show_name && !name.trim().is_empty()),
    }
}

pub(crate) fn rfc3339(at: DateTime) -> Option<String> {
    at.try_to_rfc3339_string().ok()
}

pub(crate) fn not_found(record_id: &str) -> BiotopError {
    BiotopError::NotFound(format!("Record {} not found", record_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::db::memory::InMemoryRecordStore;
    use crate::db::schemas::AnalysisResult;
    use crate::services::catalog::StaticHabitatCatalog;
    use crate::services::users::InMemoryUserDirectory;

    fn service(store: Arc<InMemoryRecordStore>) -> RecordService {
        RecordService::new(
            store,
            Arc::new(InMemoryUserDirectory::new()),
            Arc::new(StaticHabitatCatalog::new()),
        )
    }

    #[tokio::test]
    async fn test_get_record_denies_strangers() {
        let store = Arc::new(InMemoryRecordStore::new());
        store.insert(HabitatRecord::new("r-1", "anna@example.org")).unwrap();
        let service = service(store);

        let stranger = Caller::new("bert@example.org", Role::User);
        let err = service.get_record(&stranger, "r-1").await.unwrap_err();
        assert!(matches!(err, BiotopError::Forbidden(_)));

        let missing = service.get_record(&stranger, "r-404").await.unwrap_err();
        assert!(matches!(missing, BiotopError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_record_returns_deleted_to_owner() {
        let store = Arc::new(InMemoryRecordStore::new());
        let mut record = HabitatRecord::new("r-1", "anna@example.org");
        record.mark_deleted("anna@example.org", DateTime::now());
        store.insert(record).unwrap();
        let service = service(store);

        let owner = Caller::new("anna@example.org", Role::User);
        assert!(service.get_record(&owner, "r-1").await.unwrap().deleted);
    }

    #[tokio::test]
    async fn test_export_pages_through_everything() {
        let store = Arc::new(InMemoryRecordStore::new());
        for i in 0..(MAX_PAGE_SIZE + 5) {
            let mut record = HabitatRecord::new(format!("r-{:04}", i), "anna@example.org");
            record.created_at = DateTime::from_millis(i as i64);
            store.insert(record).unwrap();
        }
        let service = service(store);

        let owner = Caller::new("anna@example.org", Role::User);
        let exported = service
            .export_records(&owner, &RecordFilters::default())
            .await
            .unwrap();
        assert_eq!(exported.len() as u64, MAX_PAGE_SIZE + 5);
        assert_eq!(exported[0].record_id, "r-0000");
    }

    #[test]
    fn test_public_record_hides_name_when_not_allowed() {
        let mut record = HabitatRecord::new("r-1", "anna@example.org");
        record.author_name = Some("Anna".into());
        record.auto_result = Some(AnalysisResult::with_habitat("Hecke"));

        let hidden = to_public_record(&record, false);
        assert_eq!(hidden.author_name, None);
        assert_eq!(hidden.habitattyp.as_deref(), Some("Hecke"));

        let shown = to_public_record(&record, true);
        assert_eq!(shown.author_name.as_deref(), Some("Anna"));

        let json = serde_json::to_string(&shown).unwrap();
        assert!(!json.contains("anna@example.org"));
    }

    #[test]
    fn test_page_respects_configured_maximum() {
        let service = service(Arc::new(InMemoryRecordStore::new())).with_max_page_size(25);
        assert_eq!(service.page(1, 80).limit, 25);
    }
}
