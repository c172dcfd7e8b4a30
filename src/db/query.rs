//! Typed record predicates, sorting and paging
//!
//! A `RecordQuery` is built once by the visibility policy and then either
//! compiled to a MongoDB filter or evaluated against records in memory. Both
//! paths must agree; the tests below pin them to each other.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use bson::{doc, Bson, Document, Regex};
use serde::Serialize;

use crate::db::schemas::{HabitatRecord, ProtectionStatus};

/// Hard upper bound for a single page
pub const MAX_PAGE_SIZE: u64 = 100;
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Filters as requested by a caller, before any visibility narrowing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilters {
    pub gemeinde: Option<String>,
    pub habitat: Option<String>,
    /// Author e-mail or author name
    pub person: Option<String>,
    pub verified: Option<bool>,
    pub protection_status: Option<ProtectionStatus>,
    /// Free text over id, author, place names and habitat type
    pub search: Option<String>,
}

/// Predicate over non-deleted habitat records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordQuery {
    /// Exact author restriction set by the visibility policy
    pub author_email: Option<String>,
    pub person: Option<String>,
    pub verified: Option<bool>,
    pub gemeinde: Option<String>,
    pub habitat: Option<String>,
    pub protection_status: Option<ProtectionStatus>,
    pub search: Option<String>,
    /// Keep `authorName` out of free-text search
    pub hide_author_names: bool,
}

impl RecordQuery {
    /// Query carrying the caller's narrowing filters, without restrictions
    pub fn from_filters(filters: &RecordFilters) -> Self {
        Self {
            author_email: None,
            person: non_empty(&filters.person),
            verified: filters.verified,
            gemeinde: non_empty(&filters.gemeinde),
            habitat: non_empty(&filters.habitat),
            protection_status: filters.protection_status,
            search: non_empty(&filters.search),
            hide_author_names: false,
        }
    }

    /// Compile to a MongoDB filter document
    pub fn to_document(&self) -> Document {
        let mut filter = doc! { "deleted": { "$ne": true } };
        let mut alternatives: Vec<Bson> = Vec::new();

        if let Some(email) = &self.author_email {
            filter.insert("authorEmail", email.as_str());
        }

        match self.verified {
            Some(true) => {
                filter.insert("verified", true);
            }
            Some(false) => {
                filter.insert("verified", doc! { "$ne": true });
            }
            None => {}
        }

        if let Some(gemeinde) = &self.gemeinde {
            filter.insert("location.gemeinde", gemeinde.as_str());
        }

        if let Some(status) = self.protection_status {
            filter.insert("protectionStatus", status.as_str());
        }

        if let Some(person) = &self.person {
            alternatives.push(Bson::Document(doc! {
                "$or": [
                    { "authorEmail": person.trim().to_lowercase() },
                    { "authorName": person.as_str() },
                ]
            }));
        }

        if let Some(habitat) = &self.habitat {
            alternatives.push(Bson::Document(doc! {
                "$or": [
                    { "verifiedResult.habitattyp": habitat.as_str() },
                    {
                        "verifiedResult": { "$exists": false },
                        "autoResult.habitattyp": habitat.as_str(),
                    },
                ]
            }));
        }

        if let Some(search) = &self.search {
            let regex = Bson::RegularExpression(Regex {
                pattern: escape_regex(search),
                options: "i".to_string(),
            });
            let fields = [
                "recordId",
                "authorName",
                "location.gemeinde",
                "location.flurname",
                "verifiedResult.habitattyp",
                "autoResult.habitattyp",
            ];
            let clauses: Vec<Bson> = fields
                .iter()
                .filter(|field| !(self.hide_author_names && **field == "authorName"))
                .map(|field| {
                    let mut clause = Document::new();
                    clause.insert(*field, regex.clone());
                    Bson::Document(clause)
                })
                .collect();
            alternatives.push(Bson::Document(doc! { "$or": clauses }));
        }

        if !alternatives.is_empty() {
            filter.insert("$and", alternatives);
        }

        filter
    }

    /// Evaluate against a record already in memory
    pub fn matches(&self, record: &HabitatRecord) -> bool {
        if record.deleted {
            return false;
        }

        if let Some(email) = &self.author_email {
            if &record.author_email != email {
                return false;
            }
        }

        if let Some(verified) = self.verified {
            if record.verified != verified {
                return false;
            }
        }

        if let Some(gemeinde) = &self.gemeinde {
            if record.location.gemeinde.as_deref() != Some(gemeinde.as_str()) {
                return false;
            }
        }

        if let Some(status) = self.protection_status {
            if record.protection_status != Some(status) {
                return false;
            }
        }

        if let Some(person) = &self.person {
            let by_email = record.author_email == person.trim().to_lowercase();
            let by_name = record.author_name.as_deref() == Some(person.as_str());
            if !by_email && !by_name {
                return false;
            }
        }

        if let Some(habitat) = &self.habitat {
            if record.effective_habitat() != Some(habitat.as_str()) {
                return false;
            }
        }

        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let haystacks = [
                Some(record.record_id.as_str()),
                record.author_name.as_deref().filter(|_| !self.hide_author_names),
                record.location.gemeinde.as_deref(),
                record.location.flurname.as_deref(),
                record
                    .verified_result
                    .as_ref()
                    .and_then(|r| r.habitattyp.as_deref()),
                record.auto_result.as_ref().and_then(|r| r.habitattyp.as_deref()),
            ];
            let found = haystacks
                .iter()
                .flatten()
                .any(|value| value.to_lowercase().contains(&needle));
            if !found {
                return false;
            }
        }

        true
    }
}

/// Sortable record fields
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    VerifiedAt,
    Gemeinde,
}

impl SortField {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "createdAt" => Some(SortField::CreatedAt),
            "updatedAt" => Some(SortField::UpdatedAt),
            "verifiedAt" => Some(SortField::VerifiedAt),
            "gemeinde" => Some(SortField::Gemeinde),
            _ => None,
        }
    }

    fn path(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "createdAt",
            SortField::UpdatedAt => "updatedAt",
            SortField::VerifiedAt => "verifiedAt",
            SortField::Gemeinde => "location.gemeinde",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

/// Sort order; ties are always broken by ascending `recordId`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordSort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl RecordSort {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    pub fn to_document(&self) -> Document {
        let order = match self.direction {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        };
        let mut sort = Document::new();
        sort.insert(self.field.path(), order);
        sort.insert("recordId", 1);
        sort
    }

    /// Same ordering as `to_document`, missing values first when ascending
    pub fn compare(&self, a: &HabitatRecord, b: &HabitatRecord) -> Ordering {
        let primary = match self.field {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortField::VerifiedAt => a.verified_at.cmp(&b.verified_at),
            SortField::Gemeinde => a.location.gemeinde.cmp(&b.location.gemeinde),
        };
        let primary = match self.direction {
            SortDirection::Asc => primary,
            SortDirection::Desc => primary.reverse(),
        };
        primary.then_with(|| a.record_id.cmp(&b.record_id))
    }
}

/// 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u64,
    pub limit: u64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Page {
    /// Clamp to `1..=max_limit` (and never above `MAX_PAGE_SIZE`)
    pub fn new(page: u64, limit: u64, max_limit: u64) -> Self {
        let max_limit = max_limit.clamp(1, MAX_PAGE_SIZE);
        Self {
            page: page.max(1),
            limit: limit.clamp(1, max_limit),
        }
    }

    /// Saturates instead of overflowing for absurd page numbers
    pub fn skip(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

/// One page of records plus the total match count
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    pub records: Vec<HabitatRecord>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

/// Fields that can be faceted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacetField {
    Gemeinde,
    /// Verified habitat type if present, else the automatic one
    Habitat,
    /// Author name, falling back to e-mail
    Person,
}

impl FacetField {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "gemeinde" => Some(FacetField::Gemeinde),
            "habitat" => Some(FacetField::Habitat),
            "person" => Some(FacetField::Person),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FacetField::Gemeinde => "gemeinde",
            FacetField::Habitat => "habitat",
            FacetField::Person => "person",
        }
    }

    /// Facet value of one record, `None` when the field is empty
    pub fn value_of(&self, record: &HabitatRecord) -> Option<String> {
        let value = match self {
            FacetField::Gemeinde => record.location.gemeinde.as_deref(),
            FacetField::Habitat => record.effective_habitat(),
            FacetField::Person => Some(record.person_label()),
        };
        value
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.to_string())
    }

    /// Aggregation pipeline equivalent to `collect_buckets`
    pub fn pipeline(&self, query: &RecordQuery) -> Vec<Document> {
        let key = match self {
            FacetField::Gemeinde => Bson::String("$location.gemeinde".to_string()),
            FacetField::Habitat => Bson::Document(doc! {
                "$cond": [
                    { "$eq": [{ "$type": "$verifiedResult" }, "object"] },
                    "$verifiedResult.habitattyp",
                    "$autoResult.habitattyp",
                ]
            }),
            FacetField::Person => Bson::Document(doc! {
                "$cond": [
                    {
                        "$gt": [
                            { "$strLenCP": { "$trim": { "input": { "$ifNull": ["$authorName", ""] } } } },
                            0,
                        ]
                    },
                    "$authorName",
                    "$authorEmail",
                ]
            }),
        };

        let mut group = doc! {
            "_id": key,
            "count": { "$sum": 1 },
        };
        if *self == FacetField::Person {
            group.insert("authorEmails", doc! { "$addToSet": "$authorEmail" });
        }

        vec![
            doc! { "$match": query.to_document() },
            doc! { "$group": group },
            doc! { "$match": { "_id": { "$type": "string", "$ne": "" } } },
            doc! { "$sort": { "_id": 1 } },
        ]
    }
}

/// Distinct value of a facet with its record count
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetBucket {
    pub value: String,
    pub count: u64,
    /// Only filled for person facets; used for name visibility checks
    #[serde(skip)]
    pub author_emails: Vec<String>,
}

/// Group already-filtered records into sorted facet buckets
pub fn collect_buckets<'a>(
    field: FacetField,
    records: impl IntoIterator<Item = &'a HabitatRecord>,
) -> Vec<FacetBucket> {
    let mut groups: BTreeMap<String, (u64, BTreeSet<String>)> = BTreeMap::new();
    for record in records {
        let Some(value) = field.value_of(record) else {
            continue;
        };
        let entry = groups.entry(value).or_default();
        entry.0 += 1;
        if field == FacetField::Person {
            entry.1.insert(record.author_email.clone());
        }
    }

    groups
        .into_iter()
        .map(|(value, (count, emails))| FacetBucket {
            value,
            count,
            author_emails: emails.into_iter().collect(),
        })
        .collect()
}

/// Escape regex metacharacters so user input matches literally
pub fn escape_regex(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(
            c,
            '.' | '*' | '+' | '?' | '^' | '$' | '{' | '}' | '(' | ')' | '|' | '[' | ']' | '\\'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
