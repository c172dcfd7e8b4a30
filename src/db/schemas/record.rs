//! Habitat record document schema
//!
//! Field names are the on-disk contract shared with existing stored records
//! (`verified`, `verifiedAt`, `verifiedBy`, `verifiedResult`,
//! `protectionStatus`, `deleted`, `history`) and must not change.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::db::mongo::IntoIndexes;
use crate::db::schemas::History;
use crate::services::protection;

/// Collection name for habitat records
pub const RECORD_COLLECTION: &str = "habitatRecords";

/// Three-level status used for public map coloring
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProtectionStatus {
    Red,
    Yellow,
    Green,
}

impl ProtectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtectionStatus::Red => "red",
            ProtectionStatus::Yellow => "yellow",
            ProtectionStatus::Green => "green",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "red" => Some(ProtectionStatus::Red),
            "yellow" => Some(ProtectionStatus::Yellow),
            "green" => Some(ProtectionStatus::Green),
            _ => None,
        }
    }
}

/// Legacy protection-status field: either a label or a weight map
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum Schutzstatus {
    Label(String),
    /// Key → weight, in stored key order
    Weights(Document),
}

/// Classification produced by the classifier or entered by an expert
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub habitattyp: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub habitatfamilie: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schutzstatus: Option<Schutzstatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kommentar: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zusammenfassung: Option<String>,

    /// Any other stored keys, preserved on rewrite
    #[serde(flatten)]
    pub extra: Document,
}

impl AnalysisResult {
    pub fn with_habitat(habitattyp: &str) -> Self {
        Self {
            habitattyp: Some(habitattyp.to_string()),
            ..Default::default()
        }
    }

    /// BSON snapshot used in history entries
    pub fn snapshot(&self) -> Result<Document, bson::ser::Error> {
        bson::to_document(self)
    }
}

/// Where the observation was made
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemeinde: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flurname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// Expert who last verified the record
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedBy {
    pub user_id: String,
    pub user_name: String,
    pub role: Role,
}

/// Automatic classification lifecycle
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    #[default]
    Pending,
    Analyzing,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Analyzing => "analyzing",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }
}

/// One field observation
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HabitatRecord {
    /// MongoDB document ID
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub record_id: String,

    pub author_email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,

    #[serde(default)]
    pub location: RecordLocation,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_result: Option<AnalysisResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_result: Option<AnalysisResult>,

    /// Present iff `verified`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protection_status: Option<ProtectionStatus>,

    #[serde(default)]
    pub analysis_status: AnalysisStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_error: Option<String>,

    /// When the running re-analysis was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_requested_at: Option<DateTime>,

    #[serde(default)]
    pub verified: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<VerifiedBy>,

    #[serde(default)]
    pub deleted: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<String>,

    #[serde(default)]
    pub history: History,

    pub created_at: DateTime,

    /// Bumped on every mutation; doubles as the optimistic-concurrency token
    pub updated_at: DateTime,
}

impl HabitatRecord {
    /// Create a new, unverified record
    pub fn new(record_id: impl Into<String>, author_email: &str) -> Self {
        let now = DateTime::now();
        Self {
            id: None,
            record_id: record_id.into(),
            author_email: author_email.trim().to_lowercase(),
            author_name: None,
            organization_id: None,
            organization_name: None,
            location: RecordLocation::default(),
            auto_result: None,
            verified_result: None,
            protection_status: None,
            analysis_status: AnalysisStatus::Pending,
            analysis_error: None,
            analysis_requested_at: None,
            verified: false,
            verified_at: None,
            verified_by: None,
            deleted: false,
            deleted_at: None,
            deleted_by: None,
            history: History::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Verified result when verified, automatic result otherwise
    pub fn effective_result(&self) -> Option<&AnalysisResult> {
        self.verified_result.as_ref().or(self.auto_result.as_ref())
    }

    /// Habitat type used for filtering and facets
    pub fn effective_habitat(&self) -> Option<&str> {
        match &self.verified_result {
            Some(result) => result.habitattyp.as_deref(),
            None => self
                .auto_result
                .as_ref()
                .and_then(|r| r.habitattyp.as_deref()),
        }
    }

    /// Person label shown in facets: author name, falling back to e-mail
    pub fn person_label(&self) -> &str {
        self.author_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.author_email)
    }

    /// Store an expert result and derive the protection status from it.
    ///
    /// The stored schutzstatus is collapsed to its canonical label.
    pub fn mark_verified(
        &mut self,
        mut result: AnalysisResult,
        verified_by: VerifiedBy,
        at: DateTime,
    ) {
        let label = protection::normalize(result.schutzstatus.as_ref());
        let status = protection::derive(Some(&Schutzstatus::Label(label.clone())));
        result.schutzstatus = Some(Schutzstatus::Label(label));

        self.verified = true;
        self.verified_at = Some(at);
        self.verified_by = Some(verified_by);
        self.verified_result = Some(result);
        self.protection_status = Some(status);
    }

    /// Drop every verification field, including the derived status
    pub fn clear_verification(&mut self) {
        self.verified = false;
        self.verified_at = None;
        self.verified_by = None;
        self.verified_result = None;
        self.protection_status = None;
    }

    pub fn mark_deleted(&mut self, deleted_by: &str, at: DateTime) {
        self.deleted = true;
        self.deleted_at = Some(at);
        self.deleted_by = Some(deleted_by.to_string());
    }
}

impl IntoIndexes for HabitatRecord {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "recordId": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("record_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "authorEmail": 1, "deleted": 1 },
                Some(
                    IndexOptions::builder()
                        .name("author_email_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "verified": 1, "deleted": 1, "location.gemeinde": 1 },
                Some(
                    IndexOptions::builder()
                        .name("public_listing_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expert() -> VerifiedBy {
        VerifiedBy {
            user_id: "u-9".into(),
            user_name: "Eva".into(),
            role: Role::Expert,
        }
    }

    #[test]
    fn test_mark_verified_derives_status_and_normalizes_label() {
        let mut record = HabitatRecord::new("r-1", "owner@example.org");
        let mut weights = Document::new();
        weights.insert("gesetzlich", 80);
        weights.insert("standard", 20);
        let result = AnalysisResult {
            habitattyp: Some("Feuchtwiese".into()),
            schutzstatus: Some(Schutzstatus::Weights(weights)),
            ..Default::default()
        };

        record.mark_verified(result, expert(), DateTime::now());

        assert!(record.verified);
        assert_eq!(record.protection_status, Some(ProtectionStatus::Red));
        assert_eq!(
            record.verified_result.unwrap().schutzstatus,
            Some(Schutzstatus::Label("gesetzlich geschützt".into()))
        );
    }

    #[test]
    fn test_clear_verification_removes_status() {
        let mut record = HabitatRecord::new("r-1", "owner@example.org");
        record.mark_verified(AnalysisResult::with_habitat("Magerwiese"), expert(), DateTime::now());
        record.clear_verification();

        assert!(!record.verified);
        assert!(record.verified_at.is_none());
        assert!(record.verified_by.is_none());
        assert!(record.verified_result.is_none());
        assert!(record.protection_status.is_none());
    }

    #[test]
    fn test_effective_habitat_prefers_verified_result() {
        let mut record = HabitatRecord::new("r-1", "owner@example.org");
        record.auto_result = Some(AnalysisResult::with_habitat("Fettwiese"));
        assert_eq!(record.effective_habitat(), Some("Fettwiese"));

        record.mark_verified(AnalysisResult::with_habitat("Magerwiese"), expert(), DateTime::now());
        assert_eq!(record.effective_habitat(), Some("Magerwiese"));
    }

    #[test]
    fn test_bson_field_names() {
        let mut record = HabitatRecord::new("r-1", "owner@example.org");
        record.mark_verified(AnalysisResult::with_habitat("Magerwiese"), expert(), DateTime::now());

        let doc = bson::to_document(&record).unwrap();
        for key in [
            "recordId",
            "authorEmail",
            "verified",
            "verifiedAt",
            "verifiedBy",
            "verifiedResult",
            "protectionStatus",
            "deleted",
            "history",
            "createdAt",
            "updatedAt",
        ] {
            assert!(doc.contains_key(key), "missing {key}");
        }
        assert!(!doc.contains_key("_id"));
        assert_eq!(doc.get_str("protectionStatus").unwrap(), "green");
    }

    #[test]
    fn test_deserializes_legacy_weight_map() {
        let stored = doc! {
            "recordId": "legacy-1",
            "authorEmail": "old@example.org",
            "autoResult": {
                "habitattyp": "Magerwiese",
                "schutzstatus": { "gesetzlich": 30, "hochwertig": 70, "standard": 10 },
                "wahrscheinlichkeit": 0.8
            },
            "createdAt": DateTime::from_millis(1_000),
            "updatedAt": DateTime::from_millis(1_000),
        };

        let record: HabitatRecord = bson::from_document(stored).unwrap();
        let auto = record.auto_result.unwrap();
        assert!(matches!(auto.schutzstatus, Some(Schutzstatus::Weights(_))));
        assert!(auto.extra.contains_key("wahrscheinlichkeit"));
        assert!(!record.verified);
        assert!(record.history.is_empty());
    }
}
