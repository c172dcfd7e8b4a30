//! Database schemas for Biotop
//!
//! Defines MongoDB document structures for habitat records, their audit
//! history, users, and the habitat-type catalog.

mod habitat_type;
mod history;
mod record;
mod user;

pub use habitat_type::{default_catalog, HabitatTypeDoc, HABITAT_TYPE_COLLECTION};
pub use history::{
    AuditUser, History, HistoryEntry, MODULE_CORRECTION, MODULE_DELETION, MODULE_REANALYSIS,
    MODULE_UNVERIFICATION, MODULE_VERIFICATION,
};
pub use record::{
    AnalysisResult, AnalysisStatus, HabitatRecord, ProtectionStatus, RecordLocation,
    Schutzstatus, VerifiedBy, RECORD_COLLECTION,
};
pub use user::{NameVisibility, UserDoc, USER_COLLECTION};
