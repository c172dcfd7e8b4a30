//! Audit trail attached to every habitat record
//!
//! Entries are appended to the in-memory next version of a record and written
//! by the same conditional replace as the state change that produced them.

use bson::{DateTime, Document};
use serde::{Deserialize, Serialize};

use crate::auth::Role;

pub const MODULE_VERIFICATION: &str = "verification";
pub const MODULE_UNVERIFICATION: &str = "unverification";
pub const MODULE_CORRECTION: &str = "correction";
pub const MODULE_REANALYSIS: &str = "reanalysis";
pub const MODULE_DELETION: &str = "deletion";

/// Who performed an audited change
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditUser {
    pub user_id: String,
    pub user_name: String,
    pub email: String,
    pub role: Role,
}

/// Immutable audit record
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub date: DateTime,
    pub user: AuditUser,
    /// Free-text label of the operation
    pub module: String,
    /// Snapshot before the change
    #[serde(default)]
    pub previous_result: Document,
    /// Snapshot after the change
    #[serde(default)]
    pub changes: Document,
}

impl HistoryEntry {
    pub fn new(
        date: DateTime,
        user: AuditUser,
        module: &str,
        previous_result: Document,
        changes: Document,
    ) -> Self {
        Self {
            date,
            user,
            module: module.to_string(),
            previous_result,
            changes,
        }
    }
}

/// Append-only list of history entries, oldest first
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct History(Vec<HistoryEntry>);

impl History {
    pub fn append(&mut self, entry: HistoryEntry) {
        self.0.push(entry);
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.0.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.0.iter()
    }
}
