//! Domain services
//!
//! - `records`: `RecordService` and all record reads
//! - `verification`: verify, unverify, correct, re-analysis and deletion
//! - `protection`: schutzstatus normalization and map colors
//! - `catalog`, `users`, `classifier`: collaborators behind traits

pub mod catalog;
pub mod classifier;
pub mod protection;
pub mod records;
pub mod users;
pub mod verification;

pub use catalog::{HabitatCatalog, MongoHabitatCatalog, StaticHabitatCatalog};
pub use classifier::{Classifier, HttpClassifier};
pub use records::{PublicRecord, PublicRecordPage, RecordService};
pub use users::{InMemoryUserDirectory, MongoUserDirectory, UserDirectory};
pub use verification::MAX_TRANSITION_ATTEMPTS;
