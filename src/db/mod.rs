//! Persistence layer
//!
//! - `schemas`: MongoDB document shapes
//! - `query`: typed predicates shared by both stores
//! - `store`: the `RecordStore` port
//! - `records` / `memory`: MongoDB and in-memory implementations

pub mod memory;
pub mod mongo;
pub mod query;
pub mod records;
pub mod schemas;
pub mod store;

pub use memory::InMemoryRecordStore;
pub use mongo::{IntoIndexes, MongoClient, MongoCollection};
pub use query::{
    FacetBucket, FacetField, Page, RecordFilters, RecordPage, RecordQuery, RecordSort,
    SortDirection, SortField,
};
pub use records::MongoRecordStore;
pub use store::RecordStore;
