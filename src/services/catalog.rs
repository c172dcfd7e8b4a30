//! Habitat-type catalog
//!
//! Verification looks up the family and legal label of the chosen habitat
//! type here. Reference data is seeded explicitly at startup.

use async_trait::async_trait;
use bson::doc;
use dashmap::DashMap;
use mongodb::options::UpdateOptions;
use tracing::info;

use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::schemas::{default_catalog, HabitatTypeDoc, HABITAT_TYPE_COLLECTION};
use crate::types::{BiotopError, Result};

#[async_trait]
pub trait HabitatCatalog: Send + Sync {
    /// `Ok(None)` for unknown types; `Err` only when the catalog is unreachable
    async fn lookup(&self, name: &str) -> Result<Option<HabitatTypeDoc>>;

    /// Insert missing reference entries; never overwrites existing ones
    async fn ensure_seeded(&self) -> Result<usize>;
}

pub struct MongoHabitatCatalog {
    types: MongoCollection<HabitatTypeDoc>,
}

impl MongoHabitatCatalog {
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        let types = mongo
            .collection::<HabitatTypeDoc>(HABITAT_TYPE_COLLECTION)
            .await?;
        Ok(Self { types })
    }
}

#[async_trait]
impl HabitatCatalog for MongoHabitatCatalog {
    async fn lookup(&self, name: &str) -> Result<Option<HabitatTypeDoc>> {
        self.types
            .find_one(doc! { "name": name.trim() })
            .await
            .map_err(|e| BiotopError::Upstream(format!("Habitat catalog unavailable: {}", e)))
    }

    async fn ensure_seeded(&self) -> Result<usize> {
        let mut inserted = 0;
        for entry in default_catalog() {
            let result = self
                .types
                .inner()
                .update_one(
                    doc! { "name": entry.name.as_str() },
                    doc! {
                        "$setOnInsert": {
                            "name": entry.name.as_str(),
                            "habitatFamily": entry.habitat_family.as_str(),
                            "legalStatusLabel": entry.legal_status_label.as_str(),
                        }
                    },
                )
                .with_options(UpdateOptions::builder().upsert(true).build())
                .await?;
            if result.upserted_id.is_some() {
                inserted += 1;
            }
        }
        info!(inserted, "Habitat catalog seeded");
        Ok(inserted)
    }
}

/// Catalog held in memory, for tests and dev mode
#[derive(Default)]
pub struct StaticHabitatCatalog {
    types: DashMap<String, HabitatTypeDoc>,
}

impl StaticHabitatCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types(types: impl IntoIterator<Item = HabitatTypeDoc>) -> Self {
        let catalog = Self::new();
        for entry in types {
            catalog.types.insert(entry.name.clone(), entry);
        }
        catalog
    }
}

#[async_trait]
impl HabitatCatalog for StaticHabitatCatalog {
    async fn lookup(&self, name: &str) -> Result<Option<HabitatTypeDoc>> {
        Ok(self.types.get(name.trim()).map(|t| t.value().clone()))
    }

    async fn ensure_seeded(&self) -> Result<usize> {
        let mut inserted = 0;
        for entry in default_catalog() {
            if !self.types.contains_key(&entry.name) {
                self.types.insert(entry.name.clone(), entry);
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}
