//! Habitat-type reference catalog
//!
//! Canonical family and legal-protection label per habitat type. Seeded once at
//! startup through `HabitatCatalog::ensure_seeded`.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for habitat types
pub const HABITAT_TYPE_COLLECTION: &str = "habitatTypes";

/// One habitat type in the catalog
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HabitatTypeDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub name: String,

    pub habitat_family: String,

    /// e.g. "gesetzlich geschützt", "ökologisch hochwertig"
    pub legal_status_label: String,
}

impl HabitatTypeDoc {
    pub fn new(name: &str, habitat_family: &str, legal_status_label: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            habitat_family: habitat_family.to_string(),
            legal_status_label: legal_status_label.to_string(),
        }
    }
}

impl IntoIndexes for HabitatTypeDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "name": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("habitat_type_name_unique".to_string())
                    .build(),
            ),
        )]
    }
}

/// Reference data inserted by `ensure_seeded`
pub fn default_catalog() -> Vec<HabitatTypeDoc> {
    const PROTECTED: &str = "gesetzlich geschützt";
    const VALUABLE: &str = "ökologisch hochwertig";
    const WORTHY: &str = "schützenswert";
    const STANDARD: &str = "ökologisch niederwertig";

    vec![
        HabitatTypeDoc::new("Magerwiese", "Grünland", PROTECTED),
        HabitatTypeDoc::new("Trockenrasen", "Grünland", PROTECTED),
        HabitatTypeDoc::new("Feuchtwiese", "Grünland", PROTECTED),
        HabitatTypeDoc::new("Bergwiese", "Grünland", VALUABLE),
        HabitatTypeDoc::new("Fettwiese", "Grünland", STANDARD),
        HabitatTypeDoc::new("Niedermoor", "Moore und Sümpfe", PROTECTED),
        HabitatTypeDoc::new("Hochmoor", "Moore und Sümpfe", PROTECTED),
        HabitatTypeDoc::new("Auwald", "Wälder", PROTECTED),
        HabitatTypeDoc::new("Laubmischwald", "Wälder", VALUABLE),
        HabitatTypeDoc::new("Fichtenforst", "Wälder", STANDARD),
        HabitatTypeDoc::new("Hecke", "Gehölze", VALUABLE),
        HabitatTypeDoc::new("Streuobstwiese", "Gehölze", VALUABLE),
        HabitatTypeDoc::new("Felsflur", "Fels und Geröll", WORTHY),
        HabitatTypeDoc::new("Schutthalde", "Fels und Geröll", WORTHY),
        HabitatTypeDoc::new("Acker", "Agrarflächen", STANDARD),
        HabitatTypeDoc::new("Weinberg", "Agrarflächen", STANDARD),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_catalog_names_are_unique() {
        let catalog = default_catalog();
        let names: HashSet<&str> = catalog.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names.len(), catalog.len());
    }

    #[test]
    fn test_magerwiese_is_legally_protected() {
        let magerwiese = default_catalog()
            .into_iter()
            .find(|t| t.name == "Magerwiese")
            .unwrap();
        assert_eq!(magerwiese.legal_status_label, "gesetzlich geschützt");
    }
}
