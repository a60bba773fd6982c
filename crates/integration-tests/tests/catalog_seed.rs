//! The shipped catalog file must stay loadable by the seeder.

use reality_cheque_api::services::catalog::{CatalogSeed, DEFAULT_CATALOG as CATALOG};

#[test]
fn test_shipped_catalog_parses() {
    let seed = CatalogSeed::parse(CATALOG).expect("catalog.yaml should parse");
    assert!(!seed.categories.is_empty());
    assert!(!seed.models.is_empty());
}

#[test]
fn test_every_model_references_known_category() {
    let seed = CatalogSeed::parse(CATALOG).expect("catalog.yaml should parse");
    for model in &seed.models {
        assert!(
            seed.categories.iter().any(|c| c.name == model.category),
            "{} has unknown category {}",
            model.name,
            model.category
        );
    }
}
