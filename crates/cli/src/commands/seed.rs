//! Seed the AI catalog.
//!
//! Without a file the built-in catalog is used. A YAML file follows the
//! same layout as `crates/api/seed/catalog.yaml`. Seeding upserts by name,
//! so it can be re-run after editing the file.

use std::path::Path;

use tracing::info;

use reality_cheque_api::services::CatalogService;
use reality_cheque_api::services::catalog::CatalogSeed;

use super::{CommandError, connect};

/// Seed the catalog from `file_path`, or the built-in catalog.
pub async fn catalog(file_path: Option<&Path>) -> Result<(), CommandError> {
    // Parse before connecting so a bad file fails fast
    let seed = match file_path {
        Some(path) => {
            info!(path = %path.display(), "Loading catalog from file");
            let content =
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| CommandError::Io {
                        path: path.display().to_string(),
                        source,
                    })?;
            Some(CatalogSeed::parse(&content).map_err(|e| CommandError::Rejected(e.to_string()))?)
        }
        None => None,
    };

    let pool = connect().await?;
    let service = CatalogService::new(&pool);
    let report = match &seed {
        Some(seed) => service.seed(seed).await,
        None => service.populate().await,
    }
    .map_err(|e| CommandError::Rejected(e.to_string()))?;

    info!("Seeding complete!");
    info!("  Categories: {}", report.categories);
    info!("  Features: {}", report.features);
    info!("  Models: {}", report.models);
    Ok(())
}
