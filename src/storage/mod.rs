//! Repository seam for promotion history and learned profiles.
//!
//! One async contract, two backends (DuckDB file store and in-memory),
//! chosen once at startup by [`open_repository`].
//!
//! Consistency: each profile write replaces the whole record atomically, but
//! nothing orders a recommendation run against a concurrent learning run.
//! A recommendation may see the profile from before or after a concurrent
//! upsert, never a mix of both.

pub mod local;
pub mod memory;

use crate::config::{StorageBackend, StorageConfig};
use crate::models::{CategoryAverage, ProductPromoProfile, PromotionEvent};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

pub use self::local::DuckDbRepository;
pub use self::memory::InMemoryRepository;

/// Data access failure. Always distinct from "no result for this product".
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{op} failed: {source}")]
    Database {
        op: &'static str,
        #[source]
        source: duckdb::Error,
    },

    #[error("could not create database directory {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt profile row for {product_code}: {detail}")]
    Corrupt { product_code: String, detail: String },

    #[error("database connection lock poisoned")]
    Poisoned,
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait PromoRepository: Send + Sync {
    async fn get_promotion_events(&self) -> StorageResult<Vec<PromotionEvent>>;

    /// Clear all history and insert `events` in one transaction.
    async fn replace_promotion_events(&self, events: &[PromotionEvent]) -> StorageResult<usize>;

    async fn promotion_event_count(&self) -> StorageResult<usize>;

    /// Insert or fully replace the profile for `profile.product_code`.
    async fn upsert_product_profile(&self, profile: &ProductPromoProfile) -> StorageResult<()>;

    async fn get_product_profile(&self, product_code: &str) -> StorageResult<Option<ProductPromoProfile>>;

    /// All profiles, ordered by product code.
    async fn get_product_profiles(&self) -> StorageResult<Vec<ProductPromoProfile>>;

    /// Mean uplift and confidence over all profiles, `{1.2, 0.5}` with none.
    async fn get_category_average_uplift(&self) -> StorageResult<CategoryAverage>;

    /// Whether any promotion for the product ended within `min_days` before
    /// `before_date` (or has not ended yet).
    async fn was_product_on_promo_recently(
        &self,
        product_code: &str,
        before_date: NaiveDate,
        min_days: u32,
    ) -> StorageResult<bool>;
}

/// Build the configured backend.
pub fn open_repository(config: &StorageConfig) -> StorageResult<Arc<dyn PromoRepository>> {
    match config.backend {
        StorageBackend::Duckdb => {
            let repo = DuckDbRepository::open(&config.db_path)?;
            if config.run_migrations {
                repo.run_migrations()?;
            }
            info!("Using DuckDB store at {:?}", config.db_path);
            Ok(Arc::new(repo))
        }
        StorageBackend::Memory => {
            info!("Using in-memory store");
            Ok(Arc::new(InMemoryRepository::new()))
        }
    }
}
