use super::{PromoRepository, StorageResult};
use crate::engine::recommend::{category_average, within_cooldown};
use crate::models::{CategoryAverage, ProductPromoProfile, PromotionEvent};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Process-local store, used for dry runs and tests. Nothing survives exit.
#[derive(Default)]
pub struct InMemoryRepository {
    events: RwLock<Vec<PromotionEvent>>,
    profiles: RwLock<BTreeMap<String, ProductPromoProfile>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PromoRepository for InMemoryRepository {
    async fn get_promotion_events(&self) -> StorageResult<Vec<PromotionEvent>> {
        Ok(self.events.read().await.clone())
    }

    async fn replace_promotion_events(&self, events: &[PromotionEvent]) -> StorageResult<usize> {
        let mut guard = self.events.write().await;
        *guard = events.to_vec();
        Ok(guard.len())
    }

    async fn promotion_event_count(&self) -> StorageResult<usize> {
        Ok(self.events.read().await.len())
    }

    async fn upsert_product_profile(&self, profile: &ProductPromoProfile) -> StorageResult<()> {
        self.profiles
            .write()
            .await
            .insert(profile.product_code.clone(), profile.clone());
        Ok(())
    }

    async fn get_product_profile(&self, product_code: &str) -> StorageResult<Option<ProductPromoProfile>> {
        Ok(self.profiles.read().await.get(product_code).cloned())
    }

    async fn get_product_profiles(&self) -> StorageResult<Vec<ProductPromoProfile>> {
        Ok(self.profiles.read().await.values().cloned().collect())
    }

    async fn get_category_average_uplift(&self) -> StorageResult<CategoryAverage> {
        let profiles: Vec<ProductPromoProfile> = self.profiles.read().await.values().cloned().collect();
        Ok(category_average(&profiles))
    }

    async fn was_product_on_promo_recently(
        &self,
        product_code: &str,
        before_date: NaiveDate,
        min_days: u32,
    ) -> StorageResult<bool> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .any(|e| e.product_code == product_code && within_cooldown(e.end_date, before_date, min_days)))
    }
}
