//! Pipeline orchestrator: ties loaded sales and promotion history to the
//! engine and the repository.
//!
//! ## Entry points
//!
//! `import_promotion_history()` replaces the stored event history.
//!
//! `learn_elasticity()`:
//!   1. Group stored promotion events by product
//!   2. For each product, compute accepted uplifts → profile (bounded tasks)
//!   3. Upsert each learned profile; products without evidence are skipped
//!
//! `generate_recommendations()`:
//!   1. Trim sales to the lookback window; decliners ∪ every profiled product
//!   2. Per candidate: recency check, profile or category fallback, policy
//!   3. One deterministic sort by expected additional revenue
//!
//! Output order never depends on task completion order.

use crate::config::{AppConfig, EngineConfig};
use crate::engine::aggregate::{daily_series, period_totals, trailing_window};
use crate::engine::decline::detect_declining;
use crate::engine::learner::learn_profile;
use crate::engine::recommend::{Candidate, candidates, rank, resolve_effect, score_candidate};
use crate::models::{
    CategoryAverage, DailySalesRecord, DeclineResult, ProductPromoProfile, PromotionEvent, Recommendation,
};
use crate::storage::{PromoRepository, StorageError};
use chrono::{NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{AcquireError, Semaphore};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("data access failure: {0}")]
    DataAccess(#[from] StorageError),

    #[error("worker task failed: {0}")]
    Task(#[from] JoinError),

    #[error("worker pool closed: {0}")]
    PoolClosed(#[from] AcquireError),
}

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, PartialEq)]
pub struct LearningOutcome {
    /// Learned profiles, ordered by product code.
    pub profiles: Vec<ProductPromoProfile>,
    pub count: usize,
}

pub struct Pipeline {
    repo: Arc<dyn PromoRepository>,
    engine: Arc<EngineConfig>,
    concurrency: usize,
}

impl Pipeline {
    pub fn new(repo: Arc<dyn PromoRepository>, engine: EngineConfig, concurrency: usize) -> Self {
        Self {
            repo,
            engine: Arc::new(engine),
            concurrency: concurrency.max(1),
        }
    }

    pub fn from_config(repo: Arc<dyn PromoRepository>, config: &AppConfig) -> Self {
        Self::new(repo, config.engine.clone(), config.pipeline.concurrency)
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.engine
    }

    pub fn repository(&self) -> &Arc<dyn PromoRepository> {
        &self.repo
    }

    pub async fn import_promotion_history(&self, events: &[PromotionEvent]) -> EngineResult<usize> {
        let n = self.repo.replace_promotion_events(events).await?;
        info!("Imported {} promotion events", n);
        Ok(n)
    }

    /// Learn and persist a profile for every product with promotion history.
    pub async fn learn_elasticity(&self, daily_sales: &[DailySalesRecord]) -> EngineResult<LearningOutcome> {
        let events = self.repo.get_promotion_events().await?;
        let mut events_by_product: BTreeMap<String, Vec<PromotionEvent>> = BTreeMap::new();
        for ev in events {
            let code = ev.product_code.trim().to_string();
            if code.is_empty() {
                continue;
            }
            events_by_product.entry(code).or_default().push(ev);
        }

        let mut series_by_product = daily_series(daily_sales);
        let updated_at = Utc::now().naive_utc();
        info!(
            "Learning profiles for {} products with promotion history",
            events_by_product.len()
        );

        let sem = Arc::new(Semaphore::new(self.concurrency));
        let mut handles: Vec<(String, JoinHandle<EngineResult<Option<ProductPromoProfile>>>)> = Vec::new();

        for (code, product_events) in events_by_product {
            let series = series_by_product.remove(&code).unwrap_or_default();
            let repo = Arc::clone(&self.repo);
            let engine = Arc::clone(&self.engine);
            let sem = Arc::clone(&sem);
            let task_code = code.clone();

            let handle = tokio::spawn(async move {
                let _permit = sem.acquire().await?;

                let Some(profile) = learn_profile(&task_code, &series, &product_events, &engine, updated_at) else {
                    debug!("{}: no accepted uplift samples, skipped", task_code);
                    return Ok(None);
                };

                repo.upsert_product_profile(&profile).await?;
                debug!(
                    "{}: uplift {:.3} ({}) from {} samples",
                    task_code, profile.avg_uplift, profile.elasticity_class, profile.sample_count
                );
                Ok::<_, EngineError>(Some(profile))
            });

            handles.push((code, handle));
        }

        let mut profiles = Vec::new();
        let mut first_error: Option<EngineError> = None;
        for (code, handle) in handles {
            match handle.await {
                Ok(Ok(Some(p))) => profiles.push(p),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    warn!("{}: {}", code, e);
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    error!("Task panic for {}: {}", code, e);
                    first_error.get_or_insert(e.into());
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        profiles.sort_by(|a, b| a.product_code.cmp(&b.product_code));
        let count = profiles.len();
        info!("Learned {} profiles", count);
        Ok(LearningOutcome { profiles, count })
    }

    pub fn detect_declining_products(&self, daily_sales: &[DailySalesRecord], lookback_days: u32) -> Vec<DeclineResult> {
        let out = detect_declining(daily_sales, lookback_days);
        info!("{} declining products over a {}-day lookback", out.len(), lookback_days);
        out
    }

    /// Ranked recommendations as of `as_of` from recent sales and stock.
    pub async fn generate_recommendations(
        &self,
        daily_sales: &[DailySalesRecord],
        stock_by_product: &HashMap<String, f64>,
        as_of: NaiveDate,
    ) -> EngineResult<Vec<Recommendation>> {
        let lookback = self.engine.recommendation_lookback_days;
        let recent = trailing_window(daily_sales, lookback);
        let declines = self.detect_declining_products(&recent, lookback);
        let totals = period_totals(&recent);
        let profiled = self.repo.get_product_profiles().await?;
        let fallback = self.repo.get_category_average_uplift().await?;

        let pool = candidates(&totals, &declines, profiled.into_iter().map(|p| p.product_code));
        info!("Scoring {} candidates as of {}", pool.len(), as_of);

        let sem = Arc::new(Semaphore::new(self.concurrency));
        let mut handles: Vec<(String, JoinHandle<EngineResult<Option<Recommendation>>>)> = Vec::new();

        for candidate in pool {
            let code = candidate.product_code.clone();
            let stock = stock_by_product.get(&code).copied();
            let repo = Arc::clone(&self.repo);
            let min_days = self.engine.min_days_between_promos;
            let sem = Arc::clone(&sem);

            let handle = tokio::spawn(async move {
                let _permit = sem.acquire().await?;
                score_one(repo.as_ref(), &candidate, stock, as_of, min_days, fallback).await
            });
            handles.push((code, handle));
        }

        let mut recommendations = Vec::new();
        let mut first_error: Option<EngineError> = None;
        for (code, handle) in handles {
            match handle.await {
                Ok(Ok(Some(rec))) => recommendations.push(rec),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    warn!("{}: {}", code, e);
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    error!("Task panic for {}: {}", code, e);
                    first_error.get_or_insert(e.into());
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let ranked = rank(recommendations);
        info!("{} recommendations", ranked.len());
        Ok(ranked)
    }
}

async fn score_one(
    repo: &dyn PromoRepository,
    candidate: &Candidate,
    stock: Option<f64>,
    as_of: NaiveDate,
    min_days: u32,
    fallback: CategoryAverage,
) -> EngineResult<Option<Recommendation>> {
    let code = candidate.product_code.as_str();
    if repo.was_product_on_promo_recently(code, as_of, min_days).await? {
        debug!("{}: promoted within the last {} days, skipped", code, min_days);
        return Ok(None);
    }

    let profile = repo.get_product_profile(code).await?;
    let rec = score_candidate(candidate, resolve_effect(profile.as_ref(), fallback), stock);
    if rec.is_none() {
        debug!("{}: low elasticity and no stock to clear", code);
    }
    Ok(rec)
}
