use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub engine: EngineConfig,
    pub pipeline: PipelineConfig,
}

/// Which repository implementation backs the engine.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Duckdb,
    Memory,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Learning and recommendation parameters. Passed explicitly into the
/// pipeline; nothing in the engine reads ambient state.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default = "default_baseline_days")]
    pub baseline_days_before_promo: u32,

    #[serde(default)]
    pub elasticity_thresholds: ElasticityThresholds,

    #[serde(default = "default_lookback_days")]
    pub recommendation_lookback_days: u32,

    #[serde(default = "default_min_days_between_promos")]
    pub min_days_between_promos: u32,
}

/// Lower bound is inclusive; an upper bound, when set, is exclusive.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct UpliftBand {
    pub min_uplift: f64,
    #[serde(default)]
    pub max_uplift: Option<f64>,
}

impl UpliftBand {
    pub fn contains(&self, uplift: f64) -> bool {
        uplift >= self.min_uplift && self.max_uplift.is_none_or(|max| uplift < max)
    }
}

/// Class boundaries; bands left out of a config file keep their defaults.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ElasticityThresholds {
    #[serde(alias = "EXTREME")]
    pub extreme: UpliftBand,
    #[serde(alias = "HIGH")]
    pub high: UpliftBand,
    #[serde(alias = "MEDIUM")]
    pub medium: UpliftBand,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_db_path() -> PathBuf {
    PathBuf::from("data/promo.duckdb")
}
fn default_true() -> bool {
    true
}
fn default_baseline_days() -> u32 {
    14
}
fn default_lookback_days() -> u32 {
    7
}
fn default_min_days_between_promos() -> u32 {
    30
}
fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            db_path: default_db_path(),
            run_migrations: true,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            baseline_days_before_promo: default_baseline_days(),
            elasticity_thresholds: ElasticityThresholds::default(),
            recommendation_lookback_days: default_lookback_days(),
            min_days_between_promos: default_min_days_between_promos(),
        }
    }
}

impl Default for ElasticityThresholds {
    fn default() -> Self {
        Self {
            extreme: UpliftBand { min_uplift: 2.2, max_uplift: None },
            high: UpliftBand { min_uplift: 1.6, max_uplift: None },
            medium: UpliftBand { min_uplift: 1.2, max_uplift: None },
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("PROMO").separator("__"))
            .build()?;

        cfg.try_deserialize()
            .context("Invalid configuration (config/*.toml or PROMO__* env)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_source_yields_defaults() {
        let cfg: AppConfig = config::Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.storage.backend, StorageBackend::Duckdb);
        assert_eq!(cfg.engine, EngineConfig::default());
        assert_eq!(cfg.engine.baseline_days_before_promo, 14);
        assert_eq!(cfg.engine.min_days_between_promos, 30);
        assert!(cfg.pipeline.concurrency >= 1);
    }

    #[test]
    fn test_toml_overrides_thresholds_and_cooldown() {
        let toml = r#"
            [storage]
            backend = "memory"

            [engine]
            min_days_between_promos = 45

            [engine.elasticity_thresholds.extreme]
            min_uplift = 3.0

            [engine.elasticity_thresholds.high]
            min_uplift = 2.0
            max_uplift = 3.0

            [engine.elasticity_thresholds.medium]
            min_uplift = 1.1
            max_uplift = 2.0
        "#;

        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.storage.backend, StorageBackend::Memory);
        assert_eq!(cfg.engine.min_days_between_promos, 45);
        assert_eq!(cfg.engine.recommendation_lookback_days, 7);
        assert_eq!(cfg.engine.elasticity_thresholds.extreme.min_uplift, 3.0);
        assert_eq!(cfg.engine.elasticity_thresholds.high.max_uplift, Some(3.0));
    }

    #[test]
    fn test_band_upper_bound_is_exclusive() {
        let band = UpliftBand { min_uplift: 1.2, max_uplift: Some(1.6) };
        assert!(band.contains(1.2));
        assert!(band.contains(1.59));
        assert!(!band.contains(1.6));
        assert!(!band.contains(1.19));
    }
}
