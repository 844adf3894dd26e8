use super::{PromoRepository, StorageError, StorageResult};
use crate::engine::recommend::cooldown_cutoff;
use crate::models::{CategoryAverage, ElasticityClass, ProductPromoProfile, PromotionEvent};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use duckdb::{Connection, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS promotion_event_ids START 1;

CREATE TABLE IF NOT EXISTS promotion_events (
    id                BIGINT   PRIMARY KEY DEFAULT nextval('promotion_event_ids'),
    product_code      VARCHAR  NOT NULL,
    start_date        DATE     NOT NULL,
    end_date          DATE     NOT NULL,
    promo_price       DOUBLE,
    discount_percent  DOUBLE,
    source_file       VARCHAR  NOT NULL DEFAULT '',
    created_at        TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS product_promo_profile (
    product_code      VARCHAR  PRIMARY KEY,
    avg_uplift        DOUBLE   NOT NULL,
    max_uplift        DOUBLE   NOT NULL,
    uplift_std        DOUBLE   NOT NULL,
    confidence_score  DOUBLE   NOT NULL,
    elasticity_class  VARCHAR  NOT NULL,
    sample_count      BIGINT   NOT NULL,
    updated_at        TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_events_product ON promotion_events (product_code);
CREATE INDEX IF NOT EXISTS idx_events_end     ON promotion_events (end_date);
"#;

const PROFILE_COLUMNS: &str = "product_code, avg_uplift, max_uplift, uplift_std, \
     confidence_score, elasticity_class, sample_count, updated_at";

trait DbContext<T> {
    fn op(self, op: &'static str) -> StorageResult<T>;
}

impl<T> DbContext<T> for duckdb::Result<T> {
    fn op(self, op: &'static str) -> StorageResult<T> {
        self.map_err(|source| StorageError::Database { op, source })
    }
}

/// Profile row as stored; the class is validated after the read.
struct ProfileRow {
    product_code: String,
    avg_uplift: f64,
    max_uplift: f64,
    uplift_std: f64,
    confidence_score: f64,
    elasticity_class: String,
    sample_count: i64,
    updated_at: NaiveDateTime,
}

impl ProfileRow {
    fn from_row(r: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            product_code: r.get(0)?,
            avg_uplift: r.get(1)?,
            max_uplift: r.get(2)?,
            uplift_std: r.get(3)?,
            confidence_score: r.get(4)?,
            elasticity_class: r.get(5)?,
            sample_count: r.get(6)?,
            updated_at: r.get(7)?,
        })
    }

    fn into_profile(self) -> StorageResult<ProductPromoProfile> {
        let elasticity_class: ElasticityClass = self.elasticity_class.parse().map_err(|detail| StorageError::Corrupt {
            product_code: self.product_code.clone(),
            detail,
        })?;
        let sample_count = usize::try_from(self.sample_count).map_err(|_| StorageError::Corrupt {
            product_code: self.product_code.clone(),
            detail: format!("negative sample_count {}", self.sample_count),
        })?;

        Ok(ProductPromoProfile {
            product_code: self.product_code,
            avg_uplift: self.avg_uplift,
            max_uplift: self.max_uplift,
            uplift_std: self.uplift_std,
            confidence_score: self.confidence_score,
            elasticity_class,
            sample_count,
            updated_at: self.updated_at,
        })
    }
}

// ── Repository ────────────────────────────────────────────────────────────────

/// File-backed store. DuckDB connections are not `Sync`, so access goes
/// through a mutex; every statement is short and runs without awaiting.
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
}

impl DuckDbRepository {
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path).op("open database")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory().op("open in-memory database")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    pub fn run_migrations(&self) -> StorageResult<()> {
        info!("Running migrations…");
        let conn = self.conn()?;
        conn.execute_batch(DDL).op("DDL")?;
        conn.execute_batch(INDEXES).op("index creation")?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )
        .op("record schema version")?;
        info!("Migrations done.");
        Ok(())
    }

    // ── Promotion events ──────────────────────────────────────────────────────

    fn load_events(&self) -> StorageResult<Vec<PromotionEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT product_code, start_date, end_date, promo_price, discount_percent, source_file \
                 FROM promotion_events ORDER BY product_code, start_date, id",
            )
            .op("prepare events query")?;

        let events = stmt
            .query_map([], |r| {
                Ok(PromotionEvent {
                    product_code: r.get(0)?,
                    start_date: r.get(1)?,
                    end_date: r.get(2)?,
                    promo_price: r.get(3)?,
                    discount_percent: r.get(4)?,
                    source_file: r.get(5)?,
                })
            })
            .op("query events")?
            .collect::<duckdb::Result<Vec<_>>>()
            .op("read event row")?;
        Ok(events)
    }

    fn replace_events(&self, events: &[PromotionEvent]) -> StorageResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().op("begin transaction")?;
        let now = Utc::now().naive_utc();

        tx.execute("DELETE FROM promotion_events", []).op("clear events")?;
        for ev in events {
            tx.execute(
                r#"INSERT INTO promotion_events
                       (product_code, start_date, end_date, promo_price, discount_percent, source_file, created_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?)"#,
                params![
                    ev.product_code,
                    ev.start_date,
                    ev.end_date,
                    ev.promo_price,
                    ev.discount_percent,
                    ev.source_file,
                    now,
                ],
            )
            .op("insert event")?;
        }

        tx.commit().op("commit events")?;
        debug!("Replaced promotion history with {} events", events.len());
        Ok(events.len())
    }

    fn count_events(&self) -> StorageResult<usize> {
        let conn = self.conn()?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM promotion_events", [], |r| r.get(0))
            .op("count events")?;
        Ok(n.max(0) as usize)
    }

    fn any_event_since(&self, product_code: &str, cutoff: NaiveDate) -> StorageResult<bool> {
        let conn = self.conn()?;
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM promotion_events WHERE product_code = ? AND end_date >= ?",
                params![product_code, cutoff],
                |r| r.get(0),
            )
            .op("recency lookup")?;
        Ok(n > 0)
    }

    // ── Profiles ──────────────────────────────────────────────────────────────

    /// Single statement, so readers see either the old or the new row.
    fn write_profile(&self, p: &ProductPromoProfile) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"INSERT INTO product_promo_profile
                   (product_code, avg_uplift, max_uplift, uplift_std,
                    confidence_score, elasticity_class, sample_count, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (product_code) DO UPDATE SET
                   avg_uplift       = excluded.avg_uplift,
                   max_uplift       = excluded.max_uplift,
                   uplift_std       = excluded.uplift_std,
                   confidence_score = excluded.confidence_score,
                   elasticity_class = excluded.elasticity_class,
                   sample_count     = excluded.sample_count,
                   updated_at       = excluded.updated_at"#,
            params![
                p.product_code,
                p.avg_uplift,
                p.max_uplift,
                p.uplift_std,
                p.confidence_score,
                p.elasticity_class.as_str(),
                p.sample_count as i64,
                p.updated_at,
            ],
        )
        .op("upsert profile")?;
        Ok(())
    }

    fn load_profiles(&self, product_code: Option<&str>) -> StorageResult<Vec<ProductPromoProfile>> {
        let conn = self.conn()?;
        let rows = match product_code {
            Some(code) => {
                let sql = format!("SELECT {} FROM product_promo_profile WHERE product_code = ?", PROFILE_COLUMNS);
                let mut stmt = conn.prepare(&sql).op("prepare profile query")?;
                let rows = stmt
                    .query_map(params![code], ProfileRow::from_row)
                    .op("query profile")?
                    .collect::<duckdb::Result<Vec<_>>>();
                rows
            }
            None => {
                let sql = format!("SELECT {} FROM product_promo_profile ORDER BY product_code", PROFILE_COLUMNS);
                let mut stmt = conn.prepare(&sql).op("prepare profiles query")?;
                let rows = stmt
                    .query_map([], ProfileRow::from_row)
                    .op("query profiles")?
                    .collect::<duckdb::Result<Vec<_>>>();
                rows
            }
        }
        .op("read profile row")?;

        rows.into_iter().map(ProfileRow::into_profile).collect()
    }

    fn category_average(&self) -> StorageResult<CategoryAverage> {
        let conn = self.conn()?;
        let (avg_uplift, confidence): (Option<f64>, Option<f64>) = conn
            .query_row(
                "SELECT AVG(avg_uplift), AVG(confidence_score) FROM product_promo_profile",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .op("category average")?;

        let fallback = CategoryAverage::default();
        Ok(CategoryAverage {
            avg_uplift: avg_uplift.unwrap_or(fallback.avg_uplift),
            confidence_score: confidence.unwrap_or(fallback.confidence_score),
        })
    }
}

#[async_trait]
impl PromoRepository for DuckDbRepository {
    async fn get_promotion_events(&self) -> StorageResult<Vec<PromotionEvent>> {
        self.load_events()
    }

    async fn replace_promotion_events(&self, events: &[PromotionEvent]) -> StorageResult<usize> {
        self.replace_events(events)
    }

    async fn promotion_event_count(&self) -> StorageResult<usize> {
        self.count_events()
    }

    async fn upsert_product_profile(&self, profile: &ProductPromoProfile) -> StorageResult<()> {
        self.write_profile(profile)
    }

    async fn get_product_profile(&self, product_code: &str) -> StorageResult<Option<ProductPromoProfile>> {
        Ok(self.load_profiles(Some(product_code))?.into_iter().next())
    }

    async fn get_product_profiles(&self) -> StorageResult<Vec<ProductPromoProfile>> {
        self.load_profiles(None)
    }

    async fn get_category_average_uplift(&self) -> StorageResult<CategoryAverage> {
        self.category_average()
    }

    async fn was_product_on_promo_recently(
        &self,
        product_code: &str,
        before_date: NaiveDate,
        min_days: u32,
    ) -> StorageResult<bool> {
        self.any_event_since(product_code, cooldown_cutoff(before_date, min_days))
    }
}
