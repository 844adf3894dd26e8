use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── Daily sales ───────────────────────────────────────────────────────────────

/// One extracted sales row. May be a product-day aggregate or a single
/// transaction line; the aggregator sums either way.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailySalesRecord {
    pub date: NaiveDate,
    pub product_code: String,
    pub product_name: Option<String>,
    pub quantity: f64,
    pub amount: f64,
}

/// Recent-period totals for one product.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProductTotals {
    pub product_code: String,
    pub product_name: Option<String>,
    pub quantity: f64,
    pub amount: f64,
    /// Distinct dates with at least one row.
    pub day_count: usize,
}

// ── Promotion history ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromotionEvent {
    pub product_code: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub promo_price: Option<f64>,
    pub discount_percent: Option<f64>,
    pub source_file: String,
}

// ── Elasticity ────────────────────────────────────────────────────────────────

/// Ordered from least to most responsive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ElasticityClass {
    Low,
    Medium,
    High,
    Extreme,
}

impl ElasticityClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Extreme => "EXTREME",
        }
    }
}

impl fmt::Display for ElasticityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElasticityClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "EXTREME" => Ok(Self::Extreme),
            other => Err(format!("unknown elasticity class {:?}", other)),
        }
    }
}

/// Learned promotion response for one product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductPromoProfile {
    pub product_code: String,
    pub avg_uplift: f64,
    pub max_uplift: f64,
    pub uplift_std: f64,
    pub confidence_score: f64,
    pub elasticity_class: ElasticityClass,
    pub sample_count: usize,
    pub updated_at: NaiveDateTime,
}

/// Category-wide stand-in for products without a profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CategoryAverage {
    pub avg_uplift: f64,
    pub confidence_score: f64,
}

impl Default for CategoryAverage {
    fn default() -> Self {
        Self {
            avg_uplift: 1.2,
            confidence_score: 0.5,
        }
    }
}

// ── Engine output ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeclineResult {
    pub product_code: String,
    /// Relative change between window halves, rounded to 2 decimals.
    pub change_percent: f64,
    pub avg_first_half: f64,
    pub avg_second_half: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub product_code: String,
    pub product_name: String,
    pub elasticity_class: ElasticityClass,
    pub confidence_score: f64,
    pub avg_uplift: f64,
    pub suggested_discount_percent: u32,
    pub suggested_days: u32,
    pub rationale: String,
    pub is_declining: bool,
    pub change_percent: Option<f64>,
    pub last_period_quantity: f64,
    pub last_period_amount: f64,
    pub expected_uplift: f64,
    pub expected_additional_quantity: f64,
    pub expected_additional_revenue: f64,
}

// ── Raw CSV rows ──────────────────────────────────────────────────────────────

/// Sales export: date, product code, product name, quantity, amount.
#[derive(Debug, Clone, Default)]
pub struct RawSalesRow {
    pub date: Option<String>,
    pub product_code: Option<String>,
    pub product_name: Option<String>,
    pub quantity: Option<String>,
    pub amount: Option<String>,
}

/// Promotion history: product code, start, end, promo price, discount, source.
#[derive(Debug, Clone, Default)]
pub struct RawPromoRow {
    pub product_code: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub promo_price: Option<String>,
    pub discount_percent: Option<String>,
    pub source_file: Option<String>,
}

/// Stock snapshot: product code, quantity on hand.
#[derive(Debug, Clone, Default)]
pub struct RawStockRow {
    pub product_code: Option<String>,
    pub quantity: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elasticity_class_round_trips_through_str() {
        for class in [
            ElasticityClass::Low,
            ElasticityClass::Medium,
            ElasticityClass::High,
            ElasticityClass::Extreme,
        ] {
            assert_eq!(class.as_str().parse::<ElasticityClass>(), Ok(class));
        }
        assert!("huge".parse::<ElasticityClass>().is_err());
    }

    #[test]
    fn test_elasticity_class_ordering() {
        assert!(ElasticityClass::Extreme > ElasticityClass::High);
        assert!(ElasticityClass::Medium > ElasticityClass::Low);
    }
}
