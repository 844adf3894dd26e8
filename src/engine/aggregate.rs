use crate::models::{DailySalesRecord, ProductTotals};
use chrono::{Days, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};

/// Date-ordered daily quantities for one product.
pub type DailySeries = BTreeMap<NaiveDate, f64>;

fn resolve_code(record: &DailySalesRecord) -> Option<&str> {
    let code = record.product_code.trim();
    (!code.is_empty()).then_some(code)
}

/// Per-product `date → quantity`. Rows for the same product and date are
/// summed, since extracts may carry one line per transaction or store.
pub fn daily_series(records: &[DailySalesRecord]) -> BTreeMap<String, DailySeries> {
    let mut by_product: BTreeMap<String, DailySeries> = BTreeMap::new();
    for record in records {
        let Some(code) = resolve_code(record) else { continue };
        *by_product
            .entry(code.to_string())
            .or_default()
            .entry(record.date)
            .or_insert(0.0) += record.quantity;
    }
    by_product
}

/// Per-product quantity and amount totals over the whole input.
pub fn period_totals(records: &[DailySalesRecord]) -> BTreeMap<String, ProductTotals> {
    let mut acc: BTreeMap<String, (ProductTotals, BTreeSet<NaiveDate>)> = BTreeMap::new();

    for record in records {
        let Some(code) = resolve_code(record) else { continue };
        let (totals, days) = acc.entry(code.to_string()).or_insert_with(|| {
            (
                ProductTotals {
                    product_code: code.to_string(),
                    ..Default::default()
                },
                BTreeSet::new(),
            )
        });

        if totals.product_name.is_none() {
            totals.product_name = record.product_name.clone().filter(|n| !n.trim().is_empty());
        }
        totals.quantity += record.quantity;
        totals.amount += record.amount;
        days.insert(record.date);
    }

    acc.into_iter()
        .map(|(code, (mut totals, days))| {
            totals.day_count = days.len();
            (code, totals)
        })
        .collect()
}

/// Rows from the last `days` calendar days of the input, counted back from
/// its latest date. Recent-sales windows are anchored on the data, not the
/// wall clock, so a stale export still yields a full window.
pub fn trailing_window(records: &[DailySalesRecord], days: u32) -> Vec<DailySalesRecord> {
    let Some(latest) = records.iter().map(|r| r.date).max() else {
        return Vec::new();
    };
    if days == 0 {
        return Vec::new();
    }
    let first = latest
        .checked_sub_days(Days::new(u64::from(days) - 1))
        .unwrap_or(NaiveDate::MIN);
    records.iter().filter(|r| r.date >= first).cloned().collect()
}
