use super::aggregate::{DailySeries, daily_series, trailing_window};
use crate::models::{DailySalesRecord, DeclineResult};
use crate::utils::round_to;

/// A drop of more than 10% between window halves counts as a decline.
pub const DECLINE_THRESHOLD: f64 = -0.10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HalfChange {
    pub avg_first: f64,
    pub avg_second: f64,
    pub change: f64,
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Compare the earliest `half` dated points against the latest `half`.
/// Halves are taken by position, not calendar midpoint, and may overlap
/// when the product has fewer than `2 * half` days of data.
pub fn half_change(series: &DailySeries, half: usize) -> Option<HalfChange> {
    if half == 0 || series.len() < half {
        return None;
    }
    let quantities: Vec<f64> = series.values().copied().collect();
    let avg_first = mean(&quantities[..half]);
    let avg_second = mean(&quantities[quantities.len() - half..]);
    if avg_first <= 0.0 {
        return None;
    }
    Some(HalfChange {
        avg_first,
        avg_second,
        change: (avg_second - avg_first) / avg_first,
    })
}

/// Products whose volume fell by more than 10% across the last
/// `lookback_days` of the input, sharpest decline first.
pub fn detect_declining(records: &[DailySalesRecord], lookback_days: u32) -> Vec<DeclineResult> {
    let half = (lookback_days / 2) as usize;
    let recent = trailing_window(records, lookback_days);

    let mut declining: Vec<DeclineResult> = daily_series(&recent)
        .into_iter()
        .filter_map(|(code, series)| {
            let hc = half_change(&series, half)?;
            (hc.change < DECLINE_THRESHOLD).then(|| DeclineResult {
                product_code: code,
                change_percent: round_to(hc.change, 2),
                avg_first_half: hc.avg_first,
                avg_second_half: hc.avg_second,
            })
        })
        .collect();

    declining.sort_by(|a, b| {
        a.change_percent
            .total_cmp(&b.change_percent)
            .then_with(|| a.product_code.cmp(&b.product_code))
    });
    declining
}
