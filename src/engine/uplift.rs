//! Baseline vs. in-promotion comparison for a single promotion period.

use super::aggregate::DailySeries;
use crate::models::PromotionEvent;
use chrono::{Days, NaiveDate};

/// Ratios at or above this are noise from near-empty baselines.
pub const MAX_ACCEPTED_UPLIFT: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodComparison {
    pub baseline_avg: f64,
    pub baseline_days: usize,
    pub treatment_avg: f64,
    pub treatment_days: usize,
}

/// Average and day count over an iterator of (date, qty). Days with no
/// row are simply absent; they are never counted as zero sales.
fn average<'a>(points: impl Iterator<Item = (&'a NaiveDate, &'a f64)>) -> (f64, usize) {
    let (sum, days) = points.fold((0.0_f64, 0usize), |(s, n), (_, q)| (s + q, n + 1));
    let avg = if days > 0 { sum / days as f64 } else { 0.0 };
    (avg, days)
}

/// Baseline = the `baseline_days` calendar days strictly before `start`;
/// treatment = `start..=end`.
pub fn compare_period(series: &DailySeries, start: NaiveDate, end: NaiveDate, baseline_days: u32) -> PeriodComparison {
    let baseline_start = start
        .checked_sub_days(Days::new(u64::from(baseline_days)))
        .unwrap_or(NaiveDate::MIN);

    let (baseline_avg, baseline_days) = average(series.range(baseline_start..start));
    let (treatment_avg, treatment_days) = if start <= end {
        average(series.range(start..=end))
    } else {
        (0.0, 0)
    };

    PeriodComparison {
        baseline_avg,
        baseline_days,
        treatment_avg,
        treatment_days,
    }
}

/// `None` when there is no positive baseline to compare against.
pub fn uplift_ratio(baseline_avg: f64, treatment_avg: f64) -> Option<f64> {
    if baseline_avg <= 0.0 {
        return None;
    }
    Some(treatment_avg / baseline_avg)
}

pub fn is_accepted(uplift: f64) -> bool {
    uplift > 0.0 && uplift < MAX_ACCEPTED_UPLIFT
}

/// Accepted uplift for one event, or `None` if it is undefined or an outlier.
pub fn event_uplift(series: &DailySeries, event: &PromotionEvent, baseline_days: u32) -> Option<f64> {
    let cmp = compare_period(series, event.start_date, event.end_date, baseline_days);
    uplift_ratio(cmp.baseline_avg, cmp.treatment_avg).filter(|u| is_accepted(*u))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, month, day).unwrap()
    }

    fn event(start: NaiveDate, end: NaiveDate) -> PromotionEvent {
        PromotionEvent {
            product_code: "A".into(),
            start_date: start,
            end_date: end,
            promo_price: None,
            discount_percent: None,
            source_file: "test".into(),
        }
    }

    #[test]
    fn test_baseline_window_excludes_start_and_older_days() {
        let mut series = DailySeries::new();
        series.insert(d(2, 14), 1000.0); // 15 days before start: outside
        series.insert(d(2, 15), 4.0); // first baseline day
        series.insert(d(2, 28), 6.0); // last baseline day
        series.insert(d(3, 1), 10.0); // start: treatment

        let cmp = compare_period(&series, d(3, 1), d(3, 1), 14);
        assert_eq!(cmp.baseline_days, 2);
        assert_eq!(cmp.baseline_avg, 5.0);
        assert_eq!(cmp.treatment_days, 1);
        assert_eq!(cmp.treatment_avg, 10.0);
    }

    #[test]
    fn test_missing_days_are_not_zeros() {
        let mut series = DailySeries::new();
        series.insert(d(2, 20), 8.0);
        series.insert(d(3, 3), 12.0);

        let cmp = compare_period(&series, d(3, 1), d(3, 7), 14);
        assert_eq!(cmp.baseline_avg, 8.0);
        assert_eq!(cmp.treatment_avg, 12.0);
        assert_eq!(event_uplift(&series, &event(d(3, 1), d(3, 7)), 14), Some(1.5));
    }

    #[test]
    fn test_zero_baseline_is_undefined() {
        assert_eq!(uplift_ratio(0.0, 9.0), None);
        assert_eq!(uplift_ratio(-1.0, 9.0), None);

        let mut series = DailySeries::new();
        series.insert(d(2, 25), 0.0);
        series.insert(d(3, 2), 50.0);
        assert_eq!(event_uplift(&series, &event(d(3, 1), d(3, 7)), 14), None);

        // No baseline rows at all.
        let only_treatment: DailySeries = [(d(3, 2), 5.0)].into_iter().collect();
        assert_eq!(event_uplift(&only_treatment, &event(d(3, 1), d(3, 7)), 14), None);
    }

    #[test]
    fn test_outliers_are_rejected() {
        assert!(!is_accepted(0.0));
        assert!(!is_accepted(100.0));
        assert!(is_accepted(99.99));
        assert!(is_accepted(0.01));

        let mut series = DailySeries::new();
        series.insert(d(2, 25), 1.0);
        series.insert(d(3, 2), 150.0);
        assert_eq!(event_uplift(&series, &event(d(3, 1), d(3, 7)), 14), None);

        // Baseline but no sales during the promotion gives uplift 0, rejected.
        let no_treatment: DailySeries = [(d(2, 25), 5.0)].into_iter().collect();
        assert_eq!(event_uplift(&no_treatment, &event(d(3, 1), d(3, 7)), 14), None);
    }

    #[test]
    fn test_configurable_baseline_length() {
        let mut series = DailySeries::new();
        series.insert(d(2, 20), 100.0);
        series.insert(d(2, 27), 4.0);
        series.insert(d(3, 2), 8.0);

        assert_eq!(event_uplift(&series, &event(d(3, 1), d(3, 7)), 7), Some(2.0));
    }
}
