//! Per-product profile learning: uplift samples → summary statistics →
//! confidence and class → rounded, persistable profile.

use super::aggregate::DailySeries;
use super::elasticity::classify;
use super::uplift::event_uplift;
use crate::config::EngineConfig;
use crate::models::{ProductPromoProfile, PromotionEvent};
use crate::utils::round_to;
use chrono::NaiveDateTime;

/// Number of supporting promotions at which the volume term saturates.
const FULL_CONFIDENCE_SAMPLES: f64 = 5.0;
const SAMPLE_WEIGHT: f64 = 0.3;
const CONSISTENCY_WEIGHT: f64 = 0.7;
/// Standard deviation at which the consistency term reaches zero.
const MAX_TOLERATED_STD: f64 = 2.0;

const PERSISTED_DECIMALS: i32 = 3;
const MIN_PERSISTED_UPLIFT: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpliftSummary {
    pub mean: f64,
    pub max: f64,
    pub std: f64,
    pub count: usize,
}

/// Mean, max and sample standard deviation (n − 1). `None` for no samples.
pub fn summarize(samples: &[f64]) -> Option<UpliftSummary> {
    if samples.is_empty() {
        return None;
    }
    let n = samples.len();
    let mean = samples.iter().sum::<f64>() / n as f64;
    let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let std = if n > 1 {
        let ss: f64 = samples.iter().map(|u| (u - mean).powi(2)).sum();
        (ss / (n - 1) as f64).sqrt()
    } else {
        0.0
    };
    Some(UpliftSummary { mean, max, std, count: n })
}

/// Rewards sample volume (saturating at 5) and penalises spread (saturating
/// at std 2), weighted 30/70.
pub fn confidence_score(sample_count: usize, uplift_std: f64) -> f64 {
    let volume = sample_count as f64 / FULL_CONFIDENCE_SAMPLES;
    let spread_penalty = (uplift_std / MAX_TOLERATED_STD).clamp(0.0, 1.0);
    (volume * SAMPLE_WEIGHT + (1.0 - spread_penalty) * CONSISTENCY_WEIGHT).clamp(0.0, 1.0)
}

/// Accepted uplift samples across all of one product's promotions.
pub fn collect_samples(series: &DailySeries, events: &[PromotionEvent], baseline_days: u32) -> Vec<f64> {
    events
        .iter()
        .filter_map(|ev| event_uplift(series, ev, baseline_days))
        .collect()
}

/// Storage precision, applied once after every statistic is final.
/// `avg_uplift` keeps a floor of one unit in the last place so a tiny but
/// positive mean never persists as zero.
pub fn round_for_storage(profile: ProductPromoProfile) -> ProductPromoProfile {
    ProductPromoProfile {
        avg_uplift: round_to(profile.avg_uplift, PERSISTED_DECIMALS).max(MIN_PERSISTED_UPLIFT),
        max_uplift: round_to(profile.max_uplift, PERSISTED_DECIMALS),
        uplift_std: round_to(profile.uplift_std, PERSISTED_DECIMALS),
        confidence_score: round_to(profile.confidence_score, PERSISTED_DECIMALS),
        ..profile
    }
}

/// Learn one product's profile. `None` means insufficient evidence: no
/// promotion produced an accepted uplift, so nothing should be written.
pub fn learn_profile(
    product_code: &str,
    series: &DailySeries,
    events: &[PromotionEvent],
    config: &EngineConfig,
    updated_at: NaiveDateTime,
) -> Option<ProductPromoProfile> {
    let samples = collect_samples(series, events, config.baseline_days_before_promo);
    let summary = summarize(&samples)?;

    let profile = ProductPromoProfile {
        product_code: product_code.to_string(),
        avg_uplift: summary.mean,
        max_uplift: summary.max,
        uplift_std: summary.std,
        confidence_score: confidence_score(summary.count, summary.std),
        elasticity_class: classify(summary.mean, &config.elasticity_thresholds),
        sample_count: summary.count,
        updated_at,
    };

    Some(round_for_storage(profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ElasticityClass;
    use chrono::{Days, NaiveDate};

    fn d(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, month, day).unwrap()
    }

    fn now() -> NaiveDateTime {
        d(6, 1).and_hms_opt(12, 0, 0).unwrap()
    }

    fn event(start: NaiveDate, end: NaiveDate) -> PromotionEvent {
        PromotionEvent {
            product_code: "A".into(),
            start_date: start,
            end_date: end,
            promo_price: None,
            discount_percent: Some(20.0),
            source_file: "history.csv".into(),
        }
    }

    /// `days` consecutive days ending the day before `until`, each with `qty`.
    fn fill(series: &mut DailySeries, until: NaiveDate, days: u64, qty: f64) {
        for back in 1..=days {
            series.insert(until.checked_sub_days(Days::new(back)).unwrap(), qty);
        }
    }

    #[test]
    fn test_summary_uses_sample_std() {
        let s = summarize(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(s.mean, 2.0);
        assert_eq!(s.max, 3.0);
        assert_eq!(s.std, 1.0);
        assert_eq!(s.count, 3);

        let single = summarize(&[1.7]).unwrap();
        assert_eq!(single.std, 0.0);
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn test_confidence_bounds_and_monotonicity() {
        assert_eq!(confidence_score(5, 0.0), 1.0);
        assert_eq!(confidence_score(50, 0.0), 1.0);
        assert!((confidence_score(1, 0.0) - 0.76).abs() < 1e-12);
        assert!((confidence_score(1, 5.0) - 0.06).abs() < 1e-12);

        let mut prev = 0.0;
        for n in 1..10 {
            let c = confidence_score(n, 0.5);
            assert!(c >= prev);
            assert!((0.0..=1.0).contains(&c));
            prev = c;
        }

        let mut prev = 1.0;
        for step in 0..10 {
            let c = confidence_score(3, step as f64 * 0.3);
            assert!(c <= prev);
            prev = c;
        }
    }

    #[test]
    fn test_single_promotion_profile() {
        // 14 baseline days summing to 70 (5/day), 7 promo days summing to 63 (9/day).
        let start = d(3, 1);
        let end = d(3, 7);
        let mut series = DailySeries::new();
        fill(&mut series, start, 14, 5.0);
        fill(&mut series, end.checked_add_days(Days::new(1)).unwrap(), 7, 9.0);

        let profile = learn_profile("A", &series, &[event(start, end)], &EngineConfig::default(), now()).unwrap();

        assert_eq!(profile.avg_uplift, 1.8);
        assert_eq!(profile.max_uplift, 1.8);
        assert_eq!(profile.uplift_std, 0.0);
        assert_eq!(profile.elasticity_class, ElasticityClass::High);
        assert_eq!(profile.sample_count, 1);
        assert_eq!(profile.confidence_score, 0.76);
    }

    #[test]
    fn test_outlier_events_do_not_shift_the_mean() {
        let mut series = DailySeries::new();
        // Promo 1: baseline 10/day, promo 15/day → 1.5
        fill(&mut series, d(3, 1), 14, 10.0);
        series.insert(d(3, 1), 15.0);
        // Promo 2: baseline 0.1/day, promo 50/day → 500, rejected
        fill(&mut series, d(5, 1), 14, 0.1);
        series.insert(d(5, 2), 50.0);
        // Promo 3: no baseline sales at all → undefined
        series.insert(d(8, 2), 40.0);

        let events = vec![event(d(3, 1), d(3, 1)), event(d(5, 1), d(5, 3)), event(d(8, 1), d(8, 3))];
        let samples = collect_samples(&series, &events, 14);
        assert_eq!(samples, vec![1.5]);

        let profile = learn_profile("A", &series, &events, &EngineConfig::default(), now()).unwrap();
        assert_eq!(profile.avg_uplift, 1.5);
        assert_eq!(profile.sample_count, 1);
        assert_eq!(profile.elasticity_class, ElasticityClass::Medium);
    }

    #[test]
    fn test_no_accepted_samples_means_no_profile() {
        let series: DailySeries = [(d(3, 3), 12.0)].into_iter().collect();
        let events = vec![event(d(3, 1), d(3, 7))];
        assert!(learn_profile("A", &series, &events, &EngineConfig::default(), now()).is_none());
        assert!(learn_profile("A", &DailySeries::new(), &events, &EngineConfig::default(), now()).is_none());
    }

    #[test]
    fn test_rounding_happens_once_at_the_end() {
        let mut series = DailySeries::new();
        fill(&mut series, d(3, 1), 14, 3.0);
        series.insert(d(3, 1), 4.0); // 1.3333…
        fill(&mut series, d(6, 1), 14, 3.0);
        series.insert(d(6, 1), 5.0); // 1.6666…

        let events = vec![event(d(3, 1), d(3, 1)), event(d(6, 1), d(6, 1))];
        let p = learn_profile("A", &series, &events, &EngineConfig::default(), now()).unwrap();

        // std = sqrt(2 * (1/6)^2) = 0.2357…
        assert_eq!(p.avg_uplift, 1.5);
        assert_eq!(p.max_uplift, 1.667);
        assert_eq!(p.uplift_std, 0.236);
        assert_eq!(p.sample_count, 2);
    }

    #[test]
    fn test_tiny_positive_mean_never_persists_as_zero() {
        let profile = ProductPromoProfile {
            product_code: "A".into(),
            avg_uplift: 0.0002,
            max_uplift: 0.0002,
            uplift_std: 0.0,
            confidence_score: 0.76,
            elasticity_class: ElasticityClass::Low,
            sample_count: 1,
            updated_at: now(),
        };
        assert_eq!(round_for_storage(profile).avg_uplift, 0.001);
    }
}
