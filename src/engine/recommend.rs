//! Turns candidates plus their promotion response into ranked,
//! quantified recommendations.

use crate::models::{
    CategoryAverage, DeclineResult, ElasticityClass, ProductPromoProfile, ProductTotals, Recommendation,
};
use chrono::{Days, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};

// ── Recency ───────────────────────────────────────────────────────────────────

/// Earliest end date that still blocks a new promotion as of `as_of`.
pub fn cooldown_cutoff(as_of: NaiveDate, min_days_between_promos: u32) -> NaiveDate {
    as_of
        .checked_sub_days(Days::new(u64::from(min_days_between_promos)))
        .unwrap_or(NaiveDate::MIN)
}

/// A promotion ending on or after the cutoff (including one still running)
/// keeps the product out of the next plan.
pub fn within_cooldown(end_date: NaiveDate, as_of: NaiveDate, min_days_between_promos: u32) -> bool {
    end_date >= cooldown_cutoff(as_of, min_days_between_promos)
}

// ── Policy ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromoPolicy {
    pub discount_percent: u32,
    pub days: u32,
    pub rationale: &'static str,
}

/// Discount and duration per class. LOW products are only worth promoting
/// to clear stock; otherwise they get no recommendation.
pub fn promo_policy(class: ElasticityClass, has_stock_to_clear: bool) -> Option<PromoPolicy> {
    match class {
        ElasticityClass::Extreme => Some(PromoPolicy {
            discount_percent: 25,
            days: 7,
            rationale: "Aggressive promotion: extreme elasticity",
        }),
        ElasticityClass::High => Some(PromoPolicy {
            discount_percent: 18,
            days: 7,
            rationale: "Aggressive promotion: high elasticity",
        }),
        ElasticityClass::Medium => Some(PromoPolicy {
            discount_percent: 12,
            days: 7,
            rationale: "Standard flyer promotion",
        }),
        ElasticityClass::Low if has_stock_to_clear => Some(PromoPolicy {
            discount_percent: 10,
            days: 5,
            rationale: "Stock clearance",
        }),
        ElasticityClass::Low => None,
    }
}

// ── Effect resolution ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PromoEffect {
    pub avg_uplift: f64,
    pub confidence_score: f64,
    pub elasticity_class: ElasticityClass,
}

/// The product's own profile, or the category average treated as MEDIUM.
pub fn resolve_effect(profile: Option<&ProductPromoProfile>, fallback: CategoryAverage) -> PromoEffect {
    match profile {
        Some(p) => PromoEffect {
            avg_uplift: p.avg_uplift,
            confidence_score: p.confidence_score,
            elasticity_class: p.elasticity_class,
        },
        None => PromoEffect {
            avg_uplift: fallback.avg_uplift,
            confidence_score: fallback.confidence_score,
            elasticity_class: ElasticityClass::Medium,
        },
    }
}

/// Mean uplift and confidence across profiles; `{1.2, 0.5}` with none.
pub fn category_average(profiles: &[ProductPromoProfile]) -> CategoryAverage {
    if profiles.is_empty() {
        return CategoryAverage::default();
    }
    let n = profiles.len() as f64;
    CategoryAverage {
        avg_uplift: profiles.iter().map(|p| p.avg_uplift).sum::<f64>() / n,
        confidence_score: profiles.iter().map(|p| p.confidence_score).sum::<f64>() / n,
    }
}

// ── Candidates ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub product_code: String,
    pub totals: Option<ProductTotals>,
    pub decline: Option<DeclineResult>,
}

/// Decliners plus every profiled product, so elastic products that are not
/// declining stay eligible. Returned in product-code order.
pub fn candidates(
    totals: &BTreeMap<String, ProductTotals>,
    declines: &[DeclineResult],
    profiled: impl IntoIterator<Item = String>,
) -> Vec<Candidate> {
    let decline_by_code: BTreeMap<&str, &DeclineResult> =
        declines.iter().map(|d| (d.product_code.as_str(), d)).collect();

    let mut codes: BTreeSet<String> = declines.iter().map(|d| d.product_code.clone()).collect();
    codes.extend(profiled);

    codes
        .into_iter()
        .map(|code| Candidate {
            totals: totals.get(&code).cloned(),
            decline: decline_by_code.get(code.as_str()).map(|d| (*d).clone()),
            product_code: code,
        })
        .collect()
}

// ── Scoring ───────────────────────────────────────────────────────────────────

/// Build the recommendation for one candidate that already passed the
/// recency check. `None` when the policy excludes it.
pub fn score_candidate(candidate: &Candidate, effect: PromoEffect, stock_on_hand: Option<f64>) -> Option<Recommendation> {
    let has_stock_to_clear = stock_on_hand.is_some_and(|q| q > 0.0);
    let policy = promo_policy(effect.elasticity_class, has_stock_to_clear)?;

    let (quantity, amount, days_observed, name) = match &candidate.totals {
        Some(t) => (t.quantity, t.amount, t.day_count, t.product_name.clone()),
        None => (0.0, 0.0, 0, None),
    };
    let observed = days_observed.max(1) as f64;
    let daily_qty = quantity / observed;
    let daily_amount = amount / observed;
    let lift = (effect.avg_uplift - 1.0) * f64::from(policy.days);

    Some(Recommendation {
        product_code: candidate.product_code.clone(),
        product_name: name.unwrap_or_else(|| candidate.product_code.clone()),
        elasticity_class: effect.elasticity_class,
        confidence_score: effect.confidence_score,
        avg_uplift: effect.avg_uplift,
        suggested_discount_percent: policy.discount_percent,
        suggested_days: policy.days,
        rationale: policy.rationale.to_string(),
        is_declining: candidate.decline.is_some(),
        change_percent: candidate.decline.as_ref().map(|d| d.change_percent),
        last_period_quantity: quantity,
        last_period_amount: amount,
        expected_uplift: effect.avg_uplift,
        expected_additional_quantity: (daily_qty * lift).max(0.0),
        expected_additional_revenue: (daily_amount * lift).max(0.0),
    })
}

/// Highest expected additional revenue first; product code breaks ties so
/// the order never depends on how the list was assembled.
pub fn rank(mut recommendations: Vec<Recommendation>) -> Vec<Recommendation> {
    recommendations.sort_by(|a, b| {
        b.expected_additional_revenue
            .total_cmp(&a.expected_additional_revenue)
            .then_with(|| a.product_code.cmp(&b.product_code))
    });
    recommendations
}
