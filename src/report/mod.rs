//! Terminal tables, CSV export and JSON output for engine results.

use crate::models::{DeclineResult, ProductPromoProfile, Recommendation};
use crate::utils::{fmt_amount, fmt_number};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

const RULE: &str = "─────────────────────────────────────────────────────────────────────────────────────";

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

fn fmt_change(change: Option<f64>) -> String {
    change.map_or_else(|| "-".to_string(), |c| format!("{:+.0}%", c * 100.0))
}

pub fn render_recommendations(recs: &[Recommendation]) -> String {
    if recs.is_empty() {
        return "No recommendations.\n".to_string();
    }
    let mut out = String::new();
    out.push_str(RULE);
    out.push('\n');
    out.push_str(&format!(
        "  {:<12} {:<26} {:<8} {:>5} {:>4} {:>6} {:>7} {:>10} {:>14}\n",
        "Code", "Product", "Class", "Disc", "Days", "Uplift", "Trend", "Add. qty", "Add. revenue"
    ));
    out.push_str(RULE);
    out.push('\n');
    for r in recs {
        out.push_str(&format!(
            "  {:<12} {:<26} {:<8} {:>4}% {:>4} {:>6.2} {:>7} {:>10} {:>14}\n",
            truncate(&r.product_code, 12),
            truncate(&r.product_name, 26),
            r.elasticity_class.as_str(),
            r.suggested_discount_percent,
            r.suggested_days,
            r.expected_uplift,
            fmt_change(r.change_percent),
            fmt_number(r.expected_additional_quantity.round() as i64),
            fmt_amount(r.expected_additional_revenue),
        ));
    }
    out.push_str(RULE);
    out.push('\n');
    let total: f64 = recs.iter().map(|r| r.expected_additional_revenue).sum();
    out.push_str(&format!(
        "  {} recommendations, expected additional revenue {}\n",
        recs.len(),
        fmt_amount(total)
    ));
    out
}

pub fn render_declines(declines: &[DeclineResult]) -> String {
    if declines.is_empty() {
        return "No declining products.\n".to_string();
    }
    let mut out = format!("{} declining products:\n", declines.len());
    out.push_str(&format!("  {:<12} {:>8} {:>12} {:>12}\n", "Code", "Change", "Avg before", "Avg after"));
    for d in declines {
        out.push_str(&format!(
            "  {:<12} {:>8} {:>12.2} {:>12.2}\n",
            truncate(&d.product_code, 12),
            fmt_change(Some(d.change_percent)),
            d.avg_first_half,
            d.avg_second_half,
        ));
    }
    out
}

pub fn render_profiles(profiles: &[ProductPromoProfile]) -> String {
    if profiles.is_empty() {
        return "No profiles: run `promo-engine learn` first.\n".to_string();
    }
    let mut out = format!("{} profiles:\n", profiles.len());
    out.push_str(&format!(
        "  {:<12} {:<8} {:>7} {:>7} {:>7} {:>6} {:>7}  {}\n",
        "Code", "Class", "Avg", "Max", "Std", "Conf", "Samples", "Updated"
    ));
    for p in profiles {
        out.push_str(&format!(
            "  {:<12} {:<8} {:>7.3} {:>7.3} {:>7.3} {:>6.2} {:>7}  {}\n",
            truncate(&p.product_code, 12),
            p.elasticity_class.as_str(),
            p.avg_uplift,
            p.max_uplift,
            p.uplift_std,
            p.confidence_score,
            p.sample_count,
            p.updated_at.format("%Y-%m-%d %H:%M"),
        ));
    }
    out
}

/// One CSV row per recommendation, headers from the field names.
pub fn write_recommendations<W: Write>(writer: W, recs: &[Recommendation]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for r in recs {
        wtr.serialize(r).context("serialize recommendation")?;
    }
    wtr.flush().context("flush CSV writer")?;
    Ok(())
}

pub fn write_recommendations_csv(path: &Path, recs: &[Recommendation]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("Cannot create {:?}", parent))?;
    }
    let file = File::create(path).with_context(|| format!("Cannot create {:?}", path))?;
    write_recommendations(file, recs).with_context(|| format!("Writing {:?}", path))
}

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("serialize JSON output")
}
