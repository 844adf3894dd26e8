use crate::models::{DailySalesRecord, PromotionEvent, RawPromoRow, RawSalesRow, RawStockRow};
use chrono::NaiveDate;
use tracing::warn;

// ── Parsers ───────────────────────────────────────────────────────────────────

fn is_blank(s: &str) -> bool {
    s.is_empty() || s == "N/A" || s == "-" || s == "—"
}

/// True when `sep` splits `s` into digit groups shaped like thousands:
/// a leading group of 1-3 digits (not a lone zero), then groups of exactly 3.
fn is_grouped(s: &str, sep: char) -> bool {
    let mut groups = s.trim_start_matches('-').split(sep);
    let Some(head) = groups.next() else { return false };
    let head_ok = (1..=3).contains(&head.len()) && head != "0" && head.bytes().all(|b| b.is_ascii_digit());
    let mut rest = groups.peekable();
    head_ok && rest.peek().is_some() && rest.all(|g| g.len() == 3 && g.bytes().all(|b| b.is_ascii_digit()))
}

/// Parse a number from an export cell. Handles thousands separators and
/// decimal commas: "1,234.50" → 1234.5 | "1.234,50" → 1234.5 | "12,5" → 12.5.
/// A lone separator followed by exactly three digits is read as grouping
/// whichever character it is: "1,234" and "1.234" are both 1234.
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if is_blank(s) {
        return None;
    }
    let kept: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',' || *c == '-')
        .collect();

    let normalised = match (kept.rfind('.'), kept.rfind(',')) {
        // Whichever separator comes last is the decimal point.
        (Some(dot), Some(comma)) if comma > dot => kept.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => kept.replace(',', ""),
        (None, Some(_)) if is_grouped(&kept, ',') => kept.replace(',', ""),
        (None, Some(_)) => kept.replace(',', "."),
        (Some(_), None) if is_grouped(&kept, '.') => kept.replace('.', ""),
        _ => kept,
    };

    normalised.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Quantity/amount cell → non-negative number. Unparseable or negative
/// values become 0 so a single bad cell never drops the row.
pub fn coerce_non_negative(s: Option<&str>) -> f64 {
    s.and_then(parse_number).filter(|v| *v > 0.0).unwrap_or(0.0)
}

/// Parse dates: ISO, European dotted, slashed, or "Feb 20, 2024"
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    // Timestamps exported from SQL ("2025-03-01 00:00:00", "2025-03-01T00:00:00")
    let s = s.get(..10).filter(|head| head.as_bytes()[4] == b'-').unwrap_or(s);

    const FORMATS: [&str; 6] = ["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y", "%m/%d/%Y", "%b %d, %Y", "%d %b %Y"];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s.trim_end_matches('.'), fmt).ok())
}

pub fn normalise_code(s: &str) -> String {
    s.trim().to_uppercase()
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

// ── Sales CSV → DailySalesRecord ──────────────────────────────────────────────

pub fn sales_row_to_record(row: &RawSalesRow) -> Option<DailySalesRecord> {
    let product_code = normalise_code(row.product_code.as_deref()?);
    if product_code.is_empty() {
        return None;
    }

    let date_str = row.date.as_deref()?.trim();
    let Some(date) = parse_date(date_str) else {
        warn!("Unparseable sales date {:?} for {}", date_str, product_code);
        return None;
    };

    Some(DailySalesRecord {
        date,
        product_code,
        product_name: non_empty(row.product_name.as_deref()),
        quantity: coerce_non_negative(row.quantity.as_deref()),
        amount: coerce_non_negative(row.amount.as_deref()),
    })
}

// ── Promotion CSV → PromotionEvent ────────────────────────────────────────────

pub fn promo_row_to_event(row: &RawPromoRow, default_source: &str) -> Option<PromotionEvent> {
    let product_code = normalise_code(row.product_code.as_deref()?);
    if product_code.is_empty() {
        return None;
    }

    let start_date = row.start_date.as_deref().and_then(parse_date);
    let end_date = row.end_date.as_deref().and_then(parse_date);
    let (Some(start_date), Some(end_date)) = (start_date, end_date) else {
        warn!(
            "Unparseable promotion period {:?}..{:?} for {}",
            row.start_date, row.end_date, product_code
        );
        return None;
    };

    if start_date > end_date {
        warn!("Promotion for {} ends before it starts ({} > {})", product_code, start_date, end_date);
        return None;
    }

    Some(PromotionEvent {
        product_code,
        start_date,
        end_date,
        promo_price: row.promo_price.as_deref().and_then(parse_number),
        discount_percent: row.discount_percent.as_deref().and_then(parse_number),
        source_file: non_empty(row.source_file.as_deref()).unwrap_or_else(|| default_source.to_string()),
    })
}

// ── Stock CSV → (code, quantity) ──────────────────────────────────────────────

pub fn stock_row_to_entry(row: &RawStockRow) -> Option<(String, f64)> {
    let code = normalise_code(row.product_code.as_deref()?);
    if code.is_empty() {
        return None;
    }
    Some((code, coerce_non_negative(row.quantity.as_deref())))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_separators() {
        assert_eq!(parse_number("1,234.50"), Some(1234.5));
        assert_eq!(parse_number("1.234,50"), Some(1234.5));
        assert_eq!(parse_number("12,5"), Some(12.5));
        assert_eq!(parse_number("1,234"), Some(1234.0));
        assert_eq!(parse_number("1.234"), Some(1234.0));
        assert_eq!(parse_number("1.234.567"), Some(1234567.0));
        assert_eq!(parse_number("-2.500"), Some(-2500.0));
        assert_eq!(parse_number("0.125"), Some(0.125));
        assert_eq!(parse_number("0,125"), Some(0.125));
        assert_eq!(parse_number("12.5"), Some(12.5));
        assert_eq!(parse_number("1234.567"), Some(1234.567));
        assert_eq!(parse_number("KM 99.90"), Some(99.9));
        assert_eq!(parse_number("N/A"), None);
        assert_eq!(parse_number("abc"), None);
    }

    #[test]
    fn test_parse_date_formats() {
        let d = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(parse_date("2025-03-01"), Some(d));
        assert_eq!(parse_date("2025-03-01 00:00:00"), Some(d));
        assert_eq!(parse_date("01.03.2025"), Some(d));
        assert_eq!(parse_date("01.03.2025."), Some(d));
        assert_eq!(parse_date("Mar 01, 2025"), Some(d));
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn test_malformed_quantity_is_coerced_not_dropped() {
        let row = RawSalesRow {
            date: Some("2025-03-01".into()),
            product_code: Some(" a100 ".into()),
            product_name: Some("".into()),
            quantity: Some("lots".into()),
            amount: Some("-4".into()),
        };
        let rec = sales_row_to_record(&row).unwrap();
        assert_eq!(rec.product_code, "A100");
        assert_eq!(rec.product_name, None);
        assert_eq!(rec.quantity, 0.0);
        assert_eq!(rec.amount, 0.0);
    }

    #[test]
    fn test_sales_row_without_code_or_date_is_skipped() {
        let no_code = RawSalesRow {
            date: Some("2025-03-01".into()),
            product_code: Some("   ".into()),
            ..Default::default()
        };
        assert!(sales_row_to_record(&no_code).is_none());

        let bad_date = RawSalesRow {
            date: Some("31.02.2025".into()),
            product_code: Some("A".into()),
            ..Default::default()
        };
        assert!(sales_row_to_record(&bad_date).is_none());
    }

    #[test]
    fn test_promo_row_uses_default_source_and_rejects_reversed_period() {
        let row = RawPromoRow {
            product_code: Some("a".into()),
            start_date: Some("01.03.2025".into()),
            end_date: Some("07.03.2025".into()),
            discount_percent: Some("20".into()),
            ..Default::default()
        };
        let ev = promo_row_to_event(&row, "promos_2025").unwrap();
        assert_eq!(ev.product_code, "A");
        assert_eq!(ev.source_file, "promos_2025");
        assert_eq!(ev.discount_percent, Some(20.0));

        let reversed = RawPromoRow {
            start_date: Some("07.03.2025".into()),
            end_date: Some("01.03.2025".into()),
            ..row
        };
        assert!(promo_row_to_event(&reversed, "x").is_none());
    }
}
