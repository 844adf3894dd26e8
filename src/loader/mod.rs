//! CSV loaders for the uniform tabular inputs: daily sales, promotion
//! history and stock snapshots.
//!
//! Columns are located by header name (several aliases per field) so exports
//! from different systems load without reshaping. Bad rows are logged and
//! skipped; bad cells are coerced by the cleaner.

pub mod cleaner;

use crate::models::{DailySalesRecord, PromotionEvent, RawPromoRow, RawSalesRow, RawStockRow};
use anyhow::{Context, Result, bail};
use csv::StringRecord;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use self::cleaner::{promo_row_to_event, sales_row_to_record, stock_row_to_entry};

// ── Header resolution ─────────────────────────────────────────────────────────

const DATE: &[&str] = &["date", "datum", "day", "sales_date"];
const PRODUCT_CODE: &[&str] = &["product_code", "article_code", "artikal_id", "sku", "code", "sifra", "barcode"];
const PRODUCT_NAME: &[&str] = &["product_name", "article_name", "name", "naziv"];
const QUANTITY: &[&str] = &["quantity", "qty", "kolicina", "units"];
const AMOUNT: &[&str] = &["amount", "revenue", "value", "iznos"];
const START_DATE: &[&str] = &["start_date", "start", "from", "od"];
const END_DATE: &[&str] = &["end_date", "end", "to", "do"];
const PROMO_PRICE: &[&str] = &["promo_price", "price"];
const DISCOUNT: &[&str] = &["discount_percent", "discount", "rabat"];
const SOURCE_FILE: &[&str] = &["source_file", "source"];

fn normalise_header(h: &str) -> String {
    h.trim().trim_start_matches('\u{feff}').to_lowercase().replace([' ', '-'], "_")
}

/// Maps field aliases onto column positions of one CSV header row.
struct ColumnMap {
    index: HashMap<String, usize>,
}

impl ColumnMap {
    fn new(headers: &StringRecord) -> Self {
        let mut index = HashMap::new();
        for (i, h) in headers.iter().enumerate() {
            index.entry(normalise_header(h)).or_insert(i);
        }
        Self { index }
    }

    fn find(&self, aliases: &[&str]) -> Option<usize> {
        aliases.iter().find_map(|a| self.index.get(*a).copied())
    }

    fn require(&self, field: &str, aliases: &[&str]) -> Result<usize> {
        match self.find(aliases) {
            Some(i) => Ok(i),
            None => bail!("missing column for {} (accepted headers: {})", field, aliases.join(", ")),
        }
    }
}

fn cell(record: &StringRecord, idx: Option<usize>) -> Option<String> {
    idx.and_then(|i| record.get(i)).map(|s| s.to_string())
}

fn reader<R: Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input)
}

// ── Daily sales ───────────────────────────────────────────────────────────────

pub fn read_sales<R: Read>(input: R) -> Result<Vec<DailySalesRecord>> {
    let mut rdr = reader(input);
    let cols = ColumnMap::new(rdr.headers()?);

    let date = cols.require("date", DATE)?;
    let code = cols.require("product code", PRODUCT_CODE)?;
    let quantity = cols.require("quantity", QUANTITY)?;
    let name = cols.find(PRODUCT_NAME);
    let amount = cols.find(AMOUNT);

    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (i, result) in rdr.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Sales row {}: {}", i + 1, e);
                skipped += 1;
                continue;
            }
        };

        let raw = RawSalesRow {
            date: cell(&record, Some(date)),
            product_code: cell(&record, Some(code)),
            product_name: cell(&record, name),
            quantity: cell(&record, Some(quantity)),
            amount: cell(&record, amount),
        };

        match sales_row_to_record(&raw) {
            Some(rec) => records.push(rec),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!("{} sales rows skipped", skipped);
    }
    Ok(records)
}

pub fn load_sales_csv(path: &Path) -> Result<Vec<DailySalesRecord>> {
    let file = std::fs::File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let records = read_sales(file).with_context(|| format!("Failed to read sales from {:?}", path))?;
    info!("{:?}: {} sales rows loaded", path, records.len());
    Ok(records)
}

// ── Promotion history ─────────────────────────────────────────────────────────

pub fn read_promotions<R: Read>(input: R, default_source: &str) -> Result<Vec<PromotionEvent>> {
    let mut rdr = reader(input);
    let cols = ColumnMap::new(rdr.headers()?);

    let code = cols.require("product code", PRODUCT_CODE)?;
    let start = cols.require("start date", START_DATE)?;
    let end = cols.require("end date", END_DATE)?;
    let price = cols.find(PROMO_PRICE);
    let discount = cols.find(DISCOUNT);
    let source = cols.find(SOURCE_FILE);

    let mut events = Vec::new();
    let mut rows = 0usize;
    for (i, result) in rdr.records().enumerate() {
        rows += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Promotion row {}: {}", i + 1, e);
                continue;
            }
        };

        let raw = RawPromoRow {
            product_code: cell(&record, Some(code)),
            start_date: cell(&record, Some(start)),
            end_date: cell(&record, Some(end)),
            promo_price: cell(&record, price),
            discount_percent: cell(&record, discount),
            source_file: cell(&record, source),
        };

        if let Some(ev) = promo_row_to_event(&raw, default_source) {
            events.push(ev);
        }
    }

    // Import replaces the stored history, so rows that all fail must not
    // look like an empty file.
    if rows > 0 && events.is_empty() {
        bail!("none of the {} promotion rows could be parsed", rows);
    }
    Ok(events)
}

fn load_promotion_file(file: &Path) -> Result<Vec<PromotionEvent>> {
    let stem = file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string();

    let handle = std::fs::File::open(file).with_context(|| format!("Failed to open {:?}", file))?;
    let events = read_promotions(handle, &stem).with_context(|| format!("Failed to read promotions from {:?}", file))?;
    info!("{:?}: {} promotion events", file, events.len());
    Ok(events)
}

/// Load one promotion CSV, or every `*.csv` under a directory. The file stem
/// is the event's source when the file has no source column.
///
/// A single unreadable file is an error. In a directory, unreadable files are
/// skipped with a warning unless none of them can be read.
pub fn load_promotions(path: &Path) -> Result<Vec<PromotionEvent>> {
    if !path.is_dir() {
        return load_promotion_file(path);
    }

    let files = discover_csv_files(path)?;
    if files.is_empty() {
        bail!("no CSV files found in {:?}", path);
    }

    let mut events = Vec::new();
    let mut failed = 0usize;
    for file in &files {
        match load_promotion_file(file) {
            Ok(mut batch) => events.append(&mut batch),
            Err(e) => {
                warn!("Error loading {:?}: {:#}", file, e);
                failed += 1;
            }
        }
    }

    if failed == files.len() {
        bail!("none of the {} promotion files in {:?} could be read", failed, path);
    }
    Ok(events)
}

// ── Stock ─────────────────────────────────────────────────────────────────────

/// Stock on hand per product; duplicate codes are summed.
pub fn read_stock<R: Read>(input: R) -> Result<HashMap<String, f64>> {
    let mut rdr = reader(input);
    let cols = ColumnMap::new(rdr.headers()?);
    let code = cols.require("product code", PRODUCT_CODE)?;
    let quantity = cols.require("quantity", QUANTITY)?;

    let mut stock = HashMap::new();
    let mut skipped = 0usize;
    for (i, result) in rdr.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Stock row {}: {}", i + 1, e);
                skipped += 1;
                continue;
            }
        };

        let raw = RawStockRow {
            product_code: cell(&record, Some(code)),
            quantity: cell(&record, Some(quantity)),
        };
        match stock_row_to_entry(&raw) {
            Some((code, qty)) => *stock.entry(code).or_insert(0.0) += qty,
            None => {
                warn!("Stock row {}: missing product code, skipped", i + 1);
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        debug!("{} stock rows skipped", skipped);
    }
    Ok(stock)
}

pub fn load_stock_csv(path: &Path) -> Result<HashMap<String, f64>> {
    let file = std::fs::File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    read_stock(file).with_context(|| format!("Failed to read stock from {:?}", path))
}

pub fn discover_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(vec![]);
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map(|e| e == "csv").unwrap_or(false) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_read_sales_resolves_aliases_and_keeps_duplicate_rows() {
        let csv = "\
Datum,Sifra,Naziv,Kolicina,Iznos
2025-03-01,A1,Pasta,3,4.50
2025-03-01,A1,Pasta,2,3.00
2025-03-02,,Nameless,9,9
not-a-date,A1,Pasta,1,1
";
        let rows = read_sales(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.product_code == "A1"));
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(rows[1].quantity, 2.0);
        assert_eq!(rows[0].product_name.as_deref(), Some("Pasta"));
    }

    #[test]
    fn test_read_sales_requires_quantity_column() {
        let csv = "date,product_code,amount\n2025-03-01,A,10\n";
        let err = read_sales(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("quantity"));
    }

    #[test]
    fn test_read_promotions_and_stock() {
        let promos = "\
product_code,start_date,end_date,discount_percent
A,2025-03-01,2025-03-07,20
B,2025-04-10,2025-04-01,15
";
        let events = read_promotions(promos.as_bytes(), "history").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source_file, "history");

        let stock = "sku,qty\nA,5\na,2\nB,x\n";
        let stock = read_stock(stock.as_bytes()).unwrap();
        assert_eq!(stock.get("A"), Some(&7.0));
        assert_eq!(stock.get("B"), Some(&0.0));
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("promo_engine_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_unreadable_promotion_file_is_an_error() {
        let dir = scratch_dir("missing_end");
        let file = dir.join("akcije.csv");
        std::fs::write(&file, "product_code,start_date\nA,2025-03-01\n").unwrap();

        let err = load_promotions(&file).unwrap_err();
        assert!(format!("{:#}", err).contains("end date"));

        // Same file alone in a directory: nothing readable, still an error.
        assert!(load_promotions(&dir).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_promotion_directory_skips_bad_files() {
        let dir = scratch_dir("mixed");
        std::fs::write(dir.join("a_good.csv"), "product_code,start_date,end_date\nA,2025-03-01,2025-03-07\n").unwrap();
        std::fs::write(dir.join("b_bad.csv"), "product_code,start_date\nB,2025-03-01\n").unwrap();

        let events = load_promotions(&dir).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source_file, "a_good");

        let empty = scratch_dir("empty");
        assert!(load_promotions(&empty).is_err());
        std::fs::remove_dir_all(&dir).ok();
        std::fs::remove_dir_all(&empty).ok();
    }

    #[test]
    fn test_promotions_with_no_valid_rows_are_rejected() {
        let promos = "product_code,start_date,end_date\nA,someday,later\nB,2025-04-10,2025-04-01\n";
        let err = read_promotions(promos.as_bytes(), "history").unwrap_err();
        assert!(err.to_string().contains("2 promotion rows"));

        // A header with no rows is a genuinely empty history.
        let events = read_promotions("product_code,start_date,end_date\n".as_bytes(), "history").unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_malformed_stock_rows_are_skipped() {
        let stock: &[u8] = b"sku,qty\nA,5\n\xff\xfe,3\n  ,4\nB,2\n";
        let stock = read_stock(stock).unwrap();
        assert_eq!(stock.len(), 2);
        assert_eq!(stock.get("A"), Some(&5.0));
        assert_eq!(stock.get("B"), Some(&2.0));
    }
}
