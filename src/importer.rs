// 📥 Bulk Importer - CSV upload → stocks (+ categories) in one transaction
//
// Column layout (header line discarded):
//   symbol, name, listing_date, isin, market_cap, category
//
// Every row must parse and every insert must succeed, otherwise nothing is
// written. Categories created along the way are rolled back with the stocks.

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::db::{get_or_create_category, insert_stocks};
use crate::entities::{MarketCap, NewStock};
use crate::error::{ImportError, ListingDateError, StoreError};

/// Listing date format, e.g. "15-Jan-2023"
pub const LISTING_DATE_FORMAT: &str = "%d-%b-%Y";

/// Fixed column positions of an import file
pub mod columns {
    pub const SYMBOL: usize = 0;
    pub const NAME: usize = 1;
    pub const LISTING_DATE: usize = 2;
    pub const ISIN: usize = 3;
    pub const MARKET_CAP: usize = 4;
    pub const CATEGORY: usize = 5;
}

/// Outcome of a committed import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub stocks_created: usize,
    pub categories_created: usize,
}

/// One data row after parsing, before categories are resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockRow {
    /// 1-based line in the input file
    pub line: u64,
    pub symbol: String,
    pub name: String,
    pub listing_date: NaiveDate,
    pub isin: String,
    pub market_cap: MarketCap,
    /// `None` when the category cell is blank
    pub category: Option<String>,
}

/// Parse a listing date such as "15-Jan-2023" or "5-jan-2023".
///
/// The day takes one or two digits (a single digit may be space-padded),
/// the month is a three-letter abbreviation in any case and the year is
/// exactly four digits. Signs, other whitespace and two-digit years are
/// rejected rather than guessed.
pub fn parse_listing_date(text: &str) -> Result<NaiveDate, ListingDateError> {
    let mut parts = text.splitn(3, '-');
    let (day, month, year) = match (parts.next(), parts.next(), parts.next()) {
        (Some(day), Some(month), Some(year)) => (day, month, year),
        _ => return Err(ListingDateError::Layout),
    };

    let day = day.strip_prefix(' ').filter(|d| d.len() == 1).unwrap_or(day);
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());

    if !(1..=2).contains(&day.len())
        || !all_digits(day)
        || month.len() != 3
        || !month.bytes().all(|b| b.is_ascii_alphabetic())
        || year.len() != 4
        || !all_digits(year)
    {
        return Err(ListingDateError::Layout);
    }

    let normalized = format!("{}-{}-{}", day, month, year);
    Ok(NaiveDate::parse_from_str(&normalized, LISTING_DATE_FORMAT)?)
}

/// Decode and parse an upload into rows. Fails on the first bad row.
pub fn parse_stock_rows(data: &[u8]) -> Result<Vec<StockRow>, ImportError> {
    let text = std::str::from_utf8(data)?;

    if text.lines().next().map_or(true, str::is_empty) {
        return Err(ImportError::MissingHeader);
    }
    if let Some(line) = first_blank_line(text) {
        return Err(ImportError::MissingColumn {
            line,
            column: columns::SYMBOL,
            field: "symbol",
        });
    }

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    if rdr.headers()?.is_empty() {
        return Err(ImportError::MissingHeader);
    }

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(parse_record(&record)?);
    }

    Ok(rows)
}

/// 1-based number of the first empty line after the header.
///
/// The csv reader drops empty records, but an empty line is a row with no
/// columns and must fail the import. Lines inside a quoted field don't count.
fn first_blank_line(text: &str) -> Option<u64> {
    let mut in_quotes = false;

    for (idx, line) in text.lines().enumerate() {
        if idx > 0 && !in_quotes && line.is_empty() {
            return Some(idx as u64 + 1);
        }
        if line.matches('"').count() % 2 == 1 {
            in_quotes = !in_quotes;
        }
    }

    None
}

fn parse_record(record: &StringRecord) -> Result<StockRow, ImportError> {
    let line = record.position().map(|pos| pos.line()).unwrap_or_default();

    let field = move |column: usize, field: &'static str| {
        record
            .get(column)
            .ok_or(ImportError::MissingColumn { line, column, field })
    };

    let symbol = field(columns::SYMBOL, "symbol")?;
    let name = field(columns::NAME, "name")?;
    let date_text = field(columns::LISTING_DATE, "listing_date")?;
    let isin = field(columns::ISIN, "isin")?;
    let market_cap = field(columns::MARKET_CAP, "market_cap")?;
    let category = field(columns::CATEGORY, "category")?;

    let listing_date = parse_listing_date(date_text).map_err(|source| ImportError::InvalidDate {
        line,
        value: date_text.to_string(),
        source,
    })?;

    Ok(StockRow {
        line,
        symbol: symbol.to_string(),
        name: name.to_string(),
        listing_date,
        isin: isin.to_string(),
        market_cap: MarketCap::from_import_text(market_cap),
        category: Some(category)
            .filter(|c| !c.trim().is_empty())
            .map(str::to_string),
    })
}

/// Parse an upload and write all of its stocks as one batch.
///
/// Categories are looked up ignoring case and created when missing. The
/// whole import runs in one transaction: on any error nothing is committed.
pub fn import_stock_data(conn: &mut Connection, data: &[u8]) -> Result<ImportSummary, ImportError> {
    let rows = parse_stock_rows(data)?;
    debug!(rows = rows.len(), "parsed stock upload");

    let tx = conn.transaction().map_err(StoreError::from)?;

    let mut resolved: HashMap<String, i64> = HashMap::new();
    let mut categories_created = 0;
    let mut stocks = Vec::with_capacity(rows.len());

    for row in rows {
        let category_id = match &row.category {
            Some(name) => {
                let key = name.to_ascii_lowercase();
                match resolved.get(&key) {
                    Some(id) => Some(*id),
                    None => {
                        let (category, created) = get_or_create_category(&tx, name)
                            .map_err(|source| ImportError::Row { line: row.line, source })?;
                        if created {
                            categories_created += 1;
                        }
                        resolved.insert(key, category.id);
                        Some(category.id)
                    }
                }
            }
            None => None,
        };

        stocks.push(NewStock {
            symbol: row.symbol,
            name: row.name,
            listing_date: row.listing_date,
            isin: row.isin,
            market_cap: row.market_cap,
            category_id,
        });
    }

    let stocks_created = insert_stocks(&tx, &stocks)?;
    tx.commit().map_err(StoreError::from)?;

    let summary = ImportSummary {
        stocks_created,
        categories_created,
    };
    info!(
        stocks = summary.stocks_created,
        categories = summary.categories_created,
        "stock import committed"
    );

    Ok(summary)
}

/// Import a CSV file from disk
pub fn import_file(conn: &mut Connection, path: &Path) -> Result<ImportSummary, ImportError> {
    let data = std::fs::read(path)?;
    import_stock_data(conn, &data)
}
