// 📈 Stock Entity - listed securities identified by ISIN
//
// Market cap is stored as a one-letter code (U/S/M/L) and shown with its
// label (Unknown/Smallcap/Midcap/Largecap).

use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::category::Category;

pub const SYMBOL_MAX_LEN: usize = 10;
pub const STOCK_NAME_MAX_LEN: usize = 100;
pub const ISIN_MAX_LEN: usize = 20;

// ============================================================================
// MARKET CAPITALIZATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MarketCap {
    #[default]
    #[serde(rename = "U")]
    Unknown,
    #[serde(rename = "S")]
    Small,
    #[serde(rename = "M")]
    Mid,
    #[serde(rename = "L")]
    Large,
}

impl MarketCap {
    pub const ALL: [MarketCap; 4] = [
        MarketCap::Unknown,
        MarketCap::Small,
        MarketCap::Mid,
        MarketCap::Large,
    ];

    /// Storage code
    pub fn code(&self) -> &'static str {
        match self {
            MarketCap::Unknown => "U",
            MarketCap::Small => "S",
            MarketCap::Mid => "M",
            MarketCap::Large => "L",
        }
    }

    /// Human-readable label for display
    pub fn label(&self) -> &'static str {
        match self {
            MarketCap::Unknown => "Unknown",
            MarketCap::Small => "Smallcap",
            MarketCap::Mid => "Midcap",
            MarketCap::Large => "Largecap",
        }
    }

    pub fn from_code(code: &str) -> Option<MarketCap> {
        MarketCap::ALL.into_iter().find(|cap| cap.code() == code)
    }

    /// Map the free-text market cap column of an import file.
    ///
    /// Surrounding whitespace is ignored and matching is case-insensitive,
    /// so "SMALLCAP", " SmallCap " and "smallcap" all give `Small`.
    /// Anything else is `Unknown`.
    pub fn from_import_text(text: &str) -> MarketCap {
        match text.trim().to_lowercase().as_str() {
            "smallcap" => MarketCap::Small,
            "midcap" => MarketCap::Mid,
            "largecap" => MarketCap::Large,
            _ => MarketCap::Unknown,
        }
    }
}

impl fmt::Display for MarketCap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl ToSql for MarketCap {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for MarketCap {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = value.as_str()?;
        MarketCap::from_code(code).ok_or(FromSqlError::InvalidType)
    }
}

// ============================================================================
// STOCK ENTITY
// ============================================================================

/// A stored stock with its category joined in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stock {
    pub id: i64,
    pub symbol: String,
    pub name: String,
    pub listing_date: NaiveDate,
    pub isin: String,
    pub market_cap: MarketCap,
    pub category: Option<Category>,
}

impl Stock {
    /// Build from a row shaped
    /// `s.id, s.symbol, s.name, s.listing_date, s.isin, s.market_cap, c.id, c.name`
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let category_id: Option<i64> = row.get(6)?;
        let category_name: Option<String> = row.get(7)?;

        let category = match (category_id, category_name) {
            (Some(id), Some(name)) => Some(Category { id, name }),
            _ => None,
        };

        Ok(Stock {
            id: row.get(0)?,
            symbol: row.get(1)?,
            name: row.get(2)?,
            listing_date: row.get(3)?,
            isin: row.get(4)?,
            market_cap: row.get(5)?,
            category,
        })
    }
}

impl fmt::Display for Stock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.symbol)
    }
}

/// A stock that has not been stored yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStock {
    pub symbol: String,
    pub name: String,
    pub listing_date: NaiveDate,
    pub isin: String,
    #[serde(default)]
    pub market_cap: MarketCap,
    #[serde(default)]
    pub category_id: Option<i64>,
}

/// Change-list filters: free-text search plus the market cap / category facets
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StockFilter {
    /// Case-insensitive substring of name, symbol or ISIN
    #[serde(rename = "q", default)]
    pub search: Option<String>,

    #[serde(default)]
    pub market_cap: Option<MarketCap>,

    #[serde(rename = "category", default)]
    pub category_id: Option<i64>,
}

impl StockFilter {
    pub fn search(term: &str) -> Self {
        StockFilter {
            search: Some(term.to_string()),
            ..Default::default()
        }
    }

    pub fn with_market_cap(mut self, market_cap: MarketCap) -> Self {
        self.market_cap = Some(market_cap);
        self
    }

    pub fn with_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_cap_from_import_text_is_case_insensitive() {
        for text in ["SMALLCAP", "SmallCap", "smallcap", "  smallcap\t"] {
            assert_eq!(MarketCap::from_import_text(text), MarketCap::Small, "{:?}", text);
        }
        assert_eq!(MarketCap::from_import_text("MidCap"), MarketCap::Mid);
        assert_eq!(MarketCap::from_import_text("LARGECAP"), MarketCap::Large);
    }

    #[test]
    fn test_market_cap_unknown_text_defaults_to_unknown() {
        assert_eq!(MarketCap::from_import_text(""), MarketCap::Unknown);
        assert_eq!(MarketCap::from_import_text("small cap"), MarketCap::Unknown);
        assert_eq!(MarketCap::from_import_text("mega"), MarketCap::Unknown);
        assert_eq!(MarketCap::default(), MarketCap::Unknown);
    }

    #[test]
    fn test_market_cap_codes_and_labels() {
        assert_eq!(MarketCap::Large.code(), "L");
        assert_eq!(MarketCap::Large.label(), "Largecap");
        assert_eq!(MarketCap::from_code("M"), Some(MarketCap::Mid));
        assert_eq!(MarketCap::from_code("X"), None);
        assert_eq!(MarketCap::Small.to_string(), "Smallcap");
    }

    #[test]
    fn test_market_cap_serializes_as_code() {
        let json = serde_json::to_string(&MarketCap::Small).unwrap();
        assert_eq!(json, "\"S\"");

        let parsed: MarketCap = serde_json::from_str("\"L\"").unwrap();
        assert_eq!(parsed, MarketCap::Large);
    }

    #[test]
    fn test_stock_display() {
        let stock = Stock {
            id: 1,
            symbol: "TCS".to_string(),
            name: "Tata Consultancy".to_string(),
            listing_date: NaiveDate::from_ymd_opt(2023, 1, 15).unwrap(),
            isin: "INE467B01029".to_string(),
            market_cap: MarketCap::Large,
            category: None,
        };

        assert_eq!(stock.to_string(), "Tata Consultancy(TCS)");
    }

    #[test]
    fn test_new_stock_defaults_when_deserialized() {
        let stock: NewStock = serde_json::from_value(serde_json::json!({
            "symbol": "INFY",
            "name": "Infosys",
            "listing_date": "2023-02-01",
            "isin": "INE009A01021"
        }))
        .unwrap();

        assert_eq!(stock.market_cap, MarketCap::Unknown);
        assert_eq!(stock.category_id, None);
        assert_eq!(stock.listing_date, NaiveDate::from_ymd_opt(2023, 2, 1).unwrap());
    }
}
