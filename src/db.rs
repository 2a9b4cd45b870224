use rusqlite::{params, Connection, OptionalExtension, ToSql};
use tracing::{debug, info};

use crate::entities::category::CATEGORY_NAME_MAX_LEN;
use crate::entities::stock::{ISIN_MAX_LEN, STOCK_NAME_MAX_LEN, SYMBOL_MAX_LEN};
use crate::entities::{Category, NewStock, Stock, StockFilter};
use crate::error::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

const STOCK_SELECT: &str = "SELECT s.id, s.symbol, s.name, s.listing_date, s.isin, s.market_cap,
        c.id, c.name
     FROM stocks s
     LEFT JOIN categories c ON c.id = s.category_id";

pub fn setup_database(conn: &Connection) -> StoreResult<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    // Needed for ON DELETE RESTRICT on stocks.category_id
    conn.pragma_update(None, "foreign_keys", true)?;

    // ==========================================================================
    // Categories Table
    // ==========================================================================
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE CHECK (length(name) <= {CATEGORY_NAME_MAX_LEN})
            )"
        ),
        [],
    )?;

    // ==========================================================================
    // Stocks Table
    // ==========================================================================
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS stocks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL CHECK (length(symbol) <= {SYMBOL_MAX_LEN}),
                name TEXT NOT NULL CHECK (length(name) <= {STOCK_NAME_MAX_LEN}),
                listing_date TEXT NOT NULL,
                isin TEXT NOT NULL UNIQUE CHECK (length(isin) <= {ISIN_MAX_LEN}),
                market_cap TEXT NOT NULL DEFAULT 'U' CHECK (market_cap IN ('U', 'S', 'M', 'L')),
                category_id INTEGER REFERENCES categories(id) ON DELETE RESTRICT
            )"
        ),
        [],
    )?;

    // ==========================================================================
    // Indexes (search fields and list filters)
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_stocks_symbol ON stocks(symbol)",
        [],
    )?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_stocks_name ON stocks(name)", [])?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_stocks_market_cap ON stocks(market_cap)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_stocks_category ON stocks(category_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// Categories
// ============================================================================

pub fn insert_category(conn: &Connection, name: &str) -> StoreResult<Category> {
    conn.execute("INSERT INTO categories (name) VALUES (?1)", params![name])?;
    let id = conn.last_insert_rowid();
    debug!(id, name, "category created");

    Ok(Category {
        id,
        name: name.to_string(),
    })
}

pub fn get_category(conn: &Connection, id: i64) -> StoreResult<Option<Category>> {
    let category = conn
        .query_row(
            "SELECT id, name FROM categories WHERE id = ?1",
            params![id],
            Category::from_row,
        )
        .optional()?;

    Ok(category)
}

/// Categories whose name equals `name` ignoring ASCII case.
///
/// Storage uniqueness is case-sensitive, so "Tech" and "tech" may both exist.
pub fn find_categories_iexact(conn: &Connection, name: &str) -> StoreResult<Vec<Category>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, name FROM categories WHERE name = ?1 COLLATE NOCASE ORDER BY id",
    )?;

    let categories = stmt
        .query_map(params![name], Category::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(categories)
}

/// Reuse the single category matching `name` ignoring case, or create one
/// with `name` as given. Returns the category and whether it was created.
pub fn get_or_create_category(conn: &Connection, name: &str) -> StoreResult<(Category, bool)> {
    let mut matches = find_categories_iexact(conn, name)?;

    match matches.len() {
        0 => Ok((insert_category(conn, name)?, true)),
        1 => Ok((matches.remove(0), false)),
        _ => Err(StoreError::AmbiguousCategory(name.to_string())),
    }
}

pub fn list_categories(conn: &Connection) -> StoreResult<Vec<Category>> {
    let mut stmt = conn.prepare("SELECT id, name FROM categories ORDER BY name")?;

    let categories = stmt
        .query_map([], Category::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(categories)
}

/// Delete a category. Blocked while any stock references it.
pub fn delete_category(conn: &Connection, id: i64) -> StoreResult<()> {
    let category = get_category(conn, id)?
        .ok_or_else(|| StoreError::NotFound(format!("category {}", id)))?;

    let stock_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM stocks WHERE category_id = ?1",
        params![id],
        |row| row.get(0),
    )?;

    if stock_count > 0 {
        return Err(StoreError::Protected {
            name: category.name,
            stock_count,
        });
    }

    conn.execute("DELETE FROM categories WHERE id = ?1", params![id])?;
    info!(id, name = %category.name, "category deleted");

    Ok(())
}

pub fn count_categories(conn: &Connection) -> StoreResult<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// Stocks
// ============================================================================

const STOCK_INSERT: &str = "INSERT INTO stocks (
        symbol, name, listing_date, isin, market_cap, category_id
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

pub fn insert_stock(conn: &Connection, stock: &NewStock) -> StoreResult<Stock> {
    conn.execute(
        STOCK_INSERT,
        params![
            stock.symbol,
            stock.name,
            stock.listing_date,
            stock.isin,
            stock.market_cap,
            stock.category_id,
        ],
    )?;

    let id = conn.last_insert_rowid();
    debug!(id, isin = %stock.isin, "stock created");

    get_stock(conn, id)?.ok_or_else(|| StoreError::NotFound(format!("stock {}", id)))
}

/// Insert every stock through one prepared statement.
///
/// Stops at the first failure. Run it inside a transaction to get
/// all-or-nothing behaviour.
pub fn insert_stocks(conn: &Connection, stocks: &[NewStock]) -> StoreResult<usize> {
    let mut stmt = conn.prepare_cached(STOCK_INSERT)?;

    for stock in stocks {
        stmt.execute(params![
            stock.symbol,
            stock.name,
            stock.listing_date,
            stock.isin,
            stock.market_cap,
            stock.category_id,
        ])?;
    }

    Ok(stocks.len())
}

pub fn get_stock(conn: &Connection, id: i64) -> StoreResult<Option<Stock>> {
    let stock = conn
        .query_row(
            &format!("{STOCK_SELECT} WHERE s.id = ?1"),
            params![id],
            Stock::from_row,
        )
        .optional()?;

    Ok(stock)
}

/// Stock change list, newest first
pub fn list_stocks(conn: &Connection, filter: &StockFilter) -> StoreResult<Vec<Stock>> {
    let pattern = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(|term| format!("%{}%", escape_like(term)));

    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<&dyn ToSql> = Vec::new();

    if let Some(pattern) = &pattern {
        clauses.push(
            "(s.name LIKE ? ESCAPE '\\' OR s.symbol LIKE ? ESCAPE '\\' OR s.isin LIKE ? ESCAPE '\\')",
        );
        values.push(pattern);
        values.push(pattern);
        values.push(pattern);
    }

    if let Some(market_cap) = &filter.market_cap {
        clauses.push("s.market_cap = ?");
        values.push(market_cap);
    }

    if let Some(category_id) = &filter.category_id {
        clauses.push("s.category_id = ?");
        values.push(category_id);
    }

    let mut sql = STOCK_SELECT.to_string();
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY s.id DESC");

    let mut stmt = conn.prepare(&sql)?;
    let stocks = stmt
        .query_map(values.as_slice(), Stock::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(stocks)
}

pub fn delete_stock(conn: &Connection, id: i64) -> StoreResult<()> {
    let deleted = conn.execute("DELETE FROM stocks WHERE id = ?1", params![id])?;

    if deleted == 0 {
        return Err(StoreError::NotFound(format!("stock {}", id)));
    }

    info!(id, "stock deleted");
    Ok(())
}

pub fn count_stocks(conn: &Connection) -> StoreResult<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM stocks", [], |row| row.get(0))?;

    Ok(count)
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::MarketCap;
    use chrono::NaiveDate;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn new_stock(symbol: &str, name: &str, isin: &str) -> NewStock {
        NewStock {
            symbol: symbol.to_string(),
            name: name.to_string(),
            listing_date: NaiveDate::from_ymd_opt(2023, 1, 15).unwrap(),
            isin: isin.to_string(),
            market_cap: MarketCap::Unknown,
            category_id: None,
        }
    }

    #[test]
    fn test_setup_database_is_idempotent() {
        let conn = test_db();
        setup_database(&conn).unwrap();

        assert_eq!(count_stocks(&conn).unwrap(), 0);
        assert_eq!(count_categories(&conn).unwrap(), 0);
    }

    #[test]
    fn test_insert_and_get_stock_with_category() {
        let conn = test_db();
        let it = insert_category(&conn, "IT").unwrap();

        let mut stock = new_stock("TCS", "Tata Consultancy", "INE467B01029");
        stock.market_cap = MarketCap::Large;
        stock.category_id = Some(it.id);

        let stored = insert_stock(&conn, &stock).unwrap();
        let fetched = get_stock(&conn, stored.id).unwrap().unwrap();

        assert_eq!(fetched, stored);
        assert_eq!(fetched.symbol, "TCS");
        assert_eq!(fetched.market_cap, MarketCap::Large);
        assert_eq!(fetched.listing_date, NaiveDate::from_ymd_opt(2023, 1, 15).unwrap());
        assert_eq!(fetched.category, Some(it));
    }

    #[test]
    fn test_duplicate_isin_is_constraint_violation() {
        let conn = test_db();
        insert_stock(&conn, &new_stock("TCS", "Tata Consultancy", "INE467B01029")).unwrap();

        let err = insert_stock(&conn, &new_stock("TCS2", "Copy", "INE467B01029")).unwrap_err();

        assert!(err.is_constraint_violation());
        assert_eq!(count_stocks(&conn).unwrap(), 1);
    }

    #[test]
    fn test_field_length_limits_enforced() {
        let conn = test_db();

        let err = insert_stock(&conn, &new_stock("WAYTOOLONGSYM", "Name", "ISIN1")).unwrap_err();
        assert!(err.is_constraint_violation());

        let long_isin = "X".repeat(ISIN_MAX_LEN + 1);
        let err = insert_stock(&conn, &new_stock("OK", "Name", &long_isin)).unwrap_err();
        assert!(err.is_constraint_violation());

        let long_name = "c".repeat(CATEGORY_NAME_MAX_LEN + 1);
        let err = insert_category(&conn, &long_name).unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn test_category_names_unique_case_sensitive() {
        let conn = test_db();
        insert_category(&conn, "Tech").unwrap();

        // Different case is a distinct row
        insert_category(&conn, "tech").unwrap();

        let err = insert_category(&conn, "Tech").unwrap_err();
        assert!(err.is_constraint_violation());
        assert_eq!(count_categories(&conn).unwrap(), 2);
    }

    #[test]
    fn test_get_or_create_category_reuses_case_insensitive_match() {
        let conn = test_db();
        let existing = insert_category(&conn, "tech").unwrap();

        let (category, created) = get_or_create_category(&conn, "Tech").unwrap();

        assert!(!created);
        assert_eq!(category, existing);
        assert_eq!(count_categories(&conn).unwrap(), 1);
    }

    #[test]
    fn test_get_or_create_category_creates_when_absent() {
        let conn = test_db();

        let (category, created) = get_or_create_category(&conn, "Banking").unwrap();

        assert!(created);
        assert_eq!(category.name, "Banking");
        assert_eq!(find_categories_iexact(&conn, "BANKING").unwrap(), vec![category]);
    }

    #[test]
    fn test_get_or_create_category_ambiguous() {
        let conn = test_db();
        insert_category(&conn, "Tech").unwrap();
        insert_category(&conn, "TECH").unwrap();

        let err = get_or_create_category(&conn, "tech").unwrap_err();

        assert!(matches!(err, StoreError::AmbiguousCategory(name) if name == "tech"));
    }

    #[test]
    fn test_delete_category_protected_while_referenced() {
        let conn = test_db();
        let it = insert_category(&conn, "IT").unwrap();
        let mut stock = new_stock("TCS", "Tata Consultancy", "INE467B01029");
        stock.category_id = Some(it.id);
        let stored = insert_stock(&conn, &stock).unwrap();

        let err = delete_category(&conn, it.id).unwrap_err();
        assert!(matches!(err, StoreError::Protected { stock_count: 1, .. }));
        assert!(get_category(&conn, it.id).unwrap().is_some());

        // Once the stock is gone the category can be deleted
        delete_stock(&conn, stored.id).unwrap();
        delete_category(&conn, it.id).unwrap();
        assert!(get_category(&conn, it.id).unwrap().is_none());
    }

    #[test]
    fn test_foreign_key_restrict_backs_protection() {
        let conn = test_db();
        let it = insert_category(&conn, "IT").unwrap();
        let mut stock = new_stock("TCS", "Tata Consultancy", "INE467B01029");
        stock.category_id = Some(it.id);
        insert_stock(&conn, &stock).unwrap();

        let result = conn.execute("DELETE FROM categories WHERE id = ?1", params![it.id]);
        assert!(result.is_err());
    }

    #[test]
    fn test_delete_missing_records() {
        let conn = test_db();

        assert!(matches!(delete_stock(&conn, 42), Err(StoreError::NotFound(_))));
        assert!(matches!(delete_category(&conn, 42), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_list_stocks_search_and_filters() {
        let conn = test_db();
        let it = insert_category(&conn, "IT").unwrap();
        let banking = insert_category(&conn, "Banking").unwrap();

        let mut tcs = new_stock("TCS", "Tata Consultancy", "INE467B01029");
        tcs.market_cap = MarketCap::Large;
        tcs.category_id = Some(it.id);
        let mut infy = new_stock("INFY", "Infosys", "INE009A01021");
        infy.market_cap = MarketCap::Large;
        infy.category_id = Some(it.id);
        let mut yes = new_stock("YESBANK", "Yes Bank", "INE528G01035");
        yes.market_cap = MarketCap::Mid;
        yes.category_id = Some(banking.id);

        insert_stocks(&conn, &[tcs, infy, yes]).unwrap();

        let all = list_stocks(&conn, &StockFilter::default()).unwrap();
        let symbols: Vec<&str> = all.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["YESBANK", "INFY", "TCS"]);

        // Search covers name, symbol and ISIN, ignoring case
        assert_eq!(list_stocks(&conn, &StockFilter::search("tata")).unwrap().len(), 1);
        assert_eq!(list_stocks(&conn, &StockFilter::search("infy")).unwrap().len(), 1);
        assert_eq!(list_stocks(&conn, &StockFilter::search("ine528g")).unwrap().len(), 1);
        assert_eq!(list_stocks(&conn, &StockFilter::search("  ")).unwrap().len(), 3);

        let large = list_stocks(&conn, &StockFilter::default().with_market_cap(MarketCap::Large)).unwrap();
        assert_eq!(large.len(), 2);

        let banks = list_stocks(&conn, &StockFilter::default().with_category(banking.id)).unwrap();
        assert_eq!(banks.len(), 1);
        assert_eq!(banks[0].symbol, "YESBANK");

        let combined = StockFilter::search("bank")
            .with_market_cap(MarketCap::Large)
            .with_category(it.id);
        assert!(list_stocks(&conn, &combined).unwrap().is_empty());
    }

    #[test]
    fn test_list_stocks_search_escapes_wildcards() {
        let conn = test_db();
        insert_stock(&conn, &new_stock("A_B", "Under Score", "ISIN1")).unwrap();
        insert_stock(&conn, &new_stock("AXB", "Plain", "ISIN2")).unwrap();

        let found = list_stocks(&conn, &StockFilter::search("a_b")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].symbol, "A_B");

        assert!(list_stocks(&conn, &StockFilter::search("%")).unwrap().is_empty());
    }

    #[test]
    fn test_list_categories_ordered_by_name() {
        let conn = test_db();
        insert_category(&conn, "Pharma").unwrap();
        insert_category(&conn, "Banking").unwrap();

        let names: Vec<String> = list_categories(&conn)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Banking", "Pharma"]);
    }
}
