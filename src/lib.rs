// Stock Catalog - Core Library
// Exposes all modules for use in the admin server and tests

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod importer;

#[cfg(feature = "server")]
pub mod admin;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{
    count_categories, count_stocks, delete_category, delete_stock, find_categories_iexact,
    get_category, get_or_create_category, get_stock, insert_category, insert_stock,
    insert_stocks, list_categories, list_stocks, setup_database,
};
pub use entities::{Category, MarketCap, NewStock, Stock, StockFilter};
pub use error::{ImportError, ListingDateError, StoreError};
pub use importer::{
    import_file, import_stock_data, parse_listing_date, parse_stock_rows, ImportSummary, StockRow,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
