use thiserror::Error;

/// Catalog store failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    /// Category still referenced by stocks
    #[error("Category '{name}' is referenced by {stock_count} stock(s)")]
    Protected { name: String, stock_count: i64 },

    #[error("More than one category matches '{0}' ignoring case")]
    AmbiguousCategory(String),
}

impl StoreError {
    /// Uniqueness, length or foreign-key constraint rejected the write
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            StoreError::Database(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

/// Why a listing date cell was rejected
#[derive(Error, Debug)]
pub enum ListingDateError {
    /// Not `DD-Mon-YYYY`: wrong separators, sign, padding or year width
    #[error("expected DD-Mon-YYYY")]
    Layout,

    #[error(transparent)]
    Calendar(#[from] chrono::ParseError),
}

/// Bulk import failures. Any of these aborts the whole import.
///
/// `line` is the 1-based line of the input file (the header is line 1).
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Upload is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("Upload has no header line")]
    MissingHeader,

    #[error("Malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Line {line}: missing column {column} ({field})")]
    MissingColumn {
        line: u64,
        column: usize,
        field: &'static str,
    },

    #[error("Line {line}: invalid listing date '{value}' (expected e.g. 15-Jan-2023)")]
    InvalidDate {
        line: u64,
        value: String,
        #[source]
        source: ListingDateError,
    },

    #[error("Line {line}: {source}")]
    Row {
        line: u64,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to read import file: {0}")]
    Io(#[from] std::io::Error),
}
