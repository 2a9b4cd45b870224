// 🏷️ Category Entity - flat stock categories ("IT", "Banking", ...)
//
// Name uniqueness is case-sensitive in storage, lookups during import are
// case-insensitive.

use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a category name.
pub const CATEGORY_NAME_MAX_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

impl Category {
    /// Build from a row shaped `id, name`
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Category {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
