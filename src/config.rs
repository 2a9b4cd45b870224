// ⚙️ Configuration - read from the environment (and .env when present)

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "stocks.db";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// SQLite database file
    pub db_path: PathBuf,
    pub bind_addr: SocketAddr,
    /// Shared bearer token for `/admin` routes. `None` leaves them open.
    pub admin_token: Option<String>,
    /// Request body limit for the upload view
    pub max_upload_bytes: usize,
}

impl AppConfig {
    /// Load from `STOCK_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path: PathBuf = lookup("STOCK_DB_PATH")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_DB_PATH.to_string())
            .into();

        let bind_addr = lookup("STOCK_BIND_ADDR")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid STOCK_BIND_ADDR '{}'", bind_addr))?;

        let admin_token = lookup("STOCK_ADMIN_TOKEN").filter(|v| !v.is_empty());

        let max_upload_bytes = match lookup("STOCK_MAX_UPLOAD_BYTES").filter(|v| !v.is_empty()) {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("Invalid STOCK_MAX_UPLOAD_BYTES '{}'", raw))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(AppConfig {
            db_path,
            bind_addr,
            admin_token,
            max_upload_bytes,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            admin_token: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}
