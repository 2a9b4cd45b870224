// Stock Catalog - Admin Web Server

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stock_catalog::admin::{router, AppState, ADMIN_INDEX, UPLOAD_PATH};
use stock_catalog::{setup_database, AppConfig, VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;
    info!(version = VERSION, "starting stock catalog admin");

    // Open database
    let conn = Connection::open(&config.db_path)
        .with_context(|| format!("Failed to open database {:?}", config.db_path))?;
    setup_database(&conn).context("Failed to set up database schema")?;
    info!(path = ?config.db_path, "database ready");

    if config.admin_token.is_none() {
        tracing::warn!("STOCK_ADMIN_TOKEN not set, /admin routes are open");
    }

    let state = AppState::new(conn, config.admin_token.clone());
    let app = router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!("admin: http://{}{}", config.bind_addr, ADMIN_INDEX);
    info!("upload: http://{}{}", config.bind_addr, UPLOAD_PATH);

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
