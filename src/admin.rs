// 🌐 Admin Surface - Axum router for the stock catalog
//
// Upload view (HTML form + multipart POST), landing page, and JSON
// list/CRUD endpoints for stocks and categories.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::{delete, get},
    Router,
};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::db;
use crate::entities::{Category, MarketCap, NewStock, Stock, StockFilter};
use crate::error::StoreError;
use crate::importer::{import_stock_data, ImportSummary};

/// Multipart field carrying the CSV upload
pub const UPLOAD_FIELD: &str = "stock_data";

pub const ADMIN_INDEX: &str = "/admin/";
pub const UPLOAD_PATH: &str = "/admin/stock/stock/upload-stock-data/";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(conn: Connection, admin_token: Option<String>) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            admin_token: admin_token.map(Arc::from),
        }
    }

    fn db(&self) -> Result<MutexGuard<'_, Connection>, AdminError> {
        self.db
            .lock()
            .map_err(|_| AdminError::Internal("database lock poisoned".to_string()))
    }
}

// ============================================================================
// Responses
// ============================================================================

/// API Response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Change-list row for a stock
#[derive(Debug, Serialize, Deserialize)]
pub struct StockResponse {
    pub id: i64,
    pub symbol: String,
    pub name: String,
    pub listing_date: NaiveDate,
    pub isin: String,
    pub market_cap: MarketCap,
    pub market_cap_display: String,
    pub category_id: Option<i64>,
    pub category: Option<String>,
    pub display: String,
}

impl From<Stock> for StockResponse {
    fn from(stock: Stock) -> Self {
        let display = stock.to_string();
        let (category_id, category) = match stock.category {
            Some(category) => (Some(category.id), Some(category.name)),
            None => (None, None),
        };

        Self {
            id: stock.id,
            symbol: stock.symbol,
            name: stock.name,
            listing_date: stock.listing_date,
            isin: stock.isin,
            market_cap: stock.market_cap,
            market_cap_display: stock.market_cap.label().to_string(),
            category_id,
            category,
            display,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum AdminError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Missing or invalid admin token")]
    Unauthorized,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AdminError {
    fn status(&self) -> StatusCode {
        match self {
            AdminError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            AdminError::Store(StoreError::Protected { .. })
            | AdminError::Store(StoreError::AmbiguousCategory(_)) => StatusCode::CONFLICT,
            AdminError::Store(e) if e.is_constraint_violation() => StatusCode::CONFLICT,
            AdminError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AdminError::Unauthorized => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("admin request failed: {}", self);
        } else {
            warn!("admin request rejected: {}", self);
        }

        (status, Json(ApiResponse::<()>::err(self.to_string()))).into_response()
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Require `Authorization: Bearer <token>` when a token is configured
async fn require_admin_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(expected) = &state.admin_token {
        let provided = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));

        if provided != Some(&**expected) {
            return AdminError::Unauthorized.into_response();
        }
    }

    next.run(request).await
}

// ============================================================================
// Pages
// ============================================================================

/// GET /health
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /admin/ - landing page
async fn admin_index(State(state): State<AppState>) -> Result<Html<String>, AdminError> {
    let conn = state.db()?;
    let stock_count = db::count_stocks(&conn)?;
    let category_count = db::count_categories(&conn)?;

    Ok(Html(
        include_str!("../web/index.html")
            .replace("{{stock_count}}", &stock_count.to_string())
            .replace("{{category_count}}", &category_count.to_string())
            .replace("{{upload_path}}", UPLOAD_PATH),
    ))
}

/// GET /admin/stock/stock/upload-stock-data/ - empty upload form
async fn upload_form() -> Html<String> {
    Html(include_str!("../web/upload-stock-data.html").replace("{{upload_field}}", UPLOAD_FIELD))
}

/// POST /admin/stock/stock/upload-stock-data/ - import then redirect
async fn upload_stock_data(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let data = match read_upload(&mut multipart).await {
        Ok(Some(data)) => data,
        Ok(None) => {
            warn!("upload has no '{}' field", UPLOAD_FIELD);
            return failure_page(StatusCode::INTERNAL_SERVER_ERROR);
        }
        Err(e) => {
            warn!("failed to read upload: {}", e.body_text());
            return failure_page(e.status());
        }
    };

    match run_import(&state, &data) {
        Ok(summary) => {
            info!(
                stocks = summary.stocks_created,
                categories = summary.categories_created,
                bytes = data.len(),
                "upload imported"
            );
            Redirect::to(ADMIN_INDEX).into_response()
        }
        Err(e) => {
            error!("stock import failed: {:#}", e);
            failure_page(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn read_upload(
    multipart: &mut Multipart,
) -> Result<Option<axum::body::Bytes>, axum::extract::multipart::MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            return Ok(Some(field.bytes().await?));
        }
    }

    Ok(None)
}

fn run_import(state: &AppState, data: &[u8]) -> anyhow::Result<ImportSummary> {
    let mut conn = state.db()?;
    Ok(import_stock_data(&mut conn, data)?)
}

fn failure_page(status: StatusCode) -> Response {
    (status, Html(include_str!("../web/import-failed.html"))).into_response()
}

// ============================================================================
// Stock change list / CRUD
// ============================================================================

/// GET /admin/stock/stock/?q=&market_cap=&category=
async fn list_stocks(
    State(state): State<AppState>,
    Query(filter): Query<StockFilter>,
) -> Result<Json<ApiResponse<Vec<StockResponse>>>, AdminError> {
    let conn = state.db()?;
    let stocks = db::list_stocks(&conn, &filter)?;

    Ok(Json(ApiResponse::ok(stocks.into_iter().map(Into::into).collect())))
}

/// POST /admin/stock/stock/
async fn create_stock(
    State(state): State<AppState>,
    Json(stock): Json<NewStock>,
) -> Result<(StatusCode, Json<ApiResponse<StockResponse>>), AdminError> {
    let conn = state.db()?;
    let stored = db::insert_stock(&conn, &stock)?;
    info!(id = stored.id, isin = %stored.isin, "stock added");

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(stored.into()))))
}

/// GET /admin/stock/stock/:id/
async fn get_stock(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<StockResponse>>, AdminError> {
    let conn = state.db()?;
    let stock = db::get_stock(&conn, id)?
        .ok_or_else(|| StoreError::NotFound(format!("stock {}", id)))?;

    Ok(Json(ApiResponse::ok(stock.into())))
}

/// DELETE /admin/stock/stock/:id/
async fn delete_stock(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, AdminError> {
    let conn = state.db()?;
    db::delete_stock(&conn, id)?;

    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Category admin
// ============================================================================

/// GET /admin/stock/category/
async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Category>>>, AdminError> {
    let conn = state.db()?;

    Ok(Json(ApiResponse::ok(db::list_categories(&conn)?)))
}

/// POST /admin/stock/category/
async fn create_category(
    State(state): State<AppState>,
    Json(category): Json<NewCategory>,
) -> Result<(StatusCode, Json<ApiResponse<Category>>), AdminError> {
    if category.name.trim().is_empty() {
        return Err(AdminError::BadRequest("category name is required".to_string()));
    }

    let conn = state.db()?;
    let stored = db::insert_category(&conn, &category.name)?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(stored))))
}

/// DELETE /admin/stock/category/:id/ - 409 while stocks reference it
async fn delete_category(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, AdminError> {
    let conn = state.db()?;
    db::delete_category(&conn, id)?;

    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let admin_routes = Router::new()
        .route(ADMIN_INDEX, get(admin_index))
        .route(UPLOAD_PATH, get(upload_form).post(upload_stock_data))
        .route("/admin/stock/stock/", get(list_stocks).post(create_stock))
        .route("/admin/stock/stock/:id/", get(get_stock).delete(delete_stock))
        .route("/admin/stock/category/", get(list_categories).post(create_category))
        .route("/admin/stock/category/:id/", delete(delete_category))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin_token,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
