use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use nehmen_core::day::DAY_FORMAT;
use nehmen_core::models::validate_entry;
use nehmen_core::suggest::{DEFAULT_SCAN_BUDGET, MAX_SCAN_BUDGET};
use nehmen_core::{AutoSuggestion, DaySummary, Entry, Store};

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

#[derive(Clone)]
struct AppState {
    store: Store,
    api_key: Option<String>,
}

// --- Request / Response types ---

/// Body of `POST /api/entries` and `PUT /api/entries/{id}`.
///
/// PUT replaces the whole record, so omitted optional fields are cleared.
/// A client-supplied `day` must agree with `timestamp`; without one it is derived.
#[derive(Deserialize)]
struct EntryRequest {
    description: Option<String>,
    calories: i64,
    exercise: Option<bool>,
    timestamp: Option<DateTime<Utc>>,
    day: Option<String>,
}

impl EntryRequest {
    fn into_entry(self, id: Option<String>, store: &Store) -> Result<Entry, ApiError> {
        let mut entry = store.new_entry(
            self.description,
            self.calories,
            self.exercise,
            self.timestamp.unwrap_or_else(Utc::now),
        );
        if let Some(id) = id {
            entry.id = id;
        }
        if let Some(day) = self.day {
            entry.day = day;
        }
        validate_entry(&entry, store.day_formatter()).map_err(ApiError::BadRequest)?;
        Ok(entry)
    }
}

#[derive(Deserialize)]
struct SuggestQuery {
    #[serde(default)]
    q: String,
    budget: Option<usize>,
}

#[derive(Deserialize)]
struct SetLimitRequest {
    daily_limit: Option<i64>,
}

#[derive(Serialize)]
struct LimitResponse {
    daily_limit: Option<i64>,
}

#[derive(Serialize)]
struct HasOlderResponse {
    day: String,
    has_older: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(err) => {
                tracing::error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<nehmen_core::Error> for ApiError {
    fn from(err: nehmen_core::Error) -> Self {
        Self::Internal(err.into())
    }
}

fn parse_day_param(day: &str) -> Result<String, ApiError> {
    NaiveDate::parse_from_str(day, DAY_FORMAT)
        .map(|d| d.format(DAY_FORMAT).to_string())
        .map_err(|_| ApiError::BadRequest(format!("Invalid day '{day}'. Use YYYY-MM-DD")))
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers ---

async fn create_entry(
    State(state): State<AppState>,
    Json(req): Json<EntryRequest>,
) -> Result<(StatusCode, Json<Entry>), ApiError> {
    let entry = req.into_entry(None, &state.store)?;
    state
        .store
        .upsert(entry.clone())
        .await
        .context("failed to insert entry")?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Entry>, ApiError> {
    state
        .store
        .get_by_id(id.clone())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Entry {id} not found")))
}

async fn replace_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<EntryRequest>,
) -> Result<Json<Entry>, ApiError> {
    let entry = req.into_entry(Some(id), &state.store)?;
    state
        .store
        .upsert(entry.clone())
        .await
        .context("failed to replace entry")?;
    Ok(Json(entry))
}

async fn delete_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.store.remove(id.clone()).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Entry {id} not found")))
    }
}

async fn get_day(
    State(state): State<AppState>,
    Path(day): Path<String>,
) -> Result<Json<DaySummary>, ApiError> {
    let day = parse_day_param(&day)?;
    Ok(Json(state.store.day_summary(day).await?))
}

async fn get_has_older(
    State(state): State<AppState>,
    Path(day): Path<String>,
) -> Result<Json<HasOlderResponse>, ApiError> {
    let day = parse_day_param(&day)?;
    let has_older = state.store.has_older_than(day.clone()).await?;
    Ok(Json(HasOlderResponse { day, has_older }))
}

async fn get_suggestions(
    State(state): State<AppState>,
    Query(query): Query<SuggestQuery>,
) -> Result<Json<Vec<AutoSuggestion>>, ApiError> {
    let budget = query.budget.unwrap_or(DEFAULT_SCAN_BUDGET);
    if !(1..=MAX_SCAN_BUDGET).contains(&budget) {
        return Err(ApiError::BadRequest(format!(
            "budget must be between 1 and {MAX_SCAN_BUDGET}"
        )));
    }
    Ok(Json(state.store.suggest_with_budget(query.q, budget).await?))
}

async fn get_limit(State(state): State<AppState>) -> Result<Json<LimitResponse>, ApiError> {
    let daily_limit = state.store.daily_limit().await?;
    Ok(Json(LimitResponse { daily_limit }))
}

async fn set_limit(
    State(state): State<AppState>,
    Json(req): Json<SetLimitRequest>,
) -> Result<Json<LimitResponse>, ApiError> {
    if let Some(limit) = req.daily_limit.filter(|&limit| limit <= 0) {
        return Err(ApiError::BadRequest(format!(
            "daily_limit must be positive, got {limit}"
        )));
    }
    state.store.set_daily_limit(req.daily_limit).await?;
    Ok(Json(LimitResponse {
        daily_limit: req.daily_limit,
    }))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/entries", post(create_entry))
        .route(
            "/api/entries/{id}",
            get(get_entry).put(replace_entry).delete(delete_entry),
        )
        .route("/api/days/{day}", get(get_day))
        .route("/api/days/{day}/has-older", get(get_has_older))
        .route("/api/suggestions", get(get_suggestions))
        .route("/api/limit", get(get_limit).put(set_limit))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    store: Store,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let state = AppState {
        store,
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        let head: String = key.chars().take(4).collect();
        let tail: String = key.chars().skip(key.chars().count().saturating_sub(4)).collect();
        eprintln!("API key: {head}...{tail} (see api_key file in data directory)");
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    eprintln!("Listening on http://{bind}:{port}");
    tracing::info!(%bind, port, "server started");
    axum::serve(listener, app).await?;

    Ok(())
}
