// 🌐 JSON API - register, stats, recent feed
// Thin axum layer over the Registry; the page itself lives elsewhere

use crate::aggregator::StatsSnapshot;
use crate::config::{category_count_key, Config, EventInfo, RESERVED_COUNT_KEYS};
use crate::error::{RegisterError, StoreError, ValidationError};
use crate::registration::{RecentEntry, Registration};
use crate::registry::Registry;
use crate::validation::RegistrationForm;
use axum::{
    extract::{Query, State},
    http::{header::CONTENT_TYPE, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub event: Arc<EventPage>,
}

impl AppState {
    pub fn new(registry: Arc<Registry>, config: &Config) -> Self {
        let rules = registry.rules();
        let event = EventPage {
            event: config.event.clone(),
            minimum_donation: rules.minimum_donation,
            maximum_donation: rules.maximum_donation,
            default_donation: config.default_donation,
            categories: rules.categories.clone(),
            refresh_interval_secs: config.memo_window.as_secs(),
        };

        AppState {
            registry,
            event: Arc::new(event),
        }
    }
}

// ============================================================================
// RESPONSE TYPES
// ============================================================================

/// API Response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: T,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EventPage {
    #[serde(flatten)]
    pub event: EventInfo,
    #[serde(with = "rust_decimal::serde::float")]
    pub minimum_donation: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub maximum_donation: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub default_donation: Decimal,
    pub categories: Vec<String>,
    pub refresh_interval_secs: u64,
}

/// `men_count`, `women_count`, ... are flattened next to the totals
#[derive(Serialize)]
struct StatsResponse {
    #[serde(with = "rust_decimal::serde::float")]
    total_amount: Decimal,
    participant_count: usize,
    #[serde(flatten)]
    category_counts: BTreeMap<String, usize>,
    last_updated: DateTime<Utc>,
    stale: bool,
}

impl From<StatsSnapshot> for StatsResponse {
    fn from(snapshot: StatsSnapshot) -> Self {
        // Configured names never collide (checked at startup), hand-typed ones in the sheet can
        let mut category_counts = BTreeMap::new();
        for (category, count) in snapshot.summary.category_counts {
            let key = category_count_key(&category);
            if RESERVED_COUNT_KEYS.contains(&key.as_str()) {
                warn!(category = %category, key = %key, "Category shadows a stats field, left out of stats");
                continue;
            }
            *category_counts.entry(key).or_insert(0) += count;
        }

        Self {
            total_amount: snapshot.summary.total_amount,
            participant_count: snapshot.summary.participant_count,
            category_counts,
            last_updated: snapshot.last_updated,
            stale: snapshot.stale,
        }
    }
}

/// The confirmation never echoes the email back
#[derive(Serialize)]
struct RegistrationResponse {
    timestamp: String,
    name: String,
    category: String,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
}

impl From<Registration> for RegistrationResponse {
    fn from(reg: Registration) -> Self {
        Self {
            timestamp: reg.timestamp,
            name: reg.name,
            category: reg.category,
            amount: reg.amount,
        }
    }
}

// ============================================================================
// REQUEST TYPES
// ============================================================================

/// Amount arrives as a JSON number from the form, or as text
#[derive(Deserialize)]
#[serde(untagged)]
enum AmountInput {
    Number(serde_json::Number),
    Text(String),
}

impl Default for AmountInput {
    fn default() -> Self {
        AmountInput::Text(String::new())
    }
}

#[derive(Deserialize)]
struct RegistrationRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    amount: AmountInput,
}

impl From<RegistrationRequest> for RegistrationForm {
    fn from(req: RegistrationRequest) -> Self {
        let amount = match req.amount {
            AmountInput::Number(n) => n.to_string(),
            AmountInput::Text(s) => s,
        };
        RegistrationForm::new(req.name, req.email, req.category, amount)
    }
}

#[derive(Deserialize)]
struct RecentQuery {
    limit: Option<usize>,
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid registration")]
    Validation(Vec<ValidationError>),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<RegisterError> for ApiError {
    fn from(err: RegisterError) -> Self {
        match err {
            RegisterError::Validation(errors) => ApiError::Validation(errors),
            RegisterError::Store(e) => ApiError::Store(e),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    error: &'a str,
    #[serde(skip_serializing_if = "no_fields")]
    fields: &'a [ValidationError],
}

fn no_fields(fields: &&[ValidationError]) -> bool {
    fields.is_empty()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorBody {
                    success: false,
                    error: "Please fix the highlighted fields",
                    fields: errors,
                }),
            )
                .into_response(),
            ApiError::Store(e) => {
                error!(error = %e, "Row store request failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ErrorBody {
                        success: false,
                        error: e.user_message(),
                        fields: &[],
                    }),
                )
                    .into_response()
            }
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/health
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/event - event details and form limits
async fn get_event(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::ok(state.event.as_ref().clone()))
}

/// GET /api/stats
async fn get_stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.registry.stats().await?;
    Ok(Json(ApiResponse::ok(StatsResponse::from(snapshot))))
}

/// GET /api/recent?limit=n
async fn get_recent(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let recent: Vec<RecentEntry> = state.registry.recent(query.limit).await?;
    Ok(Json(ApiResponse::ok(recent)))
}

/// POST /api/registrations
async fn post_registration(
    State(state): State<AppState>,
    Json(request): Json<RegistrationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let form = RegistrationForm::from(request);
    let record = state.registry.register(&form).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(RegistrationResponse::from(record))),
    ))
}

/// POST /api/refresh - drop the memo so the next stats call re-reads
async fn post_refresh(State(state): State<AppState>) -> impl IntoResponse {
    state.registry.refresh().await;
    Json(ApiResponse::ok("refreshed"))
}

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/event", get(get_event))
        .route("/stats", get(get_stats))
        .route("/recent", get(get_recent))
        .route("/registrations", post(post_registration))
        .route("/refresh", post(post_refresh))
        .with_state(state);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    )
}
