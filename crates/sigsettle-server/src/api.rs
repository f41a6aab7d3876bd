//! HTTP surface using axum.
//!
//! Authentication and rate limiting happen in front of this service; requests
//! arriving here are already attributed to a provider.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::error;

use sigsettle_core::{CloseSignalInput, CreateSignalInput, SignalId};
use sigsettle_engine::{EngineError, EvaluationSummary, SettlementEngine};
use sigsettle_notify::SignalProjection;
use sigsettle_store::SignalQuery;
use sigsettle_telemetry::Metrics;

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<SettlementEngine>,
}

impl AppState {
    pub fn new(engine: Arc<SettlementEngine>) -> Self {
        Self { engine }
    }
}

/// Create the axum router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/signals", post(create_signal).get(list_signals))
        .route("/signals/evaluate", post(evaluate_open))
        .route("/signals/{id}", get(get_signal))
        .route("/signals/{id}/close", post(close_signal))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Errors
// =============================================================================

/// Engine error rendered as `{"error": {"code", "message", "field"?}}`.
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::StateConflict { .. } => StatusCode::CONFLICT,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        let field = match &self.0 {
            EngineError::Validation(v) => Some(v.field.clone()),
            _ => None,
        };
        let body = json!({
            "error": {
                "code": self.0.code(),
                "message": self.0.to_string(),
                "field": field,
            }
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Handlers
// =============================================================================

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn metrics() -> Response {
    match Metrics::encode_text() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    signal: SignalProjection,
    auto_closed: Option<SignalProjection>,
}

async fn create_signal(
    State(state): State<AppState>,
    Json(input): Json<CreateSignalInput>,
) -> ApiResult<(StatusCode, Json<CreateResponse>)> {
    let outcome = state.engine.create(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateResponse {
            signal: SignalProjection::from(&outcome.signal),
            auto_closed: outcome.auto_closed.as_ref().map(SignalProjection::from),
        }),
    ))
}

/// Close body; the signal id comes from the path.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloseRequest {
    exit_price: Decimal,
    #[serde(default)]
    exit_tx_id: Option<String>,
    #[serde(default)]
    pnl_override: Option<Decimal>,
    #[serde(default)]
    attested_price: Option<Decimal>,
}

async fn close_signal(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CloseRequest>,
) -> ApiResult<Json<SignalProjection>> {
    let closed = state
        .engine
        .close(CloseSignalInput {
            signal_id: id,
            exit_price: req.exit_price,
            exit_tx_id: req.exit_tx_id,
            pnl_override: req.pnl_override,
            attested_price: req.attested_price,
        })
        .await?;
    Ok(Json(SignalProjection::from(&closed)))
}

async fn get_signal(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SignalProjection>> {
    let signal = state.engine.get(&SignalId::from_string(id)).await?;
    Ok(Json(SignalProjection::from(&signal)))
}

async fn list_signals(
    State(state): State<AppState>,
    Query(query): Query<SignalQuery>,
) -> ApiResult<Json<Vec<SignalProjection>>> {
    let signals = state.engine.query(&query).await?;
    Ok(Json(signals.iter().map(SignalProjection::from).collect()))
}

async fn evaluate_open(State(state): State<AppState>) -> ApiResult<Json<EvaluationSummary>> {
    let concurrency = state.engine.config().batch_concurrency;
    Ok(Json(state.engine.evaluate_open(concurrency).await?))
}
