use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Json, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::{CapabilitiesConfig, Config, ExecutorConfigPatch, ProviderKeys};
use crate::domains::execution::ExecuteRequest;
use crate::error::{IfritError, Result};
use crate::handlers::registry::HandlerRegistry;
use crate::providers::build_key_handlers;
use crate::scheduler::Scheduler;
use crate::services::executor::CapabilityExecutor;
use crate::services::health::HandlerHealthJob;

#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<CapabilityExecutor>,
    pub capabilities: Arc<RwLock<CapabilitiesConfig>>,
    pub token: String,
}

impl AppState {
    pub fn new(executor: Arc<CapabilityExecutor>, capabilities: CapabilitiesConfig, token: impl Into<String>) -> Self {
        Self {
            executor,
            capabilities: Arc::new(RwLock::new(capabilities)),
            token: token.into(),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct StatusResponse {
    status: String,
}

#[derive(Deserialize)]
struct AvailabilityRequest {
    available: bool,
}

#[derive(Deserialize)]
struct ExecuteWithKeysRequest {
    request: ExecuteRequest,
    #[serde(default)]
    keys: ProviderKeys,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/handlers", get(list_handlers))
        .route("/handlers/{id}/availability", post(set_availability))
        .route("/capabilities", get(get_capabilities).post(set_capabilities))
        .route("/execute", post(execute))
        .route("/execute_with_keys", post(execute_with_keys))
        .route("/diagnostics", get(diagnostics).delete(clear_diagnostics))
        .route("/stats", get(stats))
        .route("/config", get(get_config).post(update_config))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::GIT_SHA.to_string(),
    })
}

async fn list_handlers(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let handlers: Vec<_> = state
        .executor
        .registry()
        .list()
        .await
        .iter()
        .map(|handler| handler.summary())
        .collect();
    (StatusCode::OK, Json(handlers)).into_response()
}

async fn set_availability(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<AvailabilityRequest>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let registry = state.executor.registry();
    if !registry.set_available(&id, payload.available).await {
        return error_response(StatusCode::NOT_FOUND, format!("Unknown handler '{id}'"));
    }
    match registry.get(&id).await {
        Some(handler) => (StatusCode::OK, Json(handler.summary())).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("Unknown handler '{id}'")),
    }
}

async fn get_capabilities(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let capabilities = state.capabilities.read().await.clone();
    (StatusCode::OK, Json(capabilities)).into_response()
}

async fn set_capabilities(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CapabilitiesConfig>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    if let Err(err) = payload.validate() {
        return error_response(StatusCode::BAD_REQUEST, err.to_string());
    }
    *state.capabilities.write().await = payload.clone();
    tracing::info!(
        settings = payload.capability_settings.len(),
        "capabilities config replaced"
    );
    (StatusCode::OK, Json(payload)).into_response()
}

async fn execute(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ExecuteRequest>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let capabilities = state.capabilities.read().await.clone();
    execution_response(
        state
            .executor
            .execute_registered(&request, &capabilities)
            .await,
    )
}

async fn execute_with_keys(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ExecuteWithKeysRequest>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let capabilities = state.capabilities.read().await.clone();
    execution_response(
        state
            .executor
            .execute_with_keys(&payload.request, &payload.keys, &capabilities)
            .await,
    )
}

async fn diagnostics(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    (StatusCode::OK, Json(state.executor.diagnostics_log())).into_response()
}

async fn clear_diagnostics(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    state.executor.clear_diagnostics_log();
    (
        StatusCode::OK,
        Json(StatusResponse {
            status: "cleared".to_string(),
        }),
    )
        .into_response()
}

async fn stats(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    (StatusCode::OK, Json(state.executor.provider_stats())).into_response()
}

async fn get_config(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    (StatusCode::OK, Json(state.executor.config())).into_response()
}

async fn update_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(patch): Json<ExecutorConfigPatch>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    (StatusCode::OK, Json(state.executor.update_config(patch))).into_response()
}

/// Expected execution failures still answer 200 with `success: false`.
fn execution_response(result: Result<crate::domains::execution::ExecuteResult>) -> Response {
    match result {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err @ (IfritError::Config(_) | IfritError::InvalidHandler(_))) => {
            error_response(StatusCode::BAD_REQUEST, err.to_string())
        }
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

fn authorize(
    headers: &HeaderMap,
    token: &str,
) -> std::result::Result<(), (StatusCode, Json<ErrorResponse>)> {
    let expected_token = token.trim();
    if expected_token.is_empty() {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Unauthorized".to_string(),
            }),
        ));
    }

    let header = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let api_key = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let bearer = header.strip_prefix("Bearer ").unwrap_or("").trim();
    let api_key = api_key.trim();

    if bearer == expected_token || api_key == expected_token {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Unauthorized".to_string(),
            }),
        ))
    }
}

/// Registers one handler per configured provider key and wraps the executor.
pub async fn build_state(config: &Config) -> Result<AppState> {
    let registry = Arc::new(HandlerRegistry::new());
    let executor_config = config.executor.clone();
    let handlers = build_key_handlers(&config.providers, |kind| executor_config.endpoint(kind))?;
    registry.register_all(handlers).await;
    let executor = Arc::new(CapabilityExecutor::with_registry(
        registry,
        config.executor.clone(),
    ));
    Ok(AppState::new(
        executor,
        config.capabilities.clone(),
        config.daemon.token.clone().unwrap_or_default(),
    ))
}

pub async fn run(host: &str, port: u16, config: Config) -> Result<()> {
    run_with_shutdown(host, port, config, futures::future::pending::<()>()).await
}

pub async fn run_with_shutdown<F>(host: &str, port: u16, config: Config, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let state = build_state(&config).await?;
    if state.token.trim().is_empty() {
        tracing::warn!("No daemon token configured; every protected route will answer 401");
    }
    let registered = state.executor.registry().len().await;
    tracing::info!(handlers = registered, "Registered provider handlers");

    let mut scheduler = Scheduler::new();
    if config.daemon.health_interval_secs > 0 {
        scheduler.register_job(Arc::new(HandlerHealthJob::new(
            state.executor.registry().clone(),
            Duration::from_secs(config.daemon.health_interval_secs),
        )));
    }

    let app = build_router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| IfritError::Runtime(e.to_string()))?;
    tracing::info!(%addr, "ifritd listening");
    scheduler.start();
    let shutdown = async move {
        shutdown.await;
        scheduler.stop().await;
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| IfritError::Runtime(e.to_string()))?;

    Ok(())
}
