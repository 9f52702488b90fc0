use crate::http::error::ApiError;
use crate::migration::{
    ExecuteOptions, MigrationEngine, MigrationSystemStatus, RawParameters, SystemState,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub engine: MigrationEngine,
    /// Held for the duration of any operation that may run migrations.
    pub operation_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(engine: MigrationEngine) -> Self {
        Self {
            engine,
            operation_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// Response envelope shared by all migration endpoints.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn respond<T: Serialize>(success: bool, data: T, message: Option<String>) -> Response {
    let status = if success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (
        status,
        Json(Envelope {
            success,
            data,
            message,
        }),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
pub struct CurrentVersionResponse {
    pub version: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementsQuery {
    pub target_version: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RollbackRequest {
    pub target_version: Option<i64>,
    pub dry_run: bool,
    pub force: bool,
    pub batch_size: Option<usize>,
    pub parameters: BTreeMap<i64, RawParameters>,
}

impl RollbackRequest {
    fn options(self) -> ExecuteOptions {
        ExecuteOptions {
            target_version: self.target_version,
            dry_run: self.dry_run,
            force: self.force,
            batch_size: self.batch_size,
            parameters: self.parameters,
        }
    }
}

fn try_lock(state: &AppState) -> Result<tokio::sync::MutexGuard<'_, ()>, ApiError> {
    state
        .operation_lock
        .try_lock()
        .map_err(|_| ApiError::conflict("Another migration operation is in progress"))
}

/// Handler for GET /api/migration/status
pub async fn status_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let status: MigrationSystemStatus = state.engine.check_pending_migrations().await?;
    let ok = status.status != SystemState::Error;
    let message = status.error.clone();
    Ok(respond(ok, status, message))
}

/// Handler for GET /api/migration/current-version
pub async fn current_version_handler(
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let version = state.engine.current_version().await?;
    Ok(respond(true, CurrentVersionResponse { version }, None))
}

/// Handler for GET /api/migration/parameter-requirements
pub async fn parameter_requirements_handler(
    State(state): State<AppState>,
    Query(query): Query<RequirementsQuery>,
) -> Result<Response, ApiError> {
    let requirements = state
        .engine
        .get_parameter_requirements(query.target_version)
        .await?;
    Ok(respond(true, requirements, None))
}

/// Handler for POST /api/migration/execute
pub async fn execute_handler(
    State(state): State<AppState>,
    Json(options): Json<ExecuteOptions>,
) -> Result<Response, ApiError> {
    let _guard = try_lock(&state)?;

    info!(
        "Execute requested: target={:?} dry_run={} force={}",
        options.target_version, options.dry_run, options.force
    );
    let result = state.engine.execute_migrations(&options).await;
    if !result.success {
        warn!("Migration batch failed: {:?}", result.error);
    }

    let message = result.error.clone();
    Ok(respond(result.success, result, message))
}

/// Handler for POST /api/migration/rollback
pub async fn rollback_handler(
    State(state): State<AppState>,
    Json(request): Json<RollbackRequest>,
) -> Result<Response, ApiError> {
    let target = request
        .target_version
        .ok_or_else(|| ApiError::bad_request("targetVersion is required"))?;

    let _guard = try_lock(&state)?;

    info!("Rollback requested: target={}", target);
    let options = request.options();
    let result = state.engine.rollback_to_version(target, &options).await?;

    let message = result.error.clone();
    Ok(respond(result.success, result, message))
}

/// Handler for POST /api/migration/validate
pub async fn validate_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let _guard = try_lock(&state)?;

    let report = state.engine.validate_migration_system().await;
    let message = (!report.is_valid).then(|| report.errors.join("; "));
    Ok(respond(report.is_valid, report, message))
}

pub async fn not_found_handler() -> ApiError {
    ApiError::not_found("Migration endpoint not found")
}
