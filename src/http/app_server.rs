use crate::http::handlers::{
    current_version_handler, execute_handler, not_found_handler, parameter_requirements_handler,
    rollback_handler, status_handler, validate_handler, AppState,
};
use crate::migration::MigrationEngine;
use axum::routing::{get, post};
use axum::Router;

pub struct AppServer {
    pub engine: MigrationEngine,
    pub router: Router,
}

pub const PATH_STATUS: &str = "/api/migration/status";
pub const PATH_CURRENT_VERSION: &str = "/api/migration/current-version";
pub const PATH_PARAMETER_REQUIREMENTS: &str = "/api/migration/parameter-requirements";
pub const PATH_EXECUTE: &str = "/api/migration/execute";
pub const PATH_ROLLBACK: &str = "/api/migration/rollback";
pub const PATH_VALIDATE: &str = "/api/migration/validate";

impl AppServer {
    pub fn new(engine: MigrationEngine) -> Self {
        let state = AppState::new(engine.clone());
        AppServer {
            engine,
            router: Router::new()
                .route(PATH_STATUS, get(status_handler))
                .route(PATH_CURRENT_VERSION, get(current_version_handler))
                .route(
                    PATH_PARAMETER_REQUIREMENTS,
                    get(parameter_requirements_handler),
                )
                .route(PATH_EXECUTE, post(execute_handler))
                .route(PATH_ROLLBACK, post(rollback_handler))
                .route(PATH_VALIDATE, post(validate_handler))
                .fallback(not_found_handler)
                .with_state(state),
        }
    }
}
