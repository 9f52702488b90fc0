//! Migration execution engine.
//!
//! Decisions about what to run are made by the pure functions at the bottom of
//! this module, which take the current version explicitly. The engine itself
//! only reads and writes the version store and invokes migration bodies, one
//! at a time.

use super::catalog::{validate_sequence, CatalogError, MigrationRegistry};
use super::definition::{Migration, MigrationContext, MigrationParameters, RawParameters};
use super::params::validate_parameters;
use super::types::{
    BatchParameterRequirements, ExecuteOptions, MigrationBatchResult, MigrationInfo,
    MigrationResult, MigrationStatus, MigrationSystemStatus, MigrationValidationReport,
    ParameterRequirement, SystemState,
};
use super::version;
use crate::db::SqliteDatabase;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MigrationError {
    #[error("Target version {target} must be less than current version {current}")]
    InvalidTarget { target: i64, current: i64 },

    #[error("Target version must not be negative, got {0}")]
    NegativeTarget(i64),

    #[error("Missing parameters for migration(s): {}", join_versions(.versions))]
    MissingParameters { versions: Vec<i64> },

    #[error("Migration sequence is invalid: {0}")]
    BrokenSequence(String),

    #[error("Migration {version} cannot be executed: {reason}")]
    CannotExecute { version: i64, reason: String },

    #[error("Failed to load migration: {0}")]
    Load(#[from] CatalogError),

    #[error("Migration {version} is already applied (current version {current})")]
    AlreadyApplied { version: i64, current: i64 },

    #[error("Migration {version} is not applied (current version {current})")]
    NotApplied { version: i64, current: i64 },

    #[error("Parameter validation failed for migration {version}: {errors}")]
    InvalidParameters { version: i64, errors: String },

    #[error("Migration up function failed: {message}")]
    UpFailed { version: i64, message: String },

    #[error("Migration down function failed: {message}")]
    DownFailed { version: i64, message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Failed to update schema version to {version}: {message}")]
    VersionUpdate { version: i64, message: String },
}

impl MigrationError {
    fn database(err: anyhow::Error) -> Self {
        MigrationError::Database(format!("{:#}", err))
    }
}

fn join_versions(versions: &[i64]) -> String {
    versions
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

#[derive(Clone)]
pub struct MigrationEngine {
    db: SqliteDatabase,
    registry: Arc<MigrationRegistry>,
}

impl MigrationEngine {
    pub fn new(db: SqliteDatabase, registry: Arc<MigrationRegistry>) -> Self {
        Self { db, registry }
    }

    pub fn db(&self) -> &SqliteDatabase {
        &self.db
    }

    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    pub async fn current_version(&self) -> anyhow::Result<i64> {
        version::get_current_version(&self.db).await
    }

    pub async fn scan(&self) -> anyhow::Result<Vec<MigrationInfo>> {
        self.registry.scan_database(&self.db).await
    }

    pub async fn check_pending_migrations(&self) -> anyhow::Result<MigrationSystemStatus> {
        let current = self.current_version().await?;
        let infos = self.registry.scan(current);
        Ok(system_status(current, infos))
    }

    /// Runs one migration forward. Failures are returned as data.
    pub async fn execute_migration(
        &self,
        info: &MigrationInfo,
        options: &ExecuteOptions,
    ) -> MigrationResult {
        self.run_step(info, options, Direction::Up).await
    }

    /// Runs one migration backward. Failures are returned as data.
    pub async fn rollback_migration(
        &self,
        info: &MigrationInfo,
        options: &ExecuteOptions,
    ) -> MigrationResult {
        self.run_step(info, options, Direction::Down).await
    }

    /// Applies pending migrations in ascending order.
    pub async fn execute_migrations(&self, options: &ExecuteOptions) -> MigrationBatchResult {
        let started = Instant::now();

        let current = match self.current_version().await {
            Ok(v) => v,
            Err(e) => {
                error!("Failed to read current version: {:#}", e);
                return MigrationBatchResult::aborted(
                    0,
                    0,
                    elapsed_ms(started),
                    MigrationError::database(e).to_string(),
                );
            }
        };

        let infos = self.registry.scan(current);
        let mut pending = compute_pending(&infos, current, options.target_version);
        if pending.is_empty() {
            info!("No pending migrations at version {}", current);
            return MigrationBatchResult::unchanged(current);
        }

        let sequence = validate_sequence(&infos);
        if !sequence.is_valid {
            let err = MigrationError::BrokenSequence(sequence.errors.join("; "));
            warn!("Refusing to migrate: {}", err);
            return MigrationBatchResult::aborted(
                current,
                current,
                elapsed_ms(started),
                err.to_string(),
            );
        }

        apply_batch_size(&mut pending, options.batch_size);

        let missing = missing_parameter_requirements(&pending, &options.parameters);
        if !missing.is_empty() {
            let err = MigrationError::MissingParameters { versions: missing };
            warn!("Refusing to migrate: {}", err);
            return MigrationBatchResult::aborted(
                current,
                current,
                elapsed_ms(started),
                err.to_string(),
            );
        }

        info!(
            "Executing {} migration(s) from version {}{}",
            pending.len(),
            current,
            if options.dry_run { " (dry run)" } else { "" }
        );

        self.run_batch(&pending, options, Direction::Up, current, started)
            .await
    }

    /// Rolls back every applied migration above `target_version`, newest first.
    ///
    /// Invalid targets are rejected before anything is read or written.
    pub async fn rollback_to_version(
        &self,
        target_version: i64,
        options: &ExecuteOptions,
    ) -> Result<MigrationBatchResult, MigrationError> {
        let started = Instant::now();

        if target_version < 0 {
            return Err(MigrationError::NegativeTarget(target_version));
        }

        let current = match self.current_version().await {
            Ok(v) => v,
            Err(e) => {
                error!("Failed to read current version: {:#}", e);
                return Ok(MigrationBatchResult::aborted(
                    0,
                    0,
                    elapsed_ms(started),
                    MigrationError::database(e).to_string(),
                ));
            }
        };

        if target_version >= current {
            return Err(MigrationError::InvalidTarget {
                target: target_version,
                current,
            });
        }

        let infos = self.registry.scan(current);
        let mut rollback = compute_rollback_set(&infos, current, target_version);
        apply_batch_size(&mut rollback, options.batch_size);

        let missing = missing_parameter_requirements(&rollback, &options.parameters);
        if !missing.is_empty() {
            let err = MigrationError::MissingParameters { versions: missing };
            warn!("Refusing to roll back: {}", err);
            return Ok(MigrationBatchResult::aborted(
                current,
                current,
                elapsed_ms(started),
                err.to_string(),
            ));
        }

        info!(
            "Rolling back {} migration(s) from version {} to {}{}",
            rollback.len(),
            current,
            target_version,
            if options.dry_run { " (dry run)" } else { "" }
        );

        Ok(self
            .run_batch(&rollback, options, Direction::Down, current, started)
            .await)
    }

    pub async fn get_parameter_requirements(
        &self,
        target_version: Option<i64>,
    ) -> anyhow::Result<BatchParameterRequirements> {
        let current = self.current_version().await?;
        let infos = self.registry.scan(current);
        let pending = compute_pending(&infos, current, target_version);
        Ok(parameter_requirements(&pending, &BTreeMap::new()))
    }

    pub async fn validate_migration_system(&self) -> MigrationValidationReport {
        let current = match self.current_version().await {
            Ok(v) => v,
            Err(e) => {
                let message = format!("Validation failed: {:#}", e);
                return MigrationValidationReport {
                    is_valid: false,
                    errors: vec![message.clone()],
                    warnings: Vec::new(),
                    status: MigrationSystemStatus {
                        current_version: 0,
                        latest_version: 0,
                        pending_count: 0,
                        needs_migration: false,
                        migrations: Vec::new(),
                        status: SystemState::Error,
                        error: Some(message),
                    },
                };
            }
        };

        let infos = self.registry.scan(current);
        let sequence = validate_sequence(&infos);

        let mut errors = sequence.errors;
        errors.extend(version_consistency_errors(&infos, current));

        let warnings = infos
            .iter()
            .filter(|info| !info.can_execute)
            .map(|info| {
                format!(
                    "Migration {} cannot be executed: {}",
                    info.name,
                    info.error.as_deref().unwrap_or("unknown error")
                )
            })
            .collect();

        MigrationValidationReport {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            status: system_status(current, infos),
        }
    }

    async fn run_batch(
        &self,
        migrations: &[MigrationInfo],
        options: &ExecuteOptions,
        direction: Direction,
        from_version: i64,
        started: Instant,
    ) -> MigrationBatchResult {
        let mut results = Vec::with_capacity(migrations.len());
        let mut first_error = None;

        for info in migrations {
            let result = self.run_step(info, options, direction).await;
            let failed = !result.success;
            if failed && first_error.is_none() {
                first_error = Some(format!(
                    "Migration {} failed: {}",
                    info.version,
                    result.error.as_deref().unwrap_or("unknown error")
                ));
            }
            results.push(result);

            if failed && !options.force {
                warn!("Stopping batch after migration {} failed", info.version);
                break;
            }
        }

        let to_version = match self.current_version().await {
            Ok(v) => v,
            Err(e) => {
                error!("Failed to re-read current version: {:#}", e);
                return MigrationBatchResult {
                    success: false,
                    from_version,
                    to_version: from_version,
                    results,
                    total_duration: elapsed_ms(started),
                    error: Some(MigrationError::database(e).to_string()),
                };
            }
        };

        let success = results.iter().all(|r| r.success);
        info!(
            "Batch finished: version {} -> {}, {} of {} succeeded",
            from_version,
            to_version,
            results.iter().filter(|r| r.success).count(),
            results.len()
        );

        MigrationBatchResult {
            success,
            from_version,
            to_version,
            results,
            total_duration: elapsed_ms(started),
            error: first_error,
        }
    }

    async fn run_step(
        &self,
        info: &MigrationInfo,
        options: &ExecuteOptions,
        direction: Direction,
    ) -> MigrationResult {
        let started = Instant::now();
        match self.try_step(info, options, direction).await {
            Ok(details) => MigrationResult::ok(info.version, elapsed_ms(started), details),
            Err(e) => {
                error!("Migration {} ({:?}) failed: {}", info.name, direction, e);
                MigrationResult::failed(info.version, elapsed_ms(started), e.to_string())
            }
        }
    }

    async fn try_step(
        &self,
        info: &MigrationInfo,
        options: &ExecuteOptions,
        direction: Direction,
    ) -> Result<String, MigrationError> {
        if !info.can_execute {
            return Err(MigrationError::CannotExecute {
                version: info.version,
                reason: info
                    .error
                    .clone()
                    .unwrap_or_else(|| "migration failed to load".to_string()),
            });
        }

        let migration = self.registry.load_definition(&info.name)?;
        let target = migration.version();
        let current = self
            .current_version()
            .await
            .map_err(MigrationError::database)?;

        match direction {
            Direction::Up if target <= current => {
                return Err(MigrationError::AlreadyApplied {
                    version: target,
                    current,
                })
            }
            Direction::Down if target > current => {
                return Err(MigrationError::NotApplied {
                    version: target,
                    current,
                })
            }
            _ => {}
        }

        if options.dry_run {
            let verb = match direction {
                Direction::Up => "applied",
                Direction::Down => "rolled back",
            };
            return Ok(format!(
                "Dry run: migration {} ({}) would be {}",
                target,
                migration.description(),
                verb
            ));
        }

        let params = resolve_parameters(migration.as_ref(), options)?;
        let ctx = MigrationContext::new(&self.db, &params);

        match direction {
            Direction::Up => {
                info!("Applying migration {}: {}", info.name, migration.description());
                migration
                    .up(&ctx)
                    .await
                    .map_err(|e| MigrationError::UpFailed {
                        version: target,
                        message: format!("{:#}", e),
                    })?;
                self.record_version(target).await?;
                info!("Migration {} applied", info.name);
                Ok(format!(
                    "Applied migration {}: {}",
                    target,
                    migration.description()
                ))
            }
            Direction::Down => {
                info!("Rolling back migration {}: {}", info.name, migration.description());
                migration
                    .down(&ctx)
                    .await
                    .map_err(|e| MigrationError::DownFailed {
                        version: target,
                        message: format!("{:#}", e),
                    })?;
                self.record_version(target - 1).await?;
                info!("Migration {} rolled back", info.name);
                Ok(format!(
                    "Rolled back migration {}: {}",
                    target,
                    migration.description()
                ))
            }
        }
    }

    async fn record_version(&self, version: i64) -> Result<(), MigrationError> {
        version::set_version(&self.db, version)
            .await
            .map_err(|e| MigrationError::VersionUpdate {
                version,
                message: format!("{:#}", e),
            })
    }
}

fn resolve_parameters(
    migration: &dyn Migration,
    options: &ExecuteOptions,
) -> Result<MigrationParameters, MigrationError> {
    let definitions = migration.parameters();
    if definitions.is_empty() {
        return Ok(MigrationParameters::new());
    }

    let version = migration.version();
    let supplied = options
        .parameters
        .get(&version)
        .ok_or_else(|| MigrationError::MissingParameters {
            versions: vec![version],
        })?;

    let validation = validate_parameters(&definitions, supplied);
    if !validation.valid {
        return Err(MigrationError::InvalidParameters {
            version,
            errors: validation.errors.join("; "),
        });
    }
    Ok(validation.processed_values.unwrap_or_default())
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn apply_batch_size(migrations: &mut Vec<MigrationInfo>, batch_size: Option<usize>) {
    if let Some(limit) = batch_size.filter(|n| *n > 0) {
        migrations.truncate(limit);
    }
}

/// Executable migrations above `current`, up to `target` if given, ascending.
pub fn compute_pending(
    infos: &[MigrationInfo],
    current: i64,
    target: Option<i64>,
) -> Vec<MigrationInfo> {
    let mut pending: Vec<MigrationInfo> = infos
        .iter()
        .filter(|info| info.can_execute && info.version > current)
        .filter(|info| target.map_or(true, |t| info.version <= t))
        .cloned()
        .collect();
    pending.sort_by_key(|info| info.version);
    pending
}

/// Executable migrations with `target < version <= current`, descending.
pub fn compute_rollback_set(
    infos: &[MigrationInfo],
    current: i64,
    target: i64,
) -> Vec<MigrationInfo> {
    let mut set: Vec<MigrationInfo> = infos
        .iter()
        .filter(|info| info.can_execute && info.version > target && info.version <= current)
        .cloned()
        .collect();
    set.sort_by_key(|info| std::cmp::Reverse(info.version));
    set
}

/// Versions of migrations that declare parameters but have none supplied.
pub fn missing_parameter_requirements(
    migrations: &[MigrationInfo],
    supplied: &BTreeMap<i64, RawParameters>,
) -> Vec<i64> {
    migrations
        .iter()
        .filter(|info| info.has_parameters() && !supplied.contains_key(&info.version))
        .map(|info| info.version)
        .collect()
}

pub fn parameter_requirements(
    migrations: &[MigrationInfo],
    supplied: &BTreeMap<i64, RawParameters>,
) -> BatchParameterRequirements {
    let requirements: Vec<ParameterRequirement> = migrations
        .iter()
        .filter(|info| info.has_parameters())
        .map(|info| ParameterRequirement {
            version: info.version,
            name: info.name.clone(),
            description: info.description.clone(),
            parameters: info.parameters.clone(),
        })
        .collect();

    let missing = missing_parameter_requirements(migrations, supplied);

    BatchParameterRequirements {
        has_unmet_requirements: !missing.is_empty(),
        requirements_with_parameters: requirements,
        missing_parameters: (!missing.is_empty()).then_some(missing),
    }
}

pub fn system_status(current: i64, infos: Vec<MigrationInfo>) -> MigrationSystemStatus {
    let sequence = validate_sequence(&infos);
    if !sequence.is_valid {
        return MigrationSystemStatus {
            current_version: current,
            latest_version: current,
            pending_count: 0,
            needs_migration: false,
            migrations: infos,
            status: SystemState::Error,
            error: Some(sequence.errors.join("; ")),
        };
    }

    let latest = infos
        .iter()
        .filter(|info| info.can_execute)
        .map(|info| info.version)
        .max()
        .unwrap_or(current);
    let pending_count = infos
        .iter()
        .filter(|info| info.can_execute && info.status == MigrationStatus::Pending)
        .count();

    MigrationSystemStatus {
        current_version: current,
        latest_version: latest,
        pending_count,
        needs_migration: pending_count > 0,
        migrations: infos,
        status: if pending_count > 0 {
            SystemState::PendingMigrations
        } else {
            SystemState::UpToDate
        },
        error: None,
    }
}

/// The stored version must name an executable migration, unless it is 0.
pub fn version_consistency_errors(infos: &[MigrationInfo], current: i64) -> Vec<String> {
    if current == 0 {
        return Vec::new();
    }

    let highest = infos
        .iter()
        .filter(|info| info.can_execute && info.version <= current)
        .map(|info| info.version)
        .max();

    match highest {
        Some(v) if v == current => Vec::new(),
        Some(v) => vec![format!(
            "Version inconsistency: current version is {}, but the highest known migration at or below it is {}",
            current, v
        )],
        None => vec![format!(
            "Version inconsistency: current version is {}, but no migration at or below it is known",
            current
        )],
    }
}
