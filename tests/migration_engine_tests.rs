use anyhow::{bail, Result};
use archivedb::db::SqliteDatabase;
use archivedb::migration::version::{get_current_version, set_version};
use archivedb::migration::{
    ExecuteOptions, Migration, MigrationContext, MigrationEngine, MigrationError,
    MigrationRegistry, ParameterDefinition, ParameterType, RawParameters, SystemState,
};
use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

type Log = Arc<Mutex<Vec<String>>>;

/// Creates table `step_<version>` on up and drops it on down, logging each call
/// together with the stored version at that moment.
struct Step {
    version: i64,
    log: Log,
    fail_up: bool,
    fail_down: bool,
    parameters: Vec<ParameterDefinition>,
}

impl Step {
    fn new(version: i64, log: &Log) -> Self {
        Self {
            version,
            log: Arc::clone(log),
            fail_up: false,
            fail_down: false,
            parameters: Vec::new(),
        }
    }

    fn failing(mut self) -> Self {
        self.fail_up = true;
        self
    }

    fn failing_down(mut self) -> Self {
        self.fail_down = true;
        self
    }

    fn with_parameters(mut self, parameters: Vec<ParameterDefinition>) -> Self {
        self.parameters = parameters;
        self
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl Migration for Step {
    fn version(&self) -> i64 {
        self.version
    }

    fn description(&self) -> &str {
        "test step"
    }

    fn parameters(&self) -> Vec<ParameterDefinition> {
        self.parameters.clone()
    }

    async fn up(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        let at = get_current_version(ctx.db).await?;
        self.record(format!("up:{}@{}", self.version, at));
        if self.fail_up {
            bail!("step {} exploded", self.version);
        }
        ctx.db
            .execute(&format!("CREATE TABLE step_{} (id INTEGER)", self.version))
            .await?;
        if let Some(url) = ctx.param("asset_url") {
            self.record(format!("asset_url={}", url.to_text()));
        }
        Ok(())
    }

    async fn down(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        let at = get_current_version(ctx.db).await?;
        self.record(format!("down:{}@{}", self.version, at));
        if self.fail_down {
            bail!("step {} refused to roll back", self.version);
        }
        ctx.db
            .execute(&format!("DROP TABLE step_{}", self.version))
            .await?;
        Ok(())
    }
}

fn name(version: i64) -> String {
    format!("{:03}_step_{}", version, version)
}

async fn setup(registry: MigrationRegistry) -> Result<(MigrationEngine, TempDir)> {
    let dir = TempDir::new()?;
    let db_path = dir.path().join("engine.sqlite");
    let db = SqliteDatabase::connect(db_path.to_str().unwrap()).await?;
    Ok((MigrationEngine::new(db, Arc::new(registry)), dir))
}

fn steps(versions: &[i64], log: &Log) -> MigrationRegistry {
    versions.iter().fold(MigrationRegistry::new(), |registry, v| {
        registry.register(&name(*v), Step::new(*v, log))
    })
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[tokio::test]
async fn test_status_is_idempotent() -> Result<()> {
    let log = Log::default();
    let (engine, _dir) = setup(steps(&[1, 2, 3], &log)).await?;

    let first = engine.check_pending_migrations().await?;
    let second = engine.check_pending_migrations().await?;

    assert_eq!(first.current_version, second.current_version);
    assert_eq!(first.pending_count, second.pending_count);
    assert_eq!(first.pending_count, 3);
    assert_eq!(first.latest_version, 3);
    assert_eq!(first.status, SystemState::PendingMigrations);
    assert!(entries(&log).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_batch_advances_version_by_count() -> Result<()> {
    let log = Log::default();
    let (engine, _dir) = setup(steps(&[1, 2, 3], &log)).await?;

    let result = engine.execute_migrations(&ExecuteOptions::default()).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.from_version, 0);
    assert_eq!(result.to_version, 3);
    assert_eq!(result.results.len(), 3);
    assert_eq!(entries(&log), vec!["up:1@0", "up:2@1", "up:3@2"]);
    assert_eq!(engine.current_version().await?, 3);

    let status = engine.check_pending_migrations().await?;
    assert_eq!(status.status, SystemState::UpToDate);
    assert!(!status.needs_migration);
    Ok(())
}

#[tokio::test]
async fn test_partial_failure_stops_without_force() -> Result<()> {
    let log = Log::default();
    let registry = MigrationRegistry::new()
        .register(&name(1), Step::new(1, &log))
        .register(&name(2), Step::new(2, &log).failing())
        .register(&name(3), Step::new(3, &log));
    let (engine, _dir) = setup(registry).await?;

    let result = engine.execute_migrations(&ExecuteOptions::default()).await;

    assert!(!result.success);
    assert_eq!(result.to_version, 1);
    assert_eq!(result.results.len(), 2);
    assert!(result.results[0].success);
    assert!(!result.results[1].success);
    let error = result.results[1].error.as_deref().unwrap();
    assert!(error.starts_with("Migration up function failed"), "{}", error);
    assert!(error.contains("step 2 exploded"));
    assert!(result.error.as_deref().unwrap().contains("Migration 2 failed"));
    assert!(!engine.db().table_exists("step_3").await?);

    // resuming picks up at the failed migration
    let again = engine.execute_migrations(&ExecuteOptions::default()).await;
    assert_eq!(again.from_version, 1);
    assert_eq!(again.results[0].version, 2);
    Ok(())
}

#[tokio::test]
async fn test_force_continues_past_failure() -> Result<()> {
    let log = Log::default();
    let registry = MigrationRegistry::new()
        .register(&name(1), Step::new(1, &log))
        .register(&name(2), Step::new(2, &log).failing())
        .register(&name(3), Step::new(3, &log));
    let (engine, _dir) = setup(registry).await?;

    let result = engine
        .execute_migrations(&ExecuteOptions::default().with_force())
        .await;

    assert!(!result.success);
    assert_eq!(result.results.len(), 3);
    assert!(result.results[2].success);
    assert_eq!(result.to_version, 3);
    assert_eq!(entries(&log), vec!["up:1@0", "up:2@1", "up:3@1"]);
    Ok(())
}

#[tokio::test]
async fn test_dry_run_changes_nothing() -> Result<()> {
    let log = Log::default();
    let (engine, _dir) = setup(steps(&[1, 2, 3], &log)).await?;
    engine.db().execute("CREATE TABLE keep (id INTEGER)").await?;
    let before = engine.db().schema_snapshot().await?;

    let result = engine.execute_migrations(&ExecuteOptions::dry_run()).await;

    assert!(result.success);
    assert_eq!(result.results.len(), 3);
    assert!(result.results.iter().all(|r| r.success));
    assert!(result.results[0]
        .details
        .as_deref()
        .unwrap()
        .starts_with("Dry run"));
    assert_eq!(result.to_version, 0);
    assert_eq!(engine.current_version().await?, 0);
    assert_eq!(engine.db().schema_snapshot().await?, before);
    assert!(entries(&log).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_target_at_current_executes_nothing() -> Result<()> {
    let log = Log::default();
    let (engine, _dir) = setup(steps(&[1, 2, 3, 4, 5], &log)).await?;
    set_version(engine.db(), 2).await?;

    let result = engine
        .execute_migrations(&ExecuteOptions::default().with_target(2))
        .await;

    assert!(result.success);
    assert_eq!(result.from_version, 2);
    assert_eq!(result.to_version, 2);
    assert!(result.results.is_empty());
    assert!(entries(&log).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_target_limits_batch() -> Result<()> {
    let log = Log::default();
    let (engine, _dir) = setup(steps(&[1, 2, 3, 4], &log)).await?;

    let result = engine
        .execute_migrations(&ExecuteOptions::default().with_target(2))
        .await;
    assert_eq!(result.to_version, 2);

    let capped = engine
        .execute_migrations(&ExecuteOptions {
            batch_size: Some(1),
            ..ExecuteOptions::default()
        })
        .await;
    assert!(capped.success);
    assert_eq!(capped.results.len(), 1);
    assert_eq!(capped.to_version, 3);
    Ok(())
}

#[tokio::test]
async fn test_rollback_runs_newest_first() -> Result<()> {
    let log = Log::default();
    let (engine, _dir) = setup(steps(&[1, 2, 3], &log)).await?;
    engine.execute_migrations(&ExecuteOptions::default()).await;
    log.lock().unwrap().clear();

    let result = engine
        .rollback_to_version(1, &ExecuteOptions::default())
        .await?;

    assert!(result.success);
    assert_eq!(result.from_version, 3);
    assert_eq!(result.to_version, 1);
    assert_eq!(entries(&log), vec!["down:3@3", "down:2@2"]);
    assert!(engine.db().table_exists("step_1").await?);
    assert!(!engine.db().table_exists("step_2").await?);
    Ok(())
}

#[tokio::test]
async fn test_rollback_rejects_target_above_current() -> Result<()> {
    let log = Log::default();
    let (engine, _dir) = setup(steps(&[1, 2, 3], &log)).await?;
    engine.execute_migrations(&ExecuteOptions::default()).await;
    log.lock().unwrap().clear();
    let before = engine.db().schema_snapshot().await?;

    let err = engine
        .rollback_to_version(5, &ExecuteOptions::default())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        MigrationError::InvalidTarget {
            target: 5,
            current: 3
        }
    );

    let err = engine
        .rollback_to_version(-1, &ExecuteOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err, MigrationError::NegativeTarget(-1));

    assert_eq!(engine.current_version().await?, 3);
    assert_eq!(engine.db().schema_snapshot().await?, before);
    assert!(entries(&log).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_rollback_dry_run_calls_no_down() -> Result<()> {
    let log = Log::default();
    let (engine, _dir) = setup(steps(&[1, 2], &log)).await?;
    engine.execute_migrations(&ExecuteOptions::default()).await;
    log.lock().unwrap().clear();

    let result = engine
        .rollback_to_version(0, &ExecuteOptions::dry_run())
        .await?;

    assert!(result.success);
    assert_eq!(result.results.len(), 2);
    assert_eq!(result.to_version, 2);
    assert!(entries(&log).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_rollback_failure_stops_without_force() -> Result<()> {
    let log = Log::default();
    let registry = MigrationRegistry::new()
        .register(&name(1), Step::new(1, &log))
        .register(&name(2), Step::new(2, &log).failing_down())
        .register(&name(3), Step::new(3, &log));
    let (engine, _dir) = setup(registry).await?;
    engine.execute_migrations(&ExecuteOptions::default()).await;
    log.lock().unwrap().clear();

    let result = engine
        .rollback_to_version(0, &ExecuteOptions::default())
        .await?;

    assert!(!result.success);
    assert_eq!(result.from_version, 3);
    assert_eq!(result.to_version, 2);
    assert_eq!(result.results.len(), 2);
    assert!(result.results[0].success);
    let error = result.results[1].error.as_deref().unwrap();
    assert!(error.starts_with("Migration down function failed"), "{}", error);
    assert!(error.contains("step 2 refused to roll back"));
    assert!(result.error.as_deref().unwrap().contains("Migration 2 failed"));
    assert_eq!(entries(&log), vec!["down:3@3", "down:2@2"]);
    assert!(engine.db().table_exists("step_1").await?);
    Ok(())
}

#[tokio::test]
async fn test_rollback_force_continues() -> Result<()> {
    let log = Log::default();
    let registry = MigrationRegistry::new()
        .register(&name(1), Step::new(1, &log))
        .register(&name(2), Step::new(2, &log).failing_down())
        .register(&name(3), Step::new(3, &log));
    let (engine, _dir) = setup(registry).await?;
    engine.execute_migrations(&ExecuteOptions::default()).await;
    log.lock().unwrap().clear();

    let result = engine
        .rollback_to_version(0, &ExecuteOptions::default().with_force())
        .await?;

    assert!(!result.success);
    assert_eq!(result.results.len(), 3);
    assert!(!result.results[1].success);
    assert!(result.results[2].success);
    // migration 1 rolls back from version 2, where the failed step left it
    assert_eq!(entries(&log), vec!["down:3@3", "down:2@2", "down:1@2"]);
    assert_eq!(result.to_version, 0);
    assert!(!engine.db().table_exists("step_1").await?);
    assert!(engine.db().table_exists("step_2").await?);
    Ok(())
}

fn asset_url_parameter() -> Vec<ParameterDefinition> {
    vec![
        ParameterDefinition::new("asset_url", ParameterType::Url, "Asset base URL")
            .required()
            .pattern("^https?://.+"),
    ]
}

fn asset_params(url: &str) -> RawParameters {
    serde_json::from_value(json!({ "asset_url": url })).unwrap()
}

#[tokio::test]
async fn test_parameter_gate() -> Result<()> {
    let log = Log::default();
    let registry = MigrationRegistry::new()
        .register(&name(1), Step::new(1, &log))
        .register(
            &name(2),
            Step::new(2, &log).with_parameters(asset_url_parameter()),
        );
    let (engine, _dir) = setup(registry).await?;

    let requirements = engine.get_parameter_requirements(None).await?;
    assert!(requirements.has_unmet_requirements);
    assert_eq!(requirements.missing_parameters, Some(vec![2]));

    // nothing runs, not even migration 1
    let result = engine.execute_migrations(&ExecuteOptions::default()).await;
    assert!(!result.success);
    assert!(result.results.is_empty());
    assert_eq!(
        result.error.as_deref(),
        Some("Missing parameters for migration(s): 2")
    );
    assert_eq!(engine.current_version().await?, 0);

    // supplied but invalid: migration 1 runs, migration 2 fails validation
    let result = engine
        .execute_migrations(
            &ExecuteOptions::default().with_parameters(2, asset_params("ftp://files.example.com")),
        )
        .await;
    assert!(!result.success);
    assert_eq!(result.to_version, 1);
    assert!(result.results[1]
        .error
        .as_deref()
        .unwrap()
        .contains("does not match required pattern"));

    let result = engine
        .execute_migrations(
            &ExecuteOptions::default().with_parameters(2, asset_params("https://cdn.example.com")),
        )
        .await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.to_version, 2);
    assert!(entries(&log).contains(&"asset_url=https://cdn.example.com".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_rollback_is_gated_on_parameters() -> Result<()> {
    let log = Log::default();
    let registry = MigrationRegistry::new()
        .register(&name(1), Step::new(1, &log))
        .register(
            &name(2),
            Step::new(2, &log).with_parameters(asset_url_parameter()),
        )
        .register(&name(3), Step::new(3, &log));
    let (engine, _dir) = setup(registry).await?;
    let applied = engine
        .execute_migrations(
            &ExecuteOptions::default().with_parameters(2, asset_params("https://cdn.example.com")),
        )
        .await;
    assert!(applied.success, "{:?}", applied.error);
    log.lock().unwrap().clear();
    let before = engine.db().schema_snapshot().await?;

    let result = engine
        .rollback_to_version(0, &ExecuteOptions::default())
        .await?;

    assert!(!result.success);
    assert!(result.results.is_empty());
    assert_eq!(result.from_version, 3);
    assert_eq!(result.to_version, 3);
    assert_eq!(
        result.error.as_deref(),
        Some("Missing parameters for migration(s): 2")
    );
    assert!(entries(&log).is_empty());
    assert_eq!(engine.current_version().await?, 3);
    assert_eq!(engine.db().schema_snapshot().await?, before);

    // a rollback that stops above the parameterized migration needs nothing
    let partial = engine
        .rollback_to_version(2, &ExecuteOptions::default())
        .await?;
    assert!(partial.success, "{:?}", partial.error);
    assert_eq!(entries(&log), vec!["down:3@3"]);
    Ok(())
}

#[tokio::test]
async fn test_broken_sequence_blocks_execution() -> Result<()> {
    let log = Log::default();
    let (engine, _dir) = setup(steps(&[1, 2, 4], &log)).await?;

    let status = engine.check_pending_migrations().await?;
    assert_eq!(status.status, SystemState::Error);
    assert_eq!(status.latest_version, 0);

    let result = engine.execute_migrations(&ExecuteOptions::default()).await;
    assert!(!result.success);
    assert!(result
        .error
        .as_deref()
        .unwrap()
        .contains("missing version 3"));
    assert!(entries(&log).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_single_step_rejections() -> Result<()> {
    let log = Log::default();
    let registry = steps(&[1, 2], &log).register("003_mismatch", Step::new(9, &log));
    let (engine, _dir) = setup(registry).await?;
    engine
        .execute_migrations(&ExecuteOptions::default().with_target(1))
        .await;

    let infos = engine.scan().await?;

    let applied = engine
        .execute_migration(&infos[0], &ExecuteOptions::default())
        .await;
    assert!(!applied.success);
    assert!(applied.error.as_deref().unwrap().contains("already applied"));

    let broken = engine
        .execute_migration(&infos[2], &ExecuteOptions::default())
        .await;
    assert!(!broken.success);
    assert!(broken.error.as_deref().unwrap().contains("cannot be executed"));

    let not_applied = engine
        .rollback_migration(&infos[1], &ExecuteOptions::default())
        .await;
    assert!(!not_applied.success);
    assert!(not_applied.error.as_deref().unwrap().contains("not applied"));
    Ok(())
}

#[tokio::test]
async fn test_validate_reports_inconsistency_and_warnings() -> Result<()> {
    let log = Log::default();
    let registry = steps(&[1, 2], &log).register("bogus", Step::new(3, &log));
    let (engine, _dir) = setup(registry).await?;
    engine.execute_migrations(&ExecuteOptions::default()).await;

    let report = engine.validate_migration_system().await;
    assert!(report.is_valid, "{:?}", report.errors);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("bogus"));

    set_version(engine.db(), 7).await?;
    let report = engine.validate_migration_system().await;
    assert!(!report.is_valid);
    assert!(report.errors[0].starts_with("Version inconsistency"));
    Ok(())
}
