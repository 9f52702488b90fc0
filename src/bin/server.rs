use anyhow::Result;
use archivedb::config::AppConfig;
use archivedb::db::{schema, SqliteDatabase};
use archivedb::http::app_server::AppServer;
use archivedb::migration::{ExecuteOptions, MigrationEngine, MigrationRegistry};
use clap::Parser;
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "archivedb-server", about = "Archive database migration server")]
struct Cli {
    /// Path to config file
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let now = Instant::now();
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    tracing::info!("Starting archivedb server");

    let config = AppConfig::load(&cli.config)?;
    config.validate()?;

    tracing::info!("Configuration '{}' loaded successfully", &cli.config);

    let db = SqliteDatabase::connect(&config.database.path).await?;
    if schema::ensure_baseline_schema(&db).await? {
        tracing::info!("Created baseline schema in {}", config.database.path);
    }

    let engine = MigrationEngine::new(db, Arc::new(MigrationRegistry::builtin()));
    tracing::info!("{} migrations registered", engine.registry().len());

    let status = engine.check_pending_migrations().await?;
    tracing::info!(
        "Schema at version {}, latest {}, {} pending",
        status.current_version,
        status.latest_version,
        status.pending_count
    );

    if config.migrations.auto_migrate && status.needs_migration {
        // Stop below the first migration that needs operator-supplied parameters.
        let requirements = engine.get_parameter_requirements(None).await?;
        let options = match requirements.missing_parameters.as_deref() {
            Some([first, ..]) => ExecuteOptions::default().with_target(*first - 1),
            _ => ExecuteOptions::default(),
        };
        let result = engine.execute_migrations(&options).await;
        if result.success {
            tracing::info!(
                "Auto-migrated from version {} to {}",
                result.from_version,
                result.to_version
            );
        } else {
            tracing::error!(
                "Auto-migration stopped at version {}: {}",
                result.to_version,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    let app = AppServer::new(engine);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server started in {}ms", now.elapsed().as_millis());
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app.router).await?;

    app.engine.db().close().await;
    Ok(())
}
