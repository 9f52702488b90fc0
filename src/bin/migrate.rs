use anyhow::{bail, Result};
use archivedb::config::AppConfig;
use archivedb::db::{schema, SqliteDatabase};
use archivedb::migration::{ExecuteOptions, MigrationEngine, MigrationRegistry, RawParameters};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(
    name = "archivedb-migrate",
    about = "Inspect and apply archive database migrations",
    version
)]
struct Cli {
    /// Path to config file
    #[arg(long, default_value = "archivedb.toml")]
    config: String,

    /// SQLite database path, overriding the config file
    #[arg(long)]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show current version and pending migrations
    Status,
    /// Apply pending migrations, optionally up to a target version
    Up {
        /// Highest version to apply (inclusive)
        #[arg(long)]
        to: Option<i64>,

        /// Report what would run without executing anything
        #[arg(long)]
        dry_run: bool,

        /// Keep going after a failed migration
        #[arg(long)]
        force: bool,

        /// Maximum number of migrations to run
        #[arg(long)]
        batch_size: Option<usize>,

        /// Migration parameter as VERSION:KEY=VALUE (repeatable)
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<ParamArg>,
    },
    /// Roll back applied migrations down to a target version
    Down {
        /// Version to end at (exclusive of the migrations undone)
        #[arg(long)]
        to: i64,

        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        force: bool,

        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<ParamArg>,
    },
    /// Check sequence integrity and version consistency
    Validate,
    /// List the parameters pending migrations need
    Requirements {
        #[arg(long)]
        to: Option<i64>,
    },
}

#[derive(Debug, Clone)]
struct ParamArg {
    version: i64,
    key: String,
    value: String,
}

fn parse_param(raw: &str) -> Result<ParamArg, String> {
    let (version, rest) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected VERSION:KEY=VALUE, got '{}'", raw))?;
    let (key, value) = rest
        .split_once('=')
        .ok_or_else(|| format!("expected VERSION:KEY=VALUE, got '{}'", raw))?;
    let version = version
        .parse::<i64>()
        .map_err(|_| format!("invalid migration version '{}'", version))?;
    if key.is_empty() {
        return Err(format!("empty parameter name in '{}'", raw));
    }
    Ok(ParamArg {
        version,
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn group_params(params: Vec<ParamArg>) -> BTreeMap<i64, RawParameters> {
    let mut grouped: BTreeMap<i64, RawParameters> = BTreeMap::new();
    for p in params {
        grouped
            .entry(p.version)
            .or_default()
            .insert(p.key, serde_json::Value::String(p.value));
    }
    grouped
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    if let Err(err) = run().await {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(&cli.config)?;
    if let Some(path) = cli.database {
        config.database.path = path;
    }
    config.validate()?;

    let db = SqliteDatabase::connect(&config.database.path).await?;
    schema::ensure_baseline_schema(&db).await?;
    let engine = MigrationEngine::new(db, Arc::new(MigrationRegistry::builtin()));

    let outcome = execute(&engine, cli.command).await;
    engine.db().close().await;
    outcome
}

async fn execute(engine: &MigrationEngine, command: Command) -> Result<()> {
    match command {
        Command::Status => print_json(&engine.check_pending_migrations().await?),
        Command::Up {
            to,
            dry_run,
            force,
            batch_size,
            params,
        } => {
            let options = ExecuteOptions {
                target_version: to,
                dry_run,
                force,
                batch_size,
                parameters: group_params(params),
            };
            let result = engine.execute_migrations(&options).await;
            print_json(&result)?;
            if !result.success {
                bail!(result.error.unwrap_or_else(|| "migration failed".to_string()));
            }
            Ok(())
        }
        Command::Down {
            to,
            dry_run,
            force,
            params,
        } => {
            let options = ExecuteOptions {
                target_version: Some(to),
                dry_run,
                force,
                batch_size: None,
                parameters: group_params(params),
            };
            let result = engine.rollback_to_version(to, &options).await?;
            print_json(&result)?;
            if !result.success {
                bail!(result.error.unwrap_or_else(|| "rollback failed".to_string()));
            }
            Ok(())
        }
        Command::Validate => {
            let report = engine.validate_migration_system().await;
            print_json(&report)?;
            if !report.is_valid {
                bail!(report.errors.join("; "));
            }
            Ok(())
        }
        Command::Requirements { to } => print_json(&engine.get_parameter_requirements(to).await?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_param_arguments() {
        let p = parse_param("4:asset_url=https://cdn.example.com/a=b").unwrap();
        assert_eq!(p.version, 4);
        assert_eq!(p.key, "asset_url");
        assert_eq!(p.value, "https://cdn.example.com/a=b");

        assert!(parse_param("asset_url=x").is_err());
        assert!(parse_param("x:asset_url=y").is_err());
        assert!(parse_param("4:=y").is_err());
    }

    #[test]
    fn groups_params_by_version() {
        let grouped = group_params(vec![
            parse_param("4:asset_url=https://cdn.example.com").unwrap(),
            parse_param("4:batch_size=10").unwrap(),
            parse_param("5:flag=true").unwrap(),
        ]);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[&4].len(), 2);
        assert_eq!(grouped[&4]["batch_size"], "10");
    }
}
