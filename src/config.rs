use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

const ENV_PREFIX: &str = "ARCHIVEDB";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub migrations: MigrationsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path. Created on first connect.
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MigrationsConfig {
    /// Apply pending migrations that need no parameters when the server starts.
    pub auto_migrate: bool,
}

impl AppConfig {
    /// Loads defaults, then the TOML file at `path` if it exists, then
    /// `ARCHIVEDB__SECTION__KEY` environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = ::config::Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("database.path", "archive.sqlite")?
            .set_default("migrations.auto_migrate", false)?;

        if Path::new(path).exists() {
            builder = builder.add_source(::config::File::from(Path::new(path)));
        } else {
            tracing::warn!("Config file '{}' not found, using defaults", path);
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        );

        builder
            .build()
            .context("failed to build configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            bail!("database.path must not be empty");
        }
        if self.server.port == 0 {
            bail!("server.port must be non-zero");
        }
        Ok(())
    }
}
