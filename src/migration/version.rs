//! Persistent schema version, stored as a `site_config` row.

use crate::db::{site_config, SqliteDatabase};
use anyhow::Result;
use tracing::debug;

pub const VERSION_KEY: &str = "db_version";

const VERSION_DESCRIPTION: &str = "Database schema version";

pub async fn ensure_config_table(db: &SqliteDatabase) -> Result<()> {
    site_config::ensure_table(db).await
}

/// Reads the current schema version. A fresh database reports 0.
pub async fn get_current_version(db: &SqliteDatabase) -> Result<i64> {
    if !db.table_exists("site_config").await? {
        debug!("site_config table missing, assuming version 0");
        return Ok(0);
    }

    let Some(entry) = site_config::get(db, VERSION_KEY).await? else {
        debug!("No {} entry, assuming version 0", VERSION_KEY);
        return Ok(0);
    };

    match entry.value.trim().parse::<i64>() {
        Ok(version) if version >= 0 => Ok(version),
        _ => {
            debug!("Unparsable {} value '{}', assuming version 0", VERSION_KEY, entry.value);
            Ok(0)
        }
    }
}

/// Persists `version`. The write completes before this returns.
pub async fn set_version(db: &SqliteDatabase, version: i64) -> Result<()> {
    ensure_config_table(db).await?;
    site_config::upsert(db, VERSION_KEY, &version.to_string(), Some(VERSION_DESCRIPTION)).await?;
    debug!("Schema version set to {}", version);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn version_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("version.sqlite");
        let db = SqliteDatabase::connect(path.to_str().unwrap()).await.unwrap();

        assert_eq!(get_current_version(&db).await.unwrap(), 0);

        set_version(&db, 3).await.unwrap();
        assert_eq!(get_current_version(&db).await.unwrap(), 3);

        site_config::upsert(&db, VERSION_KEY, "three", None).await.unwrap();
        assert_eq!(get_current_version(&db).await.unwrap(), 0);

        let entry = site_config::get(&db, VERSION_KEY).await.unwrap().unwrap();
        assert_eq!(entry.description.as_deref(), Some(VERSION_DESCRIPTION));
    }
}
