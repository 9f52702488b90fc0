//! Generic key-value configuration table (`site_config`).

use super::SqliteDatabase;
use anyhow::Result;
use sqlx::Row;

pub const CREATE_SITE_CONFIG_SQL: &str = "CREATE TABLE IF NOT EXISTS site_config (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    description TEXT
)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub description: Option<String>,
}

pub async fn ensure_table(db: &SqliteDatabase) -> Result<()> {
    db.execute(CREATE_SITE_CONFIG_SQL).await?;
    Ok(())
}

pub async fn get(db: &SqliteDatabase, key: &str) -> Result<Option<ConfigEntry>> {
    let row = sqlx::query("SELECT key, value, description FROM site_config WHERE key = ?")
        .bind(key)
        .fetch_optional(db.pool())
        .await?;

    Ok(row.map(|r| ConfigEntry {
        key: r.get("key"),
        value: r.get("value"),
        description: r.get("description"),
    }))
}

/// Inserts or updates an entry. An existing description is kept when none is given.
pub async fn upsert(
    db: &SqliteDatabase,
    key: &str,
    value: &str,
    description: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO site_config (key, value, description)
        VALUES (?, ?, ?)
        ON CONFLICT (key)
        DO UPDATE SET value = excluded.value,
                      description = COALESCE(excluded.description, site_config.description)
    "#,
    )
    .bind(key)
    .bind(value)
    .bind(description)
    .execute(db.pool())
    .await?;

    Ok(())
}

/// Deletes an entry, returning whether it existed.
pub async fn delete(db: &SqliteDatabase, key: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM site_config WHERE key = ?")
        .bind(key)
        .execute(db.pool())
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list(db: &SqliteDatabase) -> Result<Vec<ConfigEntry>> {
    let rows = sqlx::query("SELECT key, value, description FROM site_config ORDER BY key")
        .fetch_all(db.pool())
        .await?;

    Ok(rows
        .iter()
        .map(|r| ConfigEntry {
            key: r.get("key"),
            value: r.get("value"),
            description: r.get("description"),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open() -> (SqliteDatabase, TempDir) {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("config.sqlite");
        let db = SqliteDatabase::connect(path.to_str().unwrap()).await.unwrap();
        ensure_table(&db).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn upsert_and_get() {
        let (db, _dir) = open().await;
        assert!(get(&db, "site_title").await.unwrap().is_none());

        upsert(&db, "site_title", "Archive", Some("Site title"))
            .await
            .unwrap();
        upsert(&db, "site_title", "Media Archive", None).await.unwrap();

        let entry = get(&db, "site_title").await.unwrap().unwrap();
        assert_eq!(entry.value, "Media Archive");
        assert_eq!(entry.description.as_deref(), Some("Site title"));
    }

    #[tokio::test]
    async fn delete_and_list() {
        let (db, _dir) = open().await;
        upsert(&db, "b", "2", None).await.unwrap();
        upsert(&db, "a", "1", None).await.unwrap();

        let keys: Vec<String> = list(&db).await.unwrap().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["a", "b"]);

        assert!(delete(&db, "a").await.unwrap());
        assert!(!delete(&db, "a").await.unwrap());
        assert_eq!(list(&db).await.unwrap().len(), 1);
    }
}
