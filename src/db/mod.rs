//! SQLite database handle used by the migration engine and the archive schema.

pub mod schema;
pub mod site_config;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::fmt::Debug;
use std::str::FromStr;

/// One row of `sqlite_master`, as returned by [`SqliteDatabase::schema_snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaObject {
    pub kind: String,
    pub name: String,
    pub sql: Option<String>,
}

/// A foreign key violation reported by `PRAGMA foreign_key_check`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyViolation {
    pub table: String,
    pub rowid: Option<i64>,
    pub parent: String,
}

/// Database handle shared by the migration engine and migration bodies.
///
/// The pool holds a single connection: the engine assumes exclusive access for
/// the duration of a batch, and table rebuilds rely on connection-level
/// pragmas. Foreign key enforcement is off on this connection so that dropping
/// a parent table during a rebuild never cascades into child rows; rebuilds
/// verify integrity explicitly with [`SqliteDatabase::foreign_key_violations`].
#[derive(Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
    db_path: String,
}

impl SqliteDatabase {
    pub async fn connect(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&Self::connection_uri(db_path))?
            .foreign_keys(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open database at {}", db_path))?;

        Ok(Self {
            pool,
            db_path: db_path.to_string(),
        })
    }

    fn connection_uri(path: &str) -> String {
        format!("sqlite:{}?mode=rwc", path)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Executes a single statement and returns the number of affected rows.
    pub async fn execute(&self, sql: &str) -> Result<u64> {
        let result = sqlx::query(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Executes a multi-statement script as-is.
    pub async fn execute_script(&self, sql: &str) -> Result<()> {
        sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(())
    }

    /// Runs several statements as one transaction; either all apply or none do.
    pub async fn execute_batch(&self, statements: &[&str]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut affected = 0;
        for sql in statements {
            let result = sqlx::query(sql)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("batch statement failed: {}", sql.trim()))?;
            affected += result.rows_affected();
        }
        tx.commit().await?;
        Ok(affected)
    }

    pub async fn fetch_i64(&self, sql: &str) -> Result<i64> {
        let value: i64 = sqlx::query_scalar(sql).fetch_one(&self.pool).await?;
        Ok(value)
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn column_names(&self, table: &str) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?)")
            .bind(table)
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    pub async fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        Ok(self
            .column_names(table)
            .await?
            .iter()
            .any(|name| name == column))
    }

    /// Returns every user-defined schema object, ordered by kind and name.
    ///
    /// SQLite-internal objects (`sqlite_sequence`, auto-indexes) are excluded,
    /// so two snapshots compare equal exactly when the declared schema does.
    pub async fn schema_snapshot(&self) -> Result<Vec<SchemaObject>> {
        let rows = sqlx::query(
            r#"
            SELECT type, name, sql
            FROM sqlite_master
            WHERE name NOT LIKE 'sqlite\_%' ESCAPE '\'
            ORDER BY type, name
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| SchemaObject {
                kind: row.get("type"),
                name: row.get("name"),
                sql: row.get("sql"),
            })
            .collect())
    }

    pub async fn foreign_key_violations(&self) -> Result<Vec<ForeignKeyViolation>> {
        let rows = sqlx::query("PRAGMA foreign_key_check")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| ForeignKeyViolation {
                table: row.get(0),
                rowid: row.get(1),
                parent: row.get(2),
            })
            .collect())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDatabase")
            .field("db_path", &self.db_path)
            .finish()
    }
}
