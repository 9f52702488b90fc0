//! Multi-phase table rebuilds for schema changes SQLite cannot express with
//! `ALTER TABLE`.
//!
//! Every table is first copied into a `<table>__shadow` table, the originals
//! are dropped children-first, then each table is recreated from its target
//! DDL and refilled from the shadows parents-first. The whole rebuild runs in
//! one transaction and is committed only if `PRAGMA foreign_key_check` finds
//! nothing.

use crate::db::{ForeignKeyViolation, SqliteDatabase};
use anyhow::{bail, Context, Result};
use sqlx::{Row, Sqlite, Transaction};
use tracing::info;

/// How one table is rebuilt.
#[derive(Debug, Clone)]
pub struct TableRebuild {
    pub table: &'static str,
    /// Column list copied into the shadow, e.g. `"rowid AS id, *"`.
    pub snapshot: &'static str,
    /// `CREATE TABLE` statement of the new layout.
    pub target_ddl: &'static str,
    /// `INSERT ... SELECT` refilling the table, reading from `<table>__shadow`
    /// and from tables already restored.
    pub restore: &'static str,
}

impl TableRebuild {
    pub fn new(
        table: &'static str,
        snapshot: &'static str,
        target_ddl: &'static str,
        restore: &'static str,
    ) -> Self {
        Self {
            table,
            snapshot,
            target_ddl,
            restore,
        }
    }
}

pub fn shadow_name(table: &str) -> String {
    format!("{}__shadow", table)
}

/// Rebuilds `tables`, which must be listed parents before children.
pub async fn rebuild_tables(db: &SqliteDatabase, label: &str, tables: &[TableRebuild]) -> Result<()> {
    let mut tx = db.pool().begin().await?;

    info!("{}: step 1/5 snapshot {} tables", label, tables.len());
    for t in tables {
        let sql = format!(
            "CREATE TABLE {} AS SELECT {} FROM {}",
            shadow_name(t.table),
            t.snapshot,
            t.table
        );
        run(&mut tx, &sql).await?;
    }

    info!("{}: step 2/5 drop original tables", label);
    for t in tables.iter().rev() {
        run(&mut tx, &format!("DROP TABLE {}", t.table)).await?;
    }

    info!("{}: step 3/5 recreate tables and restore rows", label);
    for t in tables {
        run(&mut tx, t.target_ddl).await?;
        let restored = run(&mut tx, t.restore).await?;
        info!("{}: restored {} rows into {}", label, restored, t.table);
    }

    info!("{}: step 4/5 check foreign keys", label);
    let violations = foreign_key_check(&mut tx).await?;
    if !violations.is_empty() {
        let first = &violations[0];
        bail!(
            "{}: {} foreign key violation(s) after rebuild, first in {} (rowid {:?}) referencing {}",
            label,
            violations.len(),
            first.table,
            first.rowid,
            first.parent
        );
    }

    info!("{}: step 5/5 drop shadow tables", label);
    for t in tables {
        run(&mut tx, &format!("DROP TABLE {}", shadow_name(t.table))).await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn run(tx: &mut Transaction<'_, Sqlite>, sql: &str) -> Result<u64> {
    let result = sqlx::query(sql)
        .execute(&mut **tx)
        .await
        .with_context(|| format!("rebuild statement failed: {}", first_line(sql)))?;
    Ok(result.rows_affected())
}

async fn foreign_key_check(tx: &mut Transaction<'_, Sqlite>) -> Result<Vec<ForeignKeyViolation>> {
    let rows = sqlx::query("PRAGMA foreign_key_check")
        .fetch_all(&mut **tx)
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

fn first_line(sql: &str) -> &str {
    sql.trim().lines().next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open() -> (SqliteDatabase, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rebuild.sqlite");
        let db = SqliteDatabase::connect(path.to_str().unwrap()).await.unwrap();
        db.execute_script(
            r#"
            CREATE TABLE parent (code TEXT PRIMARY KEY, label TEXT NOT NULL);
            CREATE TABLE child (parent_code TEXT NOT NULL REFERENCES parent(code), note TEXT);
            INSERT INTO parent (code, label) VALUES ('a', 'A'), ('b', 'B');
            INSERT INTO child (parent_code, note) VALUES ('a', 'x'), ('b', 'y');
        "#,
        )
        .await
        .unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn rebuild_rekeys_tables() {
        let (db, _dir) = open().await;

        rebuild_tables(
            &db,
            "rekey",
            &[
                TableRebuild::new(
                    "parent",
                    "rowid AS id, *",
                    "CREATE TABLE parent (id INTEGER PRIMARY KEY, code TEXT NOT NULL UNIQUE, label TEXT NOT NULL)",
                    "INSERT INTO parent (id, code, label) SELECT id, code, label FROM parent__shadow",
                ),
                TableRebuild::new(
                    "child",
                    "*",
                    "CREATE TABLE child (parent_id INTEGER NOT NULL REFERENCES parent(id), note TEXT)",
                    "INSERT INTO child (parent_id, note) SELECT p.id, s.note FROM child__shadow s JOIN parent p ON s.parent_code = p.code",
                ),
            ],
        )
        .await
        .unwrap();

        assert!(db.has_column("child", "parent_id").await.unwrap());
        assert!(!db.table_exists("parent__shadow").await.unwrap());
        assert!(!db.table_exists("child__shadow").await.unwrap());
        assert_eq!(
            db.fetch_i64("SELECT COUNT(*) FROM child c JOIN parent p ON c.parent_id = p.id")
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn foreign_key_violation_rolls_back() {
        let (db, _dir) = open().await;
        let before = db.schema_snapshot().await.unwrap();

        let err = rebuild_tables(
            &db,
            "broken",
            &[TableRebuild::new(
                "child",
                "*",
                "CREATE TABLE child (parent_code TEXT NOT NULL REFERENCES parent(code), note TEXT)",
                "INSERT INTO child (parent_code, note) SELECT 'zzz', note FROM child__shadow",
            )],
        )
        .await
        .unwrap_err();

        assert!(format!("{:#}", err).contains("foreign key violation"));
        assert_eq!(db.schema_snapshot().await.unwrap(), before);
        assert_eq!(
            db.fetch_i64("SELECT COUNT(*) FROM child WHERE parent_code = 'a'")
                .await
                .unwrap(),
            1
        );
    }
}
