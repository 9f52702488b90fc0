//! Baseline archive schema (database version 0).
//!
//! Every entity is keyed by its UUID and every reference is a UUID column.
//! Shipped migrations evolve this layout; the DDL here is also what the
//! ID-refactor migration restores when it is rolled back, so the text must
//! stay byte-for-byte stable.

use super::{site_config, SqliteDatabase};
use anyhow::Result;
use tracing::info;

pub const CREATOR: &str = "CREATE TABLE creator (
    uuid TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    type TEXT CHECK(type IN ('human', 'virtual')) NOT NULL
)";

pub const WORK: &str = "CREATE TABLE work (
    uuid TEXT PRIMARY KEY,
    copyright_basis TEXT NOT NULL CHECK(copyright_basis IN ('none', 'accept', 'license', 'arr', 'onlymetadata'))
)";

pub const TAG: &str = "CREATE TABLE tag (
    uuid TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
)";

pub const CATEGORY: &str = "CREATE TABLE category (
    uuid TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    parent_uuid TEXT REFERENCES category(uuid) ON DELETE CASCADE
)";

pub const FOOTER_SETTINGS: &str = "CREATE TABLE footer_settings (
    uuid TEXT PRIMARY KEY,
    item_type TEXT NOT NULL CHECK(item_type IN ('link', 'social', 'copyright')),
    text TEXT NOT NULL,
    url TEXT,
    icon_class TEXT
)";

pub const EXTERNAL_SOURCE: &str = "CREATE TABLE external_source (
    uuid TEXT PRIMARY KEY,
    type TEXT CHECK(type IN ('raw_url', 'ipfs')) NOT NULL,
    name TEXT NOT NULL,
    endpoint TEXT NOT NULL
)";

pub const WORK_TITLE: &str = "CREATE TABLE work_title (
    uuid TEXT PRIMARY KEY,
    work_uuid TEXT NOT NULL REFERENCES work(uuid) ON DELETE CASCADE,
    is_official BOOLEAN NOT NULL,
    is_for_search BOOLEAN NOT NULL DEFAULT FALSE,
    language TEXT NOT NULL,
    title TEXT NOT NULL
)";

pub const MEDIA_SOURCE: &str = "CREATE TABLE media_source (
    uuid TEXT PRIMARY KEY,
    work_uuid TEXT NOT NULL REFERENCES work(uuid) ON DELETE CASCADE,
    is_music BOOLEAN NOT NULL,
    file_name TEXT NOT NULL,
    url TEXT,
    mime_type TEXT NOT NULL,
    info TEXT NOT NULL
)";

pub const ASSET: &str = "CREATE TABLE asset (
    uuid TEXT PRIMARY KEY,
    file_id TEXT,
    work_uuid TEXT NOT NULL REFERENCES work(uuid) ON DELETE CASCADE,
    asset_type TEXT CHECK(asset_type IN ('lyrics', 'picture')) NOT NULL,
    file_name TEXT NOT NULL,
    is_previewpic BOOLEAN,
    language TEXT
)";

pub const WORK_RELATION: &str = "CREATE TABLE work_relation (
    uuid TEXT PRIMARY KEY,
    from_work_uuid TEXT NOT NULL REFERENCES work(uuid) ON DELETE CASCADE,
    to_work_uuid TEXT NOT NULL REFERENCES work(uuid) ON DELETE CASCADE,
    relation_type TEXT NOT NULL CHECK(relation_type IN ('original', 'remix', 'cover', 'remake', 'picture', 'lyrics'))
)";

pub const EXTERNAL_OBJECT: &str = "CREATE TABLE external_object (
    uuid TEXT PRIMARY KEY,
    external_source_uuid TEXT NOT NULL REFERENCES external_source(uuid) ON DELETE CASCADE,
    mime_type TEXT NOT NULL,
    file_id TEXT NOT NULL
)";

pub const CREATOR_WIKI: &str = "CREATE TABLE creator_wiki (
    creator_uuid TEXT NOT NULL REFERENCES creator(uuid) ON DELETE CASCADE,
    platform TEXT NOT NULL,
    identifier TEXT NOT NULL,
    PRIMARY KEY (creator_uuid, platform)
)";

pub const WORK_LICENSE: &str = "CREATE TABLE work_license (
    work_uuid TEXT PRIMARY KEY REFERENCES work(uuid) ON DELETE CASCADE,
    license_type TEXT NOT NULL
)";

pub const WORK_CREATOR: &str = "CREATE TABLE work_creator (
    work_uuid TEXT NOT NULL REFERENCES work(uuid) ON DELETE CASCADE,
    creator_uuid TEXT NOT NULL REFERENCES creator(uuid) ON DELETE CASCADE,
    role TEXT NOT NULL,
    PRIMARY KEY (work_uuid, creator_uuid, role)
)";

pub const ASSET_CREATOR: &str = "CREATE TABLE asset_creator (
    asset_uuid TEXT NOT NULL REFERENCES asset(uuid) ON DELETE CASCADE,
    creator_uuid TEXT NOT NULL REFERENCES creator(uuid),
    role TEXT NOT NULL,
    PRIMARY KEY (asset_uuid, creator_uuid)
)";

pub const WORK_WIKI: &str = "CREATE TABLE work_wiki (
    work_uuid TEXT NOT NULL REFERENCES work(uuid) ON DELETE CASCADE,
    platform TEXT NOT NULL,
    identifier TEXT NOT NULL,
    PRIMARY KEY (work_uuid, platform)
)";

pub const WORK_TAG: &str = "CREATE TABLE work_tag (
    work_uuid TEXT NOT NULL REFERENCES work(uuid) ON DELETE CASCADE,
    tag_uuid TEXT NOT NULL REFERENCES tag(uuid) ON DELETE CASCADE,
    PRIMARY KEY (work_uuid, tag_uuid)
)";

pub const WORK_CATEGORY: &str = "CREATE TABLE work_category (
    work_uuid TEXT NOT NULL REFERENCES work(uuid) ON DELETE CASCADE,
    category_uuid TEXT NOT NULL REFERENCES category(uuid) ON DELETE CASCADE,
    PRIMARY KEY (work_uuid, category_uuid)
)";

pub const ASSET_EXTERNAL_OBJECT: &str = "CREATE TABLE asset_external_object (
    asset_uuid TEXT NOT NULL REFERENCES asset(uuid) ON DELETE CASCADE,
    external_object_uuid TEXT NOT NULL REFERENCES external_object(uuid) ON DELETE CASCADE,
    PRIMARY KEY (asset_uuid, external_object_uuid)
)";

pub const MEDIA_SOURCE_EXTERNAL_OBJECT: &str = "CREATE TABLE media_source_external_object (
    media_source_uuid TEXT NOT NULL REFERENCES media_source(uuid) ON DELETE CASCADE,
    external_object_uuid TEXT NOT NULL REFERENCES external_object(uuid) ON DELETE CASCADE,
    PRIMARY KEY (media_source_uuid, external_object_uuid)
)";

/// Baseline tables in dependency order (parents before children).
pub const BASELINE_TABLES: &[(&str, &str)] = &[
    ("creator", CREATOR),
    ("work", WORK),
    ("tag", TAG),
    ("category", CATEGORY),
    ("footer_settings", FOOTER_SETTINGS),
    ("external_source", EXTERNAL_SOURCE),
    ("work_title", WORK_TITLE),
    ("media_source", MEDIA_SOURCE),
    ("asset", ASSET),
    ("work_relation", WORK_RELATION),
    ("external_object", EXTERNAL_OBJECT),
    ("creator_wiki", CREATOR_WIKI),
    ("work_license", WORK_LICENSE),
    ("work_creator", WORK_CREATOR),
    ("asset_creator", ASSET_CREATOR),
    ("work_wiki", WORK_WIKI),
    ("work_tag", WORK_TAG),
    ("work_category", WORK_CATEGORY),
    ("asset_external_object", ASSET_EXTERNAL_OBJECT),
    ("media_source_external_object", MEDIA_SOURCE_EXTERNAL_OBJECT),
];

/// Creates the baseline schema and the `site_config` table.
pub async fn create_baseline_schema(db: &SqliteDatabase) -> Result<()> {
    site_config::ensure_table(db).await?;
    for (_, ddl) in BASELINE_TABLES {
        db.execute(ddl).await?;
    }
    Ok(())
}

/// Creates the baseline schema only when the database holds no tables yet.
///
/// Returns `true` when the schema was created.
pub async fn ensure_baseline_schema(db: &SqliteDatabase) -> Result<bool> {
    let has_tables = db
        .schema_snapshot()
        .await?
        .iter()
        .any(|object| object.kind == "table");

    if has_tables {
        site_config::ensure_table(db).await?;
        return Ok(false);
    }

    info!("Empty database at {}, creating baseline schema", db.path());
    create_baseline_schema(db).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn baseline_is_created_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("archive.sqlite");
        let db = SqliteDatabase::connect(path.to_str().unwrap()).await.unwrap();

        assert!(ensure_baseline_schema(&db).await.unwrap());
        assert!(!ensure_baseline_schema(&db).await.unwrap());

        for (table, _) in BASELINE_TABLES {
            assert!(db.table_exists(table).await.unwrap(), "missing {table}");
        }
        assert!(db.table_exists("site_config").await.unwrap());
        assert!(db.has_column("work_title", "work_uuid").await.unwrap());
    }
}
