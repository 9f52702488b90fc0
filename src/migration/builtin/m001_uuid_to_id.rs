//! Integer primary keys for every archive table.
//!
//! Entity tables get an `id INTEGER PRIMARY KEY` (taken from the old rowid)
//! and keep `uuid` as a unique external key; every reference column switches
//! from `*_uuid` to `*_id`. `down` restores the UUID-keyed layout exactly,
//! including rowids.

use crate::db::schema;
use crate::migration::definition::{Migration, MigrationContext};
use crate::migration::rebuild::{rebuild_tables, TableRebuild};
use async_trait::async_trait;

pub const CREATOR: &str = "CREATE TABLE creator (
    id INTEGER PRIMARY KEY,
    uuid TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    type TEXT CHECK(type IN ('human', 'virtual')) NOT NULL
)";

pub const WORK: &str = "CREATE TABLE work (
    id INTEGER PRIMARY KEY,
    uuid TEXT NOT NULL UNIQUE,
    copyright_basis TEXT NOT NULL CHECK(copyright_basis IN ('none', 'accept', 'license', 'arr', 'onlymetadata'))
)";

pub const TAG: &str = "CREATE TABLE tag (
    id INTEGER PRIMARY KEY,
    uuid TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL UNIQUE
)";

pub const CATEGORY: &str = "CREATE TABLE category (
    id INTEGER PRIMARY KEY,
    uuid TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL UNIQUE,
    parent_id INTEGER REFERENCES category(id) ON DELETE CASCADE
)";

pub const FOOTER_SETTINGS: &str = "CREATE TABLE footer_settings (
    id INTEGER PRIMARY KEY,
    uuid TEXT NOT NULL UNIQUE,
    item_type TEXT NOT NULL CHECK(item_type IN ('link', 'social', 'copyright')),
    text TEXT NOT NULL,
    url TEXT,
    icon_class TEXT
)";

pub const EXTERNAL_SOURCE: &str = "CREATE TABLE external_source (
    id INTEGER PRIMARY KEY,
    uuid TEXT NOT NULL UNIQUE,
    type TEXT CHECK(type IN ('raw_url', 'ipfs')) NOT NULL,
    name TEXT NOT NULL,
    endpoint TEXT NOT NULL
)";

pub const WORK_TITLE: &str = "CREATE TABLE work_title (
    id INTEGER PRIMARY KEY,
    uuid TEXT NOT NULL UNIQUE,
    work_id INTEGER NOT NULL REFERENCES work(id) ON DELETE CASCADE,
    is_official BOOLEAN NOT NULL,
    is_for_search BOOLEAN NOT NULL DEFAULT FALSE,
    language TEXT NOT NULL,
    title TEXT NOT NULL
)";

pub const MEDIA_SOURCE: &str = "CREATE TABLE media_source (
    id INTEGER PRIMARY KEY,
    uuid TEXT NOT NULL UNIQUE,
    work_id INTEGER NOT NULL REFERENCES work(id) ON DELETE CASCADE,
    is_music BOOLEAN NOT NULL,
    file_name TEXT NOT NULL,
    url TEXT,
    mime_type TEXT NOT NULL,
    info TEXT NOT NULL
)";

pub const ASSET: &str = "CREATE TABLE asset (
    id INTEGER PRIMARY KEY,
    uuid TEXT NOT NULL UNIQUE,
    file_id TEXT,
    work_id INTEGER NOT NULL REFERENCES work(id) ON DELETE CASCADE,
    asset_type TEXT CHECK(asset_type IN ('lyrics', 'picture')) NOT NULL,
    file_name TEXT NOT NULL,
    is_previewpic BOOLEAN,
    language TEXT
)";

pub const WORK_RELATION: &str = "CREATE TABLE work_relation (
    id INTEGER PRIMARY KEY,
    uuid TEXT NOT NULL UNIQUE,
    from_work_id INTEGER NOT NULL REFERENCES work(id) ON DELETE CASCADE,
    to_work_id INTEGER NOT NULL REFERENCES work(id) ON DELETE CASCADE,
    relation_type TEXT NOT NULL CHECK(relation_type IN ('original', 'remix', 'cover', 'remake', 'picture', 'lyrics'))
)";

pub const EXTERNAL_OBJECT: &str = "CREATE TABLE external_object (
    id INTEGER PRIMARY KEY,
    uuid TEXT NOT NULL UNIQUE,
    external_source_id INTEGER NOT NULL REFERENCES external_source(id) ON DELETE CASCADE,
    mime_type TEXT NOT NULL,
    file_id TEXT NOT NULL
)";

pub const CREATOR_WIKI: &str = "CREATE TABLE creator_wiki (
    creator_id INTEGER NOT NULL REFERENCES creator(id) ON DELETE CASCADE,
    platform TEXT NOT NULL,
    identifier TEXT NOT NULL,
    PRIMARY KEY (creator_id, platform)
)";

pub const WORK_LICENSE: &str = "CREATE TABLE work_license (
    work_id INTEGER PRIMARY KEY REFERENCES work(id) ON DELETE CASCADE,
    license_type TEXT NOT NULL
)";

pub const WORK_CREATOR: &str = "CREATE TABLE work_creator (
    work_id INTEGER NOT NULL REFERENCES work(id) ON DELETE CASCADE,
    creator_id INTEGER NOT NULL REFERENCES creator(id) ON DELETE CASCADE,
    role TEXT NOT NULL,
    PRIMARY KEY (work_id, creator_id, role)
)";

pub const ASSET_CREATOR: &str = "CREATE TABLE asset_creator (
    asset_id INTEGER NOT NULL REFERENCES asset(id) ON DELETE CASCADE,
    creator_id INTEGER NOT NULL REFERENCES creator(id),
    role TEXT NOT NULL,
    PRIMARY KEY (asset_id, creator_id)
)";

pub const WORK_WIKI: &str = "CREATE TABLE work_wiki (
    work_id INTEGER NOT NULL REFERENCES work(id) ON DELETE CASCADE,
    platform TEXT NOT NULL,
    identifier TEXT NOT NULL,
    PRIMARY KEY (work_id, platform)
)";

pub const WORK_TAG: &str = "CREATE TABLE work_tag (
    work_id INTEGER NOT NULL REFERENCES work(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tag(id) ON DELETE CASCADE,
    PRIMARY KEY (work_id, tag_id)
)";

pub const WORK_CATEGORY: &str = "CREATE TABLE work_category (
    work_id INTEGER NOT NULL REFERENCES work(id) ON DELETE CASCADE,
    category_id INTEGER NOT NULL REFERENCES category(id) ON DELETE CASCADE,
    PRIMARY KEY (work_id, category_id)
)";

pub const ASSET_EXTERNAL_OBJECT: &str = "CREATE TABLE asset_external_object (
    asset_id INTEGER NOT NULL REFERENCES asset(id) ON DELETE CASCADE,
    external_object_id INTEGER NOT NULL REFERENCES external_object(id) ON DELETE CASCADE,
    PRIMARY KEY (asset_id, external_object_id)
)";

pub const MEDIA_SOURCE_EXTERNAL_OBJECT: &str = "CREATE TABLE media_source_external_object (
    media_source_id INTEGER NOT NULL REFERENCES media_source(id) ON DELETE CASCADE,
    external_object_id INTEGER NOT NULL REFERENCES external_object(id) ON DELETE CASCADE,
    PRIMARY KEY (media_source_id, external_object_id)
)";

const ENTITY: &str = "rowid AS id, *";
const ALL: &str = "*";

fn forward() -> Vec<TableRebuild> {
    vec![
        TableRebuild::new(
            "creator",
            ENTITY,
            CREATOR,
            "INSERT INTO creator (id, uuid, name, type)
             SELECT id, uuid, name, type FROM creator__shadow",
        ),
        TableRebuild::new(
            "work",
            ENTITY,
            WORK,
            "INSERT INTO work (id, uuid, copyright_basis)
             SELECT id, uuid, copyright_basis FROM work__shadow",
        ),
        TableRebuild::new(
            "tag",
            ENTITY,
            TAG,
            "INSERT INTO tag (id, uuid, name) SELECT id, uuid, name FROM tag__shadow",
        ),
        TableRebuild::new(
            "category",
            ENTITY,
            CATEGORY,
            "INSERT INTO category (id, uuid, name, parent_id)
             SELECT c.id, c.uuid, c.name, p.id
             FROM category__shadow c
             LEFT JOIN category__shadow p ON c.parent_uuid = p.uuid",
        ),
        TableRebuild::new(
            "footer_settings",
            ENTITY,
            FOOTER_SETTINGS,
            "INSERT INTO footer_settings (id, uuid, item_type, text, url, icon_class)
             SELECT id, uuid, item_type, text, url, icon_class FROM footer_settings__shadow",
        ),
        TableRebuild::new(
            "external_source",
            ENTITY,
            EXTERNAL_SOURCE,
            "INSERT INTO external_source (id, uuid, type, name, endpoint)
             SELECT id, uuid, type, name, endpoint FROM external_source__shadow",
        ),
        TableRebuild::new(
            "work_title",
            ENTITY,
            WORK_TITLE,
            "INSERT INTO work_title (id, uuid, work_id, is_official, is_for_search, language, title)
             SELECT s.id, s.uuid, w.id, s.is_official, s.is_for_search, s.language, s.title
             FROM work_title__shadow s
             JOIN work w ON s.work_uuid = w.uuid",
        ),
        TableRebuild::new(
            "media_source",
            ENTITY,
            MEDIA_SOURCE,
            "INSERT INTO media_source (id, uuid, work_id, is_music, file_name, url, mime_type, info)
             SELECT s.id, s.uuid, w.id, s.is_music, s.file_name, s.url, s.mime_type, s.info
             FROM media_source__shadow s
             JOIN work w ON s.work_uuid = w.uuid",
        ),
        TableRebuild::new(
            "asset",
            ENTITY,
            ASSET,
            "INSERT INTO asset (id, uuid, file_id, work_id, asset_type, file_name, is_previewpic, language)
             SELECT s.id, s.uuid, s.file_id, w.id, s.asset_type, s.file_name, s.is_previewpic, s.language
             FROM asset__shadow s
             JOIN work w ON s.work_uuid = w.uuid",
        ),
        TableRebuild::new(
            "work_relation",
            ENTITY,
            WORK_RELATION,
            "INSERT INTO work_relation (id, uuid, from_work_id, to_work_id, relation_type)
             SELECT s.id, s.uuid, fw.id, tw.id, s.relation_type
             FROM work_relation__shadow s
             JOIN work fw ON s.from_work_uuid = fw.uuid
             JOIN work tw ON s.to_work_uuid = tw.uuid",
        ),
        TableRebuild::new(
            "external_object",
            ENTITY,
            EXTERNAL_OBJECT,
            "INSERT INTO external_object (id, uuid, external_source_id, mime_type, file_id)
             SELECT s.id, s.uuid, es.id, s.mime_type, s.file_id
             FROM external_object__shadow s
             JOIN external_source es ON s.external_source_uuid = es.uuid",
        ),
        TableRebuild::new(
            "creator_wiki",
            ALL,
            CREATOR_WIKI,
            "INSERT INTO creator_wiki (creator_id, platform, identifier)
             SELECT c.id, s.platform, s.identifier
             FROM creator_wiki__shadow s
             JOIN creator c ON s.creator_uuid = c.uuid",
        ),
        TableRebuild::new(
            "work_license",
            ALL,
            WORK_LICENSE,
            "INSERT INTO work_license (work_id, license_type)
             SELECT w.id, s.license_type
             FROM work_license__shadow s
             JOIN work w ON s.work_uuid = w.uuid",
        ),
        TableRebuild::new(
            "work_creator",
            ALL,
            WORK_CREATOR,
            "INSERT INTO work_creator (work_id, creator_id, role)
             SELECT w.id, c.id, s.role
             FROM work_creator__shadow s
             JOIN work w ON s.work_uuid = w.uuid
             JOIN creator c ON s.creator_uuid = c.uuid",
        ),
        TableRebuild::new(
            "asset_creator",
            ALL,
            ASSET_CREATOR,
            "INSERT INTO asset_creator (asset_id, creator_id, role)
             SELECT a.id, c.id, s.role
             FROM asset_creator__shadow s
             JOIN asset a ON s.asset_uuid = a.uuid
             JOIN creator c ON s.creator_uuid = c.uuid",
        ),
        TableRebuild::new(
            "work_wiki",
            ALL,
            WORK_WIKI,
            "INSERT INTO work_wiki (work_id, platform, identifier)
             SELECT w.id, s.platform, s.identifier
             FROM work_wiki__shadow s
             JOIN work w ON s.work_uuid = w.uuid",
        ),
        TableRebuild::new(
            "work_tag",
            ALL,
            WORK_TAG,
            "INSERT INTO work_tag (work_id, tag_id)
             SELECT w.id, t.id
             FROM work_tag__shadow s
             JOIN work w ON s.work_uuid = w.uuid
             JOIN tag t ON s.tag_uuid = t.uuid",
        ),
        TableRebuild::new(
            "work_category",
            ALL,
            WORK_CATEGORY,
            "INSERT INTO work_category (work_id, category_id)
             SELECT w.id, c.id
             FROM work_category__shadow s
             JOIN work w ON s.work_uuid = w.uuid
             JOIN category c ON s.category_uuid = c.uuid",
        ),
        TableRebuild::new(
            "asset_external_object",
            ALL,
            ASSET_EXTERNAL_OBJECT,
            "INSERT INTO asset_external_object (asset_id, external_object_id)
             SELECT a.id, eo.id
             FROM asset_external_object__shadow s
             JOIN asset a ON s.asset_uuid = a.uuid
             JOIN external_object eo ON s.external_object_uuid = eo.uuid",
        ),
        TableRebuild::new(
            "media_source_external_object",
            ALL,
            MEDIA_SOURCE_EXTERNAL_OBJECT,
            "INSERT INTO media_source_external_object (media_source_id, external_object_id)
             SELECT ms.id, eo.id
             FROM media_source_external_object__shadow s
             JOIN media_source ms ON s.media_source_uuid = ms.uuid
             JOIN external_object eo ON s.external_object_uuid = eo.uuid",
        ),
    ]
}

// Entity ids become rowids again; references are resolved through the shadows
// because the restored tables no longer carry ids.
fn backward() -> Vec<TableRebuild> {
    vec![
        TableRebuild::new(
            "creator",
            ALL,
            schema::CREATOR,
            "INSERT INTO creator (rowid, uuid, name, type)
             SELECT id, uuid, name, type FROM creator__shadow",
        ),
        TableRebuild::new(
            "work",
            ALL,
            schema::WORK,
            "INSERT INTO work (rowid, uuid, copyright_basis)
             SELECT id, uuid, copyright_basis FROM work__shadow",
        ),
        TableRebuild::new(
            "tag",
            ALL,
            schema::TAG,
            "INSERT INTO tag (rowid, uuid, name) SELECT id, uuid, name FROM tag__shadow",
        ),
        TableRebuild::new(
            "category",
            ALL,
            schema::CATEGORY,
            "INSERT INTO category (rowid, uuid, name, parent_uuid)
             SELECT c.id, c.uuid, c.name, p.uuid
             FROM category__shadow c
             LEFT JOIN category__shadow p ON c.parent_id = p.id",
        ),
        TableRebuild::new(
            "footer_settings",
            ALL,
            schema::FOOTER_SETTINGS,
            "INSERT INTO footer_settings (rowid, uuid, item_type, text, url, icon_class)
             SELECT id, uuid, item_type, text, url, icon_class FROM footer_settings__shadow",
        ),
        TableRebuild::new(
            "external_source",
            ALL,
            schema::EXTERNAL_SOURCE,
            "INSERT INTO external_source (rowid, uuid, type, name, endpoint)
             SELECT id, uuid, type, name, endpoint FROM external_source__shadow",
        ),
        TableRebuild::new(
            "work_title",
            ALL,
            schema::WORK_TITLE,
            "INSERT INTO work_title (rowid, uuid, work_uuid, is_official, is_for_search, language, title)
             SELECT s.id, s.uuid, w.uuid, s.is_official, s.is_for_search, s.language, s.title
             FROM work_title__shadow s
             JOIN work__shadow w ON s.work_id = w.id",
        ),
        TableRebuild::new(
            "media_source",
            ALL,
            schema::MEDIA_SOURCE,
            "INSERT INTO media_source (rowid, uuid, work_uuid, is_music, file_name, url, mime_type, info)
             SELECT s.id, s.uuid, w.uuid, s.is_music, s.file_name, s.url, s.mime_type, s.info
             FROM media_source__shadow s
             JOIN work__shadow w ON s.work_id = w.id",
        ),
        TableRebuild::new(
            "asset",
            ALL,
            schema::ASSET,
            "INSERT INTO asset (rowid, uuid, file_id, work_uuid, asset_type, file_name, is_previewpic, language)
             SELECT s.id, s.uuid, s.file_id, w.uuid, s.asset_type, s.file_name, s.is_previewpic, s.language
             FROM asset__shadow s
             JOIN work__shadow w ON s.work_id = w.id",
        ),
        TableRebuild::new(
            "work_relation",
            ALL,
            schema::WORK_RELATION,
            "INSERT INTO work_relation (rowid, uuid, from_work_uuid, to_work_uuid, relation_type)
             SELECT s.id, s.uuid, fw.uuid, tw.uuid, s.relation_type
             FROM work_relation__shadow s
             JOIN work__shadow fw ON s.from_work_id = fw.id
             JOIN work__shadow tw ON s.to_work_id = tw.id",
        ),
        TableRebuild::new(
            "external_object",
            ALL,
            schema::EXTERNAL_OBJECT,
            "INSERT INTO external_object (rowid, uuid, external_source_uuid, mime_type, file_id)
             SELECT s.id, s.uuid, es.uuid, s.mime_type, s.file_id
             FROM external_object__shadow s
             JOIN external_source__shadow es ON s.external_source_id = es.id",
        ),
        TableRebuild::new(
            "creator_wiki",
            ALL,
            schema::CREATOR_WIKI,
            "INSERT INTO creator_wiki (creator_uuid, platform, identifier)
             SELECT c.uuid, s.platform, s.identifier
             FROM creator_wiki__shadow s
             JOIN creator__shadow c ON s.creator_id = c.id",
        ),
        TableRebuild::new(
            "work_license",
            ALL,
            schema::WORK_LICENSE,
            "INSERT INTO work_license (work_uuid, license_type)
             SELECT w.uuid, s.license_type
             FROM work_license__shadow s
             JOIN work__shadow w ON s.work_id = w.id",
        ),
        TableRebuild::new(
            "work_creator",
            ALL,
            schema::WORK_CREATOR,
            "INSERT INTO work_creator (work_uuid, creator_uuid, role)
             SELECT w.uuid, c.uuid, s.role
             FROM work_creator__shadow s
             JOIN work__shadow w ON s.work_id = w.id
             JOIN creator__shadow c ON s.creator_id = c.id",
        ),
        TableRebuild::new(
            "asset_creator",
            ALL,
            schema::ASSET_CREATOR,
            "INSERT INTO asset_creator (asset_uuid, creator_uuid, role)
             SELECT a.uuid, c.uuid, s.role
             FROM asset_creator__shadow s
             JOIN asset__shadow a ON s.asset_id = a.id
             JOIN creator__shadow c ON s.creator_id = c.id",
        ),
        TableRebuild::new(
            "work_wiki",
            ALL,
            schema::WORK_WIKI,
            "INSERT INTO work_wiki (work_uuid, platform, identifier)
             SELECT w.uuid, s.platform, s.identifier
             FROM work_wiki__shadow s
             JOIN work__shadow w ON s.work_id = w.id",
        ),
        TableRebuild::new(
            "work_tag",
            ALL,
            schema::WORK_TAG,
            "INSERT INTO work_tag (work_uuid, tag_uuid)
             SELECT w.uuid, t.uuid
             FROM work_tag__shadow s
             JOIN work__shadow w ON s.work_id = w.id
             JOIN tag__shadow t ON s.tag_id = t.id",
        ),
        TableRebuild::new(
            "work_category",
            ALL,
            schema::WORK_CATEGORY,
            "INSERT INTO work_category (work_uuid, category_uuid)
             SELECT w.uuid, c.uuid
             FROM work_category__shadow s
             JOIN work__shadow w ON s.work_id = w.id
             JOIN category__shadow c ON s.category_id = c.id",
        ),
        TableRebuild::new(
            "asset_external_object",
            ALL,
            schema::ASSET_EXTERNAL_OBJECT,
            "INSERT INTO asset_external_object (asset_uuid, external_object_uuid)
             SELECT a.uuid, eo.uuid
             FROM asset_external_object__shadow s
             JOIN asset__shadow a ON s.asset_id = a.id
             JOIN external_object__shadow eo ON s.external_object_id = eo.id",
        ),
        TableRebuild::new(
            "media_source_external_object",
            ALL,
            schema::MEDIA_SOURCE_EXTERNAL_OBJECT,
            "INSERT INTO media_source_external_object (media_source_uuid, external_object_uuid)
             SELECT ms.uuid, eo.uuid
             FROM media_source_external_object__shadow s
             JOIN media_source__shadow ms ON s.media_source_id = ms.id
             JOIN external_object__shadow eo ON s.external_object_id = eo.id",
        ),
    ]
}

pub struct UuidToId;

#[async_trait]
impl Migration for UuidToId {
    fn version(&self) -> i64 {
        1
    }

    fn description(&self) -> &str {
        "Integer primary keys, UUIDs kept as unique external keys"
    }

    async fn up(&self, ctx: &MigrationContext<'_>) -> anyhow::Result<()> {
        rebuild_tables(ctx.db, "uuid_to_id", &forward()).await
    }

    async fn down(&self, ctx: &MigrationContext<'_>) -> anyhow::Result<()> {
        rebuild_tables(ctx.db, "id_to_uuid", &backward()).await
    }
}
