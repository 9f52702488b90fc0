use crate::migration::definition::{Migration, MigrationContext};
use async_trait::async_trait;
use sqlx::SqliteConnection;
use tracing::{info, warn};

const CREATE_WIKI_PLATFORM: &str = "CREATE TABLE IF NOT EXISTS wiki_platform (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    platform_key TEXT NOT NULL UNIQUE,
    platform_name TEXT NOT NULL,
    url_template TEXT NOT NULL,
    icon_class TEXT
)";

struct Platform {
    key: &'static str,
    name: &'static str,
    url_template: &'static str,
    icon_class: &'static str,
}

const DEFAULT_PLATFORMS: &[Platform] = &[
    Platform {
        key: "wikipedia_zh",
        name: "维基百科(中文)",
        url_template: "https://zh.wikipedia.org/wiki/{ENCODED_ID}",
        icon_class: "fa-wikipedia-w",
    },
    Platform {
        key: "wikipedia_ja",
        name: "Wikipedia(日本語)",
        url_template: "https://ja.wikipedia.org/wiki/{ENCODED_ID}",
        icon_class: "fa-wikipedia-w",
    },
    Platform {
        key: "moegirlpedia",
        name: "萌娘百科",
        url_template: "https://zh.moegirl.org.cn/{ENCODED_ID}",
        icon_class: "fa-book",
    },
    Platform {
        key: "thwiki",
        name: "THBWiki",
        url_template: "https://thwiki.cc/{ENCODED_ID}",
        icon_class: "fa-book",
    },
    Platform {
        key: "vocadb",
        name: "VocaDB",
        url_template: "https://vocadb.net/S/{ID}",
        icon_class: "fa-music",
    },
    Platform {
        key: "utaitedb",
        name: "UtaiteDB",
        url_template: "https://utaitedb.net/Ar/{ID}",
        icon_class: "fa-microphone",
    },
    Platform {
        key: "niconico",
        name: "ニコニコ動画",
        url_template: "https://www.nicovideo.jp/watch/{ID}",
        icon_class: "fa-play-circle",
    },
    Platform {
        key: "bilibili",
        name: "哔哩哔哩",
        url_template: "https://www.bilibili.com/video/{ID}",
        icon_class: "fa-play-circle",
    },
    Platform {
        key: "youtube",
        name: "YouTube",
        url_template: "https://www.youtube.com/watch?v={ID}",
        icon_class: "fa-youtube",
    },
    Platform {
        key: "twitter",
        name: "Twitter/X",
        url_template: "https://twitter.com/{ID}",
        icon_class: "fa-twitter",
    },
    Platform {
        key: "pixiv",
        name: "Pixiv",
        url_template: "https://www.pixiv.net/users/{ID}",
        icon_class: "fa-paint-brush",
    },
    Platform {
        key: "baidu_baike",
        name: "百度百科",
        url_template: "https://baike.baidu.com/item/{ENCODED_ID}",
        icon_class: "fa-book",
    },
];

/// Legacy platform keys and their replacements.
const RENAMED_KEYS: &[(&str, &str)] = &[
    ("moegirl", "moegirlpedia"),
    ("baidu", "baidu_baike"),
    ("thbwiki", "thwiki"),
];

const WIKI_TABLES: &[&str] = &["work_wiki", "creator_wiki"];

/// Moves wiki links from platform key `from` to `to`.
///
/// An entity that already has a link under `to` keeps that link and loses the
/// one under `from`.
async fn rename_platform(
    conn: &mut SqliteConnection,
    table: &str,
    from: &str,
    to: &str,
) -> anyhow::Result<()> {
    let renamed = sqlx::query(&format!(
        "UPDATE OR IGNORE {} SET platform = ? WHERE platform = ?",
        table
    ))
    .bind(to)
    .bind(from)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    let dropped = sqlx::query(&format!("DELETE FROM {} WHERE platform = ?", table))
        .bind(from)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    if renamed > 0 {
        info!("{}: platform '{}' -> '{}' ({} rows)", table, from, to, renamed);
    }
    if dropped > 0 {
        warn!(
            "{}: dropped {} '{}' links shadowed by existing '{}' links",
            table, dropped, from, to
        );
    }
    Ok(())
}

pub struct AddWikiPlatforms;

#[async_trait]
impl Migration for AddWikiPlatforms {
    fn version(&self) -> i64 {
        2
    }

    fn description(&self) -> &str {
        "Wiki platform registry with URL templates"
    }

    async fn up(&self, ctx: &MigrationContext<'_>) -> anyhow::Result<()> {
        let mut tx = ctx.db.pool().begin().await?;

        sqlx::query(CREATE_WIKI_PLATFORM).execute(&mut *tx).await?;

        let mut inserted = 0;
        for platform in DEFAULT_PLATFORMS {
            let result = sqlx::query(
                r#"
                INSERT INTO wiki_platform (platform_key, platform_name, url_template, icon_class)
                VALUES (?, ?, ?, ?)
                ON CONFLICT (platform_key) DO NOTHING
            "#,
            )
            .bind(platform.key)
            .bind(platform.name)
            .bind(platform.url_template)
            .bind(platform.icon_class)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        info!(
            "Seeded {} of {} default wiki platforms",
            inserted,
            DEFAULT_PLATFORMS.len()
        );

        for table in WIKI_TABLES {
            for (old, new) in RENAMED_KEYS {
                rename_platform(&mut tx, table, old, new).await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn down(&self, ctx: &MigrationContext<'_>) -> anyhow::Result<()> {
        let mut tx = ctx.db.pool().begin().await?;

        for table in WIKI_TABLES {
            for (old, new) in RENAMED_KEYS {
                rename_platform(&mut tx, table, new, old).await?;
            }
        }

        sqlx::query("DROP TABLE IF EXISTS wiki_platform")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
