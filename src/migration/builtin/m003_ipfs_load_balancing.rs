use super::m001_uuid_to_id;
use crate::db::site_config;
use crate::migration::definition::{Migration, MigrationContext};
use crate::migration::rebuild::{rebuild_tables, TableRebuild};
use async_trait::async_trait;
use tracing::info;

pub const IPFS_GATEWAYS_KEY: &str = "ipfs_gateways";

pub const DEFAULT_GATEWAYS: &[&str] = &[
    "https://ipfs.io/ipfs/",
    "https://gateway.pinata.cloud/ipfs/",
    "https://cf-ipfs.com/ipfs/",
];

pub struct AddIpfsLoadBalancing;

#[async_trait]
impl Migration for AddIpfsLoadBalancing {
    fn version(&self) -> i64 {
        3
    }

    fn description(&self) -> &str {
        "IPFS source flag and gateway list for load balancing"
    }

    async fn up(&self, ctx: &MigrationContext<'_>) -> anyhow::Result<()> {
        if ctx.db.has_column("external_source", "is_ipfs").await? {
            info!("external_source.is_ipfs already exists, skipping");
        } else {
            ctx.db
                .execute_batch(&[
                    "ALTER TABLE external_source ADD COLUMN is_ipfs INTEGER NOT NULL DEFAULT 0",
                    "UPDATE external_source SET is_ipfs = 1 WHERE type = 'ipfs'",
                ])
                .await?;
        }

        let gateways = serde_json::to_string(DEFAULT_GATEWAYS)?;
        site_config::upsert(
            ctx.db,
            IPFS_GATEWAYS_KEY,
            &gateways,
            Some("IPFS gateways used for load balancing and failover"),
        )
        .await?;
        info!("Configured {} default IPFS gateways", DEFAULT_GATEWAYS.len());
        Ok(())
    }

    async fn down(&self, ctx: &MigrationContext<'_>) -> anyhow::Result<()> {
        site_config::delete(ctx.db, IPFS_GATEWAYS_KEY).await?;

        // Rebuilt rather than dropped with ALTER TABLE so the stored DDL is
        // the version 1 text again.
        rebuild_tables(
            ctx.db,
            "drop_is_ipfs",
            &[TableRebuild::new(
                "external_source",
                "*",
                m001_uuid_to_id::EXTERNAL_SOURCE,
                "INSERT INTO external_source (id, uuid, type, name, endpoint)
                 SELECT id, uuid, type, name, endpoint FROM external_source__shadow",
            )],
        )
        .await
    }
}
