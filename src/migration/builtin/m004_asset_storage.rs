use crate::db::site_config;
use crate::migration::definition::{
    format_number, Migration, MigrationContext, ParameterDefinition, ParameterType,
    ParameterValue,
};
use async_trait::async_trait;
use tracing::info;

pub const ASSET_URL_KEY: &str = "asset_url";
pub const ASSET_BATCH_SIZE_KEY: &str = "asset_batch_size";

/// Stores where asset files are served from. Requires `asset_url`.
pub struct ConfigureAssetStorage;

#[async_trait]
impl Migration for ConfigureAssetStorage {
    fn version(&self) -> i64 {
        4
    }

    fn description(&self) -> &str {
        "Asset storage base URL and transfer batch size"
    }

    fn parameters(&self) -> Vec<ParameterDefinition> {
        vec![
            ParameterDefinition::new(
                "asset_url",
                ParameterType::Url,
                "Base URL asset files are served from",
            )
            .required()
            .pattern("^https?://.+"),
            ParameterDefinition::new(
                "batch_size",
                ParameterType::Number,
                "Number of assets processed per transfer batch",
            )
            .default_value(ParameterValue::Number(50.0))
            .min(1.0)
            .max(1000.0),
        ]
    }

    async fn up(&self, ctx: &MigrationContext<'_>) -> anyhow::Result<()> {
        let asset_url = ctx.str_param("asset_url")?;
        let batch_size = ctx.number_param("batch_size")?;

        site_config::upsert(
            ctx.db,
            ASSET_URL_KEY,
            asset_url,
            Some("Base URL for asset files"),
        )
        .await?;
        site_config::upsert(
            ctx.db,
            ASSET_BATCH_SIZE_KEY,
            &format_number(batch_size),
            Some("Assets per transfer batch"),
        )
        .await?;

        info!("Asset storage configured at {}", asset_url);
        Ok(())
    }

    async fn down(&self, ctx: &MigrationContext<'_>) -> anyhow::Result<()> {
        site_config::delete(ctx.db, ASSET_URL_KEY).await?;
        site_config::delete(ctx.db, ASSET_BATCH_SIZE_KEY).await?;
        Ok(())
    }
}
