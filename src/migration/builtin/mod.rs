//! Migrations shipped with the archive, registered in version order.

pub mod m001_uuid_to_id;
pub mod m002_wiki_platforms;
pub mod m003_ipfs_load_balancing;
pub mod m004_asset_storage;

use super::catalog::MigrationRegistry;

pub fn register_all(registry: MigrationRegistry) -> MigrationRegistry {
    registry
        .register("001_uuid_to_id", m001_uuid_to_id::UuidToId)
        .register("002_add_wiki_platforms", m002_wiki_platforms::AddWikiPlatforms)
        .register(
            "003_add_ipfs_load_balancing",
            m003_ipfs_load_balancing::AddIpfsLoadBalancing,
        )
        .register(
            "004_configure_asset_storage",
            m004_asset_storage::ConfigureAssetStorage,
        )
}
