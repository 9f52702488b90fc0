pub mod config;
pub mod db;
pub mod http;
pub mod migration;
pub use db::SqliteDatabase;
pub use migration::{MigrationEngine, MigrationRegistry};
