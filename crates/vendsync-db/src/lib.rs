pub mod config;
pub mod database;
mod error;
pub mod harvest_repository;
pub mod hub_repository;
pub mod target_repository;

pub use config::DatabaseConfig;
pub use database::Database;
pub use harvest_repository::HarvestRepository;
pub use hub_repository::HubRepository;
pub use target_repository::TargetRepository;
