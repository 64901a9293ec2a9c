//! SQLite persistence for search settings and catalog credentials

mod db;
mod repository;
mod store;

pub use db::{init_db, init_memory_db};
pub use repository::{CredentialRepository, SearchSettingsRepository};
pub use store::SqliteSettingsStore;
