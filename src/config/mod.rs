/// Application settings loaded from config.toml and the environment
pub mod app;
/// Tenant database paths, connections and schema creation
pub mod database;

pub use app::{AppConfig, BackendKind, CategorySeed, load_app_configuration};
