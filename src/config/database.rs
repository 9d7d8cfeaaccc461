//! Database configuration for the local `SQLite` backend.
//!
//! Every tenant lives in its own `SQLite` database. This module turns a tenant
//! name into a connection URL, opens connections and creates the tables from
//! the entity definitions with `Schema::create_table_from_entity`, so the
//! schema always matches the Rust structs without hand-written SQL.

use crate::entities::{CategoryEntity, ExpenseEntity, SettingEntity};
use crate::errors::{Error, Result};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};
use std::path::{Path, PathBuf};
use tracing::debug;

/// URL of a shared-nothing in-memory database.
pub const MEMORY_URL: &str = "sqlite::memory:";

/// File extension of tenant database files.
pub const TENANT_FILE_EXTENSION: &str = "sqlite";

/// Path of the database file backing `tenant` inside `data_dir`.
#[must_use]
pub fn tenant_path(data_dir: &Path, tenant: &str) -> PathBuf {
    data_dir.join(format!("{tenant}.{TENANT_FILE_EXTENSION}"))
}

/// Connection URL for a tenant file, created on first use.
#[must_use]
pub fn tenant_url(data_dir: &Path, tenant: &str) -> String {
    format!("sqlite://{}?mode=rwc", tenant_path(data_dir, tenant).display())
}

/// Rejects tenant names that cannot safely become file names.
pub fn validate_tenant_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "Database name \"{name}\" may only contain letters, digits, '-' and '_'"
        )))
    }
}

/// Opens a connection and makes sure all tables exist.
pub async fn connect(url: &str) -> Result<DatabaseConnection> {
    debug!(url, "opening tenant database");
    let db = Database::connect(url).await?;
    create_tables(&db).await?;
    Ok(db)
}

/// Creates the category, expense and settings tables if they are missing.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut category_table = schema.create_table_from_entity(CategoryEntity);
    let mut expense_table = schema.create_table_from_entity(ExpenseEntity);
    let mut setting_table = schema.create_table_from_entity(SettingEntity);

    category_table.if_not_exists();
    expense_table.if_not_exists();
    setting_table.if_not_exists();

    db.execute(builder.build(&category_table)).await?;
    db.execute(builder.build(&expense_table)).await?;
    db.execute(builder.build(&setting_table)).await?;

    Ok(())
}
