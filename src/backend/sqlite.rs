//! Local `SQLite` backend built on `SeaORM`.
//!
//! Every tenant is a separate database: a `<name>.sqlite` file inside the data
//! directory, or a private in-memory database when running in memory mode.
//! Connections are opened lazily and kept for the lifetime of the backend.

use super::{
    Backend, CategoryRecord, CategoryUpdate, DEFAULT_TENANT, ExpenseRecord, ExpenseUpdate,
    LedgerData, NewExpense, TenantList,
};
use crate::{
    config::database::{self, MEMORY_URL, TENANT_FILE_EXTENSION},
    entities::{
        CategoryEntity, ExpenseColumn, ExpenseEntity, SettingEntity, category, expense, setting,
    },
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{
    DatabaseConnection, QueryOrder, Set, TransactionTrait, prelude::*, sea_query::OnConflict,
};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

const SALARY_KEY: &str = "salary";

#[derive(Debug, Clone)]
enum Storage {
    Directory(PathBuf),
    Memory,
}

#[derive(Debug)]
struct Tenants {
    connections: BTreeMap<String, Option<DatabaseConnection>>,
    active: String,
}

/// A backend storing each tenant in its own `SQLite` database.
#[derive(Debug)]
pub struct SqliteBackend {
    storage: Storage,
    tenants: RwLock<Tenants>,
}

impl SqliteBackend {
    /// Opens (or creates) a data directory. Existing `*.sqlite` files become tenants.
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let mut connections = BTreeMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            let is_tenant = path
                .extension()
                .is_some_and(|ext| ext == TENANT_FILE_EXTENSION);
            if let (true, Some(stem)) = (is_tenant, path.file_stem().and_then(|s| s.to_str())) {
                connections.insert(stem.to_string(), None);
            }
        }
        connections
            .entry(DEFAULT_TENANT.to_string())
            .or_insert(None);
        info!(dir = %dir.display(), tenants = connections.len(), "opened sqlite data directory");

        let backend = Self {
            storage: Storage::Directory(dir),
            tenants: RwLock::new(Tenants {
                connections,
                active: DEFAULT_TENANT.to_string(),
            }),
        };
        backend.active_connection().await?;
        Ok(backend)
    }

    /// Creates a backend whose tenants are private in-memory databases.
    pub async fn in_memory() -> Result<Self> {
        let mut connections = BTreeMap::new();
        connections.insert(DEFAULT_TENANT.to_string(), None);
        let backend = Self {
            storage: Storage::Memory,
            tenants: RwLock::new(Tenants {
                connections,
                active: DEFAULT_TENANT.to_string(),
            }),
        };
        backend.active_connection().await?;
        Ok(backend)
    }

    fn url_for(&self, tenant: &str) -> String {
        match &self.storage {
            Storage::Directory(dir) => database::tenant_url(dir, tenant),
            Storage::Memory => MEMORY_URL.to_string(),
        }
    }

    /// Connection of the active tenant, opened on first use.
    async fn active_connection(&self) -> Result<DatabaseConnection> {
        let mut tenants = self.tenants.write().await;
        let active = tenants.active.clone();
        if let Some(Some(db)) = tenants.connections.get(&active) {
            return Ok(db.clone());
        }
        let db = database::connect(&self.url_for(&active)).await?;
        tenants.connections.insert(active, Some(db.clone()));
        Ok(db)
    }
}

fn not_found(entity: &'static str, id: &str) -> Error {
    Error::NotFound {
        entity,
        id: id.to_string(),
    }
}

impl Backend for SqliteBackend {
    #[instrument(skip(self))]
    async fn load_data(&self) -> Result<LedgerData> {
        let db = self.active_connection().await?;
        // Rowid order, which is insertion order
        let categories = CategoryEntity::find().all(&db).await?;
        let expenses = ExpenseEntity::find()
            .order_by_asc(ExpenseColumn::Date)
            .all(&db)
            .await?;

        let mut data = LedgerData {
            categories: categories
                .into_iter()
                .map(|c| CategoryRecord {
                    id: c.id,
                    name: c.name,
                    budget: c.budget,
                })
                .collect(),
            ..LedgerData::default()
        };
        for e in expenses {
            data.expenses
                .entry(e.category_id)
                .or_default()
                .push(ExpenseRecord {
                    id: e.id,
                    category_id: None,
                    description: e.description,
                    amount: e.amount,
                    date: e.date,
                });
        }
        Ok(data)
    }

    async fn load_salary(&self) -> Result<f64> {
        let db = self.active_connection().await?;
        let Some(row) = SettingEntity::find_by_id(SALARY_KEY).one(&db).await? else {
            return Ok(0.0);
        };
        row.value.parse().map_err(|e| Error::Config {
            message: format!("Stored salary {:?} is not a number: {e}", row.value),
        })
    }

    async fn add_category(&self, category: &CategoryRecord) -> Result<()> {
        let db = self.active_connection().await?;
        let model = category::ActiveModel {
            id: Set(category.id.clone()),
            name: Set(category.name.clone()),
            budget: Set(category.budget),
        };
        // A retried create may find the row already stored; keep the latest values
        CategoryEntity::insert(model)
            .on_conflict(
                OnConflict::column(category::Column::Id)
                    .update_columns([category::Column::Name, category::Column::Budget])
                    .to_owned(),
            )
            .exec_without_returning(&db)
            .await?;
        Ok(())
    }

    async fn update_category(&self, id: &str, update: &CategoryUpdate) -> Result<()> {
        let db = self.active_connection().await?;
        let existing = CategoryEntity::find_by_id(id)
            .one(&db)
            .await?
            .ok_or_else(|| not_found("Category", id))?;
        let mut active_model: category::ActiveModel = existing.into();
        active_model.name = Set(update.name.clone());
        active_model.budget = Set(update.budget);
        active_model.update(&db).await?;
        Ok(())
    }

    async fn delete_category(&self, id: &str) -> Result<()> {
        let db = self.active_connection().await?;
        // Expenses first: the foreign key forbids orphaning them
        let txn = db.begin().await?;
        ExpenseEntity::delete_many()
            .filter(ExpenseColumn::CategoryId.eq(id))
            .exec(&txn)
            .await?;
        CategoryEntity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn add_expense(&self, new_expense: &NewExpense) -> Result<()> {
        let db = self.active_connection().await?;
        let model = expense::ActiveModel {
            id: Set(new_expense.id.clone()),
            category_id: Set(new_expense.category_id.clone()),
            description: Set(new_expense.description.clone()),
            amount: Set(new_expense.amount),
            date: Set(new_expense.date),
        };
        ExpenseEntity::insert(model)
            .on_conflict(
                OnConflict::column(ExpenseColumn::Id)
                    .update_columns([
                        ExpenseColumn::CategoryId,
                        ExpenseColumn::Description,
                        ExpenseColumn::Amount,
                        ExpenseColumn::Date,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&db)
            .await?;
        Ok(())
    }

    async fn update_expense(&self, id: &str, update: &ExpenseUpdate) -> Result<()> {
        let db = self.active_connection().await?;
        let existing = ExpenseEntity::find_by_id(id)
            .one(&db)
            .await?
            .ok_or_else(|| not_found("Expense", id))?;
        let mut active_model: expense::ActiveModel = existing.into();
        active_model.description = Set(update.description.clone());
        active_model.amount = Set(update.amount);
        active_model.update(&db).await?;
        Ok(())
    }

    async fn delete_expense(&self, id: &str) -> Result<()> {
        let db = self.active_connection().await?;
        ExpenseEntity::delete_by_id(id).exec(&db).await?;
        Ok(())
    }

    async fn update_salary(&self, amount: f64) -> Result<()> {
        let db = self.active_connection().await?;
        let model = setting::ActiveModel {
            key: Set(SALARY_KEY.to_string()),
            value: Set(amount.to_string()),
            updated_at: Set(Utc::now()),
        };
        SettingEntity::insert(model)
            .on_conflict(
                OnConflict::column(setting::Column::Key)
                    .update_columns([setting::Column::Value, setting::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(&db)
            .await?;
        Ok(())
    }

    async fn list_tenants(&self) -> Result<TenantList> {
        let tenants = self.tenants.read().await;
        Ok(TenantList {
            databases: tenants.connections.keys().cloned().collect(),
            active: tenants.active.clone(),
        })
    }

    #[instrument(skip(self))]
    async fn create_tenant(&self, name: &str) -> Result<()> {
        database::validate_tenant_name(name)?;
        let mut tenants = self.tenants.write().await;
        if tenants.connections.contains_key(name) {
            return Err(Error::validation(format!(
                "Database \"{name}\" already exists"
            )));
        }
        let db = database::connect(&self.url_for(name)).await?;
        tenants.connections.insert(name.to_string(), Some(db));
        debug!(name, "tenant database created");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn switch_tenant(&self, name: &str) -> Result<()> {
        {
            let mut tenants = self.tenants.write().await;
            if !tenants.connections.contains_key(name) {
                return Err(not_found("Tenant", name));
            }
            tenants.active = name.to_string();
        }
        self.active_connection().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use chrono::TimeZone;

    fn food() -> CategoryRecord {
        CategoryRecord {
            id: "cat_food".to_string(),
            name: "Food".to_string(),
            budget: 200.0,
        }
    }

    fn lunch() -> NewExpense {
        NewExpense {
            id: "exp_lunch".to_string(),
            category_id: "cat_food".to_string(),
            description: "Lunch".to_string(),
            amount: 12.5,
            date: Utc.with_ymd_and_hms(2025, 4, 2, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_category_and_expense_roundtrip() -> Result<()> {
        let backend = SqliteBackend::in_memory().await?;
        backend.add_category(&food()).await?;
        backend.add_expense(&lunch()).await?;
        backend
            .update_expense(
                "exp_lunch",
                &ExpenseUpdate {
                    description: "Big lunch".to_string(),
                    amount: 20.0,
                },
            )
            .await?;

        let data = backend.load_data().await?;
        assert_eq!(data.categories, vec![food()]);
        let expenses = &data.expenses["cat_food"];
        assert_eq!(expenses.len(), 1);
        assert_eq!(expenses[0].description, "Big lunch");
        assert_eq!(expenses[0].amount, 20.0);
        assert_eq!(expenses[0].date, lunch().date);
        Ok(())
    }

    #[tokio::test]
    async fn test_repeated_inserts_overwrite_instead_of_failing() -> Result<()> {
        let backend = SqliteBackend::in_memory().await?;
        backend.add_category(&food()).await?;
        backend.add_expense(&lunch()).await?;

        let renamed = CategoryRecord {
            name: "Groceries".to_string(),
            ..food()
        };
        backend.add_category(&renamed).await?;
        let pricier = NewExpense {
            amount: 15.0,
            ..lunch()
        };
        backend.add_expense(&pricier).await?;

        let data = backend.load_data().await?;
        assert_eq!(data.categories, vec![renamed]);
        let expenses = &data.expenses["cat_food"];
        assert_eq!(expenses.len(), 1);
        assert_eq!(expenses[0].amount, 15.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_category_removes_expenses() -> Result<()> {
        let backend = SqliteBackend::in_memory().await?;
        backend.add_category(&food()).await?;
        backend.add_expense(&lunch()).await?;

        backend.delete_category("cat_food").await?;

        let data = backend.load_data().await?;
        assert!(data.categories.is_empty());
        assert!(data.expenses.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_update_missing_rows_is_not_found() -> Result<()> {
        let backend = SqliteBackend::in_memory().await?;
        let err = backend
            .update_category(
                "cat_nope",
                &CategoryUpdate {
                    name: "X".to_string(),
                    budget: 1.0,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_salary_upsert() -> Result<()> {
        let backend = SqliteBackend::in_memory().await?;
        assert_eq!(backend.load_salary().await?, 0.0);
        backend.update_salary(3000.0).await?;
        backend.update_salary(3250.5).await?;
        assert_eq!(backend.load_salary().await?, 3250.5);
        Ok(())
    }

    #[tokio::test]
    async fn test_tenants_are_separate_databases() -> Result<()> {
        let backend = SqliteBackend::in_memory().await?;
        backend.add_category(&food()).await?;

        backend.create_tenant("vacation").await?;
        let err = backend.create_tenant("vacation").await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        backend.switch_tenant("vacation").await?;
        assert!(backend.load_data().await?.categories.is_empty());
        let list = backend.list_tenants().await?;
        assert_eq!(list.databases, vec!["default", "vacation"]);
        assert_eq!(list.active, "vacation");

        backend.switch_tenant("default").await?;
        assert_eq!(backend.load_data().await?.categories.len(), 1);

        let err = backend.switch_tenant("missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_directory_storage_rediscovers_tenants() -> Result<()> {
        let dir = tempfile::tempdir()?;
        {
            let backend = SqliteBackend::open(dir.path()).await?;
            backend.create_tenant("home").await?;
            backend.switch_tenant("home").await?;
            backend.add_category(&food()).await?;
        }

        let reopened = SqliteBackend::open(dir.path()).await?;
        let list = reopened.list_tenants().await?;
        assert_eq!(list.databases, vec!["default", "home"]);
        reopened.switch_tenant("home").await?;
        assert_eq!(reopened.load_data().await?.categories, vec![food()]);
        Ok(())
    }
}
