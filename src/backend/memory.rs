//! In-memory backend used by tests and the offline demo mode.
//!
//! Tenants are plain maps behind a `tokio` lock. Faults can be injected with
//! [`MemoryBackend::set_offline`] and [`MemoryBackend::fail_next`], and every
//! successful write is appended to an operation log so tests can check the
//! order in which calls arrived.

use super::{
    Backend, CategoryRecord, CategoryUpdate, DEFAULT_TENANT, ExpenseRecord, ExpenseUpdate,
    LedgerData, NewExpense, TenantList,
};
use crate::errors::{Error, Result};
use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    time::Duration,
};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct TenantData {
    categories: Vec<CategoryRecord>,
    expenses: Vec<NewExpense>,
    salary: f64,
}

#[derive(Debug)]
struct State {
    tenants: BTreeMap<String, TenantData>,
    active: String,
    log: Vec<String>,
}

impl State {
    fn active_mut(&mut self) -> Result<&mut TenantData> {
        let active = self.active.clone();
        self.tenants.get_mut(&active).ok_or(Error::NotFound {
            entity: "Tenant",
            id: active,
        })
    }
}

/// A backend that keeps every tenant in process memory.
#[derive(Debug)]
pub struct MemoryBackend {
    state: RwLock<State>,
    offline: AtomicBool,
    failures: AtomicUsize,
    latency_ms: AtomicU64,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Creates a backend with a single empty `default` tenant.
    #[must_use]
    pub fn new() -> Self {
        let mut tenants = BTreeMap::new();
        tenants.insert(DEFAULT_TENANT.to_string(), TenantData::default());
        Self {
            state: RwLock::new(State {
                tenants,
                active: DEFAULT_TENANT.to_string(),
                log: Vec::new(),
            }),
            offline: AtomicBool::new(false),
            failures: AtomicUsize::new(0),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Makes every call fail with a network error until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes the next `count` calls fail with a network error.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Delays every call by `latency` before it is answered.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Successful write calls, oldest first, e.g. `update_expense exp_1 Lunch`.
    pub async fn operation_log(&self) -> Vec<String> {
        self.state.read().await.log.clone()
    }

    /// Description of an expense stored in the active tenant.
    pub async fn expense_description(&self, id: &str) -> Option<String> {
        let state = self.state.read().await;
        state
            .tenants
            .get(&state.active)?
            .expenses
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.description.clone())
    }

    async fn check_fault(&self) -> Result<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::network("backend offline"));
        }
        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(Error::network("injected failure"));
        }
        Ok(())
    }

    async fn write<F>(&self, entry: String, apply: F) -> Result<()>
    where
        F: FnOnce(&mut TenantData) -> Result<()> + Send,
    {
        self.check_fault().await?;
        let mut state = self.state.write().await;
        apply(state.active_mut()?)?;
        debug!(%entry, "memory backend write");
        state.log.push(entry);
        Ok(())
    }
}

fn missing(entity: &'static str, id: &str) -> Error {
    Error::NotFound {
        entity,
        id: id.to_string(),
    }
}

impl Backend for MemoryBackend {
    async fn load_data(&self) -> Result<LedgerData> {
        self.check_fault().await?;
        let mut state = self.state.write().await;
        let tenant = state.active_mut()?;
        let mut data = LedgerData {
            categories: tenant.categories.clone(),
            ..LedgerData::default()
        };
        for expense in &tenant.expenses {
            data.expenses
                .entry(expense.category_id.clone())
                .or_default()
                .push(ExpenseRecord {
                    id: expense.id.clone(),
                    category_id: None,
                    description: expense.description.clone(),
                    amount: expense.amount,
                    date: expense.date,
                });
        }
        Ok(data)
    }

    async fn load_salary(&self) -> Result<f64> {
        self.check_fault().await?;
        let mut state = self.state.write().await;
        Ok(state.active_mut()?.salary)
    }

    async fn add_category(&self, category: &CategoryRecord) -> Result<()> {
        let record = category.clone();
        self.write(format!("add_category {}", category.id), move |tenant| {
            match tenant.categories.iter_mut().find(|c| c.id == record.id) {
                Some(existing) => *existing = record,
                None => tenant.categories.push(record),
            }
            Ok(())
        })
        .await
    }

    async fn update_category(&self, id: &str, update: &CategoryUpdate) -> Result<()> {
        let update = update.clone();
        self.write(format!("update_category {id} {}", update.name), |tenant| {
            let category = tenant
                .categories
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or_else(|| missing("Category", id))?;
            category.name = update.name;
            category.budget = update.budget;
            Ok(())
        })
        .await
    }

    async fn delete_category(&self, id: &str) -> Result<()> {
        self.write(format!("delete_category {id}"), |tenant| {
            tenant.categories.retain(|c| c.id != id);
            tenant.expenses.retain(|e| e.category_id != id);
            Ok(())
        })
        .await
    }

    async fn add_expense(&self, expense: &NewExpense) -> Result<()> {
        let record = expense.clone();
        self.write(format!("add_expense {}", expense.id), move |tenant| {
            if !tenant.categories.iter().any(|c| c.id == record.category_id) {
                return Err(missing("Category", &record.category_id));
            }
            match tenant.expenses.iter_mut().find(|e| e.id == record.id) {
                Some(existing) => *existing = record,
                None => tenant.expenses.push(record),
            }
            Ok(())
        })
        .await
    }

    async fn update_expense(&self, id: &str, update: &ExpenseUpdate) -> Result<()> {
        let update = update.clone();
        self.write(
            format!("update_expense {id} {}", update.description),
            |tenant| {
                let expense = tenant
                    .expenses
                    .iter_mut()
                    .find(|e| e.id == id)
                    .ok_or_else(|| missing("Expense", id))?;
                expense.description = update.description;
                expense.amount = update.amount;
                Ok(())
            },
        )
        .await
    }

    async fn delete_expense(&self, id: &str) -> Result<()> {
        self.write(format!("delete_expense {id}"), |tenant| {
            tenant.expenses.retain(|e| e.id != id);
            Ok(())
        })
        .await
    }

    async fn update_salary(&self, amount: f64) -> Result<()> {
        self.write(format!("update_salary {amount}"), move |tenant| {
            tenant.salary = amount;
            Ok(())
        })
        .await
    }

    async fn list_tenants(&self) -> Result<TenantList> {
        self.check_fault().await?;
        let state = self.state.read().await;
        Ok(TenantList {
            databases: state.tenants.keys().cloned().collect(),
            active: state.active.clone(),
        })
    }

    async fn create_tenant(&self, name: &str) -> Result<()> {
        self.check_fault().await?;
        let mut state = self.state.write().await;
        if state.tenants.contains_key(name) {
            return Err(Error::validation(format!(
                "Database \"{name}\" already exists"
            )));
        }
        state.tenants.insert(name.to_string(), TenantData::default());
        Ok(())
    }

    async fn switch_tenant(&self, name: &str) -> Result<()> {
        self.check_fault().await?;
        let mut state = self.state.write().await;
        if !state.tenants.contains_key(name) {
            return Err(missing("Tenant", name));
        }
        state.active = name.to_string();
        Ok(())
    }
}
