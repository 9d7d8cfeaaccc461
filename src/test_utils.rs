//! Shared test utilities for the budget ledger.
//!
//! Helpers for building stores, expenses and sessions with sensible defaults.

use crate::{
    backend::{
        Backend, CategoryRecord, CategoryUpdate, ExpenseUpdate, LedgerData, MemoryBackend,
        NewExpense, TenantList,
    },
    config::AppConfig,
    core::{ledger::LedgerStore, session::Session},
    errors::{Error, Result},
    models::{Category, Expense},
};
use chrono::{DateTime, Utc};
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

/// Installs a subscriber that prints through the test harness.
///
/// Safe to call from several tests; only the first call installs it.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Default configuration with a short persistence timeout.
#[must_use]
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.backend.request_timeout_secs = TEST_TIMEOUT.as_secs();
    config
}

/// Creates a store holding the reserved category plus one regular category.
///
/// # Panics
/// If `name` or `budget` are rejected by validation.
#[allow(clippy::unwrap_used)]
#[must_use]
pub fn store_with_category(name: &str, budget: f64) -> (LedgerStore, Category) {
    let mut store = LedgerStore::new();
    let category = store.create_category(name, budget).unwrap();
    (store, category)
}

/// Builds an expense directly, bypassing validation.
#[must_use]
pub fn test_expense(id: &str, category_id: &str, amount: f64, timestamp: DateTime<Utc>) -> Expense {
    Expense {
        id: id.to_string(),
        category_id: category_id.to_string(),
        description: format!("expense {id}"),
        amount,
        timestamp,
    }
}

/// Starts a session on a fresh in-memory backend.
///
/// The backend is returned too so tests can inject faults and inspect what
/// reached it.
pub async fn memory_session() -> Result<(Arc<MemoryBackend>, Session<MemoryBackend>)> {
    init_test_tracing();
    let backend = Arc::new(MemoryBackend::new());
    let session = Session::start(Arc::clone(&backend), &test_config()).await?;
    Ok((backend, session))
}

/// Persistence timeout used by sync tests that do not exercise timeouts.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Wraps a backend so that writes are applied but their replies can go missing.
///
/// After [`LostReplyBackend::lose_next_replies`], the next writes reach the
/// inner backend and are stored, yet report a network error, the way a
/// timed-out request that the server still processed looks to the client.
#[derive(Debug)]
pub struct LostReplyBackend<B> {
    inner: B,
    lost: AtomicUsize,
}

impl<B: Backend> LostReplyBackend<B> {
    pub const fn new(inner: B) -> Self {
        Self {
            inner,
            lost: AtomicUsize::new(0),
        }
    }

    /// Makes the next `count` successful writes report a network error.
    pub fn lose_next_replies(&self, count: usize) {
        self.lost.store(count, Ordering::SeqCst);
    }

    /// The wrapped backend, for checking what was actually stored.
    pub const fn inner(&self) -> &B {
        &self.inner
    }

    fn reply(&self, result: Result<()>) -> Result<()> {
        result?;
        let lost = self
            .lost
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if lost {
            return Err(Error::network("reply lost after the write was stored"));
        }
        Ok(())
    }
}

impl<B: Backend> Backend for LostReplyBackend<B> {
    async fn load_data(&self) -> Result<LedgerData> {
        self.inner.load_data().await
    }

    async fn load_salary(&self) -> Result<f64> {
        self.inner.load_salary().await
    }

    async fn add_category(&self, category: &CategoryRecord) -> Result<()> {
        self.reply(self.inner.add_category(category).await)
    }

    async fn update_category(&self, id: &str, update: &CategoryUpdate) -> Result<()> {
        self.reply(self.inner.update_category(id, update).await)
    }

    async fn delete_category(&self, id: &str) -> Result<()> {
        self.reply(self.inner.delete_category(id).await)
    }

    async fn add_expense(&self, expense: &NewExpense) -> Result<()> {
        self.reply(self.inner.add_expense(expense).await)
    }

    async fn update_expense(&self, id: &str, update: &ExpenseUpdate) -> Result<()> {
        self.reply(self.inner.update_expense(id, update).await)
    }

    async fn delete_expense(&self, id: &str) -> Result<()> {
        self.reply(self.inner.delete_expense(id).await)
    }

    async fn update_salary(&self, amount: f64) -> Result<()> {
        self.reply(self.inner.update_salary(amount).await)
    }

    async fn list_tenants(&self) -> Result<TenantList> {
        self.inner.list_tenants().await
    }

    async fn create_tenant(&self, name: &str) -> Result<()> {
        self.inner.create_tenant(name).await
    }

    async fn switch_tenant(&self, name: &str) -> Result<()> {
        self.inner.switch_tenant(name).await
    }
}
