//! Session - the single owner of a ledger, its sync client and tenants.
//!
//! Consumers never touch the store or the sync client directly. Every
//! mutation goes through a session method that validates and applies it
//! locally, enqueues the matching persistence command and leaves a
//! notification behind. Backend outcomes are folded in by [`Session::poll_sync`]
//! and [`Session::settle`], always on the caller's task.

use crate::{
    backend::{
        Backend, CategoryRecord, CategoryUpdate, ExpenseRecord, ExpenseUpdate, NewExpense,
        TenantList,
    },
    config::{AppConfig, CategorySeed},
    core::{
        aggregate::{self, LedgerSummary, RecentExpense},
        ledger::{HydrateReport, LedgerStore},
        notify::Notification,
        sync::{EntityKey, FailedEntity, SyncClient, SyncCommand, SyncStatus},
        tenant::TenantSwitcher,
    },
    errors::Result,
    models::{Category, Expense, LedgerState},
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path, sync::Arc};
use tracing::{debug, info, instrument, warn};

/// Everything a tenant holds, in the shape of `/get_data` plus the salary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerExport {
    /// Categories in display order, the reserved one included
    pub categories: Vec<CategoryRecord>,
    /// Expenses grouped by category id, newest first within each group
    pub expenses: BTreeMap<String, Vec<ExpenseRecord>>,
    pub salary: f64,
}

/// A budgeting session against one backend.
#[derive(Debug)]
pub struct Session<B: Backend> {
    backend: Arc<B>,
    store: LedgerStore,
    sync: SyncClient,
    tenants: TenantSwitcher,
    notifications: Vec<Notification>,
    recent_limit: usize,
}

impl<B: Backend> Session<B> {
    /// Starts the sync worker and loads the active tenant.
    ///
    /// Must be called inside a tokio runtime.
    #[instrument(skip(backend, config))]
    pub async fn start(backend: Arc<B>, config: &AppConfig) -> Result<Self> {
        let sync = SyncClient::spawn(Arc::clone(&backend), config.request_timeout());
        let mut session = Self {
            backend,
            store: LedgerStore::new(),
            sync,
            tenants: TenantSwitcher::new(),
            notifications: Vec::new(),
            recent_limit: config.ledger.recent_limit,
        };
        session.tenants.list(session.backend.as_ref()).await?;
        session.reload().await?;
        info!(
            tenant = session.tenants.active().unwrap_or_default(),
            categories = session.ledger().categories().len(),
            expenses = session.ledger().expense_count(),
            "session started"
        );
        Ok(session)
    }

    /// Replaces the local ledger with the backend's copy of the active tenant.
    #[instrument(skip(self))]
    pub async fn reload(&mut self) -> Result<HydrateReport> {
        let (data, salary) =
            tokio::try_join!(self.backend.load_data(), self.backend.load_salary())?;
        let report = self.store.hydrate(data.into_snapshot(salary));

        if report.dropped_expenses > 0 {
            self.notifications.push(Notification::info(format!(
                "Ignored {} expenses without a category",
                report.dropped_expenses
            )));
        }
        if report.inserted_reserved {
            debug!("backend lacks the miscellaneous category, persisting it");
            self.sync.submit(SyncCommand::CreateCategory(CategoryRecord::from(
                &Category::reserved(),
            )));
        }
        Ok(report)
    }

    fn checked<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            warn!(error = %e, "operation rejected");
            self.notifications.push(Notification::error(e.to_string()));
        }
        result
    }

    /// Creates a category locally and queues it for the backend.
    ///
    /// # Arguments
    ///
    /// * `name` - Display name, trimmed; must be unique ignoring case
    /// * `budget` - Monthly budget, strictly positive
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`](crate::errors::Error::Validation) for a
    /// blank or taken name or a non-positive budget. Nothing is queued then.
    pub fn create_category(&mut self, name: &str, budget: f64) -> Result<Category> {
        let result = self.store.create_category(name, budget);
        let category = self.checked(result)?;
        self.sync
            .submit(SyncCommand::CreateCategory(CategoryRecord::from(&category)));
        self.notifications.push(Notification::success(format!(
            "Category \"{}\" added",
            category.name
        )));
        Ok(category)
    }

    /// Renames and rebudgets a category in place and queues the update.
    ///
    /// # Errors
    ///
    /// Fails without queueing anything if the category is missing or
    /// reserved, or if the new values do not validate.
    pub fn update_category(&mut self, id: &str, name: &str, budget: f64) -> Result<Category> {
        let result = self.store.update_category(id, name, budget);
        let category = self.checked(result)?;
        self.sync.submit(SyncCommand::UpdateCategory {
            id: category.id.clone(),
            update: CategoryUpdate {
                name: category.name.clone(),
                budget: category.budget,
            },
        });
        self.notifications.push(Notification::success(format!(
            "Category \"{}\" updated",
            category.name
        )));
        Ok(category)
    }

    /// Deletes a category and its expenses; the backend cascades on its side.
    pub fn delete_category(&mut self, id: &str) -> Result<Category> {
        let result = self.store.delete_category(id);
        let (category, expenses) = self.checked(result)?;
        for expense in &expenses {
            self.sync.forget(&EntityKey::Expense(expense.id.clone()));
        }
        self.sync.submit(SyncCommand::DeleteCategory {
            id: category.id.clone(),
        });
        self.notifications.push(Notification::success(format!(
            "Category \"{}\" deleted",
            category.name
        )));
        Ok(category)
    }

    /// Logs an expense now and queues it for the backend.
    ///
    /// # Arguments
    ///
    /// * `category_id` - Category the expense is charged to
    /// * `description` - Free text, trimmed; must not be blank
    /// * `amount` - Strictly positive amount
    pub fn add_expense(
        &mut self,
        category_id: &str,
        description: &str,
        amount: f64,
    ) -> Result<Expense> {
        let result = self.store.add_expense(category_id, description, amount);
        let expense = self.checked(result)?;
        self.sync
            .submit(SyncCommand::AddExpense(NewExpense::from(&expense)));
        self.notifications.push(Notification::success(format!(
            "Expense \"{}\" added",
            expense.description
        )));
        Ok(expense)
    }

    /// Edits description and amount of an expense and queues the update.
    pub fn update_expense(
        &mut self,
        category_id: &str,
        expense_id: &str,
        description: &str,
        amount: f64,
    ) -> Result<Expense> {
        let result = self
            .store
            .update_expense(category_id, expense_id, description, amount);
        let expense = self.checked(result)?;
        self.sync.submit(SyncCommand::UpdateExpense {
            id: expense.id.clone(),
            update: ExpenseUpdate {
                description: expense.description.clone(),
                amount: expense.amount,
            },
        });
        self.notifications
            .push(Notification::success("Expense updated"));
        Ok(expense)
    }

    /// Removes an expense locally and queues the delete.
    pub fn delete_expense(&mut self, category_id: &str, expense_id: &str) -> Result<Expense> {
        let result = self.store.delete_expense(category_id, expense_id);
        let expense = self.checked(result)?;
        self.sync.submit(SyncCommand::DeleteExpense {
            id: expense.id.clone(),
        });
        self.notifications
            .push(Notification::success("Expense deleted"));
        Ok(expense)
    }

    /// Replaces the salary; it must be a finite positive amount.
    pub fn set_salary(&mut self, amount: f64) -> Result<f64> {
        let result = self.store.set_salary(amount);
        let salary = self.checked(result)?;
        self.sync.submit(SyncCommand::UpdateSalary { amount: salary });
        self.notifications
            .push(Notification::success("Salary updated"));
        Ok(salary)
    }

    /// Creates the configured categories whose names are not taken yet.
    ///
    /// Returns how many were created.
    pub fn seed_categories(&mut self, seeds: &[CategorySeed]) -> Result<usize> {
        let mut created = 0;
        for seed in seeds {
            let lowered = seed.name.trim().to_lowercase();
            let exists = self
                .ledger()
                .categories()
                .iter()
                .any(|c| c.name.to_lowercase() == lowered);
            if exists {
                debug!(name = %seed.name, "seed category already present");
                continue;
            }
            self.create_category(&seed.name, seed.budget)?;
            created += 1;
        }
        if created > 0 {
            info!(created, "seeded default categories");
        }
        Ok(created)
    }

    /// Current ledger contents.
    #[must_use]
    pub fn ledger(&self) -> &LedgerState {
        self.store.state()
    }

    #[must_use]
    pub fn summary(&self) -> LedgerSummary {
        aggregate::summarize(self.store.state())
    }

    /// The `limit` most recent expenses across all categories.
    #[must_use]
    pub fn recent_expenses(&self, limit: usize) -> Vec<RecentExpense> {
        aggregate::recent_expenses(self.store.state(), limit)
    }

    /// Configured size of the recent-expenses view.
    #[must_use]
    pub const fn recent_limit(&self) -> usize {
        self.recent_limit
    }

    #[must_use]
    pub fn sync_status(&self, key: &EntityKey) -> Option<&SyncStatus> {
        self.sync.status(key)
    }

    /// Entities changed locally whose last save failed.
    #[must_use]
    pub fn unsynced(&self) -> Vec<EntityKey> {
        self.sync.unsynced()
    }

    /// Folds finished persistence outcomes in without waiting.
    pub fn poll_sync(&mut self) {
        let notes = self.sync.poll();
        self.notifications.extend(notes);
    }

    /// Waits for every enqueued command to finish.
    pub async fn settle(&mut self) {
        let notes = self.sync.settle().await;
        self.notifications.extend(notes);
    }

    /// Re-enqueues every entity whose save failed, using its current local values.
    ///
    /// Returns the number of commands enqueued.
    pub fn retry_failed(&mut self) -> usize {
        let mut retried = 0;
        for failed in self.sync.take_failed() {
            match self.rebuild(&failed) {
                Some(command) => {
                    self.sync.submit(command);
                    retried += 1;
                }
                None => self.sync.forget(&failed.key),
            }
        }
        if retried > 0 {
            info!(retried, "retrying failed saves");
            self.notifications.push(Notification::info(format!(
                "Retrying {retried} unsaved changes"
            )));
        }
        retried
    }

    fn rebuild(&self, failed: &FailedEntity) -> Option<SyncCommand> {
        let created = failed.commands.iter().any(SyncCommand::is_create);
        let deleted = failed.commands.iter().any(SyncCommand::is_delete);
        let state = self.store.state();

        match &failed.key {
            EntityKey::Category(id) => match state.category(id) {
                Some(category) if created => {
                    Some(SyncCommand::CreateCategory(CategoryRecord::from(category)))
                }
                Some(category) => Some(SyncCommand::UpdateCategory {
                    id: id.clone(),
                    update: CategoryUpdate {
                        name: category.name.clone(),
                        budget: category.budget,
                    },
                }),
                None if deleted && !created => {
                    Some(SyncCommand::DeleteCategory { id: id.clone() })
                }
                None => None,
            },
            EntityKey::Expense(id) => match state.find_expense(id) {
                Some(expense) if created => {
                    Some(SyncCommand::AddExpense(NewExpense::from(expense)))
                }
                Some(expense) => Some(SyncCommand::UpdateExpense {
                    id: id.clone(),
                    update: ExpenseUpdate {
                        description: expense.description.clone(),
                        amount: expense.amount,
                    },
                }),
                None if deleted && !created => {
                    Some(SyncCommand::DeleteExpense { id: id.clone() })
                }
                None => None,
            },
            EntityKey::Salary => Some(SyncCommand::UpdateSalary {
                amount: state.salary(),
            }),
        }
    }

    /// Drains pending notifications, oldest first.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        self.poll_sync();
        std::mem::take(&mut self.notifications)
    }

    #[must_use]
    pub const fn tenants(&self) -> &TenantSwitcher {
        &self.tenants
    }

    pub async fn list_tenants(&mut self) -> Result<TenantList> {
        let result = self.tenants.list(self.backend.as_ref()).await;
        self.checked(result)
    }

    pub async fn create_tenant(&mut self, name: &str) -> Result<String> {
        let result = self.tenants.create(self.backend.as_ref(), name).await;
        let name = self.checked(result)?;
        self.notifications.push(Notification::success(format!(
            "Database \"{name}\" created"
        )));
        Ok(name)
    }

    /// Makes another tenant active and replaces all local state with its data.
    ///
    /// Pending saves of the current tenant are settled first. If the reload
    /// fails the ledger stays empty and the error is returned.
    #[instrument(skip(self))]
    pub async fn switch_tenant(&mut self, name: &str) -> Result<()> {
        self.settle().await;
        let result = self.tenants.switch(self.backend.as_ref(), name).await;
        self.checked(result)?;

        self.sync.begin_generation();
        self.store.clear();
        let result = self.reload().await;
        self.checked(result)?;

        self.notifications.push(Notification::success(format!(
            "Switched to database \"{name}\""
        )));
        Ok(())
    }

    /// Snapshot of the ledger in export form.
    #[must_use]
    pub fn export(&self) -> LedgerExport {
        let state = self.store.state();
        LedgerExport {
            categories: state.categories().iter().map(CategoryRecord::from).collect(),
            expenses: state
                .categories()
                .iter()
                .map(|c| {
                    let records = state
                        .expenses_for(&c.id)
                        .iter()
                        .map(ExpenseRecord::from)
                        .collect();
                    (c.id.clone(), records)
                })
                .collect(),
            salary: state.salary(),
        }
    }

    /// Writes [`Session::export`] as pretty-printed JSON to `path`.
    pub fn export_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.export())?;
        std::fs::write(path.as_ref(), json)?;
        info!(path = %path.as_ref().display(), "ledger exported");
        Ok(())
    }
}
