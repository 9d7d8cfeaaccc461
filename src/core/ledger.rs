//! Ledger store - validated mutations over the in-memory ledger state.
//!
//! Every operation validates its inputs against the current state first and
//! only then applies the change, so a failed call never leaves a partial
//! mutation behind. Persistence is not this module's concern; the session
//! turns each successful mutation into a sync command.

use crate::{
    core::ids::{self, CATEGORY_PREFIX, EXPENSE_PREFIX},
    errors::{Error, Result},
    models::{Category, CategoryKind, Expense, LedgerState},
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Authoritative data for one tenant as loaded from a backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Categories in backend order
    pub categories: Vec<Category>,
    /// Expenses of all categories, in any order
    pub expenses: Vec<Expense>,
    /// Salary of the tenant
    pub salary: f64,
}

/// What `hydrate` had to repair while loading a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HydrateReport {
    /// Expenses dropped because their category does not exist
    pub dropped_expenses: usize,
    /// True if the reserved category was missing and has been added locally
    pub inserted_reserved: bool,
}

/// Owner of the ledger state and the only code path that mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerStore {
    state: LedgerState,
}

impl Default for LedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation("Category name cannot be empty"));
    }
    Ok(name.to_string())
}

fn validate_budget(budget: f64) -> Result<()> {
    if !budget.is_finite() || budget <= 0.0 {
        return Err(Error::validation(format!(
            "Budget must be a positive amount, got {budget}"
        )));
    }
    Ok(())
}

fn validate_expense_fields(description: &str, amount: f64) -> Result<String> {
    let description = description.trim();
    if description.is_empty() {
        return Err(Error::validation("Expense description cannot be empty"));
    }
    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::validation(format!(
            "Expense amount must be a positive amount, got {amount}"
        )));
    }
    Ok(description.to_string())
}

fn category_not_found(id: &str) -> Error {
    Error::NotFound {
        entity: "Category",
        id: id.to_string(),
    }
}

fn expense_not_found(id: &str) -> Error {
    Error::NotFound {
        entity: "Expense",
        id: id.to_string(),
    }
}

impl LedgerStore {
    /// Creates a store holding only the reserved category.
    #[must_use]
    pub fn new() -> Self {
        let reserved = Category::reserved();
        let mut expenses = HashMap::new();
        expenses.insert(reserved.id.clone(), Vec::new());
        Self {
            state: LedgerState {
                categories: vec![reserved],
                expenses,
                salary: 0.0,
            },
        }
    }

    /// Read-only view of the current state.
    #[must_use]
    pub const fn state(&self) -> &LedgerState {
        &self.state
    }

    fn category_index(&self, id: &str) -> Result<usize> {
        self.state
            .categories
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| category_not_found(id))
    }

    fn ensure_unique_name(&self, name: &str, except_id: Option<&str>) -> Result<()> {
        let lowered = name.to_lowercase();
        let taken = self
            .state
            .categories
            .iter()
            .filter(|c| Some(c.id.as_str()) != except_id)
            .any(|c| c.name.to_lowercase() == lowered);
        if taken {
            return Err(Error::validation(format!(
                "A category named \"{name}\" already exists"
            )));
        }
        Ok(())
    }

    /// Creates a budgeted category and returns it.
    pub fn create_category(&mut self, name: &str, budget: f64) -> Result<Category> {
        let name = validate_name(name)?;
        validate_budget(budget)?;
        self.ensure_unique_name(&name, None)?;

        let category = Category {
            id: ids::next_id(CATEGORY_PREFIX),
            name,
            budget,
            kind: CategoryKind::Regular,
        };
        self.state.categories.push(category.clone());
        self.state.expenses.insert(category.id.clone(), Vec::new());
        debug!(id = %category.id, name = %category.name, "category created");
        Ok(category)
    }

    /// Renames and rebudgets a regular category.
    pub fn update_category(&mut self, id: &str, name: &str, budget: f64) -> Result<Category> {
        let index = self.category_index(id)?;
        if self.state.categories[index].is_reserved() {
            return Err(Error::forbidden(
                "The miscellaneous category cannot be renamed or rebudgeted",
            ));
        }
        let name = validate_name(name)?;
        validate_budget(budget)?;
        self.ensure_unique_name(&name, Some(id))?;

        let category = &mut self.state.categories[index];
        category.name = name;
        category.budget = budget;
        debug!(id, "category updated");
        Ok(category.clone())
    }

    /// Removes a regular category together with all of its expenses.
    pub fn delete_category(&mut self, id: &str) -> Result<(Category, Vec<Expense>)> {
        let index = self.category_index(id)?;
        if self.state.categories[index].is_reserved() {
            return Err(Error::forbidden(
                "The miscellaneous category cannot be deleted",
            ));
        }
        let category = self.state.categories.remove(index);
        let expenses = self.state.expenses.remove(id).unwrap_or_default();
        debug!(id, removed_expenses = expenses.len(), "category deleted");
        Ok((category, expenses))
    }

    /// Logs an expense now, at the head of the category's sequence.
    pub fn add_expense(
        &mut self,
        category_id: &str,
        description: &str,
        amount: f64,
    ) -> Result<Expense> {
        self.add_expense_at(category_id, description, amount, Utc::now())
    }

    /// Logs an expense with an explicit timestamp.
    ///
    /// The sequence stays ordered newest first: the expense goes ahead of
    /// every entry at or before `timestamp`, so a backdated expense lands
    /// behind the newer ones.
    pub fn add_expense_at(
        &mut self,
        category_id: &str,
        description: &str,
        amount: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Expense> {
        self.category_index(category_id)?;
        let description = validate_expense_fields(description, amount)?;

        let expense = Expense {
            id: ids::next_id(EXPENSE_PREFIX),
            category_id: category_id.to_string(),
            description,
            amount,
            timestamp,
        };
        let list = self.state.expenses.entry(category_id.to_string()).or_default();
        let position = list
            .iter()
            .position(|e| e.timestamp <= timestamp)
            .unwrap_or(list.len());
        list.insert(position, expense.clone());
        debug!(id = %expense.id, category_id, amount, "expense added");
        Ok(expense)
    }

    fn expense_position(&self, category_id: &str, expense_id: &str) -> Result<usize> {
        self.category_index(category_id)?;
        self.state
            .expenses
            .get(category_id)
            .and_then(|list| list.iter().position(|e| e.id == expense_id))
            .ok_or_else(|| expense_not_found(expense_id))
    }

    /// Edits description and amount of an expense in place.
    pub fn update_expense(
        &mut self,
        category_id: &str,
        expense_id: &str,
        description: &str,
        amount: f64,
    ) -> Result<Expense> {
        let position = self.expense_position(category_id, expense_id)?;
        let description = validate_expense_fields(description, amount)?;

        let list = self
            .state
            .expenses
            .get_mut(category_id)
            .ok_or_else(|| category_not_found(category_id))?;
        let expense = &mut list[position];
        expense.description = description;
        expense.amount = amount;
        debug!(id = expense_id, category_id, "expense updated");
        Ok(expense.clone())
    }

    pub fn delete_expense(&mut self, category_id: &str, expense_id: &str) -> Result<Expense> {
        let position = self.expense_position(category_id, expense_id)?;
        let list = self
            .state
            .expenses
            .get_mut(category_id)
            .ok_or_else(|| category_not_found(category_id))?;
        let expense = list.remove(position);
        debug!(id = expense_id, category_id, "expense deleted");
        Ok(expense)
    }

    /// Replaces the salary.
    pub fn set_salary(&mut self, amount: f64) -> Result<f64> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(Error::validation(format!(
                "Salary must be a positive amount, got {amount}"
            )));
        }
        self.state.salary = amount;
        Ok(amount)
    }

    /// Discards everything except a fresh reserved category.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Replaces the whole state with a backend snapshot, repairing what would
    /// break the ledger invariants.
    pub fn hydrate(&mut self, snapshot: Snapshot) -> HydrateReport {
        let mut report = HydrateReport::default();
        let mut categories = snapshot.categories;

        if !categories.iter().any(Category::is_reserved) {
            categories.insert(0, Category::reserved());
            report.inserted_reserved = true;
        }

        let mut seen = Vec::with_capacity(categories.len());
        for category in &categories {
            let lowered = category.name.to_lowercase();
            if seen.contains(&lowered) {
                warn!(name = %category.name, "snapshot contains duplicate category name");
            }
            seen.push(lowered);
        }

        let mut expenses: HashMap<String, Vec<Expense>> = categories
            .iter()
            .map(|c| (c.id.clone(), Vec::new()))
            .collect();
        for expense in snapshot.expenses {
            if let Some(list) = expenses.get_mut(&expense.category_id) {
                list.push(expense);
            } else {
                warn!(
                    id = %expense.id,
                    category_id = %expense.category_id,
                    "dropping expense for unknown category"
                );
                report.dropped_expenses += 1;
            }
        }
        for list in expenses.values_mut() {
            list.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        }

        let salary = if snapshot.salary.is_finite() && snapshot.salary >= 0.0 {
            snapshot.salary
        } else {
            warn!(salary = snapshot.salary, "invalid salary in snapshot, using 0");
            0.0
        };

        self.state = LedgerState {
            categories,
            expenses,
            salary,
        };
        report
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::models::RESERVED_CATEGORY_ID;
    use crate::test_utils::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_new_store_holds_reserved_category() {
        let store = LedgerStore::new();
        assert_eq!(store.state().categories().len(), 1);
        assert!(store.state().categories()[0].is_reserved());
        assert!(store.state().expenses_for(RESERVED_CATEGORY_ID).is_empty());
    }

    #[test]
    fn test_create_category_validation() {
        let mut store = LedgerStore::new();

        let result = store.create_category("   ", 100.0);
        assert!(matches!(result.unwrap_err(), Error::Validation { .. }));

        let result = store.create_category("Food", 0.0);
        assert!(matches!(result.unwrap_err(), Error::Validation { .. }));

        let result = store.create_category("Food", -5.0);
        assert!(matches!(result.unwrap_err(), Error::Validation { .. }));

        let result = store.create_category("Food", f64::NAN);
        assert!(matches!(result.unwrap_err(), Error::Validation { .. }));

        assert_eq!(store, LedgerStore::new());
    }

    #[test]
    fn test_create_category_rejects_case_insensitive_duplicate() {
        let mut store = LedgerStore::new();
        store.create_category("Food", 200.0).unwrap();

        let before = store.clone();
        let result = store.create_category("  fOOd ", 50.0);
        assert!(matches!(result.unwrap_err(), Error::Validation { .. }));
        assert_eq!(store, before);

        // The reserved name is taken too
        let result = store.create_category("miscellaneous", 50.0);
        assert!(matches!(result.unwrap_err(), Error::Validation { .. }));
    }

    #[test]
    fn test_create_category_appends_with_empty_expenses() {
        let mut store = LedgerStore::new();
        let food = store.create_category(" Food ", 200.0).unwrap();
        let rent = store.create_category("Rent", 900.0).unwrap();

        assert_eq!(food.name, "Food");
        assert_eq!(food.kind, CategoryKind::Regular);
        assert_ne!(food.id, rent.id);
        let names: Vec<&str> = store
            .state()
            .categories()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["Miscellaneous", "Food", "Rent"]);
        assert!(store.state().expenses.contains_key(&food.id));
    }

    #[test]
    fn test_update_category() {
        let (mut store, food) = store_with_category("Food", 200.0);
        store.create_category("Rent", 900.0).unwrap();

        // Keeping its own name under a different case is fine
        let updated = store.update_category(&food.id, "FOOD", 250.0).unwrap();
        assert_eq!(updated.name, "FOOD");
        assert_eq!(updated.budget, 250.0);

        let result = store.update_category(&food.id, "rent", 250.0);
        assert!(matches!(result.unwrap_err(), Error::Validation { .. }));

        let result = store.update_category("cat_missing", "X", 1.0);
        assert!(matches!(result.unwrap_err(), Error::NotFound { .. }));
    }

    #[test]
    fn test_reserved_category_is_fixed() {
        let mut store = LedgerStore::new();

        let result = store.update_category(RESERVED_CATEGORY_ID, "Other", 10.0);
        assert!(matches!(result.unwrap_err(), Error::Forbidden { .. }));

        let result = store.delete_category(RESERVED_CATEGORY_ID);
        assert!(matches!(result.unwrap_err(), Error::Forbidden { .. }));

        assert_eq!(store, LedgerStore::new());
    }

    #[test]
    fn test_delete_category_cascades_expenses() {
        let (mut store, food) = store_with_category("Food", 200.0);
        store.add_expense(&food.id, "Lunch", 12.5).unwrap();
        store.add_expense(&food.id, "Dinner", 30.0).unwrap();

        let (removed, expenses) = store.delete_category(&food.id).unwrap();
        assert_eq!(removed.id, food.id);
        assert_eq!(expenses.len(), 2);
        assert!(store.state().category(&food.id).is_none());
        assert!(!store.state().expenses.contains_key(&food.id));

        let result = store.delete_category(&food.id);
        assert!(matches!(result.unwrap_err(), Error::NotFound { .. }));
    }

    #[test]
    fn test_add_expense_validation_leaves_state_unchanged() {
        let (mut store, food) = store_with_category("Food", 200.0);
        let before = store.clone();

        for (desc, amount) in [("", 10.0), ("  ", 10.0), ("Lunch", 0.0), ("Lunch", -3.0)] {
            let result = store.add_expense(&food.id, desc, amount);
            assert!(matches!(result.unwrap_err(), Error::Validation { .. }));
        }
        let result = store.add_expense("cat_missing", "Lunch", 10.0);
        assert!(matches!(result.unwrap_err(), Error::NotFound { .. }));

        assert_eq!(store, before);
    }

    #[test]
    fn test_add_expense_inserts_at_head() {
        let (mut store, food) = store_with_category("Food", 200.0);
        let first = store.add_expense(&food.id, "Breakfast", 5.0).unwrap();
        let second = store.add_expense(&food.id, "Lunch", 10.0).unwrap();

        let list = store.state().expenses_for(&food.id);
        assert_eq!(list[0].id, second.id);
        assert_eq!(list[1].id, first.id);
        assert_eq!(first.category_id, food.id);
    }

    #[test]
    fn test_backdated_expense_keeps_newest_first_order() {
        let (mut store, food) = store_with_category("Food", 200.0);
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let today = store.add_expense_at(&food.id, "Lunch", 10.0, now).unwrap();
        let last_week = store
            .add_expense_at(&food.id, "Groceries", 40.0, now - Duration::days(7))
            .unwrap();
        let yesterday = store
            .add_expense_at(&food.id, "Dinner", 25.0, now - Duration::days(1))
            .unwrap();

        let ids: Vec<_> = store
            .state()
            .expenses_for(&food.id)
            .iter()
            .map(|e| e.id.clone())
            .collect();
        assert_eq!(ids, vec![today.id, yesterday.id, last_week.id]);
    }

    #[test]
    fn test_update_and_delete_expense() {
        let (mut store, food) = store_with_category("Food", 200.0);
        let lunch = store.add_expense(&food.id, "Lunch", 10.0).unwrap();

        let updated = store
            .update_expense(&food.id, &lunch.id, "Big lunch", 18.0)
            .unwrap();
        assert_eq!(updated.description, "Big lunch");
        assert_eq!(updated.amount, 18.0);
        assert_eq!(updated.timestamp, lunch.timestamp);

        let result = store.update_expense(&food.id, &lunch.id, "", 18.0);
        assert!(matches!(result.unwrap_err(), Error::Validation { .. }));
        let result = store.update_expense(&food.id, "exp_missing", "x", 1.0);
        assert!(matches!(result.unwrap_err(), Error::NotFound { .. }));
        let result = store.update_expense("cat_missing", &lunch.id, "x", 1.0);
        assert!(matches!(result.unwrap_err(), Error::NotFound { .. }));
        // Expense exists, but under another category
        let result = store.delete_expense(RESERVED_CATEGORY_ID, &lunch.id);
        assert!(matches!(result.unwrap_err(), Error::NotFound { .. }));

        store.delete_expense(&food.id, &lunch.id).unwrap();
        assert!(store.state().expenses_for(&food.id).is_empty());
    }

    #[test]
    fn test_set_salary() {
        let mut store = LedgerStore::new();
        assert!(matches!(
            store.set_salary(0.0).unwrap_err(),
            Error::Validation { .. }
        ));
        assert!(matches!(
            store.set_salary(-1.0).unwrap_err(),
            Error::Validation { .. }
        ));
        store.set_salary(3000.0).unwrap();
        assert_eq!(store.state().salary(), 3000.0);
    }

    #[test]
    fn test_hydrate_repairs_snapshot() {
        let mut store = LedgerStore::new();
        store.create_category("Stale", 10.0).unwrap();

        let base = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let food = Category {
            id: "cat_food".to_string(),
            name: "Food".to_string(),
            budget: 200.0,
            kind: CategoryKind::Regular,
        };
        let older = test_expense("exp_1", "cat_food", 10.0, base);
        let newer = test_expense("exp_2", "cat_food", 20.0, base + Duration::hours(1));
        let orphan = test_expense("exp_3", "cat_gone", 5.0, base);

        let report = store.hydrate(Snapshot {
            categories: vec![food],
            expenses: vec![older, newer, orphan],
            salary: 1500.0,
        });

        assert!(report.inserted_reserved);
        assert_eq!(report.dropped_expenses, 1);
        let state = store.state();
        assert!(state.categories()[0].is_reserved());
        assert!(state.categories().iter().all(|c| c.name != "Stale"));
        let ids: Vec<&str> = state
            .expenses_for("cat_food")
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, vec!["exp_2", "exp_1"]);
        assert_eq!(state.salary(), 1500.0);
    }

    #[test]
    fn test_clear_discards_everything() {
        let (mut store, food) = store_with_category("Food", 200.0);
        store.add_expense(&food.id, "Lunch", 10.0).unwrap();
        store.set_salary(100.0).unwrap();

        store.clear();
        assert_eq!(store, LedgerStore::new());
    }
}
