//! Ledger data model - categories, expenses and the per-tenant ledger state.
//!
//! These types hold raw entities only. Spent totals, remaining amounts and
//! percentages are derived on every read by [`crate::core::aggregate`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Well-known id of the reserved miscellaneous category.
pub const RESERVED_CATEGORY_ID: &str = "cat_misc";

/// Display name of the reserved miscellaneous category.
pub const RESERVED_CATEGORY_NAME: &str = "Miscellaneous";

/// Whether a category is an ordinary budget bucket or the fixed miscellaneous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    /// User-created category, editable and deletable
    #[default]
    Regular,
    /// The miscellaneous category; never deleted, renamed or rebudgeted
    Reserved,
}

/// A named spending bucket with an optional budget cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Unique identifier
    pub id: String,
    /// Display name, unique case-insensitively within a ledger
    pub name: String,
    /// Budget cap; 0 means unallocated
    pub budget: f64,
    /// Regular or reserved
    pub kind: CategoryKind,
}

impl Category {
    /// Builds the reserved miscellaneous category.
    #[must_use]
    pub fn reserved() -> Self {
        Self {
            id: RESERVED_CATEGORY_ID.to_string(),
            name: RESERVED_CATEGORY_NAME.to_string(),
            budget: 0.0,
            kind: CategoryKind::Reserved,
        }
    }

    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        matches!(self.kind, CategoryKind::Reserved)
    }
}

/// A single dated spending record attached to one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    /// Unique identifier
    pub id: String,
    /// Owning category
    pub category_id: String,
    /// What the money was spent on
    pub description: String,
    /// Strictly positive amount
    pub amount: f64,
    /// When the expense was logged
    pub timestamp: DateTime<Utc>,
}

/// Categories, expenses and salary of the active tenant.
///
/// Fields are crate-private: only [`crate::core::ledger::LedgerStore`] mutates them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerState {
    pub(crate) categories: Vec<Category>,
    pub(crate) expenses: HashMap<String, Vec<Expense>>,
    pub(crate) salary: f64,
}

impl LedgerState {
    /// Categories in insertion order.
    #[must_use]
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    #[must_use]
    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    /// Expenses of one category, most recent first. Empty for unknown ids.
    #[must_use]
    pub fn expenses_for(&self, category_id: &str) -> &[Expense] {
        self.expenses.get(category_id).map_or(&[], Vec::as_slice)
    }

    /// Looks an expense up by id across all categories.
    #[must_use]
    pub fn find_expense(&self, id: &str) -> Option<&Expense> {
        self.expenses.values().flatten().find(|e| e.id == id)
    }

    #[must_use]
    pub const fn salary(&self) -> f64 {
        self.salary
    }

    /// Total number of expenses across all categories.
    #[must_use]
    pub fn expense_count(&self) -> usize {
        self.expenses.values().map(Vec::len).sum()
    }

    /// True when there is nothing but (at most) the reserved category and no expenses.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.categories.iter().all(Category::is_reserved) && self.expense_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_category_shape() {
        let misc = Category::reserved();
        assert_eq!(misc.id, RESERVED_CATEGORY_ID);
        assert!(misc.is_reserved());
        assert!(misc.budget.abs() < f64::EPSILON);
    }

    #[test]
    fn test_expenses_for_unknown_category_is_empty() {
        let state = LedgerState::default();
        assert!(state.expenses_for("nope").is_empty());
        assert!(state.is_blank());
    }
}
