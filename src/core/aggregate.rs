//! Aggregate calculation - derived, read-only statistics over a ledger.
//!
//! Nothing here is stored: every figure is recomputed from categories,
//! expenses and salary on each call, so derived values can never drift from
//! the raw entities. The formatting helpers at the bottom are for text
//! consumers such as the CLI dashboard.

use crate::models::{Category, Expense, LedgerState};

/// Default number of entries in the recent-expenses view.
pub const DEFAULT_RECENT_LIMIT: usize = 5;

/// Spending statistics for a single category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryStats {
    /// The category being reported on
    pub category: Category,
    /// Sum of the category's expenses
    pub spent: f64,
    /// `budget - spent`, negative when overspent
    pub remaining: f64,
    /// Share of the budget used, clamped to 0-100; 0 for unallocated categories
    pub percentage: f64,
    /// True only for budgeted categories whose spending exceeds the budget
    pub over_budget: bool,
    /// Number of expenses in the category
    pub expense_count: usize,
}

/// Dashboard totals for a whole ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSummary {
    /// Sum of budgets of regular categories
    pub total_budget: f64,
    /// Spending in regular categories
    pub total_spent: f64,
    /// Spending in the reserved miscellaneous category
    pub misc_spent: f64,
    /// `total_budget - total_spent`
    pub remaining: f64,
    pub salary: f64,
    /// `salary - (total_spent + misc_spent)`
    pub savings: f64,
    /// Number of categories, reserved one included
    pub category_count: usize,
    /// Per-category figures in ledger order
    pub categories: Vec<CategoryStats>,
}

/// An expense tagged with the name of its category.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentExpense {
    pub category_name: String,
    pub expense: Expense,
}

/// Sums the amounts of a list of expenses.
#[must_use]
pub fn sum_expenses(expenses: &[Expense]) -> f64 {
    expenses.iter().map(|e| e.amount).sum()
}

/// Calculates how much of a budget has been used, as a percentage capped at 100.
///
/// Unallocated categories (budget 0) always report 0.
#[must_use]
pub fn calculate_percentage(spent: f64, budget: f64) -> f64 {
    if budget <= 0.0 {
        return 0.0;
    }
    ((spent / budget) * 100.0).min(100.0)
}

/// Computes the statistics of one category from its expenses.
#[must_use]
pub fn category_stats(category: &Category, expenses: &[Expense]) -> CategoryStats {
    let spent = sum_expenses(expenses);
    CategoryStats {
        category: category.clone(),
        spent,
        remaining: category.budget - spent,
        percentage: calculate_percentage(spent, category.budget),
        over_budget: category.budget > 0.0 && spent > category.budget,
        expense_count: expenses.len(),
    }
}

/// Computes the dashboard totals for a ledger.
#[must_use]
pub fn summarize(state: &LedgerState) -> LedgerSummary {
    let categories: Vec<CategoryStats> = state
        .categories()
        .iter()
        .map(|c| category_stats(c, state.expenses_for(&c.id)))
        .collect();

    let (regular, reserved): (Vec<&CategoryStats>, Vec<&CategoryStats>) = categories
        .iter()
        .partition(|stats| !stats.category.is_reserved());

    let total_budget: f64 = regular.iter().map(|s| s.category.budget).sum();
    let total_spent: f64 = regular.iter().map(|s| s.spent).sum();
    let misc_spent: f64 = reserved.iter().map(|s| s.spent).sum();
    let salary = state.salary();

    LedgerSummary {
        total_budget,
        total_spent,
        misc_spent,
        remaining: total_budget - total_spent,
        salary,
        savings: salary - (total_spent + misc_spent),
        category_count: categories.len(),
        categories,
    }
}

/// Returns the `limit` most recent expenses across all categories.
///
/// Expenses with equal timestamps keep their ledger order.
#[must_use]
pub fn recent_expenses(state: &LedgerState, limit: usize) -> Vec<RecentExpense> {
    let mut all: Vec<RecentExpense> = state
        .categories()
        .iter()
        .flat_map(|category| {
            state
                .expenses_for(&category.id)
                .iter()
                .map(move |expense| RecentExpense {
                    category_name: category.name.clone(),
                    expense: expense.clone(),
                })
        })
        .collect();

    all.sort_by(|a, b| b.expense.timestamp.cmp(&a.expense.timestamp));
    all.truncate(limit);
    all
}

/// Generates a progress bar string for visual representation.
///
/// Creates a text-based progress bar like: `[████████░░] 80.0%`
#[must_use]
pub fn format_progress_bar(percentage: f64, bar_length: Option<usize>) -> String {
    let length = bar_length.unwrap_or(10);
    let clamped = percentage.clamp(0.0, 100.0);

    // Cast safety: clamped ∈ [0, 100] and length is small, so the product fits in usize.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let filled = ((clamped / 100.0) * length as f64).round() as usize;
    let empty = length.saturating_sub(filled);

    format!("[{}{}] {percentage:.1}%", "█".repeat(filled), "░".repeat(empty))
}

/// Formats a remaining amount as `Left: 12.00` or `Over: 3.50`.
#[must_use]
pub fn format_remaining(remaining: f64) -> String {
    if remaining >= 0.0 {
        format!("Left: {remaining:.2}")
    } else {
        format!("Over: {:.2}", remaining.abs())
    }
}
