//! Persistence backends and the JSON wire contract they share.
//!
//! The [`Backend`] trait mirrors the HTTP API one method per endpoint. The
//! sync client only ever talks to this trait, so the HTTP client, the local
//! SQLite store and the in-memory store are interchangeable.

use crate::{
    core::ledger::Snapshot,
    errors::Result,
    models::{Category, CategoryKind, Expense, RESERVED_CATEGORY_ID},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, future::Future};

/// JSON-over-HTTP client for the Flask-style budget server
pub mod http;
/// In-process backend with fault injection
pub mod memory;
/// Local `SQLite` backend where every tenant is its own database
pub mod sqlite;

pub use http::HttpBackend;
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

/// Name of the tenant every local backend starts with.
pub const DEFAULT_TENANT: &str = "default";

/// Category as it travels over the wire: `{ id, name, budget }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: String,
    pub name: String,
    pub budget: f64,
}

impl From<&Category> for CategoryRecord {
    fn from(value: &Category) -> Self {
        Self {
            id: value.id.clone(),
            name: value.name.clone(),
            budget: value.budget,
        }
    }
}

impl From<CategoryRecord> for Category {
    fn from(value: CategoryRecord) -> Self {
        // The only place the reserved id is compared: the wire boundary.
        let kind = if value.id == RESERVED_CATEGORY_ID {
            CategoryKind::Reserved
        } else {
            CategoryKind::Regular
        };
        Self {
            id: value.id,
            name: value.name,
            budget: value.budget,
            kind,
        }
    }
}

/// Body of `PUT /update_category/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryUpdate {
    pub name: String,
    pub budget: f64,
}

/// Expense as listed inside `/get_data`, keyed by category id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    pub description: String,
    pub amount: f64,
    pub date: DateTime<Utc>,
}

impl From<&Expense> for ExpenseRecord {
    fn from(value: &Expense) -> Self {
        Self {
            id: value.id.clone(),
            category_id: None,
            description: value.description.clone(),
            amount: value.amount,
            date: value.timestamp,
        }
    }
}

/// Body of `POST /add_expense`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExpense {
    pub id: String,
    pub category_id: String,
    pub description: String,
    pub amount: f64,
    pub date: DateTime<Utc>,
}

impl From<&Expense> for NewExpense {
    fn from(value: &Expense) -> Self {
        Self {
            id: value.id.clone(),
            category_id: value.category_id.clone(),
            description: value.description.clone(),
            amount: value.amount,
            date: value.timestamp,
        }
    }
}

/// Body of `PUT /update_expense/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseUpdate {
    pub description: String,
    pub amount: f64,
}

/// Response of `GET /get_data`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerData {
    pub categories: Vec<CategoryRecord>,
    #[serde(default)]
    pub expenses: HashMap<String, Vec<ExpenseRecord>>,
}

impl LedgerData {
    /// Combines the data payload with the salary into a store snapshot.
    #[must_use]
    pub fn into_snapshot(self, salary: f64) -> Snapshot {
        let categories = self.categories.into_iter().map(Category::from).collect();
        let expenses = self
            .expenses
            .into_iter()
            .flat_map(|(category_id, records)| {
                records.into_iter().map(move |record| Expense {
                    id: record.id,
                    category_id: record.category_id.unwrap_or_else(|| category_id.clone()),
                    description: record.description,
                    amount: record.amount,
                    timestamp: record.date,
                })
            })
            .collect();
        Snapshot {
            categories,
            expenses,
            salary,
        }
    }
}

/// Response of `GET /get_salary`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SalaryRecord {
    pub salary: f64,
}

/// Body of `POST /update_salary`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SalaryUpdate {
    pub amount: f64,
}

/// Response of `GET /list_dbs`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantList {
    pub databases: Vec<String>,
    pub active: String,
}

/// Body of `POST /create_db`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTenantRequest {
    pub dbname: String,
}

/// Response of `POST /create_db`: either a message or an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTenantResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A persistence backend for ledgers, one active tenant at a time.
///
/// Data operations always target the tenant the backend currently has active.
pub trait Backend: Send + Sync + 'static {
    /// `GET /get_data`
    fn load_data(&self) -> impl Future<Output = Result<LedgerData>> + Send;
    /// `GET /get_salary`
    fn load_salary(&self) -> impl Future<Output = Result<f64>> + Send;
    /// `POST /add_category`
    fn add_category(&self, category: &CategoryRecord) -> impl Future<Output = Result<()>> + Send;
    /// `PUT /update_category/{id}`
    fn update_category(
        &self,
        id: &str,
        update: &CategoryUpdate,
    ) -> impl Future<Output = Result<()>> + Send;
    /// `DELETE /delete_category/{id}`
    fn delete_category(&self, id: &str) -> impl Future<Output = Result<()>> + Send;
    /// `POST /add_expense`
    fn add_expense(&self, expense: &NewExpense) -> impl Future<Output = Result<()>> + Send;
    /// `PUT /update_expense/{id}`
    fn update_expense(
        &self,
        id: &str,
        update: &ExpenseUpdate,
    ) -> impl Future<Output = Result<()>> + Send;
    /// `DELETE /delete_expense/{id}`
    fn delete_expense(&self, id: &str) -> impl Future<Output = Result<()>> + Send;
    /// `POST /update_salary`
    fn update_salary(&self, amount: f64) -> impl Future<Output = Result<()>> + Send;
    /// `GET /list_dbs`
    fn list_tenants(&self) -> impl Future<Output = Result<TenantList>> + Send;
    /// `POST /create_db`
    fn create_tenant(&self, name: &str) -> impl Future<Output = Result<()>> + Send;
    /// `POST /switch_db/{name}`
    fn switch_tenant(&self, name: &str) -> impl Future<Output = Result<()>> + Send;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;

    #[test]
    fn test_parse_get_data_response() {
        let body = r#"{
            "categories": [
                {"id": "cat_misc", "name": "Miscellaneous", "budget": 0},
                {"id": "cat_1", "name": "Food", "budget": 200.0}
            ],
            "expenses": {
                "cat_1": [
                    {"id": "exp_1", "description": "Lunch", "amount": 12.5,
                     "date": "2025-02-01T12:30:00.000Z"}
                ]
            }
        }"#;

        let data: LedgerData = serde_json::from_str(body).unwrap();
        let snapshot = data.into_snapshot(3000.0);

        assert_eq!(snapshot.categories.len(), 2);
        assert!(snapshot.categories[0].is_reserved());
        assert!(!snapshot.categories[1].is_reserved());
        assert_eq!(snapshot.expenses.len(), 1);
        assert_eq!(snapshot.expenses[0].category_id, "cat_1");
        assert_eq!(snapshot.expenses[0].amount, 12.5);
        assert_eq!(snapshot.salary, 3000.0);
    }

    #[test]
    fn test_new_expense_serializes_wire_names() {
        let expense = Expense {
            id: "exp_1".to_string(),
            category_id: "cat_1".to_string(),
            description: "Lunch".to_string(),
            amount: 10.0,
            timestamp: "2025-02-01T12:30:00Z".parse().unwrap(),
        };
        let value = serde_json::to_value(NewExpense::from(&expense)).unwrap();
        assert_eq!(value["category_id"], "cat_1");
        assert_eq!(value["date"], "2025-02-01T12:30:00Z");
    }

    #[test]
    fn test_create_tenant_response_variants() {
        let ok: CreateTenantResponse =
            serde_json::from_str(r#"{"message": "Database created"}"#).unwrap();
        assert!(ok.error.is_none());
        let err: CreateTenantResponse =
            serde_json::from_str(r#"{"error": "Database already exists"}"#).unwrap();
        assert_eq!(err.error.as_deref(), Some("Database already exists"));
    }
}
