//! Entity module - `SeaORM` entity definitions for a tenant database.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod category;
pub mod expense;
pub mod setting;

pub use category::{Column as CategoryColumn, Entity as CategoryEntity, Model as CategoryModel};
pub use expense::{Column as ExpenseColumn, Entity as ExpenseEntity, Model as ExpenseModel};
pub use setting::{Column as SettingColumn, Entity as SettingEntity, Model as SettingModel};
