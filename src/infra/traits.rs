//! Trait definitions for expense persistence

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Expense, NewExpense};

use super::Result;

/// Expense persistence.
///
/// Callers are already authenticated; implementations never see credentials.
#[async_trait]
pub trait ExpenseStore: Send + Sync {
    /// Validate and store a new expense
    async fn create(&self, input: NewExpense, created_by: &str) -> Result<Expense>;

    /// Fetch one expense
    async fn get(&self, id: Uuid) -> Result<Expense>;

    /// Expenses, newest first
    async fn list(&self, limit: usize) -> Result<Vec<Expense>>;

    /// Remove an expense
    async fn delete(&self, id: Uuid) -> Result<()>;
}
