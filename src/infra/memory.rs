//! In-memory expense store

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{Expense, NewExpense};

use super::{ExpenseStore, Result, StoreError};

/// Expense store held in process memory
#[derive(Default)]
pub struct InMemoryExpenseStore {
    expenses: RwLock<HashMap<Uuid, Expense>>,
}

impl InMemoryExpenseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExpenseStore for InMemoryExpenseStore {
    async fn create(&self, input: NewExpense, created_by: &str) -> Result<Expense> {
        input.validate()?;
        let expense = input.into_expense(created_by);
        self.expenses
            .write()
            .await
            .insert(expense.id, expense.clone());
        Ok(expense)
    }

    async fn get(&self, id: Uuid) -> Result<Expense> {
        self.expenses
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn list(&self, limit: usize) -> Result<Vec<Expense>> {
        let mut expenses: Vec<Expense> = self.expenses.read().await.values().cloned().collect();
        expenses.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        expenses.truncate(limit);
        Ok(expenses)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.expenses
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }
}
