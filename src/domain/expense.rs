//! Expense records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest accepted description
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// A recorded expense
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,

    /// Subject of the identity that created the record
    pub created_by: String,

    pub description: String,

    /// Amount in the currency's minor unit
    pub amount_cents: i64,

    /// ISO 4217 code, upper case
    pub currency: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// Request body for creating an expense
#[derive(Debug, Clone, Deserialize)]
pub struct NewExpense {
    pub description: String,
    pub amount_cents: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub category: Option<String>,
}

fn default_currency() -> String {
    "USD".to_string()
}

/// A field failed validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl NewExpense {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let description = self.description.trim();
        if description.is_empty() {
            return Err(ValidationError::new("description", "description is required"));
        }
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(ValidationError::new(
                "description",
                format!("description exceeds {} characters", MAX_DESCRIPTION_LEN),
            ));
        }
        if self.amount_cents <= 0 {
            return Err(ValidationError::new("amount_cents", "amount must be positive"));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::new(
                "currency",
                "currency must be a three-letter code",
            ));
        }
        Ok(())
    }

    /// Build the stored record
    pub fn into_expense(self, created_by: &str) -> Expense {
        Expense {
            id: Uuid::new_v4(),
            created_by: created_by.to_string(),
            description: self.description.trim().to_string(),
            amount_cents: self.amount_cents,
            currency: self.currency.to_ascii_uppercase(),
            category: self
                .category
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_expense(description: &str, amount_cents: i64, currency: &str) -> NewExpense {
        NewExpense {
            description: description.to_string(),
            amount_cents,
            currency: currency.to_string(),
            category: None,
        }
    }

    #[test]
    fn test_validation() {
        assert!(new_expense("Taxi", 1250, "usd").validate().is_ok());

        let err = new_expense("   ", 1250, "USD").validate().unwrap_err();
        assert_eq!(err.field, "description");

        let err = new_expense("Taxi", 0, "USD").validate().unwrap_err();
        assert_eq!(err.field, "amount_cents");

        let err = new_expense("Taxi", 10, "US1").validate().unwrap_err();
        assert_eq!(err.field, "currency");

        let long = "x".repeat(MAX_DESCRIPTION_LEN + 1);
        assert!(new_expense(&long, 10, "EUR").validate().is_err());
    }

    #[test]
    fn test_into_expense_normalizes() {
        let mut input = new_expense("  Hotel  ", 20000, "eur");
        input.category = Some("  ".to_string());

        let expense = input.into_expense("demo-client");
        assert_eq!(expense.description, "Hotel");
        assert_eq!(expense.currency, "EUR");
        assert_eq!(expense.category, None);
        assert_eq!(expense.created_by, "demo-client");
    }

    #[test]
    fn test_currency_defaults_to_usd() {
        let input: NewExpense =
            serde_json::from_str(r#"{"description":"Lunch","amount_cents":1500}"#).unwrap();
        assert_eq!(input.currency, "USD");
    }
}
