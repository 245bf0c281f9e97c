//! Expense handlers
//!
//! These receive a request that has already been authenticated; only scope
//! checks happen here.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::auth_helpers::{ensure_read, ensure_write};
use crate::api::error::invalid_body;
use crate::api::ApiError;
use crate::auth::AuthIdentityExt;
use crate::domain::{Expense, NewExpense};
use crate::server::AppState;

const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct ListExpensesQuery {
    limit: Option<usize>,
}

pub async fn list_expenses(
    State(state): State<AppState>,
    Extension(AuthIdentityExt(identity)): Extension<AuthIdentityExt>,
    Query(query): Query<ListExpensesQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_read(&identity)?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .min(MAX_LIST_LIMIT);
    let expenses = state.expenses.list(limit).await?;

    Ok(Json(serde_json::json!({
        "expenses": expenses,
        "count": expenses.len(),
    })))
}

pub async fn create_expense(
    State(state): State<AppState>,
    Extension(AuthIdentityExt(identity)): Extension<AuthIdentityExt>,
    payload: Result<Json<NewExpense>, JsonRejection>,
) -> Result<(StatusCode, Json<Expense>), ApiError> {
    ensure_write(&identity)?;

    let Json(input) = payload.map_err(|e| invalid_body(e.body_text()))?;
    let expense = state.expenses.create(input, &identity.subject).await?;

    tracing::info!(expense_id = %expense.id, created_by = %expense.created_by, "expense created");
    Ok((StatusCode::CREATED, Json(expense)))
}

pub async fn get_expense(
    State(state): State<AppState>,
    Extension(AuthIdentityExt(identity)): Extension<AuthIdentityExt>,
    Path(id): Path<Uuid>,
) -> Result<Json<Expense>, ApiError> {
    ensure_read(&identity)?;
    Ok(Json(state.expenses.get(id).await?))
}

pub async fn delete_expense(
    State(state): State<AppState>,
    Extension(AuthIdentityExt(identity)): Extension<AuthIdentityExt>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    ensure_write(&identity)?;
    state.expenses.delete(id).await?;

    tracing::info!(expense_id = %id, deleted_by = %identity.subject, "expense deleted");
    Ok(StatusCode::NO_CONTENT)
}
