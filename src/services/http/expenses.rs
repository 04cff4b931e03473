use axum::extract::{Path, Query, State};

use super::{ApiResponse, ApiResult, AppState, Authenticated, ValidJson};
use crate::models::expenses::{ExpenseDetails, ExpenseInput, ExpensePage, ExpenseQuery};
use crate::services::{dispatch, expenses::ExpenseRequest};

pub async fn create_expense(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    ValidJson(input): ValidJson<ExpenseInput>,
) -> ApiResult<ExpenseDetails> {
    let expense = dispatch(&state.channels.expenses, "expense", |response| {
        ExpenseRequest::CreateExpense {
            user_id: identity.user_id,
            input,
            response,
        }
    })
    .await
    .map_err(|e| state.fail(e))?;

    Ok(ApiResponse::created("Expense created successfully", expense))
}

pub async fn list_expenses(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    Path(user_id): Path<String>,
    Query(query): Query<ExpenseQuery>,
) -> ApiResult<ExpensePage> {
    let page = dispatch(&state.channels.expenses, "expense", |response| {
        ExpenseRequest::ListExpenses {
            requester: identity,
            user_id,
            query,
            response,
        }
    })
    .await
    .map_err(|e| state.fail(e))?;

    Ok(ApiResponse::ok("Expenses fetched successfully", page))
}

pub async fn update_expense(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    Path(expense_id): Path<String>,
    ValidJson(input): ValidJson<ExpenseInput>,
) -> ApiResult<ExpenseDetails> {
    let expense = dispatch(&state.channels.expenses, "expense", |response| {
        ExpenseRequest::UpdateExpense {
            user_id: identity.user_id,
            expense_id,
            input,
            response,
        }
    })
    .await
    .map_err(|e| state.fail(e))?;

    Ok(ApiResponse::ok("Expense updated successfully", expense))
}

pub async fn delete_expense(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    Path(expense_id): Path<String>,
) -> ApiResult<()> {
    dispatch(&state.channels.expenses, "expense", |response| {
        ExpenseRequest::DeleteExpense {
            user_id: identity.user_id,
            expense_id,
            response,
        }
    })
    .await
    .map_err(|e| state.fail(e))?;

    Ok(ApiResponse::empty("Expense deleted successfully"))
}
