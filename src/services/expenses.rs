use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Days, Months, NaiveDate, TimeZone, Utc};
use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::{RequestHandler, Service, ServiceError};
use crate::models::expenses::{
    positive_amount, DateRange, Expense, ExpenseChanges, ExpenseDetails, ExpenseFilter,
    ExpenseInput, ExpensePage, ExpenseQuery, NewExpense, PageMeta, SortOrder, MAX_DESCRIPTION,
};
use crate::models::users::Identity;
use crate::repositories::{CategoryStore, ExpenseStore};

const DEFAULT_LIMIT: i64 = 10;
const MAX_LIMIT: i64 = 100;

pub enum ExpenseRequest {
    CreateExpense {
        user_id: String,
        input: ExpenseInput,
        response: oneshot::Sender<Result<ExpenseDetails, ServiceError>>,
    },
    ListExpenses {
        requester: Identity,
        user_id: String,
        query: ExpenseQuery,
        response: oneshot::Sender<Result<ExpensePage, ServiceError>>,
    },
    UpdateExpense {
        user_id: String,
        expense_id: String,
        input: ExpenseInput,
        response: oneshot::Sender<Result<ExpenseDetails, ServiceError>>,
    },
    DeleteExpense {
        user_id: String,
        expense_id: String,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
}

fn check_amount(value: &Value, problems: &mut Vec<&'static str>) -> Option<rust_decimal::Decimal> {
    let amount = positive_amount(value);
    if amount.is_none() {
        problems.push("Amount must be a positive number");
    }
    amount
}

fn check_description(value: &Value, problems: &mut Vec<&'static str>) -> Option<String> {
    match value {
        Value::String(text) if text.chars().count() > MAX_DESCRIPTION => {
            problems.push("Description should be less than or equal to 255 characters");
            None
        }
        Value::String(text) => Some(text.clone()),
        _ => {
            problems.push("Description must be a string");
            None
        }
    }
}

fn check_category_id(value: &Value, problems: &mut Vec<&'static str>) -> Option<String> {
    match value {
        Value::String(text) => match Uuid::parse_str(text) {
            Ok(id) => Some(id.hyphenated().to_string()),
            Err(_) => {
                problems.push("Category ID must be a valid UUID");
                None
            }
        },
        _ => {
            problems.push("Category ID must be a string");
            None
        }
    }
}

fn fail_with(problems: Vec<&'static str>) -> ServiceError {
    ServiceError::Validation(problems.join(", "))
}

pub fn validate_new_expense(input: &ExpenseInput) -> Result<NewExpense, ServiceError> {
    let mut problems = Vec::new();

    let amount = match &input.amount {
        Some(value) => check_amount(value, &mut problems),
        None => {
            problems.push("Amount is required");
            None
        }
    };
    let description = match &input.description {
        Some(Value::Null) | None => Some(String::new()),
        Some(value) => check_description(value, &mut problems),
    };
    let category_id = match &input.category_id {
        Some(value) => check_category_id(value, &mut problems),
        None => {
            problems.push("Category ID is required");
            None
        }
    };

    match (amount, description, category_id) {
        (Some(amount), Some(description), Some(category_id)) if problems.is_empty() => {
            Ok(NewExpense {
                category_id,
                amount,
                description,
            })
        }
        _ => Err(fail_with(problems)),
    }
}

pub fn validate_changes(input: &ExpenseInput) -> Result<ExpenseChanges, ServiceError> {
    let mut problems = Vec::new();

    let changes = ExpenseChanges {
        amount: input
            .amount
            .as_ref()
            .and_then(|v| check_amount(v, &mut problems)),
        description: input
            .description
            .as_ref()
            .and_then(|v| check_description(v, &mut problems)),
        category_id: input
            .category_id
            .as_ref()
            .and_then(|v| check_category_id(v, &mut problems)),
    };

    if !problems.is_empty() {
        return Err(fail_with(problems));
    }
    if changes == ExpenseChanges::default() {
        return Err(ServiceError::Validation(
            "Provide at least one of amount, description, or categoryId to update".to_string(),
        ));
    }

    Ok(changes)
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn month_range(month: &str, year: &str) -> Result<DateRange, ServiceError> {
    let month: u32 = month
        .parse()
        .ok()
        .filter(|m| (1..=12).contains(m))
        .ok_or_else(|| ServiceError::Validation("Month must be between 1 and 12".to_string()))?;
    let year: i32 = year
        .parse()
        .ok()
        .filter(|y| (1900..=2100).contains(y))
        .ok_or_else(|| {
            ServiceError::Validation("Year must be between 1900 and 2100".to_string())
        })?;

    let start = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| ServiceError::Validation("Month must be between 1 and 12".to_string()))?;
    let end = start
        .checked_add_months(Months::new(1))
        .ok_or_else(|| ServiceError::Validation("Year must be between 1900 and 2100".to_string()))?;

    Ok(day_bounds(start, end))
}

fn day_range(date: &str) -> Result<DateRange, ServiceError> {
    let invalid = || ServiceError::Validation("Invalid date format. Use YYYY-MM-DD".to_string());

    let start = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| invalid())?;
    let end = start.checked_add_days(Days::new(1)).ok_or_else(invalid)?;

    Ok(day_bounds(start, end))
}

fn day_bounds(start: NaiveDate, end: NaiveDate) -> DateRange {
    DateRange {
        start: Utc.from_utc_datetime(&start.and_time(chrono::NaiveTime::MIN)),
        end: Utc.from_utc_datetime(&end.and_time(chrono::NaiveTime::MIN)),
    }
}

/// Turns raw query parameters into a store filter. Unparseable or zero
/// `page`/`limit` fall back to their defaults; out of range values are clamped.
pub fn validate_query(user_id: &str, query: &ExpenseQuery) -> Result<ExpenseFilter, ServiceError> {
    let page = present(&query.page)
        .and_then(|p| p.parse::<i64>().ok())
        .filter(|p| *p != 0)
        .unwrap_or(1)
        .max(1);
    let limit = present(&query.limit)
        .and_then(|l| l.parse::<i64>().ok())
        .filter(|l| *l != 0)
        .unwrap_or(DEFAULT_LIMIT)
        .clamp(1, MAX_LIMIT);
    let order = match present(&query.order_by) {
        Some(order) if order.eq_ignore_ascii_case("asc") => SortOrder::Asc,
        _ => SortOrder::Desc,
    };

    let month = present(&query.month);
    let year = present(&query.year);
    let date = present(&query.date);

    if month.is_some() != year.is_some() {
        return Err(ServiceError::Validation(
            "Both month and year must be provided together".to_string(),
        ));
    }
    if date.is_some() && month.is_some() {
        return Err(ServiceError::Validation(
            "Date cannot be used with month or year filters".to_string(),
        ));
    }

    let created = match (month, year, date) {
        (Some(month), Some(year), _) => Some(month_range(month, year)?),
        (_, _, Some(date)) => Some(day_range(date)?),
        _ => None,
    };

    Ok(ExpenseFilter {
        user_id: user_id.to_string(),
        category_id: present(&query.category_id).map(str::to_string),
        page,
        limit,
        order,
        created,
    })
}

#[derive(Clone)]
pub struct ExpenseRequestHandler {
    expenses: Arc<dyn ExpenseStore>,
    categories: Arc<dyn CategoryStore>,
}

impl ExpenseRequestHandler {
    pub fn new(expenses: Arc<dyn ExpenseStore>, categories: Arc<dyn CategoryStore>) -> Self {
        ExpenseRequestHandler {
            expenses,
            categories,
        }
    }

    async fn ensure_category(&self, category_id: &str) -> Result<(), ServiceError> {
        let category = self
            .categories
            .find_category_by_id(category_id)
            .await
            .map_err(|e| ServiceError::persistence("Category lookup", e))?;

        match category {
            Some(_) => Ok(()),
            None => Err(ServiceError::NotFound("Category not found".to_string())),
        }
    }

    /// Expenses owned by someone else are indistinguishable from missing ones.
    async fn owned_expense(&self, user_id: &str, expense_id: &str) -> Result<Expense, ServiceError> {
        self.expenses
            .find_expense(expense_id)
            .await
            .map_err(|e| ServiceError::persistence("Expense lookup", e))?
            .filter(|expense| expense.user_id == user_id)
            .ok_or_else(|| ServiceError::NotFound("Expense not found".to_string()))
    }

    async fn create_expense(
        &self,
        user_id: &str,
        input: ExpenseInput,
    ) -> Result<ExpenseDetails, ServiceError> {
        let expense = validate_new_expense(&input)?;
        self.ensure_category(&expense.category_id).await?;

        let created = self
            .expenses
            .create_expense(user_id, &expense)
            .await
            .map_err(|e| ServiceError::persistence("Expense insert", e))?;

        log::info!("User {} created expense {}", user_id, created.id);
        Ok(created)
    }

    async fn list_expenses(
        &self,
        requester: &Identity,
        user_id: &str,
        query: ExpenseQuery,
    ) -> Result<ExpensePage, ServiceError> {
        if requester.user_id != user_id && !requester.is_super_admin() {
            log::warn!(
                "User {} attempted to list expenses of {}",
                requester.user_id,
                user_id
            );
            return Err(ServiceError::Forbidden(
                super::auth::FORBIDDEN.to_string(),
            ));
        }

        let filter = validate_query(user_id, &query)?;
        let (expenses, total) = self
            .expenses
            .list_expenses(&filter)
            .await
            .map_err(|e| ServiceError::persistence("Expense listing", e))?;

        Ok(ExpensePage {
            expenses,
            meta: PageMeta::new(total, filter.page, filter.limit),
        })
    }

    async fn update_expense(
        &self,
        user_id: &str,
        expense_id: &str,
        input: ExpenseInput,
    ) -> Result<ExpenseDetails, ServiceError> {
        let changes = validate_changes(&input)?;
        self.owned_expense(user_id, expense_id).await?;
        if let Some(category_id) = &changes.category_id {
            self.ensure_category(category_id).await?;
        }

        self.expenses
            .update_expense(expense_id, &changes)
            .await
            .map_err(|e| ServiceError::persistence("Expense update", e))
    }

    async fn delete_expense(&self, user_id: &str, expense_id: &str) -> Result<(), ServiceError> {
        self.owned_expense(user_id, expense_id).await?;

        self.expenses
            .delete_expense(expense_id)
            .await
            .map_err(|e| ServiceError::persistence("Expense delete", e))?;

        log::info!("User {} deleted expense {}", user_id, expense_id);
        Ok(())
    }
}

#[async_trait]
impl RequestHandler<ExpenseRequest> for ExpenseRequestHandler {
    async fn handle_request(&self, request: ExpenseRequest) {
        match request {
            ExpenseRequest::CreateExpense {
                user_id,
                input,
                response,
            } => {
                let created = self.create_expense(&user_id, input).await;
                let _ = response.send(created);
            }
            ExpenseRequest::ListExpenses {
                requester,
                user_id,
                query,
                response,
            } => {
                let page = self.list_expenses(&requester, &user_id, query).await;
                let _ = response.send(page);
            }
            ExpenseRequest::UpdateExpense {
                user_id,
                expense_id,
                input,
                response,
            } => {
                let updated = self.update_expense(&user_id, &expense_id, input).await;
                let _ = response.send(updated);
            }
            ExpenseRequest::DeleteExpense {
                user_id,
                expense_id,
                response,
            } => {
                let deleted = self.delete_expense(&user_id, &expense_id).await;
                let _ = response.send(deleted);
            }
        }
    }
}

pub struct ExpenseService;

impl ExpenseService {
    pub fn new() -> Self {
        ExpenseService {}
    }
}

#[async_trait]
impl Service<ExpenseRequest, ExpenseRequestHandler> for ExpenseService {}
