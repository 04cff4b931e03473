use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::categories::CategoryName;

/// Largest amount a NUMERIC(12,2) column holds.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);
/// Width of the `description` column, in characters.
pub const MAX_DESCRIPTION: usize = 255;

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: String,
    pub user_id: String,
    pub category_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Expense joined with its category name, as read back from the store.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ExpenseRow {
    pub id: String,
    pub amount: Decimal,
    pub description: String,
    pub category_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseDetails {
    pub id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub description: String,
    pub category: CategoryName,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ExpenseRow> for ExpenseDetails {
    fn from(row: ExpenseRow) -> Self {
        Self {
            id: row.id,
            amount: row.amount,
            description: row.description,
            category: CategoryName {
                name: row.category_name,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Raw create/update body. Fields stay loosely typed so validation can
/// answer with precise messages instead of a generic decode failure.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseInput {
    pub amount: Option<Value>,
    pub description: Option<Value>,
    pub category_id: Option<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewExpense {
    pub category_id: String,
    pub amount: Decimal,
    pub description: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExpenseChanges {
    pub amount: Option<Decimal>,
    pub description: Option<String>,
    pub category_id: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseQuery {
    pub category_id: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub order_by: Option<String>,
    pub month: Option<String>,
    pub year: Option<String>,
    pub date: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Half-open `[start, end)` interval on `created_at`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn contains(&self, instant: &DateTime<Utc>) -> bool {
        *instant >= self.start && *instant < self.end
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExpenseFilter {
    pub user_id: String,
    pub category_id: Option<String>,
    pub page: i64,
    pub limit: i64,
    pub order: SortOrder,
    pub created: Option<DateRange>,
}

impl ExpenseFilter {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total_items: i64,
    pub current_page: i64,
    pub total_pages: i64,
    pub limit: i64,
}

impl PageMeta {
    pub fn new(total_items: i64, current_page: i64, limit: i64) -> Self {
        let total_pages = if limit > 0 {
            (total_items + limit - 1) / limit
        } else {
            0
        };

        Self {
            total_items,
            current_page,
            total_pages,
            limit,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ExpensePage {
    pub expenses: Vec<ExpenseDetails>,
    pub meta: PageMeta,
}

/// Reads a JSON number or numeric string as a money amount rounded to cents.
/// Returns `None` unless the result is positive and fits the column.
pub fn positive_amount(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.trim().to_owned(),
        _ => return None,
    };

    let amount = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()?
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

    if amount > Decimal::ZERO && amount <= MAX_AMOUNT {
        Some(amount)
    } else {
        None
    }
}
