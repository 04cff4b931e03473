use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::categories::CategoryName;
use super::expenses::ExpenseDetails;
use super::messages::Message;

/// Frames accepted from a realtime client.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    Authenticate { token: String },
    ChatSubmit(String),
    HistoryRequest,
}

/// Frames pushed to realtime clients.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    HistoryResponse(Vec<Message>),
    ExpenseCreated(ExpenseCreated),
    PipelineError(PipelineError),
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::PipelineError(PipelineError {
            message: message.into(),
        })
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseCreated {
    pub id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub description: String,
    pub category: CategoryName,
    pub created_at: DateTime<Utc>,
}

impl From<ExpenseDetails> for ExpenseCreated {
    fn from(expense: ExpenseDetails) -> Self {
        Self {
            id: expense.id,
            amount: expense.amount,
            description: expense.description,
            category: expense.category,
            created_at: expense.created_at,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct PipelineError {
    pub message: String,
}
