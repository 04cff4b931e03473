use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::realtime::SessionRegistry;
use super::{RequestHandler, Service, ServiceError};
use crate::models::events::ServerEvent;
use crate::models::expenses::{ExpenseDetails, NewExpense};
use crate::models::messages::Message;
use crate::models::verdict::InterpretationVerdict;
use crate::repositories::interpretation::Interpreter;
use crate::repositories::{CategoryStore, ExpenseStore, MessageStore};

pub const EMPTY_MESSAGE: &str = "Message cannot be empty";

pub enum ChatRequest {
    /// Fire-and-forget: the outcome is pushed through the session registry.
    SendMessage {
        session_id: Uuid,
        user_id: String,
        content: String,
    },
    GetMessages {
        user_id: String,
        response: oneshot::Sender<Result<Vec<Message>, ServiceError>>,
    },
}

/// Why a chat message did not become an expense. The display text is what
/// the originating connection is told.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PipelineFailure {
    #[error("Could not save message.")]
    MessageNotSaved,
    #[error("The expense assistant is unavailable right now. Please try again later.")]
    InterpreterUnavailable,
    #[error("{0}")]
    Rejected(String),
    #[error("Invalid category: {0}")]
    UnknownCategory(String),
    #[error("Database error while checking category.")]
    CategoryLookup,
    #[error("Database error while creating expense.")]
    ExpenseInsert,
}

/// Turns one chat message into at most one expense.
///
/// Steps run strictly in order: persist the raw message, interpret it,
/// resolve the category by exact name, create the expense. The message is
/// never rolled back by a later failure, and nothing is written after a
/// failed step.
pub struct ExpensePipeline {
    messages: Arc<dyn MessageStore>,
    categories: Arc<dyn CategoryStore>,
    expenses: Arc<dyn ExpenseStore>,
    interpreter: Arc<dyn Interpreter>,
    interpretation_timeout: Duration,
}

impl ExpensePipeline {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        categories: Arc<dyn CategoryStore>,
        expenses: Arc<dyn ExpenseStore>,
        interpreter: Arc<dyn Interpreter>,
        interpretation_timeout: Duration,
    ) -> Self {
        Self {
            messages,
            categories,
            expenses,
            interpreter,
            interpretation_timeout,
        }
    }

    pub async fn ingest(
        &self,
        user_id: &str,
        content: &str,
    ) -> Result<ExpenseDetails, PipelineFailure> {
        let message = self
            .messages
            .create_message(user_id, content)
            .await
            .map_err(|e| {
                log::error!("Failed to persist chat message from {}: {:#}", user_id, e);
                PipelineFailure::MessageNotSaved
            })?;
        log::debug!("Persisted message {} from user {}", message.id, user_id);

        let interpreted =
            tokio::time::timeout(self.interpretation_timeout, self.interpreter.interpret(content))
                .await;
        let verdict = match interpreted {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(e)) => {
                log::error!("Interpretation of message {} failed: {}", message.id, e);
                return Err(PipelineFailure::InterpreterUnavailable);
            }
            Err(_) => {
                log::error!(
                    "Interpretation of message {} timed out after {:?}",
                    message.id,
                    self.interpretation_timeout
                );
                return Err(PipelineFailure::InterpreterUnavailable);
            }
        };

        let candidate = match verdict {
            InterpretationVerdict::Expense(candidate) => candidate,
            InterpretationVerdict::Rejected { reason } => {
                log::info!("Message {} is not an expense: {}", message.id, reason);
                return Err(PipelineFailure::Rejected(reason));
            }
        };

        let category = self
            .categories
            .find_category_by_name(&candidate.category)
            .await
            .map_err(|e| {
                log::error!("Category lookup for message {} failed: {:#}", message.id, e);
                PipelineFailure::CategoryLookup
            })?
            .ok_or_else(|| {
                log::info!(
                    "Message {} names unknown category {}",
                    message.id,
                    candidate.category
                );
                PipelineFailure::UnknownCategory(candidate.category.clone())
            })?;

        let expense = NewExpense {
            category_id: category.id,
            amount: candidate.amount,
            description: candidate.description,
        };
        let created = self
            .expenses
            .create_expense(user_id, &expense)
            .await
            .map_err(|e| {
                log::error!("Expense insert for message {} failed: {:#}", message.id, e);
                PipelineFailure::ExpenseInsert
            })?;

        log::info!(
            "Message {} became expense {} ({} in {})",
            message.id,
            created.id,
            created.amount,
            created.category.name
        );
        Ok(created)
    }
}

#[derive(Clone)]
pub struct ChatRequestHandler {
    pipeline: Arc<ExpensePipeline>,
    sessions: Arc<SessionRegistry>,
    history_limit: i64,
}

impl ChatRequestHandler {
    pub fn new(
        pipeline: ExpensePipeline,
        sessions: Arc<SessionRegistry>,
        history_limit: i64,
    ) -> Self {
        ChatRequestHandler {
            pipeline: Arc::new(pipeline),
            sessions,
            history_limit,
        }
    }

    async fn send_message(&self, session_id: Uuid, user_id: &str, content: &str) {
        if content.trim().is_empty() {
            self.sessions
                .send_to(&session_id, ServerEvent::error(EMPTY_MESSAGE));
            return;
        }

        match self.pipeline.ingest(user_id, content).await {
            Ok(expense) => {
                let delivered = self
                    .sessions
                    .broadcast(ServerEvent::ExpenseCreated(expense.into()));
                log::debug!("Broadcast new expense to {} sessions", delivered);
            }
            Err(failure) => {
                self.sessions
                    .send_to(&session_id, ServerEvent::error(failure.to_string()));
            }
        }
    }

    async fn get_messages(&self, user_id: &str) -> Result<Vec<Message>, ServiceError> {
        self.pipeline
            .messages
            .list_messages(user_id, self.history_limit)
            .await
            .map_err(|e| ServiceError::persistence("Message history", e))
    }
}

#[async_trait]
impl RequestHandler<ChatRequest> for ChatRequestHandler {
    async fn handle_request(&self, request: ChatRequest) {
        match request {
            ChatRequest::SendMessage {
                session_id,
                user_id,
                content,
            } => {
                self.send_message(session_id, &user_id, &content).await;
            }
            ChatRequest::GetMessages { user_id, response } => {
                let messages = self.get_messages(&user_id).await;
                let _ = response.send(messages);
            }
        }
    }
}

pub struct ChatService;

impl ChatService {
    pub fn new() -> Self {
        ChatService {}
    }
}

#[async_trait]
impl Service<ChatRequest, ChatRequestHandler> for ChatService {}
