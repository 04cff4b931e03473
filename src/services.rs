use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::repositories::{
    identity::TokenVerifier, interpretation::Interpreter, CategoryStore, ExpenseStore,
    MessageStore, UserStore,
};
use crate::settings::Settings;

pub mod auth;
pub mod categories;
pub mod chat;
pub mod expenses;
pub mod http;
pub mod realtime;
pub mod users;

#[cfg(test)]
pub(crate) mod testing;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Interpretation service unavailable: {0}")]
    InterpretationUnavailable(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Communication error: {0} - {1}")]
    Communication(String, String),
}

impl ServiceError {
    pub fn persistence(context: &str, error: anyhow::Error) -> Self {
        log::error!("{} failed: {:#}", context, error);
        ServiceError::Persistence(format!("{}: {}", context, error))
    }

    /// Text safe to show a client. Storage and channel failures stay generic.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::Persistence(_) | ServiceError::Communication(..) => {
                "Something went wrong!".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

/// Sends a request carrying a oneshot responder and waits for the answer.
pub async fn dispatch<R, T>(
    channel: &mpsc::Sender<R>,
    service: &str,
    build: impl FnOnce(oneshot::Sender<Result<T, ServiceError>>) -> R,
) -> Result<T, ServiceError> {
    let (response_tx, response_rx) = oneshot::channel();

    channel
        .send(build(response_tx))
        .await
        .map_err(|e| ServiceError::Communication(service.to_string(), e.to_string()))?;

    response_rx
        .await
        .map_err(|e| ServiceError::Communication(service.to_string(), e.to_string()))?
}

/// Process-scoped collaborators shared by every service.
#[derive(Clone)]
pub struct Dependencies {
    pub users: Arc<dyn UserStore>,
    pub categories: Arc<dyn CategoryStore>,
    pub expenses: Arc<dyn ExpenseStore>,
    pub messages: Arc<dyn MessageStore>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub interpreter: Arc<dyn Interpreter>,
}

/// Channels into the running request handlers.
#[derive(Clone)]
pub struct ServiceChannels {
    pub users: mpsc::Sender<users::UserRequest>,
    pub categories: mpsc::Sender<categories::CategoryRequest>,
    pub expenses: mpsc::Sender<expenses::ExpenseRequest>,
    pub chat: mpsc::Sender<chat::ChatRequest>,
}

pub struct ChatOptions {
    pub history_limit: i64,
    pub interpretation_timeout: Duration,
    pub auth_timeout: Duration,
}

impl ChatOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            history_limit: settings.chat.history_limit,
            interpretation_timeout: Duration::from_secs(settings.chat.interpretation_timeout_secs),
            auth_timeout: Duration::from_secs(settings.chat.auth_timeout_secs),
        }
    }
}

/// Spawns one task per request handler and returns the channels feeding them.
pub fn spawn_services(
    deps: &Dependencies,
    sessions: Arc<realtime::SessionRegistry>,
    options: &ChatOptions,
) -> ServiceChannels {
    let (user_tx, mut user_rx) = mpsc::channel(512);
    let (category_tx, mut category_rx) = mpsc::channel(512);
    let (expense_tx, mut expense_rx) = mpsc::channel(512);
    let (chat_tx, mut chat_rx) = mpsc::channel(512);

    log::info!("Starting user service.");
    let user_handler = users::UserRequestHandler::new(deps.users.clone());
    tokio::spawn(async move {
        users::UserService::new()
            .run(user_handler, &mut user_rx)
            .await;
    });

    log::info!("Starting category service.");
    let category_handler = categories::CategoryRequestHandler::new(deps.categories.clone());
    tokio::spawn(async move {
        categories::CategoryService::new()
            .run(category_handler, &mut category_rx)
            .await;
    });

    log::info!("Starting expense service.");
    let expense_handler =
        expenses::ExpenseRequestHandler::new(deps.expenses.clone(), deps.categories.clone());
    tokio::spawn(async move {
        expenses::ExpenseService::new()
            .run(expense_handler, &mut expense_rx)
            .await;
    });

    log::info!("Starting chat service.");
    let pipeline = chat::ExpensePipeline::new(
        deps.messages.clone(),
        deps.categories.clone(),
        deps.expenses.clone(),
        deps.interpreter.clone(),
        options.interpretation_timeout,
    );
    let chat_handler = chat::ChatRequestHandler::new(pipeline, sessions, options.history_limit);
    tokio::spawn(async move {
        chat::ChatService::new()
            .run(chat_handler, &mut chat_rx)
            .await;
    });

    ServiceChannels {
        users: user_tx,
        categories: category_tx,
        expenses: expense_tx,
        chat: chat_tx,
    }
}
