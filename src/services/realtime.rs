//! Realtime chat channel: the registry of live connections and the
//! websocket upgrade.

use axum::{
    extract::{State, WebSocketUpgrade},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::auth::bearer_token;
use super::http::AppState;
use crate::models::events::ServerEvent;

mod session;

/// Outbound queues of every authenticated connection, keyed by session id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, mpsc::UnboundedSender<ServerEvent>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<ServerEvent>) {
        let session_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.sessions.insert(session_id, tx);

        (session_id, rx)
    }

    pub fn remove(&self, session_id: &Uuid) {
        self.sessions.remove(session_id);
    }

    /// Returns false when the session is gone; the event is dropped.
    pub fn send_to(&self, session_id: &Uuid, event: ServerEvent) -> bool {
        let delivered = self
            .sessions
            .get(session_id)
            .is_some_and(|tx| tx.send(event).is_ok());

        if !delivered {
            log::debug!("Session {} closed before its event could be delivered", session_id);
        }
        delivered
    }

    /// Sends to every registered session and returns how many accepted it.
    pub fn broadcast(&self, event: ServerEvent) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().send(event.clone()).is_ok())
            .count()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Upgrades `/ws`. A bearer header is checked before the upgrade; without
/// one the client must authenticate with its first frame.
pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let identity = match bearer_token(&headers) {
        Some(token) => match state.authenticator.authenticate(token).await {
            Ok(identity) => Some(identity),
            Err(e) => return state.fail(e).into_response(),
        },
        None => None,
    };

    ws.on_upgrade(move |socket| session::run(socket, state, identity))
}
