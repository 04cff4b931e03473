//! Per-connection websocket loop.
//!
//! A connection is authenticated before it is registered, so an
//! unauthenticated socket never receives broadcasts and never reaches the
//! chat service. Once active, every frame is handled independently and no
//! failure inside a handler closes the connection.

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::events::{ClientEvent, ServerEvent};
use crate::models::users::Identity;
use crate::services::auth::MISSING_TOKEN;
use crate::services::chat::ChatRequest;
use crate::services::dispatch;
use crate::services::http::AppState;

enum SessionEnd {
    ClientClosed,
    StreamClosed,
    Protocol(axum::Error),
}

pub(super) async fn run(socket: WebSocket, state: AppState, identity: Option<Identity>) {
    let (mut sink, mut stream) = socket.split();

    let identity = match identity {
        Some(identity) => identity,
        None => match authenticate_first_frame(&mut stream, &state).await {
            Ok(identity) => identity,
            Err(reason) => {
                log::warn!("Closing unauthenticated websocket: {}", reason);
                close_policy_violation(&mut sink, reason).await;
                return;
            }
        },
    };

    let (session_id, outbound) = state.sessions.register();
    log::info!(
        "User {} connected as session {}",
        identity.user_id,
        session_id
    );

    let writer = tokio::spawn(write_events(sink, outbound));
    let end = ActiveSession {
        state: &state,
        identity: &identity,
        session_id,
    }
    .read_frames(&mut stream)
    .await;

    match end {
        SessionEnd::ClientClosed => log::info!("Session {} closed by client", session_id),
        SessionEnd::StreamClosed => log::info!("Session {} stream ended", session_id),
        SessionEnd::Protocol(e) => log::warn!("Session {} protocol error: {}", session_id, e),
    }

    state.sessions.remove(&session_id);
    writer.abort();
}

/// Waits for an `authenticate` frame within the configured timeout.
async fn authenticate_first_frame(
    stream: &mut SplitStream<WebSocket>,
    state: &AppState,
) -> Result<Identity, String> {
    let frame = tokio::time::timeout(state.auth_timeout, next_text(stream))
        .await
        .map_err(|_| MISSING_TOKEN.to_string())?
        .ok_or_else(|| MISSING_TOKEN.to_string())?;

    match serde_json::from_str::<ClientEvent>(&frame) {
        Ok(ClientEvent::Authenticate { token }) => state
            .authenticator
            .authenticate(&token)
            .await
            .map_err(|e| e.public_message()),
        _ => Err(MISSING_TOKEN.to_string()),
    }
}

async fn next_text(stream: &mut SplitStream<WebSocket>) -> Option<String> {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => return Some(text.as_str().to_owned()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
    None
}

async fn close_policy_violation(sink: &mut SplitSink<WebSocket, Message>, reason: String) {
    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: reason.into(),
    };

    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
        log::debug!("Could not send close frame: {}", e);
    }
}

async fn write_events(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::UnboundedReceiver<ServerEvent>,
) {
    while let Some(event) = outbound.recv().await {
        let body = match serde_json::to_string(&event) {
            Ok(body) => body,
            Err(e) => {
                log::error!("Failed to serialize outbound event: {}", e);
                continue;
            }
        };

        if let Err(e) = sink.send(Message::Text(body.into())).await {
            log::debug!("Websocket write failed: {}", e);
            break;
        }
    }
}

struct ActiveSession<'a> {
    state: &'a AppState,
    identity: &'a Identity,
    session_id: Uuid,
}

impl ActiveSession<'_> {
    async fn read_frames(&self, stream: &mut SplitStream<WebSocket>) -> SessionEnd {
        loop {
            match stream.next().await {
                None => return SessionEnd::StreamClosed,
                Some(Err(e)) => return SessionEnd::Protocol(e),
                Some(Ok(Message::Close(_))) => return SessionEnd::ClientClosed,
                Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()).await,
                Some(Ok(_)) => {}
            }
        }
    }

    fn reply(&self, event: ServerEvent) {
        self.state.sessions.send_to(&self.session_id, event);
    }

    async fn handle_text(&self, text: &str) {
        let event = match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => event,
            Err(e) => {
                log::warn!("Session {} sent a malformed frame: {}", self.session_id, e);
                self.reply(ServerEvent::error(format!("Malformed event: {}", e)));
                return;
            }
        };

        match event {
            ClientEvent::ChatSubmit(content) => self.submit(content).await,
            ClientEvent::HistoryRequest => self.history().await,
            ClientEvent::Authenticate { .. } => {
                log::debug!("Session {} is already authenticated", self.session_id);
            }
        }
    }

    async fn submit(&self, content: String) {
        let request = ChatRequest::SendMessage {
            session_id: self.session_id,
            user_id: self.identity.user_id.clone(),
            content,
        };

        if let Err(e) = self.state.channels.chat.send(request).await {
            log::error!("Chat service unreachable: {}", e);
            self.reply(ServerEvent::error("Something went wrong!"));
        }
    }

    async fn history(&self) {
        let user_id = self.identity.user_id.clone();
        let history = dispatch(&self.state.channels.chat, "chat", |response| {
            ChatRequest::GetMessages { user_id, response }
        })
        .await;

        match history {
            Ok(messages) => self.reply(ServerEvent::HistoryResponse(messages)),
            Err(e) => self.reply(ServerEvent::error(e.public_message())),
        }
    }
}
