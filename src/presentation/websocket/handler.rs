//! WebSocket Connection Handler
//!
//! Authenticates a connection, then runs one reader loop per socket while a
//! writer task drains the connection's outbound queue.

use std::time::Duration;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::broker::Audience;
use super::messages::{ClientFrame, Outbound, ServerFrame};
use super::registry::ConnectionHandle;
use super::session::GatewayState;
use crate::application::services::auth_service::CLOSE_AUTH_FAILED;
use crate::domain::UserProfile;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// How long the writer gets to flush before it is cancelled
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
    pub room_id: Option<i64>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Response {
    let limits = &state.settings.websocket;
    ws.max_message_size(limits.max_message_size)
        .max_frame_size(limits.max_frame_size)
        .on_upgrade(move |socket| handle_socket(socket, params, state))
}

async fn handle_socket(socket: WebSocket, params: ConnectParams, state: AppState) {
    let settings = state.settings.websocket.clone();
    let (mut sink, mut stream) = socket.split();

    let auth_timeout = Duration::from_secs(settings.auth_timeout_secs);
    let user = match timeout(auth_timeout, state.auth.authenticate(params.token.as_deref())).await {
        Ok(Ok(user)) => user,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "WebSocket authentication failed");
            send_close(&mut sink, e.close_code(), &e.to_string()).await;
            return;
        }
        Err(_) => {
            tracing::debug!("WebSocket authentication timed out");
            send_close(&mut sink, CLOSE_AUTH_FAILED, "Authentication timed out").await;
            return;
        }
    };

    let (tx, rx) = mpsc::channel(settings.outbound_buffer.max(1));
    let cancel = CancellationToken::new();
    let handle = state.registry.register(user.id, tx.clone(), cancel.clone()).await;
    let mut writer = tokio::spawn(write_loop(sink, rx, cancel.clone()));

    tracing::info!(user_id = user.id, connection_id = %handle.id, "User connected");

    let mut session = Session {
        state: state.clone(),
        user,
        handle,
        tx,
        gateway: GatewayState::Connecting.authenticated(),
    };

    if let Some(room_id) = params.room_id {
        if let Err(e) = session.join(room_id).await {
            session.reply_error(&e);
        }
    }

    let idle = Duration::from_secs(settings.idle_timeout_secs);
    let close = loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break None,
            next = timeout(idle, stream.next()) => next,
        };

        match next {
            Err(_) => {
                tracing::debug!(user_id = session.user.id, "Idle timeout");
                break Some((close_code::NORMAL, "Idle timeout"));
            }
            Ok(None) | Ok(Some(Ok(Message::Close(_)))) => break None,
            Ok(Some(Err(e))) => {
                tracing::debug!(user_id = session.user.id, error = %e, "WebSocket error");
                break None;
            }
            Ok(Some(Ok(Message::Text(text)))) => session.handle_text(text.as_str()).await,
            Ok(Some(Ok(Message::Binary(_)))) => {
                break Some((close_code::UNSUPPORTED, "Binary frames are not supported"));
            }
            // Ping and pong are answered by the socket itself
            Ok(Some(Ok(_))) => {}
        }
    };

    session.gateway = session.gateway.close();

    if let Some((code, reason)) = close {
        let close = Outbound::Close {
            code,
            reason: reason.to_string(),
        };
        let _ = timeout(WRITER_DRAIN_TIMEOUT, session.tx.send(close)).await;
    }

    state.broker.release_connection(&session.handle).await;
    let user_id = session.user.id;
    let connection_id = session.handle.id;
    drop(session);

    if timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        cancel.cancel();
        writer.abort();
    }
    cancel.cancel();

    tracing::info!(user_id, %connection_id, "User disconnected");
}

/// Single writer per socket
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Outbound>,
    cancel: CancellationToken,
) {
    loop {
        let outbound = tokio::select! {
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(outbound) => outbound,
                None => break,
            },
        };

        match outbound {
            Outbound::Frame(text) => {
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            Outbound::Close { code, reason } => {
                send_close(&mut sink, code, &reason).await;
                break;
            }
        }
    }
    let _ = sink.close().await;
}

async fn send_close(sink: &mut SplitSink<WebSocket, Message>, code: u16, reason: &str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
        tracing::debug!(error = %e, "Failed to send close frame");
    }
}

struct Session {
    state: AppState,
    user: UserProfile,
    handle: ConnectionHandle,
    tx: mpsc::Sender<Outbound>,
    gateway: GatewayState,
}

impl Session {
    async fn handle_text(&mut self, text: &str) {
        if !self.gateway.is_authenticated() {
            return;
        }
        let result = match ClientFrame::parse(text) {
            Ok(frame) => self.dispatch(frame).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            self.reply_error(&e);
        }
    }

    async fn dispatch(&mut self, frame: ClientFrame) -> Result<(), AppError> {
        let user_id = self.user.id;
        let broker = self.state.broker.clone();
        let messages = self.state.messages.clone();

        match frame {
            ClientFrame::SendMessage(data) => {
                let (request, local_temp_id) = data.into_request();
                let message = messages.send(user_id, request).await?;
                let room_id = message.room_id;
                let view = messages.view(message, local_temp_id).await?;

                broker
                    .broadcast(room_id, &ServerFrame::NewMessage(view), Audience::Everyone)
                    .await?;
                broker.clear_typing_for(user_id, room_id).await;
            }
            ClientFrame::Typing { room_id, is_typing } => {
                broker
                    .set_typing(room_id, user_id, &self.user.name, is_typing)
                    .await?;
            }
            ClientFrame::JoinRoom { room_id } => self.join(room_id).await?,
            ClientFrame::LeaveRoom {} => self.leave().await?,
            ClientFrame::MarkRead { room_id, position } => {
                let cursor = messages.mark_read(room_id, user_id, position).await?;
                broker
                    .broadcast(room_id, &ServerFrame::MessageRead(cursor), Audience::Everyone)
                    .await?;
            }
            ClientFrame::EditMessage {
                message_id,
                content,
            } => {
                let message = messages.edit(message_id, user_id, &content).await?;
                self.announce_update(message).await?;
            }
            ClientFrame::DeleteMessage { message_id } => {
                let message = messages.soft_delete(message_id, user_id).await?;
                self.announce_update(message).await?;
            }
            ClientFrame::Ping {} => self.reply(&ServerFrame::Pong {}),
        }
        Ok(())
    }

    async fn join(&mut self, room_id: i64) -> Result<(), AppError> {
        let room = self.state.broker.require_member(room_id, self.user.id).await?;

        if let Some(previous) = self.gateway.current_room() {
            if previous != room.id {
                self.state.broker.clear_typing_for(self.user.id, previous).await;
            }
        }

        self.gateway = self.gateway.join(room.id);
        self.state.registry.set_current_room(self.handle.id, Some(room.id));
        tracing::debug!(user_id = self.user.id, room_id = room.id, "Joined room");
        self.reply(&ServerFrame::RoomJoined { room_id: room.id });
        Ok(())
    }

    async fn leave(&mut self) -> Result<(), AppError> {
        let room_id = self
            .gateway
            .current_room()
            .ok_or_else(|| AppError::Validation("Not in a room".into()))?;

        self.state.broker.clear_typing_for(self.user.id, room_id).await;
        self.gateway = self.gateway.leave();
        self.state.registry.set_current_room(self.handle.id, None);
        self.reply(&ServerFrame::RoomLeft { room_id });
        Ok(())
    }

    async fn announce_update(&self, message: crate::domain::Message) -> Result<(), AppError> {
        let room_id = message.room_id;
        let view = self.state.messages.view(message, None).await?;
        self.state
            .broker
            .broadcast(room_id, &ServerFrame::MessageUpdate(view), Audience::Everyone)
            .await?;
        Ok(())
    }

    fn reply_error(&self, err: &AppError) {
        if err.is_client_error() {
            tracing::debug!(user_id = self.user.id, error = %err, "Frame rejected");
        }
        self.reply(&ServerFrame::error(err));
    }

    fn reply(&self, frame: &ServerFrame) {
        let payload = match frame.encode() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode reply");
                return;
            }
        };
        if self.tx.try_send(Outbound::Frame(payload)).is_err() {
            self.state.registry.drop_connection(self.handle.id);
        }
    }
}
