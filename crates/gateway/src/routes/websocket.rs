use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use buzzhub_chats::{
    delivery_channel, ChatError, DeliveryReceiver, DeliverySender, SubscriptionHandle,
};
use buzzhub_database::User;
use futures_util::{Sink, SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::Display;
use std::time::Duration;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    protocol::{ClientEvent, ServerEvent},
    GatewayError, GatewayState,
};

const CONTROL_CAPACITY: usize = 32;
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    token: Option<String>,
}

/// Authenticate `?token=` and upgrade to a live subscription socket.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WebSocketQuery>,
    State(state): State<GatewayState>,
) -> Result<Response, GatewayError> {
    let token = params
        .token
        .ok_or_else(|| GatewayError::AuthenticationFailed("missing token".into()))?;
    let (user, _session) = state.authenticate(&token).await?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user)))
}

/// One client connection.
struct Connection {
    state: GatewayState,
    user: User,
    session_id: String,
    out_tx: mpsc::Sender<ServerEvent>,
    delivery_tx: DeliverySender,
    subscriptions: HashMap<String, SubscriptionHandle>,
}

async fn handle_socket(socket: WebSocket, state: GatewayState, user: User) {
    let session_id = Uuid::new_v4().to_string();
    let (ws_sender, mut ws_receiver) = socket.split();

    let (out_tx, out_rx) = mpsc::channel::<ServerEvent>(CONTROL_CAPACITY);
    let (delivery_tx, delivery_rx) = delivery_channel(state.channel_capacity);

    let writer = spawn_writer(ws_sender, out_rx, delivery_rx, session_id.clone());

    info!(user_id = user.id, %session_id, "websocket connected");

    let mut connection = Connection {
        state,
        user,
        session_id,
        out_tx,
        delivery_tx,
        subscriptions: HashMap::new(),
    };

    let hello = ServerEvent::Hello {
        user_id: connection.user.id,
        session_id: connection.session_id.clone(),
    };

    if connection.reply(hello).await {
        while let Some(frame) = ws_receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    let reply = match serde_json::from_str::<ClientEvent>(&text) {
                        Ok(event) => connection.handle(event).await,
                        Err(error) => {
                            warn!(user_id = connection.user.id, %error, "invalid client frame");
                            Some(ServerEvent::Error {
                                message: "invalid event format".to_string(),
                            })
                        }
                    };
                    if let Some(reply) = reply {
                        if !connection.reply(reply).await {
                            break;
                        }
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(error) => {
                    debug!(user_id = connection.user.id, %error, "websocket read failed");
                    break;
                }
            }
        }
    }

    let removed = connection
        .state
        .registry
        .unsubscribe_session(&connection.session_id);
    drop(connection.out_tx);
    drop(connection.delivery_tx);
    stop_writer(writer).await;
    info!(
        user_id = connection.user.id,
        session_id = %connection.session_id,
        subscriptions = removed,
        "websocket disconnected"
    );
}

/// Forward control replies and deliveries to `sink` until both channels
/// are closed and drained, then hand the sink back.
fn spawn_writer<S>(
    mut sink: S,
    mut out_rx: mpsc::Receiver<ServerEvent>,
    mut delivery_rx: DeliveryReceiver,
    session_id: String,
) -> JoinHandle<S>
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display,
{
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                Some(event) = out_rx.recv() => event,
                Some(event) = delivery_rx.recv() => ServerEvent::from(event),
                else => break,
            };

            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(error) => {
                    error!(%error, "failed to encode server event");
                    continue;
                }
            };
            if let Err(error) = sink.send(Message::Text(json)).await {
                debug!(%session_id, %error, "websocket write failed");
                break;
            }
        }
        sink
    })
}

/// Wait for the writer to flush what is already queued. Its senders must be
/// dropped first. Gives up after [`WRITER_FLUSH_TIMEOUT`].
async fn stop_writer<S>(mut writer: JoinHandle<S>) -> Option<S> {
    match tokio::time::timeout(WRITER_FLUSH_TIMEOUT, &mut writer).await {
        Ok(Ok(sink)) => Some(sink),
        Ok(Err(error)) => {
            warn!(%error, "websocket writer task failed");
            None
        }
        Err(_) => {
            debug!("websocket writer did not drain in time");
            writer.abort();
            None
        }
    }
}

/// Error frame for a failed chat operation. Store failures are logged and
/// reported without their cause.
fn error_frame(error: ChatError) -> ServerEvent {
    ServerEvent::Error {
        message: GatewayError::from(error).to_string(),
    }
}

impl Connection {
    /// Queue a control reply. Returns false once the writer is gone.
    async fn reply(&self, event: ServerEvent) -> bool {
        self.out_tx.send(event).await.is_ok()
    }

    async fn handle(&mut self, event: ClientEvent) -> Option<ServerEvent> {
        match event {
            ClientEvent::Ping => Some(ServerEvent::Pong),
            ClientEvent::Subscribe { conversation_id } => Some(self.subscribe(conversation_id).await),
            ClientEvent::Unsubscribe { conversation_id } => {
                if let Some(handle) = self.subscriptions.remove(&conversation_id) {
                    self.state.registry.unsubscribe(&handle);
                }
                Some(ServerEvent::Unsubscribed { conversation_id })
            }
            ClientEvent::SendMessage {
                conversation_id,
                body,
            } => self.send_message(conversation_id, body).await,
        }
    }

    async fn subscribe(&mut self, conversation_id: String) -> ServerEvent {
        if self.subscriptions.contains_key(&conversation_id) {
            return ServerEvent::Subscribed { conversation_id };
        }

        if let Err(error) = self
            .state
            .router
            .conversation_for(&conversation_id, self.user.id)
            .await
        {
            return error_frame(error);
        }

        let handle =
            self.state
                .registry
                .subscribe(&conversation_id, &self.session_id, &self.delivery_tx);
        self.subscriptions.insert(conversation_id.clone(), handle);
        ServerEvent::Subscribed { conversation_id }
    }

    /// Subscribed senders see their own message through the fan-out path.
    async fn send_message(&self, conversation_id: String, body: String) -> Option<ServerEvent> {
        match self
            .state
            .router
            .send(&conversation_id, self.user.id, &body)
            .await
        {
            Ok(message) if !self.subscriptions.contains_key(&conversation_id) => {
                Some(ServerEvent::MessageSent {
                    conversation_id,
                    message,
                })
            }
            Ok(_) => None,
            Err(error) => Some(error_frame(error)),
        }
    }
}
