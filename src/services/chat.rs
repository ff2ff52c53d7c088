//! Live Chat Relay.
//!
//! [`ChatHub`] owns one room per order id: the append-only message sequence
//! and the senders of every connection joined to it. All mutation of a room
//! happens under that room's mutex, which gives each order a single total
//! order of messages and guarantees a joiner's history frame is queued
//! before any message posted after the join.
//!
//! [`ChatConnection`] is the per-socket state machine
//! (`Disconnected -> Joined(order, role) -> Disconnected`) that authorizes
//! client frames before touching the hub.

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::models::{ChatMessage, ParticipantRole};
use crate::notifications::{self, Channel, Notifier};
use crate::services::order_store::OrderStore;
use crate::token::TokenIssuer;

pub const MAX_MESSAGE_CHARS: usize = 2000;
const MAX_AUTHOR_CHARS: usize = 64;

pub type ConnectionId = Uuid;
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// Frames sent by a chat client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Join {
        order_id: String,
        #[serde(default)]
        token: Option<String>,
        role: ParticipantRole,
        #[serde(default)]
        staff_key: Option<String>,
    },
    Send {
        order_id: String,
        #[serde(default)]
        token: Option<String>,
        text: String,
        #[serde(default)]
        sender: Option<String>,
    },
    Complete {
        order_id: String,
        #[serde(default)]
        token: Option<String>,
    },
}

/// Frames sent to a chat client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    History {
        order_id: String,
        messages: Vec<ChatMessage>,
    },
    Message {
        order_id: String,
        message: ChatMessage,
    },
    Completed {
        order_id: String,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("Malformed frame: {0}")]
    Malformed(String),
    #[error("Invalid or missing order token")]
    Unauthorized,
    #[error("Staff access requires a valid staff key")]
    StaffKeyRejected,
    #[error("Order not found")]
    UnknownOrder,
    #[error("Join the order's chat first")]
    NotJoined,
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Message exceeds 2000 characters")]
    MessageTooLong,
}

#[derive(Default)]
struct Room {
    messages: Vec<ChatMessage>,
    members: HashMap<ConnectionId, EventSender>,
}

impl Room {
    /// Sends to every member, dropping those whose receiver is gone.
    fn broadcast(&mut self, event: &ServerEvent) {
        self.members.retain(|id, tx| {
            let alive = tx.send(event.clone()).is_ok();
            if !alive {
                debug!(connection = %id, "Dropping closed chat member");
            }
            alive
        });
    }
}

/// Per-order chat rooms shared by all connections.
#[derive(Clone, Default)]
pub struct ChatHub {
    rooms: Arc<DashMap<String, Arc<Mutex<Room>>>>,
}

impl ChatHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn room(&self, order_id: &str) -> Arc<Mutex<Room>> {
        self.rooms
            .entry(order_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Queues the full history for `tx`, then adds it to the room.
    pub async fn join(&self, order_id: &str, connection: ConnectionId, tx: EventSender) {
        let room = self.room(order_id);
        let mut room = room.lock().await;
        let _ = tx.send(ServerEvent::History {
            order_id: order_id.to_string(),
            messages: room.messages.clone(),
        });
        room.members.insert(connection, tx);
    }

    pub async fn leave(&self, order_id: &str, connection: ConnectionId) {
        let Some(room) = self.rooms.get(order_id).map(|r| r.value().clone()) else {
            return;
        };
        room.lock().await.members.remove(&connection);
    }

    /// Appends a message and relays it to every member, the sender included.
    pub async fn post(
        &self,
        order_id: &str,
        sender: ParticipantRole,
        author: Option<String>,
        text: String,
    ) -> ChatMessage {
        let room = self.room(order_id);
        let mut room = room.lock().await;
        let message = ChatMessage {
            seq: room.messages.len() as u64 + 1,
            sender,
            author,
            text,
            sent_at: Utc::now(),
        };
        room.messages.push(message.clone());
        room.broadcast(&ServerEvent::Message {
            order_id: order_id.to_string(),
            message: message.clone(),
        });
        message
    }

    pub async fn broadcast(&self, order_id: &str, event: ServerEvent) {
        let room = self.room(order_id);
        room.lock().await.broadcast(&event);
    }

    pub async fn history(&self, order_id: &str) -> Vec<ChatMessage> {
        match self.rooms.get(order_id).map(|r| r.value().clone()) {
            Some(room) => room.lock().await.messages.clone(),
            None => Vec::new(),
        }
    }

    pub async fn member_count(&self, order_id: &str) -> usize {
        match self.rooms.get(order_id).map(|r| r.value().clone()) {
            Some(room) => room.lock().await.members.len(),
            None => 0,
        }
    }
}

/// Everything a chat connection needs to authorize and relay frames.
#[derive(Clone)]
pub struct ChatRelay {
    hub: ChatHub,
    store: OrderStore,
    tokens: TokenIssuer,
    staff_key: Option<String>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl ChatRelay {
    pub fn new(
        hub: ChatHub,
        store: OrderStore,
        tokens: TokenIssuer,
        staff_key: Option<String>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            hub,
            store,
            tokens,
            staff_key: staff_key.filter(|k| !k.is_empty()),
            notifier,
        }
    }

    pub fn hub(&self) -> &ChatHub {
        &self.hub
    }

    /// Opens a new connection whose outbound frames go to `tx`.
    pub fn connect(&self, tx: EventSender) -> ChatConnection {
        ChatConnection {
            id: Uuid::new_v4(),
            state: ConnectionState::Disconnected,
            tx,
            relay: self.clone(),
        }
    }

    fn authorize(
        &self,
        order_id: &str,
        role: ParticipantRole,
        token: Option<&str>,
        staff_key: Option<&str>,
    ) -> Result<(), ChatError> {
        match role {
            ParticipantRole::Customer => {
                if !self.tokens.verify_opt(order_id, token) {
                    return Err(ChatError::Unauthorized);
                }
            }
            ParticipantRole::Staff => {
                let expected = self.staff_key.as_deref().ok_or(ChatError::StaffKeyRejected)?;
                if staff_key != Some(expected) {
                    return Err(ChatError::StaffKeyRejected);
                }
            }
        }
        if !self.store.contains(order_id) {
            return Err(ChatError::UnknownOrder);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Joined {
        order_id: String,
        role: ParticipantRole,
    },
}

/// One chat participant's connection.
pub struct ChatConnection {
    id: ConnectionId,
    state: ConnectionState,
    tx: EventSender,
    relay: ChatRelay,
}

impl ChatConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Parses and handles one raw text frame. Failures are reported back to
    /// this connection as an `error` frame.
    pub async fn handle_text(&mut self, raw: &str) {
        let result = match serde_json::from_str::<ClientEvent>(raw) {
            Ok(event) => self.handle(event).await,
            Err(e) => Err(ChatError::Malformed(e.to_string())),
        };
        if let Err(e) = result {
            debug!(connection = %self.id, error = %e, "Rejected chat frame");
            self.reply(ServerEvent::Error {
                message: e.to_string(),
            });
        }
    }

    pub async fn handle(&mut self, event: ClientEvent) -> Result<(), ChatError> {
        match event {
            ClientEvent::Join {
                order_id,
                token,
                role,
                staff_key,
            } => self.join(order_id, role, token, staff_key).await,
            ClientEvent::Send {
                order_id,
                token,
                text,
                sender,
            } => self.send(&order_id, token.as_deref(), text, sender).await,
            ClientEvent::Complete { order_id, token } => {
                self.complete(&order_id, token.as_deref()).await
            }
        }
    }

    #[instrument(skip(self, token, staff_key), fields(connection = %self.id))]
    async fn join(
        &mut self,
        order_id: String,
        role: ParticipantRole,
        token: Option<String>,
        staff_key: Option<String>,
    ) -> Result<(), ChatError> {
        self.relay
            .authorize(&order_id, role, token.as_deref(), staff_key.as_deref())?;

        self.disconnect().await;
        self.relay
            .hub
            .join(&order_id, self.id, self.tx.clone())
            .await;
        info!(role = role.label(), "Joined order chat");
        self.state = ConnectionState::Joined { order_id, role };
        Ok(())
    }

    /// Role of this connection if it is joined to `order_id`.
    fn joined_role(&self, order_id: &str, token: Option<&str>) -> Result<ParticipantRole, ChatError> {
        let ConnectionState::Joined {
            order_id: joined,
            role,
        } = &self.state
        else {
            return Err(ChatError::NotJoined);
        };
        if joined != order_id {
            return Err(ChatError::NotJoined);
        }
        if *role == ParticipantRole::Customer && !self.relay.tokens.verify_opt(order_id, token) {
            return Err(ChatError::Unauthorized);
        }
        Ok(*role)
    }

    async fn send(
        &mut self,
        order_id: &str,
        token: Option<&str>,
        text: String,
        sender: Option<String>,
    ) -> Result<(), ChatError> {
        let role = self.joined_role(order_id, token)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if text.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ChatError::MessageTooLong);
        }
        let author = sender
            .map(|s| s.trim().chars().take(MAX_AUTHOR_CHARS).collect::<String>())
            .filter(|s| !s.is_empty());

        let message = self
            .relay
            .hub
            .post(order_id, role, author, text.to_string())
            .await;
        debug!(%order_id, seq = message.seq, "Relayed chat message");
        Ok(())
    }

    #[instrument(skip(self, token), fields(connection = %self.id))]
    async fn complete(&mut self, order_id: &str, token: Option<&str>) -> Result<(), ChatError> {
        let role = self.joined_role(order_id, token)?;
        let first = self
            .relay
            .store
            .mark_completed(order_id)
            .ok_or(ChatError::UnknownOrder)?;

        let event = ServerEvent::Completed {
            order_id: order_id.to_string(),
        };
        if !first {
            self.reply(event);
            return Ok(());
        }

        info!(role = role.label(), "Order marked completed from chat");
        self.relay.hub.broadcast(order_id, event).await;
        self.notify_staff(order_id, role);
        Ok(())
    }

    fn notify_staff(&self, order_id: &str, role: ParticipantRole) {
        let (Some(notifier), Some(record)) =
            (self.relay.notifier.clone(), self.relay.store.get(order_id))
        else {
            return;
        };
        tokio::spawn(async move {
            let embed = notifications::chat_completed(&record, role);
            if let Err(e) = notifier.notify(Channel::Staff, &embed).await {
                warn!(order_id = %record.order_id(), error = %e, "Staff completion notice failed");
            }
        });
    }

    fn reply(&self, event: ServerEvent) {
        let _ = self.tx.send(event);
    }

    /// Leaves the current room, if any.
    pub async fn disconnect(&mut self) {
        if let ConnectionState::Joined { order_id, .. } =
            std::mem::replace(&mut self.state, ConnectionState::Disconnected)
        {
            self.relay.hub.leave(&order_id, self.id).await;
            debug!(connection = %self.id, %order_id, "Left order chat");
        }
    }
}
