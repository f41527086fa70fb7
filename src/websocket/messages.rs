//! WebSocket Message Types
//!
//! Defines all message types for the realtime channel between journal
//! clients and the Keepsake server. Both directions derive `Serialize` and
//! `Deserialize` because the remote backend's subscriber speaks the same
//! protocol from the other end.

use serde::{Deserialize, Serialize};

use crate::feed::{ChangeEvent, ChangeKind, Table};

/// Wildcard topic matching every table
pub const ALL_TOPICS: &str = "*";

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to topics for change notifications
    Subscribe {
        /// Topics to subscribe to ("posts", "comments" or "*")
        topics: Vec<String>,
    },
    /// Unsubscribe from topics
    Unsubscribe {
        /// Topics to unsubscribe from
        topics: Vec<String>,
    },
    /// Ping for keepalive
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A row changed
    Change {
        table: Table,
        event: ChangeKind,
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        post_id: Option<String>,
    },
    /// Subscription confirmed
    Subscribed {
        /// Topics successfully subscribed to
        topics: Vec<String>,
    },
    /// Unsubscription confirmed
    Unsubscribed {
        /// Topics successfully unsubscribed from
        topics: Vec<String>,
    },
    /// Pong response to ping
    Pong,
    /// Error message
    Error {
        /// Error description
        message: String,
    },
    /// Connection established
    Connected {
        /// Unique connection identifier
        connection_id: String,
    },
}

impl ServerMessage {
    /// The change carried by this message, if any
    pub fn into_change(self) -> Option<ChangeEvent> {
        match self {
            ServerMessage::Change {
                table,
                event,
                id,
                post_id,
            } => Some(ChangeEvent {
                table,
                kind: event,
                id,
                post_id,
            }),
            _ => None,
        }
    }
}

/// Internal event for broadcasting through the hub
#[derive(Debug, Clone)]
pub struct WsEvent {
    /// Topic this event belongs to (the table name)
    pub topic: String,
    /// The message to send to subscribers
    pub message: ServerMessage,
}

impl WsEvent {
    /// Wrap a change from the store's feed
    pub fn change(event: ChangeEvent) -> Self {
        Self {
            topic: event.table.as_str().to_string(),
            message: ServerMessage::Change {
                table: event.table,
                event: event.kind,
                id: event.id,
                post_id: event.post_id,
            },
        }
    }
}
