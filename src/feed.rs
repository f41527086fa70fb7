//! Change Feed
//!
//! Row-level change notifications for the `posts` and `comments` tables.
//! Events are invalidation triggers only: subscribers react by reloading,
//! never by patching their state from the event payload.
//!
//! Built on a tokio broadcast channel. A [`Subscription`] filters the shared
//! channel down to one table and may own the task that feeds it (the remote
//! backend pumps a WebSocket into it); dropping the subscription stops that
//! task.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// Default capacity of the broadcast buffer
pub const DEFAULT_FEED_CAPACITY: usize = 256;

/// Table a change belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Posts,
    Comments,
}

impl Table {
    pub fn all() -> &'static [Table] {
        &[Table::Posts, Table::Comments]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Posts => "posts",
            Table::Comments => "comments",
        }
    }

    pub fn parse(s: &str) -> Option<Table> {
        match s {
            "posts" => Some(Table::Posts),
            "comments" => Some(Table::Comments),
            _ => None,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to the row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    /// Events were missed; the subscriber must assume anything changed
    Resync,
}

/// A single row-level change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    #[serde(rename = "event")]
    pub kind: ChangeKind,
    /// Id of the changed row (empty for resync events)
    pub id: String,
    /// Parent post, for comment changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
}

impl ChangeEvent {
    pub fn post(kind: ChangeKind, id: impl Into<String>) -> Self {
        Self {
            table: Table::Posts,
            kind,
            id: id.into(),
            post_id: None,
        }
    }

    pub fn comment(kind: ChangeKind, id: impl Into<String>, post_id: impl Into<String>) -> Self {
        Self {
            table: Table::Comments,
            kind,
            id: id.into(),
            post_id: Some(post_id.into()),
        }
    }

    pub fn resync(table: Table) -> Self {
        Self {
            table,
            kind: ChangeKind::Resync,
            id: String::new(),
            post_id: None,
        }
    }
}

/// Publisher side of the change feed
///
/// Cheap to clone; all clones publish into the same channel.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to all current subscribers
    ///
    /// Having no subscribers is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        tracing::debug!(
            table = %event.table,
            kind = ?event.kind,
            id = %event.id,
            "Publishing change"
        );
        let _ = self.sender.send(event);
    }

    /// Subscribe to changes of one table
    pub fn subscribe(&self, table: Table) -> Subscription {
        Subscription::new(self.sender.subscribe(), Some(table))
    }

    /// Subscribe to changes of every table
    pub fn subscribe_all(&self) -> Subscription {
        Subscription::new(self.sender.subscribe(), None)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Aborts the wrapped task when dropped
#[derive(Debug)]
pub(crate) struct TaskGuard(JoinHandle<()>);

impl TaskGuard {
    pub(crate) fn new(handle: JoinHandle<()>) -> Self {
        Self(handle)
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Receiving side of a change feed
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<ChangeEvent>,
    table: Option<Table>,
    _pump: Option<TaskGuard>,
}

impl Subscription {
    fn new(receiver: broadcast::Receiver<ChangeEvent>, table: Option<Table>) -> Self {
        Self {
            receiver,
            table,
            _pump: None,
        }
    }

    /// Tie the lifetime of `pump` to this subscription
    pub(crate) fn with_pump(mut self, pump: TaskGuard) -> Self {
        self._pump = Some(pump);
        self
    }

    /// Table this subscription is scoped to (`None` = all tables)
    pub fn table(&self) -> Option<Table> {
        self.table
    }

    /// Wait for the next matching change
    ///
    /// Returns `None` once the publisher side is gone. When the subscriber
    /// fell behind and events were dropped, a resync event is returned
    /// instead of the missed ones.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.table.map_or(true, |t| t == event.table) {
                        return Some(event);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Change subscription lagged, forcing resync");
                    return Some(ChangeEvent::resync(self.table.unwrap_or(Table::Posts)));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_event_serialization() {
        let event = ChangeEvent::comment(ChangeKind::Insert, "c1", "p1");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"table\":\"comments\""));
        assert!(json.contains("\"event\":\"insert\""));
        assert!(json.contains("\"post_id\":\"p1\""));

        let post = ChangeEvent::post(ChangeKind::Delete, "p1");
        let json = serde_json::to_string(&post).unwrap();
        assert!(!json.contains("post_id"));
    }

    #[tokio::test]
    async fn test_subscription_filters_by_table() {
        let feed = ChangeFeed::default();
        let mut posts = feed.subscribe(Table::Posts);
        let mut all = feed.subscribe_all();

        feed.publish(ChangeEvent::comment(ChangeKind::Insert, "c1", "p1"));
        feed.publish(ChangeEvent::post(ChangeKind::Insert, "p2"));

        let event = posts.recv().await.unwrap();
        assert_eq!(event.table, Table::Posts);
        assert_eq!(event.id, "p2");

        assert_eq!(all.recv().await.unwrap().table, Table::Comments);
        assert_eq!(all.recv().await.unwrap().table, Table::Posts);
    }

    #[tokio::test]
    async fn test_lagged_subscription_resyncs() {
        let feed = ChangeFeed::new(2);
        let mut sub = feed.subscribe(Table::Comments);

        for i in 0..5 {
            feed.publish(ChangeEvent::comment(ChangeKind::Insert, format!("c{}", i), "p"));
        }

        let event = sub.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Resync);
        assert_eq!(event.table, Table::Comments);
    }

    #[tokio::test]
    async fn test_closed_feed_ends_subscription() {
        let feed = ChangeFeed::default();
        let mut sub = feed.subscribe(Table::Posts);
        drop(feed);
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn test_table_parse() {
        assert_eq!(Table::parse("posts"), Some(Table::Posts));
        assert_eq!(Table::parse("comments"), Some(Table::Comments));
        assert_eq!(Table::parse("users"), None);
    }
}
