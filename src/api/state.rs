//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use crate::config::ApiConfig;
use crate::storage::SqliteStore;
use crate::websocket::{ConnectionHub, HubConfig};
use std::sync::Arc;
use std::time::Instant;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Relational store serving posts and comments
    pub store: Arc<SqliteStore>,
    /// API configuration
    pub config: Arc<ApiConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
    /// WebSocket connection hub for realtime change notifications
    pub ws_hub: Arc<ConnectionHub>,
}

impl AppState {
    /// Create a new AppState
    ///
    /// The hub is sized from `config.max_realtime_connections`. Call
    /// [`AppState::start_realtime`] to begin forwarding store changes.
    pub fn new(store: Arc<SqliteStore>, config: ApiConfig) -> Self {
        let hub_config = HubConfig {
            max_connections: config.max_realtime_connections,
        };
        Self {
            store,
            config: Arc::new(config),
            start_time: Instant::now(),
            ws_hub: Arc::new(ConnectionHub::new(hub_config)),
        }
    }

    /// Forward the store's change feed to realtime subscribers
    pub fn start_realtime(&self) -> tokio::task::JoinHandle<()> {
        self.ws_hub.forward_changes(self.store.change_feed())
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get WebSocket connection count
    pub async fn ws_connection_count(&self) -> usize {
        self.ws_hub.connection_count().await
    }
}
