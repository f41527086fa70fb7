//! # Keepsake
//!
//! A private journal for two people: a login gate, a post list, and
//! threaded comments, stored locally or on a small hosted backend that
//! pushes changes to every connected client.
//!
//! ## Features
//!
//! - **Credential gate**: fixed name → code table, in-memory sessions
//! - **Three backends** behind one [`storage::JournalStore`] trait:
//!   local key/value files, SQLite, or the hosted HTTP API
//! - **Realtime**: per-table change subscriptions; clients reload on change
//! - **Hosted API**: Axum REST routes plus a WebSocket change channel
//!
//! ## Modules
//!
//! - [`auth`]: Credential table, login form, sessions
//! - [`storage`]: Posts, comments and the three backends
//! - [`feed`]: Change events and subscriptions
//! - [`app`]: The journal client controller and its text rendering
//! - [`api`]: REST API server with Axum
//! - [`websocket`]: Realtime connection hub
//! - [`config`] / [`telemetry`]: Configuration and logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use keepsake::app::JournalApp;
//! use keepsake::auth::CredentialTable;
//! use keepsake::config::Config;
//! use keepsake::storage::open_store;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let store = open_store(&config.storage).await?;
//!
//!     let mut app = JournalApp::new(store, CredentialTable::from_config(&config.auth));
//!     app.login("소영", "000521").await?;
//!     app.create_post("hello").await?;
//!
//!     println!("{} posts", app.posts().len());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod feed;
pub mod storage;
pub mod telemetry;
pub mod websocket;

// Re-export top-level types for convenience
pub use storage::{
    open_store, Comment, CommentId, JournalStore, LocalStore, Post, PostId, RemoteStore,
    SqliteStore, StorageError, StorageResult, StoreKind,
};

pub use feed::{ChangeEvent, ChangeFeed, ChangeKind, Subscription, Table};

pub use auth::{AuthError, CredentialTable, LoginForm, Session};

pub use app::{AppError, JournalApp, Screen};

pub use api::{build_router, serve, ApiError, AppState};

pub use websocket::{
    websocket_handler, ClientMessage, ConnectionHub, HubConfig, HubError, ServerMessage, WsEvent,
};

pub use config::{
    generate_default_config, ApiConfig, AuthConfig, BackendKind, Config, ConfigError,
    LoggingConfig, StorageConfig,
};
