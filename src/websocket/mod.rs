//! WebSocket Realtime Channel
//!
//! Pushes row-level change notifications for posts and comments to
//! connected journal clients.
//!
//! ## Architecture
//!
//! - **ConnectionHub**: Manages active connections and topic subscriptions,
//!   and forwards the store's change feed to them
//! - **Handler**: Handles WebSocket upgrade and message processing
//! - **Messages**: Defines client and server message formats
//!
//! ## Usage
//!
//! Clients connect to `/api/v1/realtime` and subscribe to topics:
//! - `posts` - Post inserts and deletes
//! - `comments` - Comment inserts and deletes
//! - `*` - Everything
//!
//! ## Example
//!
//! ```javascript
//! // Browser
//! const ws = new WebSocket('ws://localhost:8090/api/v1/realtime?apikey=...');
//!
//! ws.onopen = () => {
//!   ws.send(JSON.stringify({type: 'subscribe', topics: ['posts', 'comments']}));
//! };
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   if (msg.type === 'change') reloadPosts();
//! };
//! ```

mod handler;
mod hub;
mod messages;

pub use handler::websocket_handler;
pub use hub::{ConnectionHub, HubConfig, HubError};
pub use messages::{ClientMessage, ServerMessage, WsEvent, ALL_TOPICS};
