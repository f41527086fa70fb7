//! Remote backend - HTTP client of the hosted Keepsake API
//!
//! Every operation is one request against `/api/v1`. The access key travels
//! in the `apikey` header. Realtime subscriptions open one WebSocket per
//! table against `/api/v1/realtime` and pump change messages into a private
//! [`ChangeFeed`]; dropping the returned [`Subscription`] closes the socket.

use async_trait::async_trait;
use futures_util::{SinkExt, Stream, StreamExt};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::api::dto::{
    CommentListResponse, CreateCommentRequest, CreatePostRequest, ErrorResponse,
    PostListResponse,
};
use crate::feed::{ChangeFeed, Subscription, Table, TaskGuard};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{Comment, CommentId, Post, PostId};
use crate::storage::{JournalStore, StoreKind};
use crate::websocket::{ClientMessage, ServerMessage};

/// Header carrying the access key
pub const ACCESS_KEY_HEADER: &str = "apikey";

/// How long `subscribe` waits for the server to confirm a subscription
const SUBSCRIBE_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection parameters of the hosted API
#[derive(Debug, Clone)]
pub struct RemoteOptions {
    /// Base URL without trailing slash, e.g. `http://localhost:8090`
    pub base_url: String,
    pub access_key: Option<String>,
    pub request_timeout: Duration,
}

/// Journal store backed by the hosted API
pub struct RemoteStore {
    client: Client,
    options: RemoteOptions,
}

impl RemoteStore {
    pub fn new(options: RemoteOptions) -> StorageResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("Keepsake/", env!("CARGO_PKG_VERSION")))
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| StorageError::Unavailable(format!("HTTP client: {}", e)))?;

        Ok(Self { client, options })
    }

    pub fn base_url(&self) -> &str {
        &self.options.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.options.base_url, path)
    }

    /// WebSocket URL of the realtime endpoint
    fn realtime_url(&self) -> String {
        let base = &self.options.base_url;
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.clone()
        };

        match &self.options.access_key {
            Some(key) => format!(
                "{}/api/v1/realtime?{}={}",
                ws_base,
                ACCESS_KEY_HEADER,
                urlencoding::encode(key)
            ),
            None => format!("{}/api/v1/realtime", ws_base),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.options.access_key {
            Some(key) => request.header(ACCESS_KEY_HEADER, key),
            None => request,
        }
    }

    /// Send a request and turn non-success statuses into errors
    async fn send(&self, request: RequestBuilder, what: &str) -> StorageResult<Response> {
        let response = self.authorize(request).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let message = match response.json::<ErrorResponse>().await {
            Ok(body) => body.error.message,
            Err(_) => status.canonical_reason().unwrap_or("unknown").to_string(),
        };

        tracing::debug!(status = status.as_u16(), what, message = %message, "Remote request failed");

        if status == StatusCode::NOT_FOUND {
            Err(StorageError::NotFound(what.to_string()))
        } else {
            Err(StorageError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> StorageResult<T> {
        let response = self.send(request, what).await?;
        Ok(response.json::<T>().await?)
    }

    /// Open the realtime socket and wait until `table` is subscribed
    async fn open_realtime(&self, table: Table) -> StorageResult<Subscription> {
        let url = self.realtime_url();
        let (socket, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| StorageError::Unavailable(format!("realtime connect: {}", e)))?;
        let (mut sink, mut stream) = socket.split();

        let request = ClientMessage::Subscribe {
            topics: vec![table.as_str().to_string()],
        };
        sink.send(Message::Text(serde_json::to_string(&request)?))
            .await
            .map_err(|e| StorageError::Unavailable(format!("realtime subscribe: {}", e)))?;

        tokio::time::timeout(SUBSCRIBE_ACK_TIMEOUT, wait_for_subscribed(&mut stream))
            .await
            .map_err(|_| StorageError::Timeout)??;

        let feed = ChangeFeed::default();
        let subscription = feed.subscribe(table);

        let pump = tokio::spawn(async move {
            // Keep the sink alive so the server does not see a half-closed socket.
            let _sink = sink;
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(message) => {
                            if let Some(change) = message.into_change() {
                                feed.publish(change);
                            }
                        }
                        Err(e) => tracing::debug!(error = %e, "Ignoring malformed realtime message"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(table = %table, error = %e, "Realtime connection lost");
                        break;
                    }
                }
            }
            tracing::debug!(table = %table, "Realtime pump finished");
        });

        Ok(subscription.with_pump(TaskGuard::new(pump)))
    }
}

/// Read frames until the server confirms or rejects the subscription
async fn wait_for_subscribed<S>(stream: &mut S) -> StorageResult<()>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        let frame = frame.map_err(|e| StorageError::Unavailable(format!("realtime: {}", e)))?;
        let Message::Text(text) = frame else { continue };
        match serde_json::from_str::<ServerMessage>(&text)? {
            ServerMessage::Subscribed { .. } => return Ok(()),
            ServerMessage::Error { message } => {
                return Err(StorageError::Api {
                    status: 400,
                    message,
                })
            }
            _ => {}
        }
    }

    Err(StorageError::Unavailable(
        "realtime connection closed before subscribing".to_string(),
    ))
}

#[async_trait]
impl JournalStore for RemoteStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Remote
    }

    async fn list_posts(&self) -> StorageResult<Vec<Post>> {
        let response: PostListResponse = self
            .send_json(self.client.get(self.url("/posts")), "posts")
            .await?;
        Ok(response.posts)
    }

    async fn create_post(&self, author: &str, content: &str) -> StorageResult<Post> {
        let body = CreatePostRequest {
            author: author.to_string(),
            content: content.to_string(),
        };
        self.send_json(self.client.post(self.url("/posts")).json(&body), "posts")
            .await
    }

    async fn list_comments(&self, post_id: &PostId) -> StorageResult<Vec<Comment>> {
        let path = format!("/posts/{}/comments", urlencoding::encode(post_id.as_str()));
        let what = format!("post {}", post_id);
        let response: CommentListResponse =
            self.send_json(self.client.get(self.url(&path)), &what).await?;
        Ok(response.comments)
    }

    async fn add_comment(
        &self,
        post_id: &PostId,
        author: &str,
        content: &str,
    ) -> StorageResult<Comment> {
        let path = format!("/posts/{}/comments", urlencoding::encode(post_id.as_str()));
        let what = format!("post {}", post_id);
        let body = CreateCommentRequest {
            author: author.to_string(),
            content: content.to_string(),
        };
        self.send_json(self.client.post(self.url(&path)).json(&body), &what)
            .await
    }

    async fn delete_post(&self, id: &PostId) -> StorageResult<()> {
        let path = format!("/posts/{}", urlencoding::encode(id.as_str()));
        self.send(self.client.delete(self.url(&path)), &format!("post {}", id))
            .await?;
        Ok(())
    }

    async fn delete_comment(&self, id: &CommentId) -> StorageResult<()> {
        let path = format!("/comments/{}", urlencoding::encode(id.as_str()));
        self.send(self.client.delete(self.url(&path)), &format!("comment {}", id))
            .await?;
        Ok(())
    }

    async fn subscribe(&self, table: Table) -> StorageResult<Option<Subscription>> {
        let subscription = self.open_realtime(table).await?;
        tracing::info!(table = %table, url = %self.options.base_url, "Realtime subscription opened");
        Ok(Some(subscription))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(base_url: &str, access_key: Option<&str>) -> RemoteStore {
        RemoteStore::new(RemoteOptions {
            base_url: base_url.to_string(),
            access_key: access_key.map(str::to_string),
            request_timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    #[test]
    fn test_urls() {
        let store = store("http://localhost:8090", Some("a b"));
        assert_eq!(store.url("/posts"), "http://localhost:8090/api/v1/posts");
        assert_eq!(
            store.realtime_url(),
            "ws://localhost:8090/api/v1/realtime?apikey=a%20b"
        );

        let secure = store_without_key("https://journal.example.com");
        assert_eq!(
            secure.realtime_url(),
            "wss://journal.example.com/api/v1/realtime"
        );
    }

    fn store_without_key(base_url: &str) -> RemoteStore {
        store(base_url, None)
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_unavailable() {
        // Port 9 (discard) is closed on test machines.
        let store = store_without_key("http://127.0.0.1:9");
        let err = store.list_posts().await.unwrap_err();
        assert!(
            matches!(err, StorageError::Unavailable(_) | StorageError::Timeout),
            "unexpected error: {err:?}"
        );
        assert!(store.subscribe(Table::Posts).await.is_err());
    }

    #[test]
    fn test_kind() {
        let store = store_without_key("http://localhost:8090");
        assert_eq!(store.kind(), StoreKind::Remote);
        assert!(store.supports_delete());
    }
}
