//! Keepsake REST API
//!
//! HTTP API over the relational store, built with Axum. This is what the
//! remote backend talks to.
//!
//! # Endpoints
//!
//! ## Posts
//! - `GET /api/v1/posts` - List posts, most recent first, with comment counts
//! - `POST /api/v1/posts` - Create a post
//! - `DELETE /api/v1/posts/:id` - Delete a post and its comments
//!
//! ## Comments
//! - `GET /api/v1/posts/:id/comments` - Comments of a post, oldest first
//! - `POST /api/v1/posts/:id/comments` - Add a comment
//! - `DELETE /api/v1/comments/:id` - Delete a comment
//!
//! ## Realtime
//! - `GET /api/v1/realtime` - WebSocket change notifications
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! When an access key is configured, every `/api/v1` request must carry it
//! in the `apikey` header or the `apikey` query parameter (browsers cannot
//! set headers on WebSocket upgrades).
//!
//! # Example
//!
//! ```rust,no_run
//! use keepsake::api::{serve, AppState};
//! use keepsake::config::ApiConfig;
//! use keepsake::storage::SqliteStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqliteStore::open("keepsake.db")?);
//!     let config = ApiConfig::default();
//!
//!     let state = AppState::new(store, config.clone());
//!     state.start_realtime();
//!     serve(state, &config).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use crate::config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
    routing::{delete, get},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::storage::remote::ACCESS_KEY_HEADER;
use crate::websocket::websocket_handler;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    // Create shared state
    let shared_state = Arc::new(state);

    let api_routes = Router::new()
        // Post routes
        .route(
            "/posts",
            get(routes::posts::list_posts).post(routes::posts::create_post),
        )
        .route("/posts/:id", delete(routes::posts::delete_post))
        // Comment routes
        .route(
            "/posts/:id/comments",
            get(routes::comments::list_comments).post(routes::comments::add_comment),
        )
        .route("/comments/:id", delete(routes::comments::delete_comment))
        // WebSocket route
        .route("/realtime", get(websocket_handler))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&shared_state),
            require_access_key,
        ));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state)
}

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Reject `/api/v1` requests without the configured access key
async fn require_access_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.config.access_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    let from_header = request
        .headers()
        .get(ACCESS_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let provided = from_header.or_else(|| access_key_from_query(request.uri().query()));

    match provided {
        Some(key) if key == expected => Ok(next.run(request).await),
        Some(_) => Err(ApiError::Unauthorized("invalid access key".to_string())),
        None => Err(ApiError::Unauthorized("missing access key".to_string())),
    }
}

fn access_key_from_query(query: Option<&str>) -> Option<String> {
    query?.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        if name != ACCESS_KEY_HEADER {
            return None;
        }
        urlencoding::decode(value).ok().map(|v| v.into_owned())
    })
}

/// Start the API server
pub async fn serve(state: AppState, config: &ApiConfig) -> Result<(), ApiError> {
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Keepsake API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Keepsake API shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
