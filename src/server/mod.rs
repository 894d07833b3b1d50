//! HTTP and WebSocket surface.

mod handlers;
mod request_tracing;
mod response;
mod ws;

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::auth::Authenticator;
use crate::repository::ChoreRepository;

pub use handlers::AuthUser;
pub use response::ApiError;

const DEFAULT_BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Services injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<ChoreRepository>,
    pub auth: Arc<dyn Authenticator>,
    /// Include error causes in 500 bodies.
    pub expose_errors: bool,
    pub body_limit: usize,
    request_id_seed: Arc<AtomicU64>,
}

impl AppState {
    #[must_use]
    pub fn new(repo: Arc<ChoreRepository>, auth: Arc<dyn Authenticator>) -> Self {
        Self {
            repo,
            auth,
            expose_errors: true,
            body_limit: DEFAULT_BODY_LIMIT,
            request_id_seed: Arc::new(AtomicU64::new(1)),
        }
    }

    #[must_use]
    pub fn with_expose_errors(mut self, expose_errors: bool) -> Self {
        self.expose_errors = expose_errors;
        self
    }

    #[must_use]
    pub fn with_body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route(
            "/api/chores",
            get(handlers::list_chores).post(handlers::create_chore),
        )
        .route(
            "/api/chores/:id",
            get(handlers::get_chore)
                .put(handlers::update_chore)
                .delete(handlers::delete_chore),
        )
        .route("/api/chores/:id/photo", post(handlers::upload_photo))
        .route("/ws", get(ws::ws_handler))
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(state.body_limit))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            request_tracing::request_tracing_middleware,
        ))
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!("Cannot listen for Ctrl-C, serving until killed: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
