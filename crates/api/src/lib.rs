//! `api` crate — HTTP REST API layer
//!
//! Exposes:
//!   GET    /api/v1/workflows
//!   POST   /api/v1/workflows
//!   GET    /api/v1/workflows/:id
//!   DELETE /api/v1/workflows/:id
//!   POST   /api/v1/workflows/:id/execute
//!   GET    /api/v1/runs/:id
//!   POST   /api/v1/runs/:id/cancel
//!   GET    /api/v1/runs/:id/logs
//!   POST   /webhook/:path
//!
//! Every route except `/webhook/:path` is tenant-scoped through an
//! `X-Tenant-Id` header, extracted by `tenant::TenantId`.

pub mod handlers;
pub mod tenant;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use db::DbPool;
use queue::RunDispatcher;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub dispatcher: Arc<RunDispatcher>,
}

pub async fn serve(bind: &str, pool: DbPool, dispatcher: Arc<RunDispatcher>) -> Result<(), std::io::Error> {
    let state = AppState { pool, dispatcher };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_router = Router::new()
        .route("/workflows", get(handlers::workflows::list).post(handlers::workflows::create))
        .route("/workflows/:id", get(handlers::workflows::get).delete(handlers::workflows::delete))
        .route("/workflows/:id/execute", post(handlers::runs::execute))
        .route("/runs/:id", get(handlers::runs::status))
        .route("/runs/:id/cancel", post(handlers::runs::cancel))
        .route("/runs/:id/logs", get(handlers::runs::logs));

    let app = Router::new()
        .nest("/api/v1", api_router)
        .route("/webhook/:path", post(handlers::webhooks::handle_webhook))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await
}
