//! HTTP surface.
//!
//! One JSON API serves both sides of the desk: the public submission
//! flow (submit, view, attach, feedback) and the admin console
//! (triage, merge, settings, reporting). There is no authentication
//! layer here; deployments front the admin routes with their own
//! proxy.

mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::desk::Desk;
use crate::error::Result;

/// Transport-level body cap. Sits above the per-attachment limit so
/// the handler-side size check is the one that answers.
const BODY_LIMIT: usize = 64 * 1024 * 1024;

/// Build the full application router.
pub fn router(desk: Arc<Desk>) -> Router {
    Router::new()
        .merge(routes::ticket_routes())
        .merge(routes::admin_routes())
        .merge(routes::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(desk)
}

/// Bind and serve until the process is stopped.
pub async fn run(addr: SocketAddr, desk: Arc<Desk>) -> Result<()> {
    let app = router(desk);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
