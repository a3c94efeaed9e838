//! Route configuration.

use crate::auth::trace_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let upload_routes = Router::new()
        .route("/upload", post(handlers::create_upload))
        .route("/upload/{upload_id}", get(handlers::get_upload))
        // Ingest enforces the configured file size limit while streaming.
        .route(
            "/upload/{upload_id}/file",
            post(handlers::add_file).layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/upload/{upload_id}/file/{file_id}",
            get(handlers::get_file).delete(handlers::remove_file),
        );

    let file_routes = Router::new()
        .route(
            "/file/{upload_id}/{file_id}/{file_name}",
            get(handlers::get_file_by_name).head(handlers::head_file_by_name),
        )
        .route(
            "/file/{upload_id}/{file_id}/{file_name}/token/{token}",
            get(handlers::get_file_with_token),
        );

    let service_routes = Router::new()
        // Health check (unauthenticated for load balancers)
        .route("/health", get(handlers::health_check))
        .route("/config", get(handlers::get_config));

    let mut router = Router::new()
        .merge(upload_routes)
        .merge(file_routes)
        .merge(service_routes);

    // SECURITY: When enabled, this endpoint MUST be network-restricted
    // to authorized Prometheus scraper IPs only.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(middleware::from_fn(trace_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
