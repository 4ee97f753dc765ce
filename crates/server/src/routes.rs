//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        // Health check (unauthenticated for load balancers and k8s liveness checks)
        .route("/v1/health", get(handlers::health_check))
        .route("/v1/auth/whoami", get(handlers::whoami))
        // Announcements
        .route(
            "/v1/announcements",
            get(handlers::list_announcements).post(handlers::create_announcement),
        )
        .route(
            "/v1/announcements/{id}",
            get(handlers::get_announcement)
                .put(handlers::update_announcement)
                .delete(handlers::delete_announcement),
        )
        .route(
            "/v1/announcements/{id}/status",
            post(handlers::change_announcement_status),
        )
        // Categories, links and inventory
        .route(
            "/v1/categories",
            get(handlers::list_categories).post(handlers::create_category),
        )
        .route("/v1/categories/{id}", delete(handlers::delete_category))
        .route(
            "/v1/links",
            get(handlers::list_links).post(handlers::create_link),
        )
        .route(
            "/v1/links/{id}",
            get(handlers::get_link).delete(handlers::delete_link),
        )
        .route("/v1/links/{id}/status", post(handlers::change_link_status))
        .route(
            "/v1/inventory",
            get(handlers::list_inventory).post(handlers::create_inventory_item),
        )
        .route(
            "/v1/inventory/{id}",
            get(handlers::get_inventory_item).delete(handlers::delete_inventory_item),
        )
        .route(
            "/v1/inventory/{id}/status",
            post(handlers::change_inventory_status),
        )
        // Certificates (read only; written by sync jobs)
        .route("/v1/certificates", get(handlers::list_certificates))
        .route("/v1/certificates/stats", get(handlers::certificate_stats))
        .route("/v1/certificates/{id}", get(handlers::get_certificate))
        .route(
            "/v1/certificates/{id}/notifications",
            get(handlers::list_certificate_notifications),
        )
        // On-call roster (read only; written by the duty sync job)
        .route("/v1/duty", get(handlers::list_duties))
        .route("/v1/duty/current", get(handlers::current_duty))
        // Admin
        .route(
            "/v1/admin/jobs",
            get(handlers::list_jobs).post(handlers::trigger_job),
        )
        .route("/v1/admin/jobs/{id}", get(handlers::get_job))
        .route(
            "/v1/admin/sessions",
            get(handlers::list_sessions).post(handlers::create_session),
        )
        .route(
            "/v1/admin/sessions/{id}",
            delete(handlers::revoke_session),
        );

    // When enabled, this endpoint must be network-restricted to the
    // Prometheus scraper.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
