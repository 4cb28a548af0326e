use std::sync::Arc;

use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use errors::{MetricsError, SourceError};
pub use services::{AppState, MetricsFacade};

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        // Public endpoints
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .nest(
            "/api/v1/learners",
            learner_routes().layer(cors).layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        .nest(
            "/admin",
            admin_routes()
                .route_layer(middleware::from_fn(
                    middlewares::auth::privileged_guard_middleware,
                ))
                .layer(middleware::from_fn_with_state(
                    app_state.clone(),
                    middlewares::auth::auth_middleware,
                )),
        )
        .with_state(app_state)
        .layer(middleware::from_fn(middlewares::metrics::metrics_middleware))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn learner_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{id}/confidence", get(handlers::learners::get_confidence))
        .route(
            "/{id}/pronunciation",
            get(handlers::learners::get_pronunciation),
        )
        .route("/{id}/streak", get(handlers::learners::get_streak))
        .route("/{id}/summary", get(handlers::learners::get_summary))
}

fn admin_routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/learners/{id}/recompute",
        post(handlers::learners::recompute_for_learner),
    )
}
