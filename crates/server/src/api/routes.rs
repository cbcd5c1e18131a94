use axum::{
    middleware::from_fn,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::{credentials, handlers, middleware, runs, scrapers, terms};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let scraper_routes = Router::new()
        .route("/sources", get(scrapers::list_sources))
        .route("/trigger", post(scrapers::trigger))
        .route("/load-url", post(scrapers::load_url))
        .route("/runs", get(runs::query_runs))
        .route("/terms/{platform}", get(terms::get_terms))
        .route("/terms/{platform}", put(terms::put_terms))
        .route("/credentials/{platform}", get(credentials::get_credential))
        .route("/credentials/{platform}", put(credentials::put_credential));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .nest("/api/scrapers", scraper_routes)
        .with_state(state)
        .layer(from_fn(middleware::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
