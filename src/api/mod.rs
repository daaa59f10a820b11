//! HTTP and WebSocket surface.

pub mod routes;
pub mod ws;

use std::sync::Arc;

use axum::{Router, http::HeaderValue, routing::get, routing::post};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::intake::ResultSink;
use crate::pipeline::Orchestrator;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Where intake results are delivered.
    pub results: Arc<dyn ResultSink>,
}

/// Build the router with REST and WebSocket routes.
///
/// An empty `cors_origins` allows any origin.
pub fn triage_routes(
    orchestrator: Arc<Orchestrator>,
    results: Arc<dyn ResultSink>,
    cors_origins: &[String],
) -> Router {
    let state = AppState {
        orchestrator,
        results,
    };

    Router::new()
        .route("/", get(routes::root))
        .route("/api/v1/health", get(routes::health))
        .route("/api/v1/classify", post(routes::classify))
        .route(
            "/api/v1/classify-with-answers",
            post(routes::classify_with_answers),
        )
        .route("/api/v1/work-types", get(routes::work_types))
        .route("/api/v1/work-types/{id}", get(routes::work_type))
        .route("/api/v1/agents", get(routes::agents))
        .route("/api/v1/webhook/intake", post(routes::intake_webhook))
        .route("/ws/updates", get(ws::ws_handler))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}
