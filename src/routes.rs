//! Route definitions and router setup
//!
//! Configures all API routes and middleware. Every `/api` route passes
//! through the tenant middleware, which fails closed without a resolvable
//! tenant.

mod audit;
mod consistency;
mod monitoring;

use crate::config::Settings;
use crate::state::SharedState;
use crate::tenant::tenant_middleware;
use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    // Build CORS layer
    let cors = build_cors_layer(settings);

    // Build tracing/logging layer
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Build middleware stack
    let middleware_stack = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    // Tenant-scoped governance API
    let api = Router::new()
        // Consistency Engine
        .route("/consistency/report", get(consistency::get_report))
        // Drift Detector & Safety Governor
        .route("/ml-monitoring/detect", post(monitoring::detect))
        .route("/ml-monitoring/acknowledge", post(monitoring::acknowledge))
        .route("/ml-monitoring/reset-status", post(monitoring::reset_status))
        .route("/ml-monitoring/status", get(monitoring::status))
        // Audit & Evidence Engine
        .route("/audit/events", get(audit::list_events))
        .route("/audit/evidence-pack/{window}", get(audit::evidence_pack))
        .route("/audit/export", get(audit::export))
        .layer(middleware::from_fn(tenant_middleware));

    Router::new()
        // Health check (unauthenticated liveness)
        .route("/health", get(health_check))
        .nest("/api", api)
        // Apply middleware and state
        .layer(middleware_stack)
        .with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<_> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
            .max_age(Duration::from_secs(3600))
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
            .max_age(Duration::from_secs(3600))
    }
}

/// Health check endpoint
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "success": true,
        "message": "Server is running fine.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
