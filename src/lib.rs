//! Material Allocation API
//!
//! Warehouse back office for material requests, their review, and the allocation of
//! serialized inventory units to approved request lines.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod context;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    http::HeaderValue,
    routing::{delete, get, post, put},
    Router,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::common::{ApiResponse, ApiResult};

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::handlers::AppServices;
use crate::services::ServiceSettings;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub services: AppServices,
}

impl AppState {
    pub fn new(db: Arc<DatabaseConnection>, config: AppConfig, event_sender: EventSender) -> Self {
        let services = AppServices::new(
            db.clone(),
            Arc::new(event_sender),
            ServiceSettings::from(&config),
        );
        Self {
            db,
            config: Arc::new(config),
            services,
        }
    }
}

/// Routes mounted under `/api/v1`. Every handler requires the caller identity headers.
pub fn api_v1_routes() -> Router<AppState> {
    use handlers::{allocations, audit_logs, material_requests, notifications};

    Router::new()
        .route(
            "/material-request",
            post(material_requests::create_material_request)
                .get(material_requests::list_material_requests),
        )
        .route(
            "/material-request/:id",
            get(material_requests::get_material_request)
                .put(material_requests::update_material_request)
                .delete(material_requests::delete_material_request),
        )
        .route(
            "/material-request/:id/submit",
            post(material_requests::submit_material_request),
        )
        .route(
            "/material-request/:id/approve",
            post(material_requests::review_material_request),
        )
        .route(
            "/material-request/:id/available-stock",
            get(allocations::list_available_stock),
        )
        .route(
            "/material-request/:id/allocate",
            post(allocations::allocate_materials),
        )
        .route(
            "/material-request/:id/allocations",
            get(allocations::list_allocations),
        )
        .route(
            "/material-request/:id/allocations/:allocation_id",
            delete(allocations::cancel_allocation),
        )
        .route("/audit-logs", get(audit_logs::list_audit_logs))
        .route("/notifications", get(notifications::list_notifications))
        .route(
            "/notifications/:id/read",
            put(notifications::mark_notification_read),
        )
}

/// CORS from the configured origin list; permissive when none are configured.
pub fn cors_layer(cfg: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if origins.is_empty() {
        ::tracing::info!(
            environment = %cfg.environment,
            "No CORS origins configured; using permissive CORS"
        );
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Full application router: health, API docs and the versioned API.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .nest("/api/v1", api_v1_routes())
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        .layer(cors)
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}
