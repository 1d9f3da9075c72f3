//! Health check endpoint.

use actix_web::{HttpResponse, web};
use quota_shared::dto::HealthResponse;

use crate::state::AppState;

/// Health check endpoint - returns server status and shared store reachability.
///
/// A down shared store still reports `ok`: quotas keep working on local counters.
///
/// GET /api/health
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let shared_store = state.gate.shared_status().await;

    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: state.clock.now().to_rfc3339(),
        shared_store: shared_store.as_str().to_string(),
    })
}
