//! Quota handlers.

use std::time::Duration;

use actix_web::{HttpResponse, web};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use quota_core::domain::{DEFAULT_MAX_ATTEMPTS, DEFAULT_WINDOW};
use quota_core::{Decision, Policy};
use quota_shared::dto::{CheckQuotaRequest, DecisionResponse, ResetQuotaRequest, ScopedQuotaRequest};

use crate::middleware::error::{AppError, AppResult};
use crate::scope::QuotaScope;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ScopePath {
    scope: QuotaScope,
}

fn decision_response(decision: &Decision, now: DateTime<Utc>) -> DecisionResponse {
    DecisionResponse {
        allowed: decision.allowed,
        remaining: decision.remaining,
        reset_at: decision.reset_at,
        retry_after_secs: decision.retry_after(now).as_secs(),
    }
}

fn requested_policy(req: &CheckQuotaRequest) -> Result<Policy, AppError> {
    if req.max_attempts.is_none() && req.window_secs.is_none() {
        return Ok(Policy::default());
    }

    let policy = Policy::new(
        req.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
        req.window_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_WINDOW),
    )?;
    Ok(policy)
}

/// POST /api/quota/check
///
/// Always answers 200; callers act on `allowed` themselves.
pub async fn check(
    state: web::Data<AppState>,
    body: web::Json<CheckQuotaRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();
    let policy = requested_policy(&req)?;

    let decision = state.gate.check(&req.identifier, &policy).await;

    Ok(HttpResponse::Ok().json(decision_response(&decision, state.clock.now())))
}

/// POST /api/quota/reset
pub async fn reset(
    state: web::Data<AppState>,
    body: web::Json<ResetQuotaRequest>,
) -> HttpResponse {
    state.gate.reset(&body.identifier).await;
    HttpResponse::NoContent().finish()
}

/// POST /api/quota/{scope}/check
///
/// Rejections surface as 429 with `Retry-After`.
pub async fn check_scope(
    state: web::Data<AppState>,
    path: web::Path<ScopePath>,
    body: web::Json<ScopedQuotaRequest>,
) -> AppResult<HttpResponse> {
    let scope = path.scope;
    let identifier = scope.identifier(&body.subject);
    let policy = state.scopes.for_scope(scope);

    let decision = state.gate.check(&identifier, policy).await;
    let now = state.clock.now();

    if !decision.allowed {
        tracing::warn!(scope = scope.as_str(), "Quota exceeded");
        return Err(AppError::TooManyRequests {
            retry_after_secs: decision.retry_after(now).as_secs(),
        });
    }

    Ok(HttpResponse::Ok().json(decision_response(&decision, now)))
}

/// POST /api/quota/{scope}/reset
///
/// Called after the guarded action succeeds, e.g. a successful login.
pub async fn reset_scope(
    state: web::Data<AppState>,
    path: web::Path<ScopePath>,
    body: web::Json<ScopedQuotaRequest>,
) -> HttpResponse {
    let identifier = path.scope.identifier(&body.subject);
    state.gate.reset(&identifier).await;
    HttpResponse::NoContent().finish()
}
