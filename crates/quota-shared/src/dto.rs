//! Data Transfer Objects - request/response types for the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request to check a raw identifier, optionally with its own policy.
///
/// Omitted policy fields fall back to login protection (5 per 15 minutes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckQuotaRequest {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_secs: Option<u64>,
}

/// Request to clear the counter of a raw identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetQuotaRequest {
    pub identifier: String,
}

/// Request against a named scope (`login`, `ai`, `sandbox`).
///
/// The subject is an email or user id; the server builds the identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopedQuotaRequest {
    pub subject: String,
}

/// Response carrying one quota decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionResponse {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub retry_after_secs: u64,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    /// `up`, `down` or `disabled`.
    pub shared_store: String,
}
