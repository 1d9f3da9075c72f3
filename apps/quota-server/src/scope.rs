//! Named quota scopes and their identifier convention.

use serde::Deserialize;

/// Action families that share a quota policy.
///
/// Identifiers are `"{scope}:{subject}"`; the gate itself treats them as
/// opaque keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaScope {
    /// Login attempts, keyed by email.
    Login,
    /// AI chat turns, keyed by user id.
    Ai,
    /// Code execution runs, keyed by user id.
    Sandbox,
}

impl QuotaScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaScope::Login => "login",
            QuotaScope::Ai => "ai",
            QuotaScope::Sandbox => "sandbox",
        }
    }

    pub fn identifier(&self, subject: &str) -> String {
        format!("{}:{}", self.as_str(), subject)
    }
}
