//! Application configuration loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use quota_core::{Policy, PolicyError};
use quota_infra::LocalBackendConfig;

#[cfg(feature = "redis")]
use quota_infra::RedisConfig;

use crate::scope::QuotaScope;

const DEFAULT_THROTTLE_EXEMPT: &str = "/api/quota/";

/// Configuration errors - fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid {name} policy: {source}")]
    InvalidPolicy {
        name: &'static str,
        #[source]
        source: PolicyError,
    },
}

/// Policies applied to the named quota scopes.
#[derive(Debug, Clone, Copy)]
pub struct ScopePolicies {
    pub login: Policy,
    pub ai: Policy,
    pub sandbox: Policy,
}

impl Default for ScopePolicies {
    fn default() -> Self {
        Self {
            login: Policy::login(),
            ai: Policy::per_minute(60).unwrap_or_default(),
            sandbox: Policy::sandbox(),
        }
    }
}

impl ScopePolicies {
    pub fn for_scope(&self, scope: QuotaScope) -> &Policy {
        match scope {
            QuotaScope::Login => &self.login,
            QuotaScope::Ai => &self.ai,
            QuotaScope::Sandbox => &self.sandbox,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Shared counter store; `None` runs on local counters only.
    #[cfg(feature = "redis")]
    pub redis: Option<RedisConfig>,
    pub local: LocalBackendConfig,
    pub scopes: ScopePolicies,
    /// Per-client-IP throttle applied to API requests.
    pub throttle: Policy,
    /// Path prefixes the throttle skips. Quota routes are exempt by default:
    /// their callers are upstream services that serve many end users.
    pub throttle_exempt: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            #[cfg(feature = "redis")]
            redis: None,
            local: LocalBackendConfig::default(),
            scopes: ScopePolicies::default(),
            throttle: Policy::per_minute(300).unwrap_or_default(),
            throttle_exempt: vec![DEFAULT_THROTTLE_EXEMPT.to_string()],
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let scopes = ScopePolicies {
            login: policy_from_env("login", "LOGIN_MAX_ATTEMPTS", 5, "LOGIN_WINDOW_SECS", 900)?,
            ai: policy_from_env("ai", "MAX_AI_REQUESTS_PER_MINUTE", 60, "AI_WINDOW_SECS", 60)?,
            sandbox: policy_from_env(
                "sandbox",
                "SANDBOX_MAX_RUNS_PER_MINUTE",
                20,
                "SANDBOX_WINDOW_SECS",
                60,
            )?,
        };

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env_or("PORT", 8080),
            #[cfg(feature = "redis")]
            redis: RedisConfig::from_env(),
            local: LocalBackendConfig::from_env(),
            scopes,
            throttle: policy_from_env(
                "throttle",
                "API_THROTTLE_MAX_REQUESTS",
                300,
                "API_THROTTLE_WINDOW_SECS",
                60,
            )?,
            throttle_exempt: env::var("API_THROTTLE_EXEMPT")
                .map(|v| parse_prefixes(&v))
                .unwrap_or_else(|_| vec![DEFAULT_THROTTLE_EXEMPT.to_string()]),
        })
    }
}

/// Comma-separated path prefixes; blanks are dropped.
fn parse_prefixes(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn policy_from_env(
    name: &'static str,
    max_var: &str,
    default_max: u32,
    window_var: &str,
    default_window_secs: u64,
) -> Result<Policy, ConfigError> {
    Policy::new(
        env_or(max_var, default_max),
        Duration::from_secs(env_or(window_var, default_window_secs)),
    )
    .map_err(|source| ConfigError::InvalidPolicy { name, source })
}
