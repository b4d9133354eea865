//! Authentication configuration.

use crate::mfa::MfaConfig;
use crate::throttle::BackoffCurve;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

const DEFAULT_EMAIL_TOKEN_TTL_SECONDS: u64 = 30 * 60;
const DEFAULT_AUTH_TOKEN_TTL_SECONDS: u64 = 14 * 24 * 60 * 60;
const DEFAULT_THROTTLE_RETENTION_SECONDS: u64 = 60 * 60;
const ENV_PERSISTENT_LOGIN: &str = "ENSALUTO_PERSISTENT_LOGIN";
const ENV_EMAIL_VERIFICATION_REQUIRED: &str = "ENSALUTO_EMAIL_VERIFICATION_REQUIRED";

/// Deployment-level configuration for the authentication model.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    persistent_login_enabled: bool,
    email_verification_required: bool,
    verification_base_url: String,
    email_token_ttl_seconds: u64,
    auth_token_ttl_seconds: u64,
    backoff: BackoffCurve,
    throttle_retention_seconds: u64,
    mfa: MfaConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            persistent_login_enabled: false,
            email_verification_required: false,
            verification_base_url: String::new(),
            email_token_ttl_seconds: DEFAULT_EMAIL_TOKEN_TTL_SECONDS,
            auth_token_ttl_seconds: DEFAULT_AUTH_TOKEN_TTL_SECONDS,
            backoff: BackoffCurve::default(),
            throttle_retention_seconds: DEFAULT_THROTTLE_RETENTION_SECONDS,
            mfa: MfaConfig::new(),
        }
    }

    #[must_use]
    pub fn with_persistent_login(mut self, enabled: bool) -> Self {
        self.persistent_login_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_email_verification_required(mut self, required: bool) -> Self {
        self.email_verification_required = required;
        self
    }

    #[must_use]
    pub fn with_verification_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.verification_base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_email_token_ttl_seconds(mut self, seconds: u64) -> Self {
        self.email_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_auth_token_ttl_seconds(mut self, seconds: u64) -> Self {
        self.auth_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffCurve) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_throttle_retention_seconds(mut self, seconds: u64) -> Self {
        self.throttle_retention_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_mfa(mut self, mfa: MfaConfig) -> Self {
        self.mfa = mfa;
        self
    }

    #[must_use]
    pub fn persistent_login_enabled(&self) -> bool {
        self.persistent_login_enabled
    }

    #[must_use]
    pub fn email_verification_required(&self) -> bool {
        self.email_verification_required
    }

    #[must_use]
    pub fn email_token_ttl(&self) -> Duration {
        Duration::from_secs(self.email_token_ttl_seconds)
    }

    #[must_use]
    pub fn auth_token_ttl(&self) -> Duration {
        Duration::from_secs(self.auth_token_ttl_seconds)
    }

    #[must_use]
    pub fn backoff(&self) -> &BackoffCurve {
        &self.backoff
    }

    #[must_use]
    pub fn throttle_retention(&self) -> Duration {
        Duration::from_secs(self.throttle_retention_seconds)
    }

    #[must_use]
    pub fn mfa(&self) -> &MfaConfig {
        &self.mfa
    }

    /// Build the email-link URL for a raw token, or `None` when no valid
    /// base URL is configured. The raw token only ever travels in this link.
    #[must_use]
    pub fn verification_url(&self, token: &str) -> Option<String> {
        Url::parse(&self.verification_base_url).ok()?;
        let base = self.verification_base_url.trim_end_matches('/');
        Some(format!("{base}/verify#token={token}"))
    }

    /// Apply environment overrides on top of the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::new();
        if let Some(enabled) = parse_bool_env(ENV_PERSISTENT_LOGIN) {
            config.persistent_login_enabled = enabled;
        }
        if let Some(required) = parse_bool_env(ENV_EMAIL_VERIFICATION_REQUIRED) {
            config.email_verification_required = required;
        }
        config.mfa = MfaConfig::from_env();
        config
    }
}

pub(crate) fn parse_bool_env(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|value| match value.trim() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
}
