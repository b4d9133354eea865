//! Multi-factor authentication gate configuration.
//!
//! The gate itself runs in `AuthModel::has_mfa_step`; this module holds the
//! policy knobs. Both open questions of the design — whether MFA applies and
//! how a failed factor lookup resolves — are explicit configuration here.

use crate::config::parse_bool_env;
use serde::{Deserialize, Serialize};

const DEFAULT_MFA_PROVIDER: &str = "totp";
const ENV_MFA_REQUIRED: &str = "ENSALUTO_MFA_REQUIRED";

/// Whether and how the second-factor step applies.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MfaMode {
    Disabled,
    /// Users with a registered factor get the step; others log in directly.
    Optional,
    /// Every successful primary authentication is followed by the step.
    Required,
}

impl MfaMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Optional => "optional",
            Self::Required => "required",
        }
    }

    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim() {
            "disabled" => Some(Self::Disabled),
            "optional" => Some(Self::Optional),
            "required" => Some(Self::Required),
            _ => None,
        }
    }
}

/// How a failed factor lookup resolves when MFA is optional.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MfaLookupPolicy {
    /// Treat the user as having no registered factor; login proceeds.
    FailOpen,
    /// Demand the second factor anyway.
    FailClosed,
}

/// MFA gate configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MfaConfig {
    mode: MfaMode,
    provider: String,
    lookup_policy: MfaLookupPolicy,
}

impl Default for MfaConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl MfaConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode: MfaMode::Disabled,
            provider: DEFAULT_MFA_PROVIDER.to_string(),
            lookup_policy: MfaLookupPolicy::FailOpen,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: MfaMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    #[must_use]
    pub fn with_lookup_policy(mut self, policy: MfaLookupPolicy) -> Self {
        self.lookup_policy = policy;
        self
    }

    #[must_use]
    pub fn mode(&self) -> MfaMode {
        self.mode
    }

    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    #[must_use]
    pub fn lookup_policy(&self) -> MfaLookupPolicy {
        self.lookup_policy
    }

    /// Load overrides from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::new();
        if parse_bool_env(ENV_MFA_REQUIRED).unwrap_or(false) {
            config.mode = MfaMode::Required;
        }
        config
    }
}
