//! Token processing for email verification and persistent logins.
//!
//! The model consumes and classifies tokens; a [`TokenStore`] owns the
//! records. Raw token values are generated from 32 random bytes, encoded
//! base64url, and handed out exactly once — stores keep only a SHA-256 hash,
//! so a leaked store never yields a usable token.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::MemoryTokenStore;
#[cfg(feature = "postgres")]
pub use postgres::{PgDirectory, PgTokenStore};

use crate::directory::User;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// What an email token authorizes once it validates.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VerificationIntent {
    ConfirmRegistration,
    ResetPassword,
    SuspendAccount,
}

impl VerificationIntent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfirmRegistration => "confirm_registration",
            Self::ResetPassword => "reset_password",
            Self::SuspendAccount => "suspend_account",
        }
    }

    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim() {
            "confirm_registration" => Some(Self::ConfirmRegistration),
            "reset_password" => Some(Self::ResetPassword),
            "suspend_account" => Some(Self::SuspendAccount),
            _ => None,
        }
    }
}

/// Classification of an email-token submission, as reported to callers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EmailTokenResult {
    /// Unknown, malformed, or already consumed.
    Invalid,
    Expired,
    /// The token was valid but its account is gone or unusable.
    UserNotFound,
    Valid {
        user: User,
        intent: VerificationIntent,
    },
}

/// Store-level outcome of an atomic consume; the model resolves the user.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TokenConsumption {
    Invalid,
    Expired,
    Valid {
        user_id: Uuid,
        intent: VerificationIntent,
    },
}

/// The external token store.
///
/// Implementations must make `consume_email_token` atomic: two concurrent
/// submissions of the same token may never both observe `Valid`.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Create a single-use email token bound to `user_id` and return the
    /// raw value for the mail link.
    async fn create_email_token(
        &self,
        user_id: Uuid,
        intent: VerificationIntent,
        ttl: Duration,
    ) -> Result<String>;

    /// Validate and consume in one step. Expiry wins over consumption
    /// state: an expired token classifies `Expired` no matter how often it
    /// was presented before.
    async fn consume_email_token(&self, token: &str) -> Result<TokenConsumption>;

    /// Create a remember-me token, invalidating the user's previous ones.
    async fn create_auth_token(&self, user_id: Uuid, ttl: Duration) -> Result<String>;

    /// Consume a presented remember-me token, returning its user while the
    /// token is still valid. Consumption is final; callers rotate.
    async fn consume_auth_token(&self, token: &str) -> Result<Option<Uuid>>;

    /// Drop every remember-me token held for `user_id`.
    async fn invalidate_auth_tokens(&self, user_id: Uuid) -> Result<()>;
}

/// Delivery channel that hands a token to the caller's environment and
/// reads it back on later requests. Stands in front of whatever transport
/// the embedding uses (typically a persistent cookie).
pub trait TokenTransport: Send + Sync {
    fn deliver(&self, token: &str, max_age: Duration);
    fn read_back(&self) -> Option<String>;
    fn clear(&self);
}

/// Single-slot transport for tests and single-process embedding.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    slot: Mutex<Option<String>>,
}

impl MemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenTransport for MemoryTransport {
    fn deliver(&self, token: &str, _max_age: Duration) {
        let mut slot = self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *slot = Some(token.to_string());
    }

    fn read_back(&self) -> Option<String> {
        let slot = self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        slot.clone()
    }

    fn clear(&self) {
        let mut slot = self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *slot = None;
    }
}

/// Create a raw token value. Only ever sent to the user; stores keep a hash.
pub(crate) fn generate_token() -> Result<String> {
    let mut bytes = [0_u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Hash a token for storage and lookup.
pub(crate) fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}
