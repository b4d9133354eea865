//! Password verification capability.
//!
//! Hashing and storage of password material live behind this contract; the
//! model only consumes the four-way outcome.

use crate::directory::{AccountStatus, MemoryDirectory, UserDirectory};
use anyhow::Result;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Outcome reported by the external password-verification capability.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PasswordVerification {
    Valid,
    Invalid,
    /// The account is locked by policy; the credential was not judged.
    Disabled,
    LoginNotFound,
}

#[async_trait]
pub trait PasswordVerifier: Send + Sync {
    /// Judge a submitted credential. An `Err` means the backend itself
    /// failed and the outcome is unknown.
    async fn verify(
        &self,
        identity: &str,
        password: &SecretString,
    ) -> Result<PasswordVerification>;
}

/// Plain-comparison verifier over a [`MemoryDirectory`], for tests and
/// single-process embedding.
pub struct MemoryPasswordVerifier {
    directory: Arc<MemoryDirectory>,
    passwords: Mutex<HashMap<String, String>>,
}

impl MemoryPasswordVerifier {
    #[must_use]
    pub fn new(directory: Arc<MemoryDirectory>) -> Self {
        Self {
            directory,
            passwords: Mutex::new(HashMap::new()),
        }
    }

    pub async fn set_password(&self, identity: &str, password: &str) {
        let mut passwords = self.passwords.lock().await;
        passwords.insert(identity.to_string(), password.to_string());
    }
}

#[async_trait]
impl PasswordVerifier for MemoryPasswordVerifier {
    async fn verify(
        &self,
        identity: &str,
        password: &SecretString,
    ) -> Result<PasswordVerification> {
        let Some(user) = self.directory.find_by_identity(identity).await? else {
            return Ok(PasswordVerification::LoginNotFound);
        };
        if user.status() == AccountStatus::Disabled {
            return Ok(PasswordVerification::Disabled);
        }
        let passwords = self.passwords.lock().await;
        match passwords.get(identity) {
            Some(stored) if stored == password.expose_secret() => {
                Ok(PasswordVerification::Valid)
            }
            _ => Ok(PasswordVerification::Invalid),
        }
    }
}
