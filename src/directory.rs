//! User records and the directory capability.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Account lifecycle state as stored by the directory.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccountStatus {
    PendingVerification,
    Active,
    Disabled,
}

impl AccountStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingVerification => "pending_verification",
            Self::Active => "active",
            Self::Disabled => "disabled",
        }
    }

    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim() {
            "pending_verification" => Some(Self::PendingVerification),
            "active" => Some(Self::Active),
            "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }
}

/// A resolved user record. The directory owns the backing data; this is a
/// point-in-time copy.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct User {
    id: Uuid,
    identity: String,
    status: AccountStatus,
}

impl User {
    #[must_use]
    pub fn new(id: Uuid, identity: impl Into<String>, status: AccountStatus) -> Self {
        Self {
            id,
            identity: identity.into(),
            status,
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    #[must_use]
    pub fn status(&self) -> AccountStatus {
        self.status
    }
}

/// Read access to the external user store.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_identity(&self, identity: &str) -> Result<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// The user's registered second-factor identity for `provider`, if any.
    async fn mfa_identity(&self, user_id: Uuid, provider: &str) -> Result<Option<String>>;
}

#[derive(Default)]
struct DirectoryInner {
    users: HashMap<Uuid, User>,
    mfa: HashMap<(Uuid, String), String>,
}

/// Process-local directory for tests and single-node embedding.
#[derive(Default)]
pub struct MemoryDirectory {
    inner: Mutex<DirectoryInner>,
}

impl MemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a user and return its record.
    pub async fn add_user(&self, identity: &str, status: AccountStatus) -> User {
        let user = User::new(Uuid::new_v4(), identity, status);
        let mut inner = self.inner.lock().await;
        inner.users.insert(user.id(), user.clone());
        user
    }

    pub async fn set_status(&self, id: Uuid, status: AccountStatus) {
        let mut inner = self.inner.lock().await;
        if let Some(user) = inner.users.get_mut(&id) {
            user.status = status;
        }
    }

    pub async fn register_mfa_identity(&self, id: Uuid, provider: &str, identity: &str) {
        let mut inner = self.inner.lock().await;
        inner
            .mfa
            .insert((id, provider.to_string()), identity.to_string());
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn find_by_identity(&self, identity: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .values()
            .find(|user| user.identity() == identity)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let inner = self.inner.lock().await;
        Ok(inner.users.get(&id).cloned())
    }

    async fn mfa_identity(&self, user_id: Uuid, provider: &str) -> Result<Option<String>> {
        let inner = self.inner.lock().await;
        Ok(inner.mfa.get(&(user_id, provider.to_string())).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::{AccountStatus, MemoryDirectory, UserDirectory};
    use anyhow::Result;

    #[test]
    fn account_status_round_trips() {
        for status in [
            AccountStatus::PendingVerification,
            AccountStatus::Active,
            AccountStatus::Disabled,
        ] {
            assert_eq!(AccountStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(AccountStatus::from_str("locked"), None);
    }

    #[tokio::test]
    async fn lookup_by_identity_and_id() -> Result<()> {
        let directory = MemoryDirectory::new();
        let alice = directory
            .add_user("alice@example.com", AccountStatus::Active)
            .await;

        let by_identity = directory.find_by_identity("alice@example.com").await?;
        assert_eq!(by_identity.as_ref().map(super::User::id), Some(alice.id()));

        let by_id = directory.find_by_id(alice.id()).await?;
        assert_eq!(by_id.map(|user| user.identity().to_string()).as_deref(), Some("alice@example.com"));

        assert!(directory.find_by_identity("bob@example.com").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn mfa_identity_is_per_provider() -> Result<()> {
        let directory = MemoryDirectory::new();
        let alice = directory
            .add_user("alice@example.com", AccountStatus::Active)
            .await;
        directory
            .register_mfa_identity(alice.id(), "totp", "alice-totp")
            .await;

        assert_eq!(
            directory.mfa_identity(alice.id(), "totp").await?.as_deref(),
            Some("alice-totp")
        );
        assert!(directory.mfa_identity(alice.id(), "webauthn").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn set_status_updates_record() -> Result<()> {
        let directory = MemoryDirectory::new();
        let alice = directory
            .add_user("alice@example.com", AccountStatus::PendingVerification)
            .await;
        directory.set_status(alice.id(), AccountStatus::Active).await;

        let refreshed = directory.find_by_id(alice.id()).await?;
        assert_eq!(refreshed.map(|user| user.status()), Some(AccountStatus::Active));
        Ok(())
    }
}
