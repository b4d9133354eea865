//! Process-local token store.

use super::{generate_token, hash_token, TokenConsumption, TokenStore, VerificationIntent};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;
use ulid::Ulid;
use uuid::Uuid;

struct EmailEntry {
    id: Ulid,
    user_id: Uuid,
    intent: VerificationIntent,
    issued_at: Instant,
    ttl: Duration,
    consumed: bool,
}

struct AuthEntry {
    id: Ulid,
    user_id: Uuid,
    issued_at: Instant,
    ttl: Duration,
}

#[derive(Default)]
struct StoreInner {
    email: HashMap<Vec<u8>, EmailEntry>,
    auth: HashMap<Vec<u8>, AuthEntry>,
}

/// In-memory [`TokenStore`]. Records live for the process lifetime, which
/// matches the spirit of the contract: consumed email tokens stay around so
/// replays keep classifying as invalid rather than unknown.
#[derive(Default)]
pub struct MemoryTokenStore {
    inner: Mutex<StoreInner>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn create_email_token(
        &self,
        user_id: Uuid,
        intent: VerificationIntent,
        ttl: Duration,
    ) -> Result<String> {
        let token = generate_token()?;
        let entry = EmailEntry {
            id: Ulid::new(),
            user_id,
            intent,
            issued_at: Instant::now(),
            ttl,
            consumed: false,
        };
        debug!(token_id = %entry.id, intent = intent.as_str(), "issued email token");
        let mut inner = self.inner.lock().await;
        inner.email.insert(hash_token(&token), entry);
        Ok(token)
    }

    async fn consume_email_token(&self, token: &str) -> Result<TokenConsumption> {
        // Single lock scope: validation and consumption are one step.
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.email.get_mut(&hash_token(token)) else {
            return Ok(TokenConsumption::Invalid);
        };
        if entry.issued_at.elapsed() >= entry.ttl {
            return Ok(TokenConsumption::Expired);
        }
        if entry.consumed {
            return Ok(TokenConsumption::Invalid);
        }
        entry.consumed = true;
        debug!(token_id = %entry.id, "email token consumed");
        Ok(TokenConsumption::Valid {
            user_id: entry.user_id,
            intent: entry.intent,
        })
    }

    async fn create_auth_token(&self, user_id: Uuid, ttl: Duration) -> Result<String> {
        let token = generate_token()?;
        let entry = AuthEntry {
            id: Ulid::new(),
            user_id,
            issued_at: Instant::now(),
            ttl,
        };
        debug!(token_id = %entry.id, "issued auth token");
        let mut inner = self.inner.lock().await;
        // One live token per user; the previous one dies with the new issue.
        inner.auth.retain(|_, existing| existing.user_id != user_id);
        inner.auth.insert(hash_token(&token), entry);
        Ok(token)
    }

    async fn consume_auth_token(&self, token: &str) -> Result<Option<Uuid>> {
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.auth.remove(&hash_token(token)) else {
            return Ok(None);
        };
        if entry.issued_at.elapsed() >= entry.ttl {
            return Ok(None);
        }
        debug!(token_id = %entry.id, "auth token consumed");
        Ok(Some(entry.user_id))
    }

    async fn invalidate_auth_tokens(&self, user_id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.auth.retain(|_, entry| entry.user_id != user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::{TokenConsumption, TokenStore, VerificationIntent};
    use super::MemoryTokenStore;
    use anyhow::Result;
    use std::time::Duration;
    use uuid::Uuid;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn email_token_is_single_use() -> Result<()> {
        let store = MemoryTokenStore::new();
        let user_id = Uuid::new_v4();
        let token = store
            .create_email_token(user_id, VerificationIntent::ResetPassword, TTL)
            .await?;

        let first = store.consume_email_token(&token).await?;
        assert_eq!(
            first,
            TokenConsumption::Valid {
                user_id,
                intent: VerificationIntent::ResetPassword,
            }
        );

        let second = store.consume_email_token(&token).await?;
        assert_eq!(second, TokenConsumption::Invalid);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_email_token_is_invalid() -> Result<()> {
        let store = MemoryTokenStore::new();
        let outcome = store.consume_email_token("never-issued").await?;
        assert_eq!(outcome, TokenConsumption::Invalid);
        Ok(())
    }

    #[tokio::test]
    async fn expired_email_token_stays_expired() -> Result<()> {
        let store = MemoryTokenStore::new();
        let token = store
            .create_email_token(
                Uuid::new_v4(),
                VerificationIntent::ConfirmRegistration,
                Duration::ZERO,
            )
            .await?;

        // Expiry wins on every presentation, consumed or not.
        assert_eq!(
            store.consume_email_token(&token).await?,
            TokenConsumption::Expired
        );
        assert_eq!(
            store.consume_email_token(&token).await?,
            TokenConsumption::Expired
        );
        Ok(())
    }

    #[tokio::test]
    async fn auth_token_consumes_once() -> Result<()> {
        let store = MemoryTokenStore::new();
        let user_id = Uuid::new_v4();
        let token = store.create_auth_token(user_id, TTL).await?;

        assert_eq!(store.consume_auth_token(&token).await?, Some(user_id));
        assert_eq!(store.consume_auth_token(&token).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn expired_auth_token_yields_no_user() -> Result<()> {
        let store = MemoryTokenStore::new();
        let token = store
            .create_auth_token(Uuid::new_v4(), Duration::ZERO)
            .await?;
        assert_eq!(store.consume_auth_token(&token).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn new_auth_token_replaces_previous() -> Result<()> {
        let store = MemoryTokenStore::new();
        let user_id = Uuid::new_v4();
        let old = store.create_auth_token(user_id, TTL).await?;
        let fresh = store.create_auth_token(user_id, TTL).await?;

        assert_eq!(store.consume_auth_token(&old).await?, None);
        assert_eq!(store.consume_auth_token(&fresh).await?, Some(user_id));
        Ok(())
    }

    #[tokio::test]
    async fn invalidate_drops_only_that_user() -> Result<()> {
        let store = MemoryTokenStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let alice_token = store.create_auth_token(alice, TTL).await?;
        let bob_token = store.create_auth_token(bob, TTL).await?;

        store.invalidate_auth_tokens(alice).await?;
        assert_eq!(store.consume_auth_token(&alice_token).await?, None);
        assert_eq!(store.consume_auth_token(&bob_token).await?, Some(bob));
        Ok(())
    }
}
