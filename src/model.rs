//! The authentication model: joint validation, login/logout, token flows.
//!
//! Flow Overview:
//! 1) `validate` certifies a submitted credential: throttle check first,
//!    then the password verifier; the outcome feeds the throttle before it
//!    is reported.
//! 2) `login` moves the caller's session to `Strong`, `RequiresMfa`, or
//!    `Disabled`, and issues a remember-me token when asked to.
//! 3) `process_email_token` and `process_auth_token` serve the email-link
//!    and cookie flows without touching the password path.
//!
//! Security boundaries:
//! - Wrong password and unknown identity are indistinguishable to callers.
//! - No password check runs while a throttle delay is pending.
//! - Store failures surface as transient errors, never as success, and the
//!   always-on auto-login path degrades silently to "not authenticated".

use crate::config::AuthConfig;
use crate::directory::{AccountStatus, User, UserDirectory};
use crate::error::Error;
use crate::fields::{Field, FieldOptions};
use crate::identity::{EmailPolicy, IdentityPolicy};
use crate::mfa::{MfaLookupPolicy, MfaMode};
use crate::password::{PasswordVerification, PasswordVerifier};
use crate::session::{Login, LoginState};
use crate::throttle::Throttler;
use crate::token::{EmailTokenResult, TokenConsumption, TokenStore, TokenTransport};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A submitted credential; lives for one validate-and-login round trip and
/// is never persisted.
pub struct Attempt {
    identity: String,
    password: SecretString,
    remember_me: bool,
}

impl Attempt {
    #[must_use]
    pub fn new(identity: impl Into<String>, password: SecretString) -> Self {
        Self {
            identity: identity.into(),
            password,
            remember_me: false,
        }
    }

    #[must_use]
    pub fn with_remember_me(mut self, remember_me: bool) -> Self {
        self.remember_me = remember_me;
        self
    }

    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    #[must_use]
    pub fn remember_me(&self) -> bool {
        self.remember_me
    }

    fn password(&self) -> &SecretString {
        &self.password
    }
}

/// Why the last `validate` returned false.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AttemptFailure {
    MissingField(Field),
    MalformedIdentity,
    /// An enforced delay is pending; no password check was made.
    Throttled { remaining: Duration },
    /// Wrong password or unknown identity; deliberately merged.
    InvalidCredentials,
    AccountDisabled,
    /// The account still awaits email verification.
    EmailUnverified,
}

/// Shared collaborators and configuration behind every [`AuthModel`].
///
/// One `AuthState` serves all sessions of a process, so throttle counters
/// apply across concurrent attempts for the same identity.
pub struct AuthState {
    config: AuthConfig,
    directory: Arc<dyn UserDirectory>,
    verifier: Arc<dyn PasswordVerifier>,
    tokens: Arc<dyn TokenStore>,
    transport: Arc<dyn TokenTransport>,
    policy: Arc<dyn IdentityPolicy>,
    throttle: Throttler,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        directory: Arc<dyn UserDirectory>,
        verifier: Arc<dyn PasswordVerifier>,
        tokens: Arc<dyn TokenStore>,
        transport: Arc<dyn TokenTransport>,
    ) -> Self {
        let throttle =
            Throttler::new(config.backoff().clone()).with_retention(config.throttle_retention());
        Self {
            config,
            directory,
            verifier,
            tokens,
            transport,
            policy: Arc::new(EmailPolicy),
            throttle,
        }
    }

    /// Replace the default email-format policy.
    #[must_use]
    pub fn with_identity_policy(mut self, policy: Arc<dyn IdentityPolicy>) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn throttle(&self) -> &Throttler {
        &self.throttle
    }
}

struct ValidatedCredential {
    user: User,
    remember_me: bool,
}

/// Per-session authentication model over a shared [`AuthState`].
pub struct AuthModel {
    state: Arc<AuthState>,
    preset_identity: Option<String>,
    validated: Option<ValidatedCredential>,
    failure: Option<AttemptFailure>,
}

impl AuthModel {
    #[must_use]
    pub fn new(state: Arc<AuthState>) -> Self {
        Self {
            state,
            preset_identity: None,
            validated: None,
            failure: None,
        }
    }

    /// Pre-fill the identity for confirm-current-user flows; the login-name
    /// field turns read-only and submitted values for it are ignored.
    pub fn set_preset_identity(&mut self, identity: &str) {
        self.preset_identity = Some(self.state.policy.normalize(identity));
    }

    /// Discard any certified credential and recorded failure.
    pub fn reset(&mut self) {
        self.validated = None;
        self.failure = None;
    }

    #[must_use]
    pub fn field_options(&self, field: Field) -> FieldOptions {
        match field {
            Field::LoginName => FieldOptions {
                visible: true,
                required: true,
                read_only: self.preset_identity.is_some(),
            },
            Field::Password => FieldOptions {
                visible: true,
                required: true,
                read_only: false,
            },
            Field::RememberMe => FieldOptions {
                visible: self.state.config.persistent_login_enabled(),
                required: false,
                read_only: false,
            },
        }
    }

    /// Well-formedness of a single field value.
    #[must_use]
    pub fn validate_field(&self, field: Field, value: &str) -> bool {
        match field {
            Field::LoginName => {
                let identity = self.state.policy.normalize(value);
                !identity.is_empty() && self.state.policy.valid(&identity)
            }
            Field::Password => !value.is_empty(),
            Field::RememberMe => true,
        }
    }

    /// Validate a submitted credential without changing any session.
    ///
    /// `Ok(true)` certifies the credential; call [`AuthModel::login`] next.
    /// `Ok(false)` leaves the reason in [`AuthModel::last_failure`]. `Err`
    /// means an external collaborator failed; retry later.
    pub async fn validate(&mut self, attempt: &Attempt) -> Result<bool, Error> {
        self.reset();

        let identity = self.effective_identity(attempt);
        if identity.is_empty() {
            return Ok(self.fail(AttemptFailure::MissingField(Field::LoginName)));
        }
        if !self.state.policy.valid(&identity) {
            return Ok(self.fail(AttemptFailure::MalformedIdentity));
        }
        if attempt.password().expose_secret().is_empty() {
            return Ok(self.fail(AttemptFailure::MissingField(Field::Password)));
        }

        // Throttle before the verifier: a pending delay means no password
        // check at all, for real and made-up identities alike.
        let remaining = self.state.throttle.delay_for(&identity).await;
        if remaining > Duration::ZERO {
            debug!(?remaining, "attempt blocked by throttle");
            return Ok(self.fail(AttemptFailure::Throttled { remaining }));
        }

        let verification = self
            .state
            .verifier
            .verify(&identity, attempt.password())
            .await
            .map_err(Error::Store)?;

        let succeeded = verification == PasswordVerification::Valid;
        self.state.throttle.record_attempt(&identity, succeeded).await;

        match verification {
            PasswordVerification::Valid => {
                let Some(user) = self
                    .state
                    .directory
                    .find_by_identity(&identity)
                    .await
                    .map_err(Error::Store)?
                else {
                    // Verifier and directory disagree; report the generic
                    // credential failure rather than leaking the mismatch.
                    warn!("verifier accepted an identity the directory cannot resolve");
                    return Ok(self.fail(AttemptFailure::InvalidCredentials));
                };
                match user.status() {
                    AccountStatus::Disabled => Ok(self.fail(AttemptFailure::AccountDisabled)),
                    AccountStatus::PendingVerification
                        if self.state.config.email_verification_required() =>
                    {
                        Ok(self.fail(AttemptFailure::EmailUnverified))
                    }
                    _ => {
                        self.validated = Some(ValidatedCredential {
                            user,
                            remember_me: attempt.remember_me(),
                        });
                        Ok(true)
                    }
                }
            }
            PasswordVerification::Invalid | PasswordVerification::LoginNotFound => {
                debug!("credential rejected");
                Ok(self.fail(AttemptFailure::InvalidCredentials))
            }
            PasswordVerification::Disabled => Ok(self.fail(AttemptFailure::AccountDisabled)),
        }
    }

    #[must_use]
    pub fn last_failure(&self) -> Option<&AttemptFailure> {
        self.failure.as_ref()
    }

    /// True when email verification is required and the last attempt failed
    /// only because the account is unverified. Callers use this to offer a
    /// way out for users whose verification mail was lost.
    #[must_use]
    pub fn show_resend_email_verification(&self) -> bool {
        self.state.config.email_verification_required()
            && matches!(self.failure, Some(AttemptFailure::EmailUnverified))
    }

    /// Log the certified user in, moving `login` to `Strong` or
    /// `RequiresMfa` (or `Disabled` if the account went dark since
    /// validation). Call immediately after a successful `validate`; the
    /// certification is consumed either way.
    ///
    /// Returns whether the session transition applied.
    pub async fn login(&mut self, login: &mut Login) -> Result<bool, Error> {
        let Some(validated) = self.validated.take() else {
            return Ok(false);
        };

        // Re-resolve the account: its status may have changed since the
        // credential was certified.
        let user = match self
            .state
            .directory
            .find_by_id(validated.user.id())
            .await
            .map_err(Error::Store)?
        {
            Some(user) => user,
            None => {
                warn!("validated user vanished before login");
                return Ok(false);
            }
        };

        if user.status() == AccountStatus::Disabled {
            login.set(user, LoginState::Disabled);
            return Ok(false);
        }

        let state = if self.has_mfa_step(&user).await {
            LoginState::RequiresMfa
        } else {
            LoginState::Strong
        };

        if state == LoginState::Strong
            && validated.remember_me
            && self.state.config.persistent_login_enabled()
        {
            // The cookie is only set once the session is fully trusted; MFA
            // flows call `set_remember_me_token` after the challenge.
            if let Err(err) = self.set_remember_me_token(&user).await {
                warn!("failed to issue remember-me token: {err}");
            }
        }

        let applied = login.set(user, state);
        if applied {
            info!(state = ?login.state(), "login state changed");
        }
        Ok(applied)
    }

    /// Whether a second factor must follow primary authentication for
    /// `user`. A failed factor lookup resolves per the configured
    /// [`MfaLookupPolicy`].
    pub async fn has_mfa_step(&self, user: &User) -> bool {
        let mfa = self.state.config.mfa();
        match mfa.mode() {
            MfaMode::Disabled => false,
            MfaMode::Required => true,
            MfaMode::Optional => {
                match self
                    .state
                    .directory
                    .mfa_identity(user.id(), mfa.provider())
                    .await
                {
                    Ok(identity) => identity.is_some(),
                    Err(err) => {
                        warn!("MFA identity lookup failed: {err}");
                        match mfa.lookup_policy() {
                            MfaLookupPolicy::FailOpen => false,
                            MfaLookupPolicy::FailClosed => true,
                        }
                    }
                }
            }
        }
    }

    /// Issue a remember-me token for `user` and hand it to the transport.
    /// The user's previous token dies with the new issue.
    pub async fn set_remember_me_token(&self, user: &User) -> Result<(), Error> {
        if !self.state.config.persistent_login_enabled() {
            return Err(Error::PersistentLoginDisabled);
        }
        let ttl = self.state.config.auth_token_ttl();
        let token = self
            .state
            .tokens
            .create_auth_token(user.id(), ttl)
            .await
            .map_err(Error::Store)?;
        self.state.transport.deliver(&token, ttl);
        Ok(())
    }

    /// Identify a user from a remember-me token in the environment.
    ///
    /// Runs on every request, so it never errors: missing, expired, revoked,
    /// or disabled all degrade to `None`. On success the presented token has
    /// been consumed and a fresh one delivered; establish a `Weak` session
    /// with the returned user.
    pub async fn process_auth_token(&self) -> Option<User> {
        if !self.state.config.persistent_login_enabled() {
            return None;
        }
        let token = self.state.transport.read_back()?;

        let user_id = match self.state.tokens.consume_auth_token(&token).await {
            Ok(Some(user_id)) => user_id,
            Ok(None) => {
                self.state.transport.clear();
                return None;
            }
            Err(err) => {
                warn!("auth token lookup failed: {err}");
                return None;
            }
        };

        let user = match self.state.directory.find_by_id(user_id).await {
            Ok(Some(user)) if self.account_usable(&user) => user,
            Ok(_) => {
                self.state.transport.clear();
                return None;
            }
            Err(err) => {
                warn!("auto-login user lookup failed: {err}");
                return None;
            }
        };

        // Rotate: the presented token is gone; hand a fresh one back.
        let ttl = self.state.config.auth_token_ttl();
        match self.state.tokens.create_auth_token(user.id(), ttl).await {
            Ok(fresh) => self.state.transport.deliver(&fresh, ttl),
            Err(err) => warn!("failed to rotate auth token: {err}"),
        }

        debug!("auto-login token accepted");
        Some(user)
    }

    /// Classify an email token, resolving its user through the directory.
    /// Consumption is atomic with validation; a token classified `Valid`
    /// here will classify `Invalid` on every later submission.
    pub async fn process_email_token(&self, token: &str) -> Result<EmailTokenResult, Error> {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Ok(EmailTokenResult::Invalid);
        }
        match self
            .state
            .tokens
            .consume_email_token(trimmed)
            .await
            .map_err(Error::Store)?
        {
            TokenConsumption::Invalid => Ok(EmailTokenResult::Invalid),
            TokenConsumption::Expired => Ok(EmailTokenResult::Expired),
            TokenConsumption::Valid { user_id, intent } => {
                match self
                    .state
                    .directory
                    .find_by_id(user_id)
                    .await
                    .map_err(Error::Store)?
                {
                    Some(user) if user.status() != AccountStatus::Disabled => {
                        Ok(EmailTokenResult::Valid { user, intent })
                    }
                    _ => Ok(EmailTokenResult::UserNotFound),
                }
            }
        }
    }

    /// Log the session out and revoke its remember-me tokens.
    pub async fn logout(&self, login: &mut Login) {
        if let Some(user) = login.user() {
            if let Err(err) = self.state.tokens.invalidate_auth_tokens(user.id()).await {
                warn!("failed to invalidate auth tokens on logout: {err}");
            }
        }
        self.state.transport.clear();
        login.clear();
        info!("logged out");
    }

    /// Remaining throttle delay for an identity; safe to poll for a
    /// client-facing countdown.
    pub async fn delay_for(&self, identity: &str) -> Duration {
        self.state
            .throttle
            .delay_for(&self.state.policy.normalize(identity))
            .await
    }

    fn fail(&mut self, failure: AttemptFailure) -> bool {
        self.failure = Some(failure);
        false
    }

    fn effective_identity(&self, attempt: &Attempt) -> String {
        self.preset_identity
            .clone()
            .unwrap_or_else(|| self.state.policy.normalize(attempt.identity()))
    }

    fn account_usable(&self, user: &User) -> bool {
        match user.status() {
            AccountStatus::Disabled => false,
            AccountStatus::PendingVerification => {
                !self.state.config.email_verification_required()
            }
            AccountStatus::Active => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Attempt, AttemptFailure, AuthModel, AuthState};
    use crate::config::AuthConfig;
    use crate::directory::{AccountStatus, MemoryDirectory, UserDirectory};
    use crate::fields::Field;
    use crate::identity::LoginNamePolicy;
    use crate::mfa::{MfaConfig, MfaLookupPolicy, MfaMode};
    use crate::password::MemoryPasswordVerifier;
    use crate::token::{MemoryTokenStore, MemoryTransport};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use secrecy::SecretString;
    use std::sync::Arc;
    use uuid::Uuid;

    async fn state_with_alice(config: AuthConfig) -> Arc<AuthState> {
        let directory = Arc::new(MemoryDirectory::new());
        directory
            .add_user("alice@example.com", AccountStatus::Active)
            .await;
        let verifier = Arc::new(MemoryPasswordVerifier::new(directory.clone()));
        verifier.set_password("alice@example.com", "s3cret").await;
        Arc::new(AuthState::new(
            config,
            directory,
            verifier,
            Arc::new(MemoryTokenStore::new()),
            Arc::new(MemoryTransport::new()),
        ))
    }

    fn attempt(identity: &str, password: &str) -> Attempt {
        Attempt::new(identity, SecretString::from(password.to_string()))
    }

    #[tokio::test]
    async fn empty_fields_fail_without_verifier_call() -> Result<()> {
        let state = state_with_alice(AuthConfig::new()).await;
        let mut model = AuthModel::new(state);

        assert!(!model.validate(&attempt("", "s3cret")).await?);
        assert_eq!(
            model.last_failure(),
            Some(&AttemptFailure::MissingField(Field::LoginName))
        );

        assert!(!model.validate(&attempt("alice@example.com", "")).await?);
        assert_eq!(
            model.last_failure(),
            Some(&AttemptFailure::MissingField(Field::Password))
        );
        Ok(())
    }

    #[tokio::test]
    async fn malformed_identity_is_rejected() -> Result<()> {
        let state = state_with_alice(AuthConfig::new()).await;
        let mut model = AuthModel::new(state);

        assert!(!model.validate(&attempt("not-an-email", "s3cret")).await?);
        assert_eq!(model.last_failure(), Some(&AttemptFailure::MalformedIdentity));
        Ok(())
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_identity_report_identically() -> Result<()> {
        let state = state_with_alice(AuthConfig::new()).await;
        let mut model = AuthModel::new(state);

        assert!(!model.validate(&attempt("alice@example.com", "wrong")).await?);
        let wrong_password = model.last_failure().cloned();

        assert!(!model.validate(&attempt("ghost@example.com", "wrong")).await?);
        let unknown_identity = model.last_failure().cloned();

        assert_eq!(wrong_password, unknown_identity);
        assert_eq!(wrong_password, Some(AttemptFailure::InvalidCredentials));
        Ok(())
    }

    #[tokio::test]
    async fn throttled_identity_short_circuits() -> Result<()> {
        let state = state_with_alice(AuthConfig::new()).await;
        let mut model = AuthModel::new(state);

        assert!(!model.validate(&attempt("alice@example.com", "wrong")).await?);
        // The failure armed a delay; the next attempt must not reach the
        // verifier, even with the correct password.
        assert!(!model.validate(&attempt("alice@example.com", "s3cret")).await?);
        assert!(matches!(
            model.last_failure(),
            Some(AttemptFailure::Throttled { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn identity_is_normalized_before_verification() -> Result<()> {
        let state = state_with_alice(AuthConfig::new()).await;
        let mut model = AuthModel::new(state);

        assert!(model.validate(&attempt(" Alice@Example.COM ", "s3cret")).await?);
        Ok(())
    }

    #[tokio::test]
    async fn preset_identity_wins_and_field_turns_read_only() -> Result<()> {
        let state = state_with_alice(AuthConfig::new()).await;
        let mut model = AuthModel::new(state);
        model.set_preset_identity("alice@example.com");

        assert!(model.field_options(Field::LoginName).read_only);
        assert!(model.validate(&attempt("ignored@example.com", "s3cret")).await?);
        Ok(())
    }

    #[tokio::test]
    async fn remember_me_field_tracks_configuration() {
        let state = state_with_alice(AuthConfig::new()).await;
        let model = AuthModel::new(state);
        assert!(!model.field_options(Field::RememberMe).visible);

        let state = state_with_alice(AuthConfig::new().with_persistent_login(true)).await;
        let model = AuthModel::new(state);
        assert!(model.field_options(Field::RememberMe).visible);
    }

    #[tokio::test]
    async fn pending_account_fails_when_verification_required() -> Result<()> {
        let directory = Arc::new(MemoryDirectory::new());
        directory
            .add_user("carol@example.com", AccountStatus::PendingVerification)
            .await;
        let verifier = Arc::new(MemoryPasswordVerifier::new(directory.clone()));
        verifier.set_password("carol@example.com", "s3cret").await;
        let state = Arc::new(AuthState::new(
            AuthConfig::new().with_email_verification_required(true),
            directory,
            verifier,
            Arc::new(MemoryTokenStore::new()),
            Arc::new(MemoryTransport::new()),
        ));
        let mut model = AuthModel::new(state);

        assert!(!model.validate(&attempt("carol@example.com", "s3cret")).await?);
        assert_eq!(model.last_failure(), Some(&AttemptFailure::EmailUnverified));
        assert!(model.show_resend_email_verification());
        Ok(())
    }

    struct FailingDirectory;

    #[async_trait]
    impl UserDirectory for FailingDirectory {
        async fn find_by_identity(&self, _identity: &str) -> Result<Option<crate::directory::User>> {
            Err(anyhow!("directory offline"))
        }

        async fn find_by_id(&self, _id: Uuid) -> Result<Option<crate::directory::User>> {
            Err(anyhow!("directory offline"))
        }

        async fn mfa_identity(&self, _user_id: Uuid, _provider: &str) -> Result<Option<String>> {
            Err(anyhow!("directory offline"))
        }
    }

    #[tokio::test]
    async fn mfa_lookup_failure_follows_policy() {
        let user = crate::directory::User::new(
            Uuid::new_v4(),
            "alice@example.com",
            AccountStatus::Active,
        );

        for (policy, expected) in [
            (MfaLookupPolicy::FailOpen, false),
            (MfaLookupPolicy::FailClosed, true),
        ] {
            let config = AuthConfig::new().with_mfa(
                MfaConfig::new()
                    .with_mode(MfaMode::Optional)
                    .with_lookup_policy(policy),
            );
            let directory = Arc::new(MemoryDirectory::new());
            let verifier = Arc::new(MemoryPasswordVerifier::new(directory));
            let state = Arc::new(AuthState::new(
                config,
                Arc::new(FailingDirectory),
                verifier,
                Arc::new(MemoryTokenStore::new()),
                Arc::new(MemoryTransport::new()),
            ));
            let model = AuthModel::new(state);
            assert_eq!(model.has_mfa_step(&user).await, expected);
        }
    }

    #[tokio::test]
    async fn required_mfa_ignores_registered_factors() {
        let config =
            AuthConfig::new().with_mfa(MfaConfig::new().with_mode(MfaMode::Required));
        let state = state_with_alice(config).await;
        let model = AuthModel::new(state);
        let user = crate::directory::User::new(
            Uuid::new_v4(),
            "alice@example.com",
            AccountStatus::Active,
        );
        assert!(model.has_mfa_step(&user).await);
    }

    #[tokio::test]
    async fn custom_identity_policy_replaces_email_format() -> Result<()> {
        let directory = Arc::new(MemoryDirectory::new());
        directory.add_user("alice", AccountStatus::Active).await;
        let verifier = Arc::new(MemoryPasswordVerifier::new(directory.clone()));
        verifier.set_password("alice", "s3cret").await;
        let state = Arc::new(
            AuthState::new(
                AuthConfig::new(),
                directory,
                verifier,
                Arc::new(MemoryTokenStore::new()),
                Arc::new(MemoryTransport::new()),
            )
            .with_identity_policy(Arc::new(LoginNamePolicy::default())),
        );
        let mut model = AuthModel::new(state);

        assert!(model.validate(&attempt("alice", "s3cret")).await?);
        Ok(())
    }

    #[tokio::test]
    async fn set_remember_me_token_requires_persistent_login() {
        let state = state_with_alice(AuthConfig::new()).await;
        let model = AuthModel::new(state);
        let user = crate::directory::User::new(
            Uuid::new_v4(),
            "alice@example.com",
            AccountStatus::Active,
        );
        assert!(matches!(
            model.set_remember_me_token(&user).await,
            Err(crate::error::Error::PersistentLoginDisabled)
        ));
    }
}
