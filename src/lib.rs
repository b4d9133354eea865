//! # Ensaluto (Authentication Model)
//!
//! `ensaluto` is the decision core for credential-based sign-in: it judges
//! login attempts, throttles repeated failures, consumes email-verification
//! and remember-me tokens, and decides when a second factor is required.
//! Password hashing, user storage, cookie transport, and UI all live behind
//! injected capability contracts.
//!
//! ## Trust levels
//!
//! A [`session::Login`] moves through
//! `Unauthenticated → Weak / RequiresMfa / Strong` and only ever toward more
//! trust; logout is the single way back down. Auto-login through a
//! remember-me token yields `Weak`, a password yields `Strong` — or
//! `RequiresMfa` first when the MFA gate demands a second factor.
//!
//! ## Throttling
//!
//! Consecutive failures per submitted identity arm an increasing delay
//! ([`throttle::BackoffCurve`], default 1/5/10/25 seconds). While a delay is
//! pending no password check runs at all, and the delay is identical for
//! identities that do not exist, so neither timing nor the countdown leaks
//! which accounts are real.
//!
//! ## Tokens
//!
//! Email tokens are single-use and consumed atomically with validation;
//! remember-me tokens rotate on every successful auto-login. Stores only
//! ever see SHA-256 hashes of token values.
//!
//! ## MFA
//!
//! The gate is configuration ([`mfa::MfaConfig`]): disabled, optional
//! (users with a registered factor get the step), or required for everyone.
//! Whether a failed factor lookup blocks login is an explicit policy choice.

pub mod config;
pub mod directory;
pub mod error;
pub mod fields;
pub mod identity;
pub mod mfa;
pub mod model;
pub mod password;
pub mod session;
pub mod throttle;
pub mod token;

pub use config::AuthConfig;
pub use error::Error;
pub use model::{Attempt, AttemptFailure, AuthModel, AuthState};
pub use session::{Login, LoginState};
