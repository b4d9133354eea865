//! Login sessions and trust levels.
//!
//! A [`Login`] is owned by the calling context and mutated by the model.
//! Transitions only move toward more trust; the single way down is
//! [`Login::clear`], reached through `AuthModel::logout`.

use crate::directory::User;
use serde::{Deserialize, Serialize};

/// Trust level of a login session, ordered from least to most trusted.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginState {
    Unauthenticated,
    /// The account exists but is administratively unusable.
    Disabled,
    /// Established through a remember-me token; the password must be
    /// re-entered before sensitive operations.
    Weak,
    /// Primary credential accepted; a second factor is still pending.
    RequiresMfa,
    Strong,
}

impl Default for LoginState {
    fn default() -> Self {
        Self::Unauthenticated
    }
}

#[derive(Debug, Default)]
pub struct Login {
    state: LoginState,
    user: Option<User>,
    changes: u64,
}

impl Login {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> LoginState {
        self.state
    }

    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Whether the session carries an authenticated user. `RequiresMfa` is
    /// not logged in yet; `Disabled` never is.
    #[must_use]
    pub fn logged_in(&self) -> bool {
        matches!(self.state, LoginState::Weak | LoginState::Strong)
    }

    /// Move the session to `state` for `user`.
    ///
    /// Refused when it would lower trust, name `Unauthenticated` (use
    /// [`Login::clear`]), or switch users without an intervening logout.
    /// Returns whether the transition applied.
    pub fn set(&mut self, user: User, state: LoginState) -> bool {
        if state == LoginState::Unauthenticated || state < self.state {
            return false;
        }
        if let Some(current) = &self.user {
            if current.id() != user.id() {
                return false;
            }
        }
        self.user = Some(user);
        self.state = state;
        self.changes += 1;
        true
    }

    /// Reset to `Unauthenticated`, dropping the user.
    pub fn clear(&mut self) {
        self.state = LoginState::Unauthenticated;
        self.user = None;
        self.changes += 1;
    }

    /// Monotonic tick incremented on every applied transition; lets an
    /// embedding UI detect changes without holding a borrow.
    #[must_use]
    pub fn changed_count(&self) -> u64 {
        self.changes
    }
}
