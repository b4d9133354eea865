//! Identity normalization and format policy.
//!
//! The model never inspects identity syntax itself; deployments inject a
//! policy matching their provider (email addresses, plain login names, ...).

use regex::Regex;

/// Syntactic policy for login identities.
pub trait IdentityPolicy: Send + Sync {
    /// Normalize a submitted identity for lookups and throttling keys.
    fn normalize(&self, raw: &str) -> String {
        raw.trim().to_lowercase()
    }

    /// Whether an already-normalized identity is well-formed.
    fn valid(&self, identity: &str) -> bool;
}

/// Email-address identities.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmailPolicy;

impl IdentityPolicy for EmailPolicy {
    fn valid(&self, identity: &str) -> bool {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(identity))
    }
}

/// Free-form login names with a minimum length and no whitespace.
#[derive(Clone, Copy, Debug)]
pub struct LoginNamePolicy {
    min_chars: usize,
}

impl LoginNamePolicy {
    #[must_use]
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars }
    }
}

impl Default for LoginNamePolicy {
    fn default() -> Self {
        Self::new(4)
    }
}

impl IdentityPolicy for LoginNamePolicy {
    fn valid(&self, identity: &str) -> bool {
        identity.chars().count() >= self.min_chars && !identity.contains(char::is_whitespace)
    }
}

#[cfg(test)]
mod tests {
    use super::{EmailPolicy, IdentityPolicy, LoginNamePolicy};

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(EmailPolicy.normalize(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn email_policy_accepts_basic_format() {
        assert!(EmailPolicy.valid("a@example.com"));
        assert!(EmailPolicy.valid("name.surname@example.co"));
    }

    #[test]
    fn email_policy_rejects_missing_parts() {
        assert!(!EmailPolicy.valid("not-an-email"));
        assert!(!EmailPolicy.valid("missing-at.example.com"));
        assert!(!EmailPolicy.valid("missing-domain@"));
    }

    #[test]
    fn login_name_policy_enforces_minimum_length() {
        let policy = LoginNamePolicy::default();
        assert!(policy.valid("alice"));
        assert!(!policy.valid("abc"));
        assert!(!policy.valid("has space"));
    }
}
