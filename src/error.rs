//! Crate error type.
//!
//! Failures from external collaborators are deliberately collapsed into a
//! single `Store` variant so callers cannot tell infrastructure trouble apart
//! from one another; the wrapped source carries the detail for operators.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// An external store or verifier failed. Transient; the caller should
    /// retry the operation at a higher layer, never treat it as success.
    #[error(transparent)]
    Store(#[from] anyhow::Error),

    /// A remember-me token was requested while persistent login is disabled.
    #[error("persistent login is not enabled")]
    PersistentLoginDisabled,
}

#[cfg(test)]
mod tests {
    use super::Error;
    use anyhow::anyhow;

    #[test]
    fn store_error_keeps_source_message() {
        let err = Error::from(anyhow!("connection refused"));
        assert_eq!(err.to_string(), "connection refused");
    }

    #[test]
    fn persistent_login_disabled_message() {
        assert_eq!(
            Error::PersistentLoginDisabled.to_string(),
            "persistent login is not enabled"
        );
    }
}
