//! Form fields and their presentation options.

/// Fields of a credential attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Field {
    LoginName,
    Password,
    RememberMe,
}

impl Field {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoginName => "login_name",
            Self::Password => "password",
            Self::RememberMe => "remember_me",
        }
    }
}

/// How a field is presented by the caller's form layer.
///
/// Computed per field from configuration and the current flow; this is a
/// plain record, not per-field dispatch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FieldOptions {
    pub visible: bool,
    pub required: bool,
    pub read_only: bool,
}
