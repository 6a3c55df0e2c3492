//! Credential providers for the streaming endpoint and the session service.

use std::env;

/// Environment variable read by [`EnvCredentials::new`].
pub const DEFAULT_TOKEN_VAR: &str = "PARLEY_AUTH_TOKEN";

/// Supplies the bearer token used to authenticate connections.
///
/// Returning `None` means no credential is available; connecting then fails with
/// [`Error::Authentication`](crate::Error::Authentication).
pub trait CredentialProvider: Send + Sync {
    /// Returns the current token, if any.
    fn auth_token(&self) -> Option<String>;
}

/// A fixed token, or the absence of one.
#[derive(Debug, Clone, Default)]
pub struct StaticToken {
    token: Option<String>,
}

impl StaticToken {
    /// A provider that always returns `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// A provider that never has a token.
    pub fn absent() -> Self {
        Self { token: None }
    }
}

impl CredentialProvider for StaticToken {
    fn auth_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// Reads the token from an environment variable on every call.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    /// Reads `PARLEY_AUTH_TOKEN`.
    pub fn new() -> Self {
        Self::from_var(DEFAULT_TOKEN_VAR)
    }

    /// Reads the named variable.
    pub fn from_var(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialProvider for EnvCredentials {
    fn auth_token(&self) -> Option<String> {
        env::var(&self.var).ok().filter(|token| !token.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_token() {
        assert_eq!(StaticToken::new("abc").auth_token().as_deref(), Some("abc"));
        assert!(StaticToken::absent().auth_token().is_none());
    }

    #[test]
    fn env_credentials_missing_var() {
        let provider = EnvCredentials::from_var("PARLEY_TEST_TOKEN_THAT_IS_NEVER_SET");
        assert!(provider.auth_token().is_none());
    }
}
