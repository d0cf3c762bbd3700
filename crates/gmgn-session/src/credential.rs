//! Credential hook for gated channels.
//!
//! The client never obtains access tokens itself. Whoever builds the
//! client hands over a [`CredentialProvider`], and the registry asks it
//! for a token whenever a gated channel is subscribed without one.

/// Supplies the access token for credential-gated channels.
///
/// Called on every gated subscribe that has no explicit token, so a
/// provider can rotate tokens behind the client's back.
///
/// # Example
///
/// ```rust
/// use gmgn_session::CredentialProvider;
///
/// /// Reads the token from the environment on every call.
/// struct EnvCredential;
///
/// impl CredentialProvider for EnvCredential {
///     fn access_token(&self) -> Option<String> {
///         std::env::var("GMGN_ACCESS_TOKEN").ok()
///     }
/// }
/// ```
pub trait CredentialProvider: Send + Sync + 'static {
    /// The current token, if any.
    fn access_token(&self) -> Option<String>;
}

/// A fixed, possibly absent, token.
#[derive(Debug, Clone, Default)]
pub struct StaticCredential(Option<String>);

impl StaticCredential {
    /// A provider that always returns `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    /// A provider with no token.
    pub fn none() -> Self {
        Self(None)
    }
}

impl From<Option<String>> for StaticCredential {
    fn from(token: Option<String>) -> Self {
        Self(token)
    }
}

impl CredentialProvider for StaticCredential {
    fn access_token(&self) -> Option<String> {
        self.0.clone().filter(|t| !t.is_empty())
    }
}
