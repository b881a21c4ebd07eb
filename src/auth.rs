//! Token sources consulted whenever a connection attempt is made.
//!
//! The client never acquires or refreshes tokens itself. Callers either hand over a fixed
//! secret or a [`TokenProvider`] that is awaited before every attempt, which lets a rotated
//! token take effect on the next reconnect without rebuilding the client.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
/// Secret string types that redact values in debug output for security.
pub use secrecy::{ExposeSecret, SecretString};

use crate::Result;

/// Asynchronous source of bearer tokens.
///
/// Any `Fn() -> impl Future<Output = Result<SecretString>>` closure is a provider:
///
/// ```
/// use notify_client_sdk::auth::{SecretString, TokenSource};
/// use notify_client_sdk::error::Error;
///
/// let source =
///     TokenSource::provider(|| async { Ok::<_, Error>(SecretString::from("rotated-token")) });
/// # let _ = source;
/// ```
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Resolve the token to present on the next connection attempt.
    async fn token(&self) -> Result<SecretString>;
}

#[async_trait]
impl<F, Fut> TokenProvider for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<SecretString>> + Send,
{
    async fn token(&self) -> Result<SecretString> {
        self().await
    }
}

/// Where the connection token comes from.
#[non_exhaustive]
#[derive(Clone)]
pub enum TokenSource {
    /// A fixed token, presented unchanged on every attempt
    Static(SecretString),
    /// A provider awaited on every attempt
    Provider(Arc<dyn TokenProvider>),
}

impl TokenSource {
    /// Wrap a fixed token.
    #[must_use]
    pub fn fixed<S: Into<String>>(token: S) -> Self {
        Self::Static(SecretString::from(token.into()))
    }

    /// Wrap an asynchronous provider.
    #[must_use]
    pub fn provider<P: TokenProvider + 'static>(provider: P) -> Self {
        Self::Provider(Arc::new(provider))
    }

    /// Resolve the token for the current attempt.
    pub async fn resolve(&self) -> Result<SecretString> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::Provider(provider) => provider.token().await,
        }
    }
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(_) => f.write_str("TokenSource::Static([REDACTED])"),
            Self::Provider(_) => f.write_str("TokenSource::Provider(..)"),
        }
    }
}

impl From<SecretString> for TokenSource {
    fn from(token: SecretString) -> Self {
        Self::Static(token)
    }
}
