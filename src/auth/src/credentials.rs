// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::Result;
use crate::errors::CredentialsError;
use crate::token::Token;
use std::future::Future;
use std::sync::Arc;

pub mod gcloud;
pub mod impersonated;
pub mod jws;
pub mod mds;
pub mod service_account;
pub mod user_account;
pub mod well_known;

/// One optional token-producing operation a [CredentialSource] may support.
///
/// Every source supports the base contract, [CredentialSourceProvider::token].
/// The capabilities are the richer operations on top of it, and a backend
/// only needs to implement the ones it can honor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Mint an access token restricted to a set of scopes.
    AccessToken,
    /// Return a pre-scoped access token, the caller cannot choose scopes.
    AccessTokenWithoutScopes,
    /// Mint an ID token for a given audience.
    IdToken,
    /// Return an ID token with a fixed audience.
    IdTokenWithoutAudience,
    /// Mint a signed JWT for a given audience.
    JwtToken,
    /// Report the identity (usually an email) of the principal.
    Email,
}

impl Capability {
    const ALL: [Capability; 6] = [
        Capability::AccessToken,
        Capability::AccessTokenWithoutScopes,
        Capability::IdToken,
        Capability::IdTokenWithoutAudience,
        Capability::JwtToken,
        Capability::Email,
    ];

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// The set of [Capability] values a [CredentialSource] supports.
///
/// # Example
/// ```
/// # use gtoken::credentials::{Capabilities, Capability};
/// let caps = Capabilities::empty()
///     .with(Capability::AccessTokenWithoutScopes)
///     .with(Capability::Email);
/// assert!(caps.contains(Capability::Email));
/// assert!(!caps.contains(Capability::AccessToken));
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Capabilities(u8);

impl Capabilities {
    /// A set with no capabilities, only the base contract is available.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Returns a copy of this set with `capability` added.
    pub const fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability.bit())
    }

    /// Returns `true` if `capability` is in the set.
    pub const fn contains(&self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    /// Returns `true` if the set has no capabilities.
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterates over the capabilities in the set.
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.contains(*c))
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// An identity's handle for producing credentials.
///
/// `CredentialSource` is a type-erased, cheap to clone wrapper around any
/// [CredentialSourceProvider]. Sources are immutable once built. To change
/// the configuration, build a new source.
///
/// The methods on this type call the backend directly, without any fallback.
/// Use the functions in [dispatch][crate::dispatch] to get the most precise
/// credential a source can produce.
#[derive(Clone, Debug)]
pub struct CredentialSource {
    pub(crate) inner: Arc<dyn dynamic::CredentialSourceProvider>,
}

impl<T> std::convert::From<T> for CredentialSource
where
    T: CredentialSourceProvider + Send + Sync + 'static,
{
    fn from(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }
}

impl CredentialSource {
    /// Retrieves a bearer token, the base contract every source supports.
    pub async fn token(&self) -> Result<Token> {
        self.inner.token().await
    }

    /// The capabilities this source supports.
    pub fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    /// Calls the [Capability::AccessToken] operation.
    pub async fn access_token(&self, scopes: Vec<String>) -> Result<String> {
        self.inner.access_token(scopes).await
    }

    /// Calls the [Capability::AccessTokenWithoutScopes] operation.
    pub async fn access_token_without_scopes(&self) -> Result<String> {
        self.inner.access_token_without_scopes().await
    }

    /// Calls the [Capability::IdToken] operation.
    pub async fn id_token(&self, audience: String) -> Result<String> {
        self.inner.id_token(audience).await
    }

    /// Calls the [Capability::IdTokenWithoutAudience] operation.
    pub async fn id_token_without_audience(&self) -> Result<String> {
        self.inner.id_token_without_audience().await
    }

    /// Calls the [Capability::JwtToken] operation.
    pub async fn jwt_token(&self, audience: String) -> Result<String> {
        self.inner.jwt_token(audience).await
    }

    /// Calls the [Capability::Email] operation.
    pub async fn email(&self) -> Result<String> {
        self.inner.email().await
    }
}

/// Backends implement this trait to participate in capability dispatch.
///
/// Only [token][CredentialSourceProvider::token] and
/// [capabilities][CredentialSourceProvider::capabilities] are required. A
/// backend overrides the capability methods it supports and advertises them
/// in `capabilities()`. The default bodies fail with an
/// [unsupported][CredentialsError::is_unsupported] error.
///
/// # Example
/// ```
/// # use gtoken::credentials::{Capabilities, Capability, CredentialSource, CredentialSourceProvider};
/// # use gtoken::token::Token;
/// # use gtoken::Result;
/// #[derive(Debug)]
/// struct Fixed;
///
/// impl CredentialSourceProvider for Fixed {
///     async fn token(&self) -> Result<Token> {
///         Ok(Token::bearer("fixed-token"))
///     }
///     fn capabilities(&self) -> Capabilities {
///         Capabilities::empty().with(Capability::Email)
///     }
///     async fn email(&self) -> Result<String> {
///         Ok("fixed@example.com".to_string())
///     }
/// }
///
/// let source = CredentialSource::from(Fixed);
/// assert!(source.capabilities().contains(Capability::Email));
/// # tokio_test::block_on(async {
/// let email = gtoken::dispatch::email(&source).await?;
/// assert_eq!(email, "fixed@example.com");
/// # Ok::<(), anyhow::Error>(())
/// # });
/// ```
pub trait CredentialSourceProvider: std::fmt::Debug {
    /// Retrieves a bearer token with whatever scopes the backend defaults to.
    fn token(&self) -> impl Future<Output = Result<Token>> + Send;

    /// The capabilities implemented by this backend.
    fn capabilities(&self) -> Capabilities;

    /// Mints an access token for `scopes`.
    fn access_token(&self, scopes: Vec<String>) -> impl Future<Output = Result<String>> + Send {
        let _ = scopes;
        async { Err(not_implemented(Capability::AccessToken)) }
    }

    /// Returns an access token with the backend's own scopes.
    fn access_token_without_scopes(&self) -> impl Future<Output = Result<String>> + Send {
        async { Err(not_implemented(Capability::AccessTokenWithoutScopes)) }
    }

    /// Mints an ID token for `audience`.
    fn id_token(&self, audience: String) -> impl Future<Output = Result<String>> + Send {
        let _ = audience;
        async { Err(not_implemented(Capability::IdToken)) }
    }

    /// Returns an ID token with the backend's own audience.
    fn id_token_without_audience(&self) -> impl Future<Output = Result<String>> + Send {
        async { Err(not_implemented(Capability::IdTokenWithoutAudience)) }
    }

    /// Mints a signed JWT for `audience`.
    fn jwt_token(&self, audience: String) -> impl Future<Output = Result<String>> + Send {
        let _ = audience;
        async { Err(not_implemented(Capability::JwtToken)) }
    }

    /// Returns the identity of the principal.
    fn email(&self) -> impl Future<Output = Result<String>> + Send {
        async { Err(not_implemented(Capability::Email)) }
    }
}

fn not_implemented(capability: Capability) -> CredentialsError {
    CredentialsError::unsupported(format!(
        "the credential source does not implement {capability:?}"
    ))
}

pub(crate) mod dynamic {
    use super::Capabilities;
    use crate::Result;
    use crate::token::Token;

    /// A dyn-compatible, crate-private version of `CredentialSourceProvider`.
    #[async_trait::async_trait]
    pub trait CredentialSourceProvider: Send + Sync + std::fmt::Debug {
        async fn token(&self) -> Result<Token>;
        fn capabilities(&self) -> Capabilities;
        async fn access_token(&self, scopes: Vec<String>) -> Result<String>;
        async fn access_token_without_scopes(&self) -> Result<String>;
        async fn id_token(&self, audience: String) -> Result<String>;
        async fn id_token_without_audience(&self) -> Result<String>;
        async fn jwt_token(&self, audience: String) -> Result<String>;
        async fn email(&self) -> Result<String>;
    }

    /// The public CredentialSourceProvider implements the dyn-compatible CredentialSourceProvider.
    #[async_trait::async_trait]
    impl<T> CredentialSourceProvider for T
    where
        T: super::CredentialSourceProvider + Send + Sync,
    {
        async fn token(&self) -> Result<Token> {
            T::token(self).await
        }

        fn capabilities(&self) -> Capabilities {
            T::capabilities(self)
        }

        async fn access_token(&self, scopes: Vec<String>) -> Result<String> {
            T::access_token(self, scopes).await
        }

        async fn access_token_without_scopes(&self) -> Result<String> {
            T::access_token_without_scopes(self).await
        }

        async fn id_token(&self, audience: String) -> Result<String> {
            T::id_token(self, audience).await
        }

        async fn id_token_without_audience(&self) -> Result<String> {
            T::id_token_without_audience(self).await
        }

        async fn jwt_token(&self, audience: String) -> Result<String> {
            T::jwt_token(self, audience).await
        }

        async fn email(&self) -> Result<String> {
            T::email(self).await
        }
    }
}
