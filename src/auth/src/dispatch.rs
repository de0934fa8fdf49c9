// Copyright 2025 Google LLC
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

//! Obtain the most precise credential a [CredentialSource] can produce.
//!
//! Each function probes the source's [Capabilities] in a fixed priority
//! order, from the exact operation to the approximate one, and then to the
//! base contract or a terminal [unsupported] error:
//!
//! | Operation        | Exact          | Approximate                  | Last resort        |
//! |------------------|----------------|------------------------------|--------------------|
//! | [access_token]   | `AccessToken`  | `AccessTokenWithoutScopes`   | `token()`          |
//! | [id_token]       | `IdToken`      | `IdTokenWithoutAudience`     | unsupported        |
//! | [jwt_token]      | `JwtToken`     |                              | unsupported        |
//! | [email]          | `Email`        |                              | unsupported        |
//!
//! When an approximate route discards the requested scopes or audience, the
//! result carries [Route::Approximate] and a `WARN` level event is emitted.
//!
//! # Example
//! ```
//! # use gtoken::credentials::impersonated;
//! # use gtoken::credentials::CredentialSource;
//! # use gtoken::dispatch;
//! # async fn sample(base: CredentialSource) -> anyhow::Result<()> {
//! let source = impersonated::Builder::new(base, "sa@my-project.iam.gserviceaccount.com").build()?;
//! let dispatched = dispatch::id_token(&source, "https://my-service.example.com").await?;
//! if dispatched.is_fallback() {
//!     anyhow::bail!("the ID token is not for the requested audience");
//! }
//! println!("{}", dispatched.token);
//! # Ok(()) }
//! ```
//!
//! [Capabilities]: crate::credentials::Capabilities
//! [unsupported]: crate::errors::CredentialsError::is_unsupported

use crate::Result;
use crate::credentials::{Capability, CredentialSource, dynamic};
use crate::errors::CredentialsError;

const NO_ID_TOKEN: &str = "token source can't issue ID token";
const NO_JWT_TOKEN: &str = "token source can't issue JWT token";
const NO_EMAIL: &str = "token source hasn't email";

/// How a dispatched credential was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// The source implemented the requested operation.
    Exact,
    /// The source ignored the requested scopes or audience.
    Approximate,
    /// The source only produced its base bearer token.
    BaseToken,
}

/// The result of [access_token] and [id_token].
#[derive(Clone, PartialEq)]
pub struct Dispatched {
    /// The credential.
    pub token: String,
    /// Whether the credential matches the request, or is a fallback.
    pub route: Route,
}

impl Dispatched {
    /// Returns `true` if the requested scopes or audience were not honored.
    pub fn is_fallback(&self) -> bool {
        self.route != Route::Exact
    }
}

impl std::fmt::Debug for Dispatched {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatched")
            .field("token", &"[censored]")
            .field("route", &self.route)
            .finish()
    }
}

/// Obtains an access token for `scopes`.
///
/// Never fails with [unsupported], every source can produce a base token.
///
/// [unsupported]: crate::errors::CredentialsError::is_unsupported
pub async fn access_token<I, S>(source: &CredentialSource, scopes: I) -> Result<Dispatched>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let scopes = scopes.into_iter().map(Into::into).collect();
    access_token_dyn(source.inner.as_ref(), scopes).await
}

/// Obtains an ID token for `audience`.
pub async fn id_token<S: Into<String>>(source: &CredentialSource, audience: S) -> Result<Dispatched> {
    id_token_dyn(source.inner.as_ref(), audience.into()).await
}

/// Obtains a signed JWT for `audience`.
pub async fn jwt_token<S: Into<String>>(source: &CredentialSource, audience: S) -> Result<String> {
    let source = source.inner.as_ref();
    if !source.capabilities().contains(Capability::JwtToken) {
        return Err(CredentialsError::unsupported(NO_JWT_TOKEN));
    }
    tracing::debug!(?source, "issuing JWT token");
    source.jwt_token(audience.into()).await
}

/// Obtains the identity of the principal behind `source`.
pub async fn email(source: &CredentialSource) -> Result<String> {
    let source = source.inner.as_ref();
    if !source.capabilities().contains(Capability::Email) {
        return Err(CredentialsError::unsupported(NO_EMAIL));
    }
    source.email().await
}

// Sources that call back into dispatch go through these, the boxed futures of
// the dyn-compatible trait keep the recursion finite.
pub(crate) async fn access_token_dyn(
    source: &dyn dynamic::CredentialSourceProvider,
    scopes: Vec<String>,
) -> Result<Dispatched> {
    let capabilities = source.capabilities();
    if capabilities.contains(Capability::AccessToken) {
        tracing::debug!(?source, ?scopes, "issuing access token");
        let token = source.access_token(scopes).await?;
        return Ok(Dispatched {
            token,
            route: Route::Exact,
        });
    }
    if capabilities.contains(Capability::AccessTokenWithoutScopes) {
        tracing::warn!(
            ?source,
            ignored_scopes = ?scopes,
            "fallback to access token without scopes"
        );
        let token = source.access_token_without_scopes().await?;
        return Ok(Dispatched {
            token,
            route: Route::Approximate,
        });
    }
    tracing::warn!(
        ?source,
        ignored_scopes = ?scopes,
        "fallback to the base token of the credential source"
    );
    let token = source.token().await?;
    Ok(Dispatched {
        token: token.token,
        route: Route::BaseToken,
    })
}

pub(crate) async fn id_token_dyn(
    source: &dyn dynamic::CredentialSourceProvider,
    audience: String,
) -> Result<Dispatched> {
    let capabilities = source.capabilities();
    if capabilities.contains(Capability::IdToken) {
        tracing::debug!(?source, %audience, "issuing ID token");
        let token = source.id_token(audience).await?;
        return Ok(Dispatched {
            token,
            route: Route::Exact,
        });
    }
    if capabilities.contains(Capability::IdTokenWithoutAudience) {
        tracing::warn!(
            ?source,
            ignored_audience = %audience,
            "fallback to ID token without audience"
        );
        let token = source.id_token_without_audience().await?;
        return Ok(Dispatched {
            token,
            route: Route::Approximate,
        });
    }
    Err(CredentialsError::unsupported(NO_ID_TOKEN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Capabilities;
    use crate::credentials::tests::MockSource;
    use crate::token::Token;
    use test_case::test_case;

    fn mock_with(capabilities: &[Capability]) -> MockSource {
        let mut mock = MockSource::new();
        let capabilities = capabilities.iter().copied().collect::<Capabilities>();
        mock.expect_capabilities().return_const(capabilities);
        mock
    }

    #[tokio::test]
    async fn access_token_exact() -> anyhow::Result<()> {
        let mut mock = mock_with(&[
            Capability::AccessToken,
            Capability::AccessTokenWithoutScopes,
        ]);
        mock.expect_access_token()
            .withf(|scopes| scopes == &["s1".to_string(), "s2".to_string()])
            .times(1)
            .returning(|_| Ok("scoped-token".to_string()));
        mock.expect_access_token_without_scopes().never();
        mock.expect_token().never();

        let source = CredentialSource::from(mock);
        let got = access_token(&source, ["s1", "s2"]).await?;
        assert_eq!(got.token, "scoped-token");
        assert_eq!(got.route, Route::Exact);
        assert!(!got.is_fallback(), "{got:?}");
        Ok(())
    }

    #[tokio::test]
    async fn access_token_without_scopes_fallback() -> anyhow::Result<()> {
        let mut mock = mock_with(&[Capability::AccessTokenWithoutScopes, Capability::Email]);
        mock.expect_access_token().never();
        mock.expect_access_token_without_scopes()
            .times(1)
            .returning(|| Ok("prescoped-token".to_string()));
        mock.expect_token().never();

        let source = CredentialSource::from(mock);
        let got = access_token(&source, ["s1"]).await?;
        assert_eq!(got.token, "prescoped-token");
        assert_eq!(got.route, Route::Approximate);
        assert!(got.is_fallback(), "{got:?}");
        Ok(())
    }

    #[tokio::test]
    async fn access_token_base_token_fallback() -> anyhow::Result<()> {
        let mut mock = mock_with(&[Capability::Email]);
        mock.expect_access_token().never();
        mock.expect_access_token_without_scopes().never();
        mock.expect_token()
            .times(1)
            .returning(|| Ok(Token::bearer("base-token")));

        let source = CredentialSource::from(mock);
        let got = access_token(&source, ["s1"]).await?;
        assert_eq!(got.token, "base-token");
        assert_eq!(got.route, Route::BaseToken);
        assert!(got.is_fallback(), "{got:?}");
        Ok(())
    }

    #[tokio::test]
    async fn access_token_propagates_errors() {
        let mut mock = mock_with(&[]);
        mock.expect_token()
            .times(1)
            .returning(|| Err(CredentialsError::transport("cannot connect")));

        let source = CredentialSource::from(mock);
        let err = access_token(&source, Vec::<String>::new()).await.unwrap_err();
        assert!(err.is_transport(), "{err:?}");
    }

    #[tokio::test]
    async fn access_token_does_not_use_unadvertised_methods() -> anyhow::Result<()> {
        // The mock would answer `access_token()`, but does not advertise it.
        let mut mock = mock_with(&[]);
        mock.expect_access_token().never();
        mock.expect_token()
            .times(1)
            .returning(|| Ok(Token::bearer("base-token")));

        let source = CredentialSource::from(mock);
        let got = access_token(&source, ["s1"]).await?;
        assert_eq!(got.route, Route::BaseToken);
        Ok(())
    }

    #[tokio::test]
    async fn id_token_exact() -> anyhow::Result<()> {
        let mut mock = mock_with(&[Capability::IdToken, Capability::IdTokenWithoutAudience]);
        mock.expect_id_token()
            .withf(|audience| audience == "https://svc.example.com")
            .times(1)
            .returning(|_| Ok("id-token".to_string()));
        mock.expect_id_token_without_audience().never();

        let source = CredentialSource::from(mock);
        let got = id_token(&source, "https://svc.example.com").await?;
        assert_eq!(got.token, "id-token");
        assert_eq!(got.route, Route::Exact);
        Ok(())
    }

    #[tokio::test]
    async fn id_token_without_audience_fallback() -> anyhow::Result<()> {
        let mut mock = mock_with(&[Capability::IdTokenWithoutAudience]);
        mock.expect_id_token().never();
        mock.expect_id_token_without_audience()
            .times(1)
            .returning(|| Ok("fixed-audience-token".to_string()));

        let source = CredentialSource::from(mock);
        let got = id_token(&source, "https://svc.example.com").await?;
        assert_eq!(got.token, "fixed-audience-token");
        assert_eq!(got.route, Route::Approximate);
        assert!(got.is_fallback(), "{got:?}");
        Ok(())
    }

    #[test_case(&[]; "no capabilities")]
    #[test_case(&[Capability::AccessToken, Capability::JwtToken, Capability::Email]; "other capabilities")]
    #[tokio::test]
    async fn id_token_unsupported(capabilities: &[Capability]) {
        let mut mock = mock_with(capabilities);
        mock.expect_id_token().never();
        mock.expect_id_token_without_audience().never();
        mock.expect_token().never();

        let source = CredentialSource::from(mock);
        let err = id_token(&source, "aud").await.unwrap_err();
        assert!(err.is_unsupported(), "{err:?}");
        assert_eq!(err.to_string(), "token source can't issue ID token");
    }

    #[tokio::test]
    async fn jwt_token_exact() -> anyhow::Result<()> {
        let mut mock = mock_with(&[Capability::JwtToken]);
        mock.expect_jwt_token()
            .withf(|audience| audience == "https://svc.example.com")
            .times(1)
            .returning(|_| Ok("header.claims.signature".to_string()));

        let source = CredentialSource::from(mock);
        let got = jwt_token(&source, "https://svc.example.com").await?;
        assert_eq!(got, "header.claims.signature");
        Ok(())
    }

    #[test_case(&[]; "no capabilities")]
    #[test_case(&[Capability::AccessToken, Capability::IdToken, Capability::IdTokenWithoutAudience]; "other capabilities")]
    #[tokio::test]
    async fn jwt_token_unsupported(capabilities: &[Capability]) {
        let mut mock = mock_with(capabilities);
        mock.expect_jwt_token().never();
        mock.expect_token().never();

        let source = CredentialSource::from(mock);
        let err = jwt_token(&source, "aud").await.unwrap_err();
        assert!(err.is_unsupported(), "{err:?}");
        assert_eq!(err.to_string(), "token source can't issue JWT token");
    }

    #[tokio::test]
    async fn email_exact() -> anyhow::Result<()> {
        let mut mock = mock_with(&[Capability::Email]);
        mock.expect_email()
            .times(1)
            .returning(|| Ok("user@example.com".to_string()));

        let source = CredentialSource::from(mock);
        assert_eq!(email(&source).await?, "user@example.com");
        Ok(())
    }

    #[tokio::test]
    async fn email_unsupported() {
        let mut mock = mock_with(&[Capability::AccessToken]);
        mock.expect_email().never();

        let source = CredentialSource::from(mock);
        let err = email(&source).await.unwrap_err();
        assert!(err.is_unsupported(), "{err:?}");
        assert_eq!(err.to_string(), "token source hasn't email");
    }

    #[test]
    fn dispatched_debug() {
        let got = Dispatched {
            token: "secret-token".to_string(),
            route: Route::Approximate,
        };
        let fmt = format!("{got:?}");
        assert!(!fmt.contains("secret-token"), "{fmt}");
        assert!(fmt.contains("Approximate"), "{fmt}");
    }
}
