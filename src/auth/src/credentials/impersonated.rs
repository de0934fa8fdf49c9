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

//! [Impersonated service account] credential sources.
//!
//! When the principal you are using doesn't have the permissions you need to
//! accomplish your task, you can use service account impersonation. The
//! source built here wraps any other [CredentialSource] (the *base* source)
//! and mints tokens *as* a target service account, using the [IAM
//! Credentials API] as the signing authority. The base source is only used to
//! authenticate the calls to that API.
//!
//! The principal behind the base source must have the [Service Account Token
//! Creator Role] on the target service account, or on the first delegate when
//! a delegation chain is used. Each delegate must have the role on the next
//! account in the chain.
//!
//! The result is itself a [CredentialSource], it can be wrapped again or
//! given to the functions in [dispatch][crate::dispatch].
//!
//! ## Example: impersonate through a delegation chain
//!
//! ```
//! # use gtoken::credentials::{gcloud, impersonated};
//! # use gtoken::dispatch;
//! # async fn sample() -> anyhow::Result<()> {
//! let base = gcloud::Builder::default().build().await?;
//! let source = impersonated::Builder::from_chain(
//!     base,
//!     ["delegate@p.iam.gserviceaccount.com", "target@p.iam.gserviceaccount.com"],
//! )
//! .build()?;
//! let id_token = dispatch::id_token(&source, "https://my-service.example.com").await?;
//! println!("{}", id_token.token);
//! # Ok(()) }
//! ```
//!
//! [Impersonated service account]: https://cloud.google.com/docs/authentication/use-service-account-impersonation
//! [IAM Credentials API]: https://cloud.google.com/iam/docs/reference/credentials/rest
//! [Service Account Token Creator Role]: https://cloud.google.com/docs/authentication/use-service-account-impersonation#required-roles

use crate::build_errors::Error as BuilderError;
use crate::constants::{DEFAULT_SCOPE, IAM_CREDENTIALS_ENDPOINT, SERVICE_ACCOUNT_RESOURCE_PREFIX};
use crate::credentials::jws::JwsClaims;
use crate::credentials::{Capabilities, Capability, CredentialSource, CredentialSourceProvider};
use crate::errors::{self, CredentialsError};
use crate::token::Token;
use crate::{BuildResult, Result, dispatch};
use http::HeaderValue;
use http::header::AUTHORIZATION;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;

const CAPABILITIES: Capabilities = Capabilities::empty()
    .with(Capability::AccessToken)
    .with(Capability::IdToken)
    .with(Capability::JwtToken)
    .with(Capability::Email);

const ACCESS_TOKEN_MSG: &str = "failed to generate access token";
const ID_TOKEN_MSG: &str = "failed to generate ID token";
const SIGN_JWT_MSG: &str = "failed to sign JWT";

/// Returns the IAM resource name of a service account.
///
/// # Example
/// ```
/// # use gtoken::credentials::impersonated::service_account_name;
/// assert_eq!(
///     service_account_name("sa@p.iam.gserviceaccount.com"),
///     "projects/-/serviceAccounts/sa@p.iam.gserviceaccount.com"
/// );
/// ```
pub fn service_account_name(id: &str) -> String {
    format!("{SERVICE_ACCOUNT_RESOURCE_PREFIX}{id}")
}

/// A builder for impersonated service account [CredentialSource] instances.
///
/// # Example
/// ```
/// # use gtoken::credentials::{CredentialSource, impersonated};
/// # fn sample(base: CredentialSource) -> anyhow::Result<()> {
/// let source = impersonated::Builder::new(base, "target@p.iam.gserviceaccount.com")
///     .with_delegates(["delegate@p.iam.gserviceaccount.com"])
///     .with_scopes(["https://www.googleapis.com/auth/devstorage.read_only"])
///     .build()?;
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct Builder {
    source: CredentialSource,
    target_principal: Option<String>,
    delegates: Vec<String>,
    scopes: Option<Vec<String>>,
    endpoint: Option<String>,
}

impl Builder {
    /// Impersonates `target_principal` using the `source` credentials.
    pub fn new<S: Into<String>>(source: CredentialSource, target_principal: S) -> Self {
        Self {
            source,
            target_principal: Some(target_principal.into()),
            delegates: Vec::new(),
            scopes: None,
            endpoint: None,
        }
    }

    /// Impersonates the last service account in `chain`.
    ///
    /// The preceding accounts, if any, become the delegation chain. The chain
    /// must not be empty, [build][Builder::build] fails otherwise.
    pub fn from_chain<I, S>(source: CredentialSource, chain: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut delegates = chain.into_iter().map(Into::into).collect::<Vec<String>>();
        let target_principal = delegates.pop();
        Self {
            source,
            target_principal,
            delegates,
            scopes: None,
            endpoint: None,
        }
    }

    /// Sets the chain of delegates, replacing any previous chain.
    ///
    /// The delegates are listed in order, the first delegate is impersonated
    /// by the base source, and the last delegate impersonates the target.
    pub fn with_delegates<I, S>(mut self, delegates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.delegates = delegates.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the scopes used when access tokens are requested without scopes.
    ///
    /// Defaults to `https://www.googleapis.com/auth/cloud-platform`.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    /// Overrides the IAM Credentials API endpoint.
    ///
    /// Mostly useful in tests.
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Returns a [CredentialSource] that impersonates the target principal.
    ///
    /// # Errors
    /// Fails if the target principal is missing or empty.
    pub fn build(self) -> BuildResult<CredentialSource> {
        let target_principal = self
            .target_principal
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BuilderError::missing_field("target_principal"))?;
        let endpoint = self
            .endpoint
            .unwrap_or_else(|| IAM_CREDENTIALS_ENDPOINT.to_string());
        Ok(CredentialSource::from(ImpersonatedSource {
            source: self.source,
            target_principal,
            delegates: self.delegates,
            default_scopes: self
                .scopes
                .unwrap_or_else(|| vec![DEFAULT_SCOPE.to_string()]),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client: Client::new(),
        }))
    }
}

#[derive(Debug)]
struct ImpersonatedSource {
    source: CredentialSource,
    target_principal: String,
    delegates: Vec<String>,
    default_scopes: Vec<String>,
    endpoint: String,
    client: Client,
}

#[derive(Serialize)]
struct GenerateAccessTokenRequest<'a> {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    delegates: Vec<String>,
    scope: &'a [String],
}

#[derive(serde::Deserialize)]
struct GenerateAccessTokenResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
}

#[derive(Serialize)]
struct GenerateIdTokenRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    delegates: Vec<String>,
    audience: String,
    #[serde(rename = "includeEmail")]
    include_email: bool,
}

#[derive(serde::Deserialize)]
struct GenerateIdTokenResponse {
    token: String,
}

#[derive(Serialize)]
struct SignJwtRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    delegates: Vec<String>,
    payload: String,
}

#[derive(serde::Deserialize)]
struct SignJwtResponse {
    #[serde(rename = "signedJwt")]
    signed_jwt: String,
}

impl ImpersonatedSource {
    fn delegates(&self) -> Vec<String> {
        self.delegates
            .iter()
            .map(|d| service_account_name(d))
            .collect()
    }

    async fn authorization(&self) -> Result<HeaderValue> {
        let token = self.source.token().await?;
        let mut value = HeaderValue::from_str(&format!("{} {}", token.token_type, token.token))
            .map_err(CredentialsError::malformed)?;
        value.set_sensitive(true);
        Ok(value)
    }

    async fn call<Req, Resp>(&self, method: &str, body: &Req, msg: &str) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let authorization = self.authorization().await?;
        let url = format!(
            "{}/v1/{}:{method}",
            self.endpoint,
            service_account_name(&self.target_principal)
        );
        tracing::debug!(%url, "calling the IAM Credentials API");
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, authorization)
            .json(body)
            .send()
            .await
            .map_err(|e| errors::from_http_error(e, msg))?;
        if !response.status().is_success() {
            return Err(errors::from_iam_response(response, msg).await);
        }
        response
            .json::<Resp>()
            .await
            .map_err(|e| errors::from_http_error(e, msg))
    }
}

impl CredentialSourceProvider for ImpersonatedSource {
    async fn token(&self) -> Result<Token> {
        let dispatched = dispatch::access_token_dyn(self, Vec::new()).await?;
        Ok(Token::bearer(dispatched.token))
    }

    fn capabilities(&self) -> Capabilities {
        CAPABILITIES
    }

    async fn access_token(&self, scopes: Vec<String>) -> Result<String> {
        let scope = if scopes.is_empty() {
            &self.default_scopes
        } else {
            &scopes
        };
        let request = GenerateAccessTokenRequest {
            delegates: self.delegates(),
            scope,
        };
        let response: GenerateAccessTokenResponse = self
            .call("generateAccessToken", &request, ACCESS_TOKEN_MSG)
            .await?;
        Ok(response.access_token)
    }

    async fn id_token(&self, audience: String) -> Result<String> {
        let request = GenerateIdTokenRequest {
            delegates: self.delegates(),
            audience,
            include_email: true,
        };
        let response: GenerateIdTokenResponse = self
            .call("generateIdToken", &request, ID_TOKEN_MSG)
            .await?;
        Ok(response.token)
    }

    async fn jwt_token(&self, audience: String) -> Result<String> {
        let payload = JwsClaims::new(self.target_principal.as_str(), audience).to_json()?;
        let request = SignJwtRequest {
            delegates: self.delegates(),
            payload,
        };
        let response: SignJwtResponse = self.call("signJwt", &request, SIGN_JWT_MSG).await?;
        Ok(response.signed_jwt)
    }

    async fn email(&self) -> Result<String> {
        Ok(self.target_principal.clone())
    }
}
