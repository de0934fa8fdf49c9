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

//! [User Account] credential sources.
//!
//! User accounts represent a developer, administrator, or any other person
//! who interacts with Google APIs and services. The `authorized_user` files
//! created by `gcloud auth application-default login` hold a refresh token
//! for such an account. These sources exchange the refresh token for access
//! tokens.
//!
//! # Example
//! ```
//! # use gtoken::credentials::user_account::Builder;
//! # use gtoken::dispatch;
//! # async fn sample() -> anyhow::Result<()> {
//! let authorized_user = serde_json::json!({
//!     "client_id": "YOUR_CLIENT_ID.apps.googleusercontent.com",
//!     "client_secret": "YOUR_CLIENT_SECRET", // LOAD SECURELY!
//!     "refresh_token": "YOUR_REFRESH_TOKEN", // LOAD SECURELY!
//!     "type": "authorized_user",
//! });
//! let source = Builder::new(authorized_user).build()?;
//! let token = dispatch::access_token(&source, ["https://www.googleapis.com/auth/pubsub"]).await?;
//! println!("Token: {}", token.token);
//! # Ok(()) }
//! ```
//!
//! [User Account]: https://cloud.google.com/docs/authentication#user-accounts

use crate::build_errors::Error as BuilderError;
use crate::constants::{OAUTH2_REFRESH_URL, REFRESH_TOKEN_GRANT_TYPE};
use crate::credentials::{Capabilities, Capability, CredentialSource, CredentialSourceProvider};
use crate::errors;
use crate::token::{Token, expires_in};
use crate::{BuildResult, Result};
use reqwest::Client;
use serde_json::Value;

const MSG: &str = "failed to refresh the user access token";

/// A builder for `authorized_user` [CredentialSource] instances.
#[derive(Debug)]
pub struct Builder {
    authorized_user: Value,
    scopes: Option<Vec<String>>,
    token_uri: Option<String>,
}

impl Builder {
    /// Creates a builder from an `authorized_user` JSON object.
    pub fn new(authorized_user: Value) -> Self {
        Self {
            authorized_user,
            scopes: None,
            token_uri: None,
        }
    }

    /// Sets the scopes for access tokens requested without scopes.
    ///
    /// If unset, the token endpoint uses the scopes granted to the refresh
    /// token.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    /// Overrides the token endpoint.
    ///
    /// Any value provided here overrides a `token_uri` value from the input
    /// `authorized_user` JSON. Defaults to `https://oauth2.googleapis.com/token`.
    pub fn with_token_uri<S: Into<String>>(mut self, token_uri: S) -> Self {
        self.token_uri = Some(token_uri.into());
        self
    }

    /// Returns a [CredentialSource] that refreshes user access tokens.
    ///
    /// # Errors
    /// Fails if the JSON is not an `authorized_user` object.
    pub fn build(self) -> BuildResult<CredentialSource> {
        let authorized_user = serde_json::from_value::<AuthorizedUser>(self.authorized_user)
            .map_err(BuilderError::parsing)?;
        let endpoint = self
            .token_uri
            .or(authorized_user.token_uri)
            .unwrap_or_else(|| OAUTH2_REFRESH_URL.to_string());
        Ok(CredentialSource::from(UserSource {
            endpoint,
            client_id: authorized_user.client_id,
            client_secret: authorized_user.client_secret,
            refresh_token: authorized_user.refresh_token,
            default_scopes: self.scopes.unwrap_or_default(),
            client: Client::new(),
        }))
    }
}

#[derive(PartialEq, serde::Deserialize)]
struct AuthorizedUser {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    #[serde(default)]
    token_uri: Option<String>,
}

struct UserSource {
    endpoint: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    default_scopes: Vec<String>,
    client: Client,
}

impl std::fmt::Debug for UserSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSource")
            .field("endpoint", &self.endpoint)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[censored]")
            .field("refresh_token", &"[censored]")
            .field("default_scopes", &self.default_scopes)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
struct Oauth2RefreshRequest {
    grant_type: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
struct Oauth2RefreshResponse {
    access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_in: Option<u64>,
    token_type: String,
}

impl UserSource {
    async fn refresh(&self, scopes: &[String]) -> Result<Token> {
        let scopes = if scopes.is_empty() {
            self.default_scopes.as_slice()
        } else {
            scopes
        };
        let request = Oauth2RefreshRequest {
            grant_type: REFRESH_TOKEN_GRANT_TYPE.to_string(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            refresh_token: self.refresh_token.clone(),
            scope: (!scopes.is_empty()).then(|| scopes.join(" ")),
        };
        tracing::debug!(endpoint = %self.endpoint, "refreshing user access token");
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| errors::from_http_error(e, MSG))?;
        if !response.status().is_success() {
            return Err(errors::from_http_response(response, MSG).await);
        }
        let response = response
            .json::<Oauth2RefreshResponse>()
            .await
            .map_err(|e| errors::from_http_error(e, MSG))?;
        Ok(Token {
            token: response.access_token,
            token_type: response.token_type,
            expires_at: expires_in(response.expires_in),
        })
    }
}

impl CredentialSourceProvider for UserSource {
    async fn token(&self) -> Result<Token> {
        self.refresh(&[]).await
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::empty().with(Capability::AccessToken)
    }

    async fn access_token(&self, scopes: Vec<String>) -> Result<String> {
        let token = self.refresh(&scopes).await?;
        Ok(token.token)
    }
}
