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

//! [Metadata Service] credential sources.
//!
//! Google Cloud environments such as [Google Compute Engine (GCE)][gce-link],
//! [Google Kubernetes Engine (GKE)][gke-link], or [Cloud Run] provide a metadata service.
//! This is a local service to the VM (or pod) which (as the name implies) provides
//! metadata information about the VM. The service also provides access
//! tokens and ID tokens for the service accounts attached to the VM.
//!
//! The `GCE_METADATA_HOST` environment variable, if set, overrides the
//! metadata server address.
//!
//! Example usage:
//!
//! ```
//! # use gtoken::credentials::mds::Builder;
//! # use gtoken::dispatch;
//! # async fn sample() -> anyhow::Result<()> {
//! let source = Builder::default().build()?;
//! let token = dispatch::id_token(&source, "https://my-service.example.com").await?;
//! println!("Token: {}", token.token);
//! # Ok(()) }
//! ```
//!
//! [Cloud Run]: https://cloud.google.com/run
//! [gce-link]: https://cloud.google.com/products/compute
//! [gke-link]: https://cloud.google.com/kubernetes-engine
//! [Metadata Service]: https://cloud.google.com/compute/docs/metadata/overview

use crate::credentials::{Capabilities, Capability, CredentialSource, CredentialSourceProvider};
use crate::mds::DEFAULT_ACCOUNT;
use crate::mds::client::Client as MDSClient;
use crate::token::Token;
use crate::{BuildResult, Result};

const CAPABILITIES: Capabilities = Capabilities::empty()
    .with(Capability::AccessToken)
    .with(Capability::IdToken)
    .with(Capability::Email);

/// Creates metadata service [CredentialSource] instances.
#[derive(Debug, Default)]
pub struct Builder {
    endpoint: Option<String>,
    account: Option<String>,
    scopes: Option<Vec<String>>,
}

impl Builder {
    /// Sets the endpoint for this source.
    ///
    /// The default is `http://metadata.google.internal`. The
    /// `GCE_METADATA_HOST` environment variable takes precedence.
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Uses the service account `account` instead of the default one.
    pub fn with_account<S: Into<String>>(mut self, account: S) -> Self {
        self.account = Some(account.into());
        self
    }

    /// Sets the scopes for access tokens requested without scopes.
    ///
    /// If unset, the metadata server uses the scopes configured for the
    /// instance.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    /// Returns a [CredentialSource] backed by the metadata service.
    pub fn build(self) -> BuildResult<CredentialSource> {
        Ok(CredentialSource::from(MDSSource {
            client: MDSClient::new(self.endpoint),
            account: self
                .account
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| DEFAULT_ACCOUNT.to_string()),
            default_scopes: self.scopes.unwrap_or_default(),
        }))
    }
}

#[derive(Debug)]
struct MDSSource {
    client: MDSClient,
    account: String,
    default_scopes: Vec<String>,
}

impl CredentialSourceProvider for MDSSource {
    async fn token(&self) -> Result<Token> {
        self.client
            .access_token(&self.account, &self.default_scopes)
            .await
    }

    fn capabilities(&self) -> Capabilities {
        CAPABILITIES
    }

    async fn access_token(&self, scopes: Vec<String>) -> Result<String> {
        let scopes = if scopes.is_empty() {
            self.default_scopes.as_slice()
        } else {
            scopes.as_slice()
        };
        let token = self.client.access_token(&self.account, scopes).await?;
        Ok(token.token)
    }

    async fn id_token(&self, audience: String) -> Result<String> {
        self.client.id_token(&self.account, &audience).await
    }

    async fn email(&self) -> Result<String> {
        self.client.email(&self.account).await
    }
}
