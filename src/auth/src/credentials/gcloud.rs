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

//! Credential sources backed by the [gcloud CLI].
//!
//! The source runs `gcloud config config-helper --format=json` once, when it
//! is built, and serves the tokens from that output. The CLI decides the
//! scopes of the access token and the audience of the ID token, so these
//! sources only implement the "without scopes" and "without audience"
//! capabilities.
//!
//! [gcloud CLI]: https://cloud.google.com/sdk/gcloud

use crate::build_errors::Error as BuilderError;
use crate::credentials::{Capabilities, Capability, CredentialSource, CredentialSourceProvider};
use crate::token::{Token, expires_at};
use crate::{BuildResult, Result};
use time::OffsetDateTime;
use tokio::process::Command;

const GCLOUD: &str = "gcloud";

/// Creates [CredentialSource] instances using the `gcloud` CLI.
///
/// # Example
/// ```
/// # use gtoken::credentials::gcloud::Builder;
/// # async fn sample() -> anyhow::Result<()> {
/// let source = Builder::default()
///     .with_account("user@example.com")
///     .build()
///     .await?;
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct Builder {
    program: String,
    account: Option<String>,
}

impl std::default::Default for Builder {
    fn default() -> Self {
        Self {
            program: GCLOUD.to_string(),
            account: None,
        }
    }
}

impl Builder {
    /// Use the credentials of `account` instead of the active account.
    pub fn with_account<S: Into<String>>(mut self, account: S) -> Self {
        self.account = Some(account.into());
        self
    }

    /// Overrides the path of the `gcloud` executable.
    pub fn with_program<S: Into<String>>(mut self, program: S) -> Self {
        self.program = program.into();
        self
    }

    fn args(&self) -> Vec<String> {
        let mut args = vec![
            "config".to_string(),
            "config-helper".to_string(),
            "--format=json".to_string(),
        ];
        if let Some(account) = self.account.as_ref().filter(|a| !a.is_empty()) {
            args.push(format!("--account={account}"));
        }
        args
    }

    /// Runs `gcloud` and returns a [CredentialSource] with its credentials.
    ///
    /// # Errors
    /// Fails with a [loading] error if `gcloud` cannot run or exits with an
    /// error, and with a [parsing] error if its output is not recognized.
    ///
    /// [loading]: crate::build_errors::Error::is_loading
    /// [parsing]: crate::build_errors::Error::is_parsing
    pub async fn build(self) -> BuildResult<CredentialSource> {
        let args = self.args();
        tracing::debug!(program = %self.program, ?args, "running gcloud");
        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(BuilderError::loading)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BuilderError::loading(format!(
                "`{} {}` failed with {}: {stderr}",
                self.program,
                args.join(" "),
                output.status
            )));
        }
        let config = parse_config(&output.stdout)?;
        Ok(CredentialSource::from(GcloudSource::new(config)))
    }
}

#[derive(Debug, serde::Deserialize)]
struct GcloudConfig {
    credential: GcloudCredential,
    #[serde(default)]
    configuration: Option<Configuration>,
    #[serde(default)]
    core: Option<Core>,
}

#[derive(serde::Deserialize)]
struct GcloudCredential {
    access_token: String,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    token_expiry: Option<OffsetDateTime>,
}

impl std::fmt::Debug for GcloudCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcloudCredential")
            .field("access_token", &"[censored]")
            .field("id_token", &self.id_token.as_ref().map(|_| "[censored]"))
            .field("token_expiry", &self.token_expiry)
            .finish()
    }
}

#[derive(Debug, serde::Deserialize)]
struct Configuration {
    #[serde(default)]
    properties: Option<Properties>,
}

#[derive(Debug, serde::Deserialize)]
struct Properties {
    #[serde(default)]
    core: Option<Core>,
}

#[derive(Debug, serde::Deserialize)]
struct Core {
    #[serde(default)]
    account: Option<String>,
}

impl GcloudConfig {
    // The active configuration wins, the top-level `core` section is only
    // consulted when it has no account.
    fn account(&self) -> Option<&str> {
        let active = self
            .configuration
            .as_ref()
            .and_then(|c| c.properties.as_ref())
            .and_then(|p| p.core.as_ref());
        Core::account(active).or_else(|| Core::account(self.core.as_ref()))
    }
}

impl Core {
    fn account(core: Option<&Core>) -> Option<&str> {
        core.and_then(|c| c.account.as_deref())
            .filter(|a| !a.is_empty())
    }
}

fn parse_config(stdout: &[u8]) -> BuildResult<GcloudConfig> {
    serde_json::from_slice(stdout).map_err(BuilderError::parsing)
}

struct GcloudSource {
    access_token: String,
    id_token: Option<String>,
    token_expiry: Option<OffsetDateTime>,
    account: Option<String>,
}

impl std::fmt::Debug for GcloudSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcloudSource")
            .field("access_token", &"[censored]")
            .field("id_token", &self.id_token.as_ref().map(|_| "[censored]"))
            .field("token_expiry", &self.token_expiry)
            .field("account", &self.account)
            .finish()
    }
}

impl GcloudSource {
    fn new(config: GcloudConfig) -> Self {
        let account = config.account().map(str::to_string);
        Self {
            access_token: config.credential.access_token,
            id_token: config.credential.id_token.filter(|t| !t.is_empty()),
            token_expiry: config.credential.token_expiry,
            account,
        }
    }
}

impl CredentialSourceProvider for GcloudSource {
    async fn token(&self) -> Result<Token> {
        Ok(Token {
            token: self.access_token.clone(),
            token_type: "Bearer".to_string(),
            expires_at: self.token_expiry.map(expires_at),
        })
    }

    fn capabilities(&self) -> Capabilities {
        let mut capabilities = Capabilities::empty().with(Capability::AccessTokenWithoutScopes);
        if self.id_token.is_some() {
            capabilities = capabilities.with(Capability::IdTokenWithoutAudience);
        }
        if self.account.is_some() {
            capabilities = capabilities.with(Capability::Email);
        }
        capabilities
    }

    async fn access_token_without_scopes(&self) -> Result<String> {
        Ok(self.access_token.clone())
    }

    async fn id_token_without_audience(&self) -> Result<String> {
        self.id_token.clone().ok_or_else(|| {
            crate::errors::CredentialsError::unsupported("gcloud did not return an ID token")
        })
    }

    async fn email(&self) -> Result<String> {
        self.account.clone().ok_or_else(|| {
            crate::errors::CredentialsError::unsupported("gcloud has no active account")
        })
    }
}
