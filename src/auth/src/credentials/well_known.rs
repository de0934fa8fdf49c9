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

//! Credential sources loaded from the [Application Default Credentials] file.
//!
//! The file is found at the path in the `GOOGLE_APPLICATION_CREDENTIALS`
//! environment variable. If the variable is unset, the well-known location
//! written by `gcloud auth application-default login` is used:
//! `$HOME/.config/gcloud/application_default_credentials.json` on Unix and
//! `%APPDATA%\gcloud\application_default_credentials.json` on Windows.
//!
//! The `type` field selects the backend. `service_account` files produce a
//! [service_account] source, `authorized_user` files produce a
//! [user_account] source. Other types are rejected.
//!
//! ```
//! # use gtoken::credentials::well_known::Builder;
//! # use gtoken::dispatch;
//! # async fn sample() -> anyhow::Result<()> {
//! let source = Builder::default().build().await?;
//! let token = dispatch::access_token(&source, Vec::<String>::new()).await?;
//! println!("Token: {}", token.token);
//! # Ok(()) }
//! ```
//!
//! [Application Default Credentials]: https://cloud.google.com/docs/authentication/application-default-credentials
//! [service_account]: crate::credentials::service_account
//! [user_account]: crate::credentials::user_account

use crate::BuildResult;
use crate::build_errors::Error as BuilderError;
use crate::constants::GOOGLE_APPLICATION_CREDENTIALS_VAR;
use crate::credentials::{CredentialSource, service_account, user_account};
use serde_json::Value;
use std::path::PathBuf;

const WINDOWS_APPDATA: &str = "APPDATA";
const UNIX_HOME: &str = "HOME";
const WELL_KNOWN_FILE: &str = "application_default_credentials.json";

/// Creates [CredentialSource] instances from the ADC file.
#[derive(Debug, Default)]
pub struct Builder {
    path: Option<PathBuf>,
    scopes: Option<Vec<String>>,
}

impl Builder {
    /// Reads the credentials from `path` instead of the default location.
    pub fn with_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the scopes for access tokens requested without scopes.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    /// Loads the file and returns the matching [CredentialSource].
    ///
    /// # Errors
    /// A loading error if the file cannot be found or read, a parsing error
    /// if it is not valid JSON, and an unknown type error for unsupported
    /// `type` values.
    pub async fn build(self) -> BuildResult<CredentialSource> {
        let path = match self.path {
            Some(p) => p,
            None => adc_path()?,
        };
        tracing::debug!(path = %path.display(), "loading credentials file");
        let contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
            BuilderError::loading(format!("cannot read {}: {e}", path.display()))
        })?;
        let value: Value = serde_json::from_str(&contents).map_err(BuilderError::parsing)?;
        from_value(value, self.scopes)
    }
}

fn from_value(value: Value, scopes: Option<Vec<String>>) -> BuildResult<CredentialSource> {
    let cred_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| BuilderError::parsing("no `type` field found"))?;
    match cred_type {
        "service_account" => {
            let builder = service_account::Builder::new(value);
            match scopes {
                Some(s) => builder.with_scopes(s),
                None => builder,
            }
            .build()
        }
        "authorized_user" => {
            let builder = user_account::Builder::new(value);
            match scopes {
                Some(s) => builder.with_scopes(s),
                None => builder,
            }
            .build()
        }
        t => Err(BuilderError::unknown_type(format!(
            "unsupported credentials type `{t}`"
        ))),
    }
}

fn adc_path() -> BuildResult<PathBuf> {
    if let Ok(path) = std::env::var(GOOGLE_APPLICATION_CREDENTIALS_VAR) {
        return Ok(PathBuf::from(path));
    }
    well_known_path()
}

fn well_known_path() -> BuildResult<PathBuf> {
    let mut path = if cfg!(windows) {
        std::env::var(WINDOWS_APPDATA)
            .map(PathBuf::from)
            .map_err(|_| BuilderError::loading("unable to find APPDATA"))?
    } else {
        let mut home = std::env::var(UNIX_HOME)
            .map(PathBuf::from)
            .map_err(|_| BuilderError::loading("unable to lookup HOME"))?;
        home.push(".config");
        home
    };
    path.push("gcloud");
    path.push(WELL_KNOWN_FILE);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Capability;
    use crate::credentials::tests::PKCS8_PK;
    use scoped_env::ScopedEnv;
    use serde_json::json;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    type TestResult = anyhow::Result<()>;

    fn write_json(value: &Value) -> anyhow::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        file.write_all(value.to_string().as_bytes())?;
        Ok(file)
    }

    fn service_account_json() -> Value {
        json!({
            "type": "service_account",
            "client_email": "sa@p.iam.gserviceaccount.com",
            "private_key_id": "test-key-id",
            "private_key": PKCS8_PK,
            "project_id": "test-project",
        })
    }

    fn authorized_user_json() -> Value {
        json!({
            "type": "authorized_user",
            "client_id": "test-client-id",
            "client_secret": "test-client-secret",
            "refresh_token": "test-refresh-token",
        })
    }

    #[tokio::test]
    #[serial]
    async fn service_account_from_env() -> TestResult {
        let file = write_json(&service_account_json())?;
        let path = file.path().to_string_lossy().to_string();
        let _e = ScopedEnv::set(GOOGLE_APPLICATION_CREDENTIALS_VAR, &path);

        let source = Builder::default().build().await?;
        let caps = source.capabilities();
        assert!(caps.contains(Capability::JwtToken), "{caps:?}");
        assert!(caps.contains(Capability::Email), "{caps:?}");
        assert_eq!(source.email().await?, "sa@p.iam.gserviceaccount.com");
        Ok(())
    }

    #[tokio::test]
    #[serial]
    async fn authorized_user_from_home() -> TestResult {
        let home = tempfile::tempdir()?;
        let dir = home.path().join(".config").join("gcloud");
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(WELL_KNOWN_FILE), authorized_user_json().to_string())?;

        let _c = ScopedEnv::remove(GOOGLE_APPLICATION_CREDENTIALS_VAR);
        let home_path = home.path().to_string_lossy().to_string();
        let _h = ScopedEnv::set(UNIX_HOME, home_path.as_str());
        if cfg!(windows) {
            return Ok(());
        }

        let source = Builder::default().build().await?;
        assert_eq!(
            source.capabilities().iter().collect::<Vec<_>>(),
            vec![Capability::AccessToken]
        );
        Ok(())
    }

    #[tokio::test]
    #[serial]
    async fn explicit_path_wins() -> TestResult {
        let _e = ScopedEnv::set(GOOGLE_APPLICATION_CREDENTIALS_VAR, "/does/not/exist.json");
        let file = write_json(&authorized_user_json())?;
        let source = Builder::default().with_path(file.path()).build().await?;
        assert!(source.capabilities().contains(Capability::AccessToken));
        Ok(())
    }

    #[tokio::test]
    #[serial]
    async fn missing_file() -> TestResult {
        let _e = ScopedEnv::set(GOOGLE_APPLICATION_CREDENTIALS_VAR, "/does/not/exist.json");
        let err = Builder::default().build().await.unwrap_err();
        assert!(err.is_loading(), "{err:?}");
        assert!(err.to_string().contains("/does/not/exist.json"), "{err}");
        Ok(())
    }

    #[tokio::test]
    async fn not_json() -> TestResult {
        let mut file = NamedTempFile::new()?;
        file.write_all(b"not json")?;
        let err = Builder::default()
            .with_path(file.path())
            .build()
            .await
            .unwrap_err();
        assert!(err.is_parsing(), "{err:?}");
        Ok(())
    }

    #[test]
    fn unknown_type() {
        let value = json!({"type": "external_account"});
        let err = from_value(value, None).unwrap_err();
        assert!(err.is_unknown_type(), "{err:?}");
        assert!(err.to_string().contains("external_account"), "{err}");
    }

    #[test]
    fn missing_type() {
        let err = from_value(json!({"client_id": "x"}), None).unwrap_err();
        assert!(err.is_parsing(), "{err:?}");
    }

    #[test]
    #[serial]
    fn well_known_path_unix() -> TestResult {
        if cfg!(windows) {
            return Ok(());
        }
        let _h = ScopedEnv::set(UNIX_HOME, "/home/test");
        let path = well_known_path()?;
        assert_eq!(
            path,
            PathBuf::from("/home/test/.config/gcloud/application_default_credentials.json")
        );
        Ok(())
    }
}
