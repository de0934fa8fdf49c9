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

//! Errors returned when a [CredentialSource] fails to produce a credential.
//!
//! [CredentialSource]: crate::credentials::CredentialSource

use http::StatusCode;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type for credential operations.
///
/// The library never retries and never recovers locally: every failure is
/// returned to the caller as-is. Use the predicates to decide how to report
/// the problem.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct CredentialsError(ErrorKind);

impl CredentialsError {
    /// The credential source cannot produce the requested kind of credential,
    /// and there is no fallback for it.
    pub fn is_unsupported(&self) -> bool {
        matches!(self.0, ErrorKind::Unsupported(_))
    }

    /// A network or HTTP failure talking to the signing authority or the
    /// token endpoint.
    pub fn is_transport(&self) -> bool {
        matches!(self.0, ErrorKind::Transport { .. })
    }

    /// The key material or a claim set could not be decoded.
    pub fn is_malformed(&self) -> bool {
        matches!(self.0, ErrorKind::Malformed(_))
    }

    /// The signing authority rejected the request with an application-level
    /// error.
    pub fn is_upstream(&self) -> bool {
        matches!(self.0, ErrorKind::Upstream { .. })
    }

    /// The HTTP status code returned by the remote service, if any.
    pub fn http_status(&self) -> Option<StatusCode> {
        match &self.0 {
            ErrorKind::Transport { status, .. } => *status,
            ErrorKind::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The raw response body returned by the remote service, if any.
    pub fn body(&self) -> Option<&str> {
        match &self.0 {
            ErrorKind::Transport { body, .. } => body.as_deref(),
            ErrorKind::Upstream { body, .. } => Some(body.as_str()),
            _ => None,
        }
    }

    /// Creates an error for a capability that is not available.
    ///
    /// Applications implementing [CredentialSourceProvider] rarely need this,
    /// the default capability methods already return it.
    ///
    /// [CredentialSourceProvider]: crate::credentials::CredentialSourceProvider
    pub fn unsupported<T: Into<String>>(message: T) -> Self {
        Self(ErrorKind::Unsupported(message.into()))
    }

    /// Creates a transport error with a plain message.
    pub fn transport<T: Into<String>>(message: T) -> Self {
        Self(ErrorKind::Transport {
            message: message.into(),
            status: None,
            body: None,
            source: None,
        })
    }

    /// Creates a transport error wrapping the underlying failure.
    pub fn transport_from<T>(message: &str, source: T) -> Self
    where
        T: Into<BoxError>,
    {
        Self(ErrorKind::Transport {
            message: message.to_string(),
            status: None,
            body: None,
            source: Some(source.into()),
        })
    }

    /// Creates an error for malformed key material or claims.
    pub fn malformed<T>(source: T) -> Self
    where
        T: Into<BoxError>,
    {
        Self(ErrorKind::Malformed(source.into()))
    }

    pub(crate) fn http_status_error(message: &str, status: StatusCode, body: String) -> Self {
        Self(ErrorKind::Transport {
            message: format!("{message}: HTTP status {status}, body: {body}"),
            status: Some(status),
            body: Some(body),
            source: None,
        })
    }

    pub(crate) fn upstream(message: &str, status: StatusCode, detail: String, body: String) -> Self {
        Self(ErrorKind::Upstream {
            message: format!("{message}: {status}: {detail}"),
            status,
            body,
        })
    }
}

#[derive(thiserror::Error, Debug)]
enum ErrorKind {
    #[error("{0}")]
    Unsupported(String),
    #[error("{message}")]
    Transport {
        message: String,
        status: Option<StatusCode>,
        body: Option<String>,
        #[source]
        source: Option<BoxError>,
    },
    #[error("malformed credential: {0}")]
    Malformed(#[source] BoxError),
    #[error("{message}")]
    Upstream {
        message: String,
        status: StatusCode,
        body: String,
    },
}

/// Maps a failure to send a request, or to receive its response.
pub(crate) fn from_http_error(err: reqwest::Error, message: &str) -> CredentialsError {
    CredentialsError(ErrorKind::Transport {
        message: format!("{message}: {err}"),
        status: err.status(),
        body: None,
        source: Some(err.into()),
    })
}

/// Maps a non-2xx response from an OAuth token endpoint.
pub(crate) async fn from_http_response(response: reqwest::Response, message: &str) -> CredentialsError {
    let status = response.status();
    match response.text().await {
        Ok(body) => CredentialsError::http_status_error(message, status, body),
        Err(e) => from_http_error(e, message),
    }
}

/// Maps a non-2xx response from the signing authority.
///
/// Responses carrying the standard `{"error": {...}}` envelope are
/// application-level rejections, anything else is a transport problem.
pub(crate) async fn from_iam_response(response: reqwest::Response, message: &str) -> CredentialsError {
    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return from_http_error(e, message),
    };
    match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => {
            let detail = match envelope.error.status {
                Some(s) => format!("{s}: {}", envelope.error.message),
                None => envelope.error.message,
            };
            CredentialsError::upstream(message, status, detail, body)
        }
        Err(_) => CredentialsError::http_status_error(message, status, body),
    }
}

#[derive(serde::Deserialize)]
struct ErrorEnvelope {
    error: ErrorStatus,
}

#[derive(serde::Deserialize)]
struct ErrorStatus {
    message: String,
    status: Option<String>,
}
