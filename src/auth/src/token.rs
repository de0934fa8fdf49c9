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

//! Types and functions to work with auth [Tokens].
//!
//! [Tokens]: https://cloud.google.com/docs/authentication#token

use std::time::Duration;
use time::OffsetDateTime;
use tokio::time::Instant;

/// Represents an auth token.
#[derive(Clone, PartialEq)]
pub struct Token {
    /// The actual token string.
    ///
    /// This is the value used in `Authorization:` header.
    pub token: String,

    /// The type of the token.
    ///
    /// The most common type is `"Bearer"` but other types may appear in the
    /// future.
    pub token_type: String,

    /// The instant at which the token expires.
    ///
    /// If `None`, the expiration is unknown. This library does not track
    /// expirations, it only reports what the backend returned.
    pub expires_at: Option<Instant>,
}

impl Token {
    /// Creates a bearer token with no known expiration.
    pub fn bearer<S: Into<String>>(token: S) -> Self {
        Self {
            token: token.into(),
            token_type: "Bearer".to_string(),
            expires_at: None,
        }
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("token", &"[censored]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

pub(crate) fn expires_in(seconds: Option<u64>) -> Option<Instant> {
    seconds.map(|s| Instant::now() + Duration::from_secs(s))
}

// Wall-clock expirations are converted to the monotonic clock. Tokens that
// already expired report "now".
pub(crate) fn expires_at(when: OffsetDateTime) -> Instant {
    let remaining = when - OffsetDateTime::now_utc();
    let remaining = Duration::try_from(remaining).unwrap_or(Duration::ZERO);
    Instant::now() + remaining
}
