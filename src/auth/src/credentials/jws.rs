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

//! Claim sets and headers for self-signed JWTs.
//!
//! Both signing paths, the local key-file signer and the remote `signJwt`
//! call, start from the same [JwsClaims]: the signing account is both issuer
//! and subject, and the token is valid for one hour from the moment the claim
//! set is built.

use crate::Result;
use crate::errors::CredentialsError;
use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;

/// Tokens built from [JwsClaims::new] expire after this long.
pub const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(3600);

/// The claim set of a JSON Web Signature.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JwsClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    #[serde(with = "time::serde::timestamp")]
    pub iat: OffsetDateTime,
    #[serde(with = "time::serde::timestamp")]
    pub exp: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub target_audience: Option<String>,
}

impl JwsClaims {
    /// Creates the claims for `account` to present to `audience`.
    ///
    /// The issuer and subject are both `account`, `iat` is the current time
    /// and `exp` is one hour later.
    ///
    /// # Example
    /// ```
    /// # use gtoken::credentials::jws::JwsClaims;
    /// let claims = JwsClaims::new("sa@p.iam.gserviceaccount.com", "https://svc.example.com");
    /// assert_eq!(claims.iss, claims.sub);
    /// assert_eq!((claims.exp - claims.iat).whole_seconds(), 3600);
    /// assert!(claims.target_audience.is_none());
    /// ```
    pub fn new<A, B>(account: A, audience: B) -> Self
    where
        A: Into<String>,
        B: Into<String>,
    {
        let account = account.into();
        let now = OffsetDateTime::now_utc();
        // The wire format has second granularity.
        let iat = now - Duration::from_nanos(now.nanosecond().into());
        Self {
            sub: account.clone(),
            iss: account,
            aud: audience.into(),
            iat,
            exp: iat + DEFAULT_TOKEN_TIMEOUT,
            scope: None,
            target_audience: None,
        }
    }

    /// Sets the `target_audience` claim, used to request ID tokens.
    pub fn with_target_audience<S: Into<String>>(mut self, v: S) -> Self {
        let v = v.into();
        self.target_audience = (!v.is_empty()).then_some(v);
        self
    }

    /// Sets the `scope` claim from a list of scopes.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scope = scopes.into_iter().map(Into::into).collect::<Vec<_>>().join(" ");
        self.scope = (!scope.is_empty()).then_some(scope);
        self
    }

    /// Overrides the subject. Empty values are ignored.
    pub fn with_subject<S: Into<String>>(mut self, v: S) -> Self {
        let v = v.into();
        if !v.is_empty() {
            self.sub = v;
        }
        self
    }

    /// The claims as a JSON string, the payload format used by `signJwt`.
    pub fn to_json(&self) -> Result<String> {
        self.check()?;
        serde_json::to_string(self).map_err(CredentialsError::malformed)
    }

    /// The claims as the base64url encoded JWS payload segment.
    pub fn encode(&self) -> Result<String> {
        let json = self.to_json()?;
        Ok(BASE64_URL_SAFE_NO_PAD.encode(json.as_bytes()))
    }

    fn check(&self) -> Result<()> {
        if self.exp < self.iat {
            return Err(CredentialsError::malformed(format!(
                "expiration time {:?}, must be later than issued time {:?}",
                self.exp, self.iat
            )));
        }
        Ok(())
    }
}

/// The header that describes who, what, and how a token was created.
#[derive(Serialize, Deserialize, Debug)]
pub struct JwsHeader<'a> {
    pub alg: &'a str,
    pub typ: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

impl JwsHeader<'_> {
    /// An RS256 header for the given key id.
    pub fn rs256(kid: Option<String>) -> JwsHeader<'static> {
        JwsHeader {
            alg: "RS256",
            typ: "JWT",
            kid,
        }
    }

    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_string(&self).map_err(CredentialsError::malformed)?;
        Ok(BASE64_URL_SAFE_NO_PAD.encode(json.as_bytes()))
    }
}

/// Decodes the claims of a JWT without verifying its signature.
///
/// Useful to inspect tokens returned by remote services, never to trust them.
pub fn decode_unverified(jwt: &str) -> Result<JwsClaims> {
    let payload = jwt
        .split('.')
        .nth(1)
        .ok_or_else(|| CredentialsError::malformed("the token is not a JWT"))?;
    let json = BASE64_URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(CredentialsError::malformed)?;
    serde_json::from_slice(&json).map_err(CredentialsError::malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn decode_segment(segment: &str) -> anyhow::Result<Value> {
        let bytes = BASE64_URL_SAFE_NO_PAD.decode(segment)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    #[test]
    fn new_claims() {
        let before = OffsetDateTime::now_utc().unix_timestamp();
        let claims = JwsClaims::new("sa@p.iam.gserviceaccount.com", "test-audience");
        let after = OffsetDateTime::now_utc().unix_timestamp();

        assert_eq!(claims.iss, "sa@p.iam.gserviceaccount.com");
        assert_eq!(claims.sub, claims.iss);
        assert_eq!(claims.aud, "test-audience");
        assert_eq!(claims.iat.nanosecond(), 0);
        assert!(claims.iat.unix_timestamp() >= before, "{claims:?}");
        assert!(claims.iat.unix_timestamp() <= after, "{claims:?}");
        assert_eq!(claims.exp - claims.iat, time::Duration::seconds(3600));
        assert!(claims.scope.is_none(), "{claims:?}");
        assert!(claims.target_audience.is_none(), "{claims:?}");
    }

    #[test]
    fn encode_without_target_audience() -> anyhow::Result<()> {
        let claims = JwsClaims::new("test-account", "test-audience");
        let v = decode_segment(&claims.encode()?)?;
        assert_eq!(v["iss"], "test-account");
        assert_eq!(v["sub"], "test-account");
        assert_eq!(v["aud"], "test-audience");
        assert_eq!(v["iat"], claims.iat.unix_timestamp());
        assert_eq!(v["exp"], claims.exp.unix_timestamp());
        assert_eq!(v.get("target_audience"), None, "{v:?}");
        assert_eq!(v.get("scope"), None, "{v:?}");
        Ok(())
    }

    #[test]
    fn encode_with_target_audience() -> anyhow::Result<()> {
        let claims = JwsClaims::new("test-account", "https://token.example.com")
            .with_target_audience("https://svc.example.com");
        let v = decode_segment(&claims.encode()?)?;
        assert_eq!(v["aud"], "https://token.example.com");
        assert_eq!(v["target_audience"], "https://svc.example.com");
        Ok(())
    }

    #[test]
    fn empty_target_audience_is_omitted() -> anyhow::Result<()> {
        let claims = JwsClaims::new("test-account", "test-audience").with_target_audience("");
        assert!(claims.target_audience.is_none(), "{claims:?}");
        Ok(())
    }

    #[test]
    fn with_scopes() -> anyhow::Result<()> {
        let claims = JwsClaims::new("test-account", "test-audience").with_scopes(["s1", "s2"]);
        let v = decode_segment(&claims.encode()?)?;
        assert_eq!(v["scope"], "s1 s2");

        let claims =
            JwsClaims::new("test-account", "test-audience").with_scopes(Vec::<String>::new());
        assert!(claims.scope.is_none(), "{claims:?}");
        Ok(())
    }

    #[test]
    fn with_subject() {
        let claims = JwsClaims::new("test-account", "aud").with_subject("user@example.com");
        assert_eq!(claims.iss, "test-account");
        assert_eq!(claims.sub, "user@example.com");

        let claims = JwsClaims::new("test-account", "aud").with_subject("");
        assert_eq!(claims.sub, "test-account");
    }

    #[test]
    fn json_round_trip() -> anyhow::Result<()> {
        let claims = JwsClaims::new("test-account", "test-audience").with_target_audience("t");
        let json = claims.to_json()?;
        let got = serde_json::from_str::<JwsClaims>(&json)?;
        assert_eq!(got, claims);
        Ok(())
    }

    #[test]
    fn encode_error_exp_before_iat() {
        let mut claims = JwsClaims::new("test-account", "test-audience");
        claims.exp = claims.iat - Duration::from_secs(60);
        let err = claims.encode().unwrap_err();
        assert!(err.is_malformed(), "{err:?}");
        assert!(
            err.to_string().contains("must be later than issued time"),
            "{err}"
        );
    }

    #[test]
    fn header_encode() -> anyhow::Result<()> {
        let header = JwsHeader::rs256(Some("some_key_id".to_string()));
        let v = decode_segment(&header.encode()?)?;
        assert_eq!(v["alg"], "RS256");
        assert_eq!(v["typ"], "JWT");
        assert_eq!(v["kid"], "some_key_id");

        let header = JwsHeader::rs256(None);
        let v = decode_segment(&header.encode()?)?;
        assert_eq!(v.get("kid"), None, "{v:?}");
        Ok(())
    }

    #[test]
    fn decode_unverified_claims() -> anyhow::Result<()> {
        let claims = JwsClaims::new("test-account", "test-audience");
        let jwt = format!(
            "{}.{}.signature",
            JwsHeader::rs256(None).encode()?,
            claims.encode()?
        );
        assert_eq!(decode_unverified(&jwt)?, claims);

        let err = decode_unverified("not-a-jwt").unwrap_err();
        assert!(err.is_malformed(), "{err:?}");
        let err = decode_unverified("a.!!!.c").unwrap_err();
        assert!(err.is_malformed(), "{err:?}");
        Ok(())
    }
}
