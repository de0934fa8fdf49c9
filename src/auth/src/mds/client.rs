// Copyright 2026 Google LLC
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

use super::{
    GCE_METADATA_HOST_ENV_VAR, METADATA_FLAVOR, METADATA_FLAVOR_VALUE, METADATA_ROOT, account_uri,
};
use crate::Result;
use crate::errors;
use crate::token::{Token, expires_in};
use reqwest::Response;

/// The per-account resources served by the metadata server.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Resource {
    Token,
    Identity,
    Email,
}

impl Resource {
    fn name(self) -> &'static str {
        match self {
            Resource::Token => "token",
            Resource::Identity => "identity",
            Resource::Email => "email",
        }
    }

    fn error_message(self) -> &'static str {
        match self {
            Resource::Token => "failed to fetch access token from the metadata server",
            Resource::Identity => "failed to fetch ID token from the metadata server",
            Resource::Email => "failed to fetch email from the metadata server",
        }
    }
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    token_type: String,
}

/// A minimal client for the GCE metadata server (MDS).
#[derive(Clone, Debug)]
pub(crate) struct Client {
    endpoint: String,
    inner: reqwest::Client,
}

impl Client {
    /// `GCE_METADATA_HOST` wins over `endpoint`, which wins over the default
    /// metadata root.
    pub(crate) fn new(endpoint: Option<String>) -> Self {
        let endpoint = match std::env::var(GCE_METADATA_HOST_ENV_VAR) {
            Ok(host) => format!("http://{host}"),
            Err(_) => endpoint.unwrap_or_else(|| METADATA_ROOT.to_string()),
        };
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            inner: reqwest::Client::new(),
        }
    }

    async fn fetch(&self, account: &str, resource: Resource, query: &[(&str, String)]) -> Result<Response> {
        let url = format!("{}{}/{}", self.endpoint, account_uri(account), resource.name());
        tracing::debug!(%url, "querying the metadata server");
        let msg = resource.error_message();
        let response = self
            .inner
            .get(url)
            .header(METADATA_FLAVOR, METADATA_FLAVOR_VALUE)
            .query(query)
            .send()
            .await
            .map_err(|e| errors::from_http_error(e, msg))?;
        if !response.status().is_success() {
            return Err(errors::from_http_response(response, msg).await);
        }
        Ok(response)
    }

    async fn fetch_text(&self, account: &str, resource: Resource, query: &[(&str, String)]) -> Result<String> {
        let response = self.fetch(account, resource, query).await?;
        response
            .text()
            .await
            .map_err(|e| errors::from_http_error(e, resource.error_message()))
    }

    /// An access token for `account`. Without scopes the server uses the
    /// scopes of the instance.
    pub(crate) async fn access_token(&self, account: &str, scopes: &[String]) -> Result<Token> {
        let query = if scopes.is_empty() {
            Vec::new()
        } else {
            vec![("scopes", scopes.join(","))]
        };
        let response = self.fetch(account, Resource::Token, &query).await?;
        let response = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| errors::from_http_error(e, Resource::Token.error_message()))?;
        Ok(Token {
            token: response.access_token,
            token_type: response.token_type,
            expires_at: expires_in(response.expires_in),
        })
    }

    pub(crate) async fn id_token(&self, account: &str, audience: &str) -> Result<String> {
        let query = [("audience", audience.to_string())];
        self.fetch_text(account, Resource::Identity, &query).await
    }

    pub(crate) async fn email(&self, account: &str) -> Result<String> {
        self.fetch_text(account, Resource::Email, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use scoped_env::ScopedEnv;
    use serde_json::json;
    use serial_test::{parallel, serial};
    use test_case::test_case;

    type TestResult = anyhow::Result<()>;

    const ACCOUNTS: &str = "/computeMetadata/v1/instance/service-accounts";

    fn client(server: &Server) -> Client {
        Client::new(Some(format!("http://{}", server.addr())))
    }

    #[tokio::test]
    #[parallel]
    async fn access_token_with_scopes() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", format!("{ACCOUNTS}/default/token")),
                request::headers(contains(("metadata-flavor", "Google"))),
                request::query(url_decoded(contains(("scopes", "scope1,scope2")))),
            ])
            .respond_with(json_encoded(json!({
                "access_token": "test-token",
                "expires_in": 3600,
                "token_type": "Bearer",
            }))),
        );

        let token = client(&server)
            .access_token("default", &["scope1".to_string(), "scope2".to_string()])
            .await?;
        assert_eq!(token.token, "test-token");
        assert_eq!(token.token_type, "Bearer");
        assert!(token.expires_at.is_some(), "{token:?}");
        Ok(())
    }

    #[tokio::test]
    #[parallel]
    async fn access_token_without_scopes() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", format!("{ACCOUNTS}/default/token")),
                request::query(url_decoded(not(contains(key("scopes"))))),
            ])
            .respond_with(json_encoded(json!({
                "access_token": "instance-scoped-token",
                "token_type": "Bearer",
            }))),
        );

        let token = client(&server).access_token("default", &[]).await?;
        assert_eq!(token.token, "instance-scoped-token");
        assert!(token.expires_at.is_none(), "{token:?}");
        Ok(())
    }

    #[tokio::test]
    #[parallel]
    async fn id_token_and_email() -> TestResult {
        let account = "sa@p.iam.gserviceaccount.com";
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", format!("{ACCOUNTS}/{account}/identity")),
                request::headers(contains(("metadata-flavor", "Google"))),
                request::query(url_decoded(contains(("audience", "test-aud")))),
            ])
            .respond_with(status_code(200).body("test-id-token")),
        );
        server.expect(
            Expectation::matching(request::method_path(
                "GET",
                format!("{ACCOUNTS}/{account}/email"),
            ))
            .respond_with(status_code(200).body(account)),
        );

        let client = client(&server);
        assert_eq!(client.id_token(account, "test-aud").await?, "test-id-token");
        assert_eq!(client.email(account).await?, account);
        Ok(())
    }

    #[test_case(Resource::Token; "token")]
    #[test_case(Resource::Identity; "identity")]
    #[test_case(Resource::Email; "email")]
    #[tokio::test]
    #[parallel]
    async fn http_errors(resource: Resource) {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path(
                "GET",
                format!("{ACCOUNTS}/default/{}", resource.name()),
            ))
            .respond_with(status_code(404).body("Not Found")),
        );

        let client = client(&server);
        let err = match resource {
            Resource::Token => client.access_token("default", &[]).await.map(|t| t.token),
            Resource::Identity => client.id_token("default", "aud").await,
            Resource::Email => client.email("default").await,
        }
        .unwrap_err();
        assert!(err.is_transport(), "{err:?}");
        assert!(err.to_string().contains(resource.error_message()), "{err}");
        assert_eq!(err.http_status().map(|s| s.as_u16()), Some(404));
        assert_eq!(err.body(), Some("Not Found"));
    }

    #[tokio::test]
    #[parallel]
    async fn bad_token_payload() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", format!("{ACCOUNTS}/default/token")))
                .respond_with(status_code(200).body("not json")),
        );
        let err = client(&server).access_token("default", &[]).await.unwrap_err();
        assert!(err.is_transport(), "{err:?}");
        assert!(err.http_status().is_none(), "{err:?}");
    }

    #[test_case(None, "http://metadata.google.internal"; "default root")]
    #[test_case(Some("http://custom.endpoint/"), "http://custom.endpoint"; "override")]
    #[serial]
    fn endpoint_without_env(endpoint: Option<&str>, want: &str) {
        let _e = ScopedEnv::remove(GCE_METADATA_HOST_ENV_VAR);
        let client = Client::new(endpoint.map(str::to_string));
        assert_eq!(client.endpoint, want);
    }

    #[test_case(None; "no override")]
    #[test_case(Some("http://custom.endpoint"); "with override")]
    #[serial]
    fn endpoint_env_wins(endpoint: Option<&str>) {
        let _e = ScopedEnv::set(GCE_METADATA_HOST_ENV_VAR, "env.host:8080");
        let client = Client::new(endpoint.map(str::to_string));
        assert_eq!(client.endpoint, "http://env.host:8080");
    }
}
