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

pub(crate) const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
/// JWT Bearer OAuth Grant Type
pub(crate) const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Refresh Token OAuth Grant Type
pub(crate) const REFRESH_TOKEN_GRANT_TYPE: &str = "refresh_token";
/// Accepts self-signed assertions and returns access and ID tokens.
pub(crate) const OAUTH2_TOKEN_SERVER_URL: &str = "https://www.googleapis.com/oauth2/v4/token";
/// Exchanges refresh tokens for access tokens.
pub(crate) const OAUTH2_REFRESH_URL: &str = "https://oauth2.googleapis.com/token";
pub(crate) const IAM_CREDENTIALS_ENDPOINT: &str = "https://iamcredentials.googleapis.com";
pub(crate) const SERVICE_ACCOUNT_RESOURCE_PREFIX: &str = "projects/-/serviceAccounts/";
pub(crate) const GOOGLE_APPLICATION_CREDENTIALS_VAR: &str = "GOOGLE_APPLICATION_CREDENTIALS";
