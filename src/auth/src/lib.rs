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

//! Mint, delegate, and inspect Google Cloud identity tokens.
//!
//! This crate turns a credential backend, such as a service account key
//! file, the `gcloud` CLI, the metadata server, or Application Default
//! Credentials, into access tokens, ID tokens, and signed JWTs. A backend
//! only implements the operations it natively supports. The functions in
//! [dispatch] pick the most precise operation available and report when they
//! had to fall back to a less precise one.
//!
//! Any source can be wrapped with [credentials::impersonated] to mint tokens
//! as a different service account, optionally through a chain of delegates.
//! The IAM Credentials API does the signing, the base source only proves the
//! identity of the caller.
//!
//! [Authentication methods at Google] is a good introduction on the topic of
//! authentication for Google Cloud services and other Google products. The
//! guide also describes the common terminology used with authentication, such
//! as [Principals], [Tokens], and [Credentials].
//!
//! [Authentication methods at Google]: https://cloud.google.com/docs/authentication
//! [Principals]: https://cloud.google.com/docs/authentication#principal
//! [Tokens]: https://cloud.google.com/docs/authentication#token
//! [Credentials]: https://cloud.google.com/docs/authentication#credentials

pub mod build_errors;
pub mod errors;

/// Types and functions to work with credential sources.
pub mod credentials;

pub mod dispatch;

pub mod token;

pub(crate) mod constants;

/// The GCE metadata server client.
pub(crate) mod mds;

/// A `Result` alias where the `Err` case is `gtoken::errors::CredentialsError`.
pub type Result<T> = std::result::Result<T, crate::errors::CredentialsError>;

/// A `Result` alias where the `Err` case is `gtoken::build_errors::Error`.
pub type BuildResult<T> = std::result::Result<T, crate::build_errors::Error>;
