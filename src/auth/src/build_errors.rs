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

//! Errors returned by the credential source builders.
//!
//! Building a source never touches the token endpoints. These errors are
//! about the *inputs* of a source: a key file that cannot be read, a
//! `gcloud` run that failed, JSON that does not describe a known credential,
//! or a builder missing its impersonation target.

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type for credential source builders.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct Error(Kind);

#[derive(thiserror::Error, Debug)]
enum Kind {
    #[error("cannot load the credential source input: {0}")]
    Loading(#[source] BoxError),
    #[error("cannot parse the credential source input: {0}")]
    Parsing(#[source] BoxError),
    #[error("unsupported credential source type: {0}")]
    UnknownType(#[source] BoxError),
    #[error("the builder requires `{0}`")]
    MissingField(&'static str),
}

impl Error {
    /// The input could not be read or produced.
    ///
    /// For example, the ADC file does not exist, or `gcloud` exited with an
    /// error.
    pub fn is_loading(&self) -> bool {
        matches!(self.0, Kind::Loading(_))
    }

    /// The input was read, but it is not the expected JSON.
    pub fn is_parsing(&self) -> bool {
        matches!(self.0, Kind::Parsing(_))
    }

    /// The `type` field names a credential this crate cannot use.
    pub fn is_unknown_type(&self) -> bool {
        matches!(self.0, Kind::UnknownType(_))
    }

    /// A required builder setting, such as the impersonation target, is
    /// missing or empty.
    pub fn is_missing_field(&self) -> bool {
        matches!(self.0, Kind::MissingField(_))
    }

    /// The name of the missing builder setting, if that is the problem.
    pub fn missing_field_name(&self) -> Option<&'static str> {
        match self.0 {
            Kind::MissingField(name) => Some(name),
            _ => None,
        }
    }

    pub(crate) fn loading<T: Into<BoxError>>(source: T) -> Error {
        Error(Kind::Loading(source.into()))
    }

    pub(crate) fn parsing<T: Into<BoxError>>(source: T) -> Error {
        Error(Kind::Parsing(source.into()))
    }

    pub(crate) fn unknown_type<T: Into<BoxError>>(source: T) -> Error {
        Error(Kind::UnknownType(source.into()))
    }

    pub(crate) fn missing_field(name: &'static str) -> Error {
        Error(Kind::MissingField(name))
    }
}
