// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! The `AccessToken` data type.

use iii_iv_core::model::{ModelError, ModelResult};
use iii_iv_core::random;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of our tokens, in characters.
///
/// This is not customizable because this size is replicated in the database schema.
const TOKEN_LENGTH: usize = 256;

/// An opaque type representing a user's access token.
///
/// Access tokens are sequences of alphanumeric characters of a fixed size.  Their contents are
/// never printed so that they do not leak into logs.
#[derive(Clone, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(try_from = "String")]
pub struct AccessToken(String);

impl AccessToken {
    /// Creates a new access token from an untrusted string.
    pub fn new<S: Into<String>>(token: S) -> ModelResult<Self> {
        let token = token.into();
        if token.len() != TOKEN_LENGTH || !token.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(ModelError("Invalid access token".to_owned()));
        }
        Ok(Self(token))
    }

    /// Generates a new random access token.
    pub fn generate() -> Self {
        Self(random::alphanumeric(TOKEN_LENGTH))
    }

    /// Returns the string representation of the token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AccessToken {
    type Error = ModelError;

    fn try_from(value: String) -> ModelResult<Self> {
        Self::new(value)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("scrubbed access token")
    }
}
