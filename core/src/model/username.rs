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

//! The `Username` data type.

use crate::model::{ModelError, ModelResult};
use serde::{Deserialize, Serialize, de::Visitor};
use std::fmt;

/// Maximum length of a username as stored in the database.
pub(crate) const USERS_MAX_USERNAME_LENGTH: usize = 32;

/// Prefix of the usernames assigned to accounts created on the fly by a one-time login.
const GENERATED_USERNAME_PREFIX: &str = "u-";

/// Length of the random part of generated usernames.
const GENERATED_USERNAME_RANDOM_LENGTH: usize = 16;

/// Represents a correctly-formatted (but maybe non-existent) username.
///
/// Usernames are case-insensitive and are always stored in lowercase.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    /// Creates a new username from an untrusted string `s`, making sure it is valid.
    pub fn new<S: Into<String>>(s: S) -> ModelResult<Self> {
        let s = s.into();

        if s.is_empty() {
            return Err(ModelError("Username cannot be empty".to_owned()));
        }
        if s.len() > USERS_MAX_USERNAME_LENGTH {
            return Err(ModelError("Username is too long".to_owned()));
        }

        if let Some(ch) = s.chars().find(|ch| !(ch.is_ascii_alphanumeric() || ".-_".contains(*ch)))
        {
            return Err(ModelError(format!("Unsupported character '{}' in username '{}'", ch, s)));
        }

        Ok(Self(s.to_lowercase()))
    }

    /// Generates a new random username for accounts that were not explicitly registered.
    pub fn generate() -> Self {
        let suffix = crate::random::alphanumeric(GENERATED_USERNAME_RANDOM_LENGTH);
        Self(format!("{}{}", GENERATED_USERNAME_PREFIX, suffix).to_lowercase())
    }

    /// Creates a new username from an untrusted string `s`, without validation.  Useful for testing
    /// purposes only.
    #[cfg(any(test, feature = "testutils"))]
    pub fn new_invalid<S: Into<String>>(s: S) -> Self {
        Self(s.into())
    }

    /// Returns a string view of the username.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(any(test, feature = "testutils"))]
impl From<&'static str> for Username {
    /// Creates a new username from a hardcoded string, which must be valid.
    fn from(name: &'static str) -> Self {
        assert_eq!(name, name.to_lowercase(), "Hardcoded usernames must be lowercase");
        Username::new(name).expect("Hardcoded usernames must be valid")
    }
}

/// A deserialization visitor for a `Username`.
struct UsernameVisitor;

impl Visitor<'_> for UsernameVisitor {
    type Value = Username;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a username")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Username::new(v).map_err(|e| E::custom(e.to_string()))
    }

    fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Username::new(v).map_err(|e| E::custom(e.to_string()))
    }
}

impl<'de> Deserialize<'de> for Username {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_string(UsernameVisitor)
    }
}
