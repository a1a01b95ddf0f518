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

//! The `PhoneNumber` data type.

use crate::model::{ModelError, ModelResult};
use serde::de::Visitor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of digits that follow the leading `+` in a phone number.
const PHONE_NUMBER_DIGITS: usize = 11;

/// A phone number in international format: a `+` followed by exactly 11 digits.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Creates a new phone number from an untrusted string `s`, making sure it is valid.
    pub fn new<S: Into<String>>(s: S) -> ModelResult<Self> {
        let s = s.into();

        let digits = match s.strip_prefix('+') {
            Some(digits) => digits,
            None => return Err(ModelError(format!("Phone number '{}' must start with +", s))),
        };
        if digits.len() != PHONE_NUMBER_DIGITS || !digits.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(ModelError(format!(
                "Phone number '{}' must have exactly {} digits",
                s, PHONE_NUMBER_DIGITS
            )));
        }

        Ok(Self(s))
    }

    /// Returns a string view of the phone number.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(feature = "testutils")]
impl From<&str> for PhoneNumber {
    fn from(raw: &str) -> Self {
        Self::new(raw).expect("Hardcoded phone numbers for testing must be valid")
    }
}

/// Visitor to deserialize a `PhoneNumber` from a string.
struct PhoneNumberVisitor;

impl Visitor<'_> for PhoneNumberVisitor {
    type Value = PhoneNumber;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a phone number")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        PhoneNumber::new(v).map_err(|e| E::custom(e.to_string()))
    }
}

impl<'de> Deserialize<'de> for PhoneNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(PhoneNumberVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_test::{Token, assert_de_tokens_error, assert_tokens};

    #[test]
    fn test_phonenumber_ok() {
        assert_eq!("+15551234567", PhoneNumber::new("+15551234567").unwrap().as_str());
    }

    #[test]
    fn test_phonenumber_error() {
        assert!(PhoneNumber::new("").is_err());
        assert!(PhoneNumber::new("15551234567").is_err());
        assert!(PhoneNumber::new("+1555123456").is_err());
        assert!(PhoneNumber::new("+155512345678").is_err());
        assert!(PhoneNumber::new("+1555123456a").is_err());
        assert!(PhoneNumber::new("+1 555123456").is_err());
    }

    #[test]
    fn test_phonenumber_ser_de_ok() {
        let phone = PhoneNumber::new("+15551234567").unwrap();
        assert_tokens(&phone, &[Token::Str("+15551234567")]);
    }

    #[test]
    fn test_phonenumber_de_error() {
        assert_de_tokens_error::<PhoneNumber>(
            &[Token::Str("5551234567")],
            "Phone number '5551234567' must start with +",
        );
    }
}
