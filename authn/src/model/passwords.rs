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

//! The `Password` and `HashedPassword` data types.

use iii_iv_core::model::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of bytes that bcrypt takes into account when hashing.
const MAX_PASSWORD_LENGTH: usize = 56;

/// Cost of the bcrypt hashes generated for new passwords.
const BCRYPT_COST: u32 = 10;

/// Minimum length of passwords accepted by `default_password_validator`.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Verifies that a password is sufficiently complex: it must be long enough and contain both
/// letters and numbers.  Returns a description of the problem if the password is too weak.
pub fn default_password_validator(s: &str) -> Option<&'static str> {
    if s.len() < MIN_PASSWORD_LENGTH {
        return Some("Too short");
    }

    let alphabetic = s.chars().any(char::is_alphabetic);
    let numeric = s.chars().any(char::is_numeric);
    if !alphabetic || !numeric {
        return Some("Must contain letters and numbers");
    }

    None
}

/// An opaque type to hold a password, protecting it from leaking into logs.
#[derive(Deserialize, PartialEq, Serialize)]
#[serde(try_from = "String")]
#[cfg_attr(any(test, feature = "testutils"), derive(Clone))]
pub struct Password(String);

impl Password {
    /// Creates a new password from a literal string.
    pub fn new<S: Into<String>>(s: S) -> ModelResult<Self> {
        let s = s.into();
        if s.len() > MAX_PASSWORD_LENGTH {
            return Err(ModelError("Password is too long".to_owned()));
        }
        Ok(Password(s))
    }

    /// Returns a string view of the password.
    #[cfg(any(test, feature = "testutils"))]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hashes the password after validating that it is sufficiently complex via the `validator`
    /// hook.  Consumes the password because there is no context in which keeping the password
    /// alive once we have generated its hash is correct.
    pub fn validate_and_hash(
        self,
        validator: fn(&str) -> Option<&'static str>,
    ) -> ModelResult<HashedPassword> {
        if let Some(error) = validator(&self.0) {
            return Err(ModelError(format!("Weak password: {}", error)));
        }
        let hashed = bcrypt::hash(self.0, BCRYPT_COST)
            .map_err(|e| ModelError(format!("Password error: {}", e)))?;
        Ok(HashedPassword::new(hashed))
    }

    /// Verifies if this password matches a given `hash`.
    pub fn verify(self, hash: &HashedPassword) -> ModelResult<bool> {
        bcrypt::verify(self.0, hash.as_str())
            .map_err(|e| ModelError(format!("Password error: {}", e)))
    }
}

impl TryFrom<String> for Password {
    type Error = ModelError;

    fn try_from(value: String) -> ModelResult<Self> {
        Self::new(value)
    }
}

#[cfg(any(test, feature = "testutils"))]
impl From<&'static str> for Password {
    /// Creates a new password from a hardcoded string, which must be valid.
    fn from(s: &'static str) -> Self {
        Password::new(s).expect("Hardcoded passwords must be valid")
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("scrubbed password")
    }
}

/// An opaque type to hold a hashed password, protecting it from leaking into logs.
#[derive(Clone, PartialEq)]
pub struct HashedPassword(String);

impl HashedPassword {
    /// Creates a new hashed password from a literal string.
    pub fn new<S: Into<String>>(s: S) -> Self {
        HashedPassword(s.into())
    }

    /// Returns a string view of the hash.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for HashedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("scrubbed hash")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_password_validator() {
        assert_eq!(None, default_password_validator("abcdefg1"));
        assert_eq!(None, default_password_validator("sufficiently0complex"));
        assert_eq!(Some("Too short"), default_password_validator(""));
        assert_eq!(Some("Too short"), default_password_validator("abc1234"));
        assert_eq!(
            Some("Must contain letters and numbers"),
            default_password_validator("long enough")
        );
        assert_eq!(
            Some("Must contain letters and numbers"),
            default_password_validator("1234567890")
        );
    }

    #[test]
    fn test_password_ok() {
        assert_eq!(Password::from("foo"), Password::new("foo").unwrap());
        assert_eq!("bar", Password::new("bar").unwrap().as_str());
    }

    #[test]
    fn test_password_too_long() {
        Password::new("x".repeat(MAX_PASSWORD_LENGTH)).unwrap();
        let err = Password::new("x".repeat(MAX_PASSWORD_LENGTH + 1)).unwrap_err();
        assert_eq!("Password is too long", err.0);
    }

    #[test]
    fn test_password_deserialize_validates() {
        let password: Password = serde_json::from_str("\"secret\"").unwrap();
        assert_eq!("secret", password.as_str());

        let raw = format!("\"{}\"", "x".repeat(MAX_PASSWORD_LENGTH + 1));
        let err = serde_json::from_str::<Password>(&raw).unwrap_err();
        assert!(err.to_string().contains("too long"));
    }

    #[test]
    fn test_password_validate_and_hash() {
        let password = Password::from("abcd");
        password.clone().validate_and_hash(|_| None).unwrap();
        match password.validate_and_hash(|_| Some("the error")) {
            Err(e) => assert_eq!("Weak password: the error", e.0),
            e => panic!("{:?}", e),
        }
    }

    #[test]
    fn test_password_hash_and_verify() {
        let password1 = Password::from("first password");
        let password2 = Password::from("second password");
        let hash1 = password1.clone().validate_and_hash(|_| None).unwrap();
        let hash2 = password2.clone().validate_and_hash(|_| None).unwrap();

        assert!(hash1.as_str().starts_with("$2b$10$"));
        assert!(hash2.as_str().starts_with("$2b$10$"));
        assert!(hash1 != hash2);

        assert!(password1.clone().verify(&hash1).unwrap());
        assert!(!password2.clone().verify(&hash1).unwrap());
        assert!(!password1.verify(&hash2).unwrap());
        assert!(password2.verify(&hash2).unwrap());
    }

    #[test]
    fn test_debug_is_scrubbed() {
        assert_eq!("scrubbed password", format!("{:?}", Password::from("secret")));
        assert_eq!("scrubbed hash", format!("{:?}", HashedPassword::new("$2b$10$foo")));
    }
}
