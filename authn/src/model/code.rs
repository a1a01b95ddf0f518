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

//! The `OneTimeCode` data type.

use iii_iv_core::model::{ModelError, ModelResult};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

/// The flow a one-time code was issued for.  Codes issued for one flow cannot be used in
/// another.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CodePurpose {
    /// Passwordless login via email or SMS.
    Login,

    /// Password reset via email.
    PasswordReset,
}

impl CodePurpose {
    /// Returns the database representation of the purpose.
    pub fn as_str(&self) -> &'static str {
        match self {
            CodePurpose::Login => "login",
            CodePurpose::PasswordReset => "password-reset",
        }
    }
}

impl fmt::Display for CodePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodePurpose {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        match s {
            "login" => Ok(CodePurpose::Login),
            "password-reset" => Ok(CodePurpose::PasswordReset),
            _ => Err(ModelError(format!("Unknown code purpose '{}'", s))),
        }
    }
}

/// A numeric code sent to a user to prove that they own an email address or a phone number.
#[derive(Clone, Debug, PartialEq)]
pub struct OneTimeCode {
    /// The flow the code was issued for.
    pub purpose: CodePurpose,

    /// The email address or phone number the code was sent to.
    pub address: String,

    /// The code itself.
    pub code: u64,

    /// When the code stops being valid.
    pub expires: OffsetDateTime,
}

impl OneTimeCode {
    /// Checks if `code` matches this one-time code at time `now`.
    pub fn check(&self, code: u64, now: OffsetDateTime) -> ModelResult<()> {
        if self.code != code {
            return Err(ModelError("Invalid verification code".to_owned()));
        }
        if now >= self.expires {
            return Err(ModelError("Verification code has expired".to_owned()));
        }
        Ok(())
    }
}
