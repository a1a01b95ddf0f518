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

//! The `Session` data type.

use crate::model::AccessToken;
use iii_iv_core::model::Username;
use std::time::Duration;
use time::OffsetDateTime;

/// Represents a user session.
#[derive(Clone, Debug, PartialEq)]
pub struct Session {
    /// The access token for the session, which acts as its identifier.
    access_token: AccessToken,

    /// The username for this session.
    username: Username,

    /// Timestamp to represent when the session was initiated.
    login_time: OffsetDateTime,
}

impl Session {
    /// Creates a new session from its parts.
    pub(crate) fn new(
        access_token: AccessToken,
        username: Username,
        login_time: OffsetDateTime,
    ) -> Self {
        Self { access_token, username, login_time }
    }

    /// Returns the session's access token.
    pub fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    /// Returns the session's username.
    pub fn username(&self) -> &Username {
        &self.username
    }

    /// Returns the session's login time.
    pub fn login_time(&self) -> OffsetDateTime {
        self.login_time
    }

    /// Checks whether the session is still usable at `now`.
    ///
    /// Sessions expire `max_age` after login.  Sessions that seem to start in the future are
    /// tolerated up to `max_skew` to account for clock differences across servers.
    pub fn is_valid_at(&self, now: OffsetDateTime, max_age: Duration, max_skew: Duration) -> bool {
        let expired = self.login_time < (now - max_age);
        let skewed = self.login_time > (now + max_skew);
        !expired && !skewed
    }

    /// Consumes the session and extracts its access token.
    pub fn take_access_token(self) -> AccessToken {
        self.access_token
    }
}
