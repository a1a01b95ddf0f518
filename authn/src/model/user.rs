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

//! The `User` data type.

use crate::model::HashedPassword;
use iii_iv_core::model::{EmailAddress, PhoneNumber, Username};
use time::OffsetDateTime;

/// Representation of a user's information.
///
/// Users always have at least one way of being contacted: an email address, a phone number or
/// both.
#[derive(Clone, Debug, PartialEq)]
pub struct User {
    /// Name of the user.
    username: Username,

    /// Hashed password.  None if the user is not allowed to log in with a password.
    password: Option<HashedPassword>,

    /// Email of the user.
    email: Option<EmailAddress>,

    /// Phone number of the user.
    phone: Option<PhoneNumber>,

    /// Token required to activate the user if not active yet.
    activation_code: Option<u64>,

    /// Time of last login of the user.  None if the user has never logged in.
    last_login: Option<OffsetDateTime>,
}

impl User {
    /// Creates a new user with the given fields.
    pub(crate) fn new(username: Username) -> Self {
        Self {
            username,
            password: None,
            email: None,
            phone: None,
            activation_code: None,
            last_login: None,
        }
    }

    /// Modifies a user to set or clear its activation code.
    pub(crate) fn with_activation_code(mut self, code: Option<u64>) -> Self {
        self.activation_code = code;
        self
    }

    /// Modifies a user to set or clear their email address.
    pub(crate) fn with_email(mut self, email: Option<EmailAddress>) -> Self {
        self.email = email;
        self
    }

    /// Modifies a user to record their most recent login time.
    pub(crate) fn with_last_login(mut self, last_login: OffsetDateTime) -> Self {
        self.last_login = Some(last_login);
        self
    }

    /// Modifies a user to set or clear their password.
    pub(crate) fn with_password(mut self, password: Option<HashedPassword>) -> Self {
        self.password = password;
        self
    }

    /// Modifies a user to set or clear their phone number.
    pub(crate) fn with_phone(mut self, phone: Option<PhoneNumber>) -> Self {
        self.phone = phone;
        self
    }

    /// Gets the user's username.
    pub fn username(&self) -> &Username {
        &self.username
    }

    /// Gets the user's password as a hash.
    pub fn password(&self) -> Option<&HashedPassword> {
        self.password.as_ref()
    }

    /// Gets the user's email address.
    pub fn email(&self) -> Option<&EmailAddress> {
        self.email.as_ref()
    }

    /// Gets the user's phone number.
    pub fn phone(&self) -> Option<&PhoneNumber> {
        self.phone.as_ref()
    }

    /// Gets the user's activation code.
    pub fn activation_code(&self) -> Option<u64> {
        self.activation_code
    }

    /// Returns true if the user has no means of identifying itself beyond its sessions.
    pub fn is_anonymous(&self) -> bool {
        self.password.is_none() && self.email.is_none() && self.phone.is_none()
    }

    /// Returns true if the user has been activated.
    pub fn is_active(&self) -> bool {
        self.activation_code.is_none()
    }

    /// Gets the user's last login timestamp, or `None` if the user has never logged in yet.
    pub fn last_login(&self) -> Option<OffsetDateTime> {
        self.last_login
    }
}
