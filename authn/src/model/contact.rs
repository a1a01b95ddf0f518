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

//! The `Contact` data type.

use iii_iv_core::model::{EmailAddress, ModelError, ModelResult, PhoneNumber};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A way to reach a user to deliver one-time codes.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum Contact {
    /// Codes are delivered over email.
    Email(EmailAddress),

    /// Codes are delivered over SMS.
    Phone(PhoneNumber),
}

impl Contact {
    /// Parses an untrusted string `s` as a contact.  Phone numbers are recognized by their
    /// leading `+` and anything else must be an email address.
    pub fn new<S: Into<String>>(s: S) -> ModelResult<Self> {
        let s = s.into();
        if s.starts_with('+') {
            Ok(Contact::Phone(PhoneNumber::new(s)?))
        } else {
            Ok(Contact::Email(EmailAddress::new(s)?))
        }
    }

    /// Returns a string view of the contact.
    pub fn as_str(&self) -> &str {
        match self {
            Contact::Email(email) => email.as_str(),
            Contact::Phone(phone) => phone.as_str(),
        }
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<EmailAddress> for Contact {
    fn from(email: EmailAddress) -> Self {
        Contact::Email(email)
    }
}

impl From<PhoneNumber> for Contact {
    fn from(phone: PhoneNumber) -> Self {
        Contact::Phone(phone)
    }
}

impl TryFrom<String> for Contact {
    type Error = ModelError;

    fn try_from(value: String) -> ModelResult<Self> {
        Self::new(value)
    }
}

impl From<Contact> for String {
    fn from(contact: Contact) -> Self {
        contact.as_str().to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_new() {
        assert_eq!(
            Contact::Email(EmailAddress::from("a@example.com")),
            Contact::new("a@example.com").unwrap()
        );
        assert_eq!(
            Contact::Phone(PhoneNumber::from("+12345678901")),
            Contact::new("+12345678901").unwrap()
        );
    }

    #[test]
    fn test_contact_new_errors() {
        assert!(Contact::new("+1234").unwrap_err().0.contains("exactly 11 digits"));
        assert!(Contact::new("12345678901").unwrap_err().0.contains("valid address"));
        assert!(Contact::new("").unwrap_err().0.contains("cannot be empty"));
    }

    #[test]
    fn test_contact_serde() {
        let contact: Contact = serde_json::from_str("\"+12345678901\"").unwrap();
        assert_eq!("+12345678901", contact.as_str());
        assert_eq!("\"+12345678901\"", serde_json::to_string(&contact).unwrap());

        let contact: Contact = serde_json::from_str("\"b@example.com\"").unwrap();
        assert_eq!(Contact::from(EmailAddress::from("b@example.com")), contact);

        serde_json::from_str::<Contact>("\"+1\"").unwrap_err();
    }
}
