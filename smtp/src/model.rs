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

//! Data types to interact with email messages.

use iii_iv_core::model::{EmailAddress, ModelError, ModelResult};
use iii_iv_core::template;
use lettre::message::Body;
use lettre::message::header::ContentTransferEncoding;
pub use lettre::message::{Mailbox, Message};

/// Converts one of our email addresses into a `lettre` mailbox.
pub fn mailbox(email: &EmailAddress) -> ModelResult<Mailbox> {
    email
        .as_str()
        .parse()
        .map_err(|e| ModelError(format!("Cannot use {} as a mailbox: {}", email.as_str(), e)))
}

/// Extracts the textual representation of the recipients of `message`.
pub fn recipients(message: &Message) -> Vec<String> {
    message.envelope().to().iter().map(|a| a.to_string()).collect()
}

/// A template for an email message.
///
/// The subject and body can contain `%key%` placeholders.  See `iii_iv_core::template::apply`.
#[derive(Clone, Debug)]
pub struct EmailTemplate {
    /// Who the message comes from.
    pub from: Mailbox,

    /// Subject of the message.
    pub subject_template: String,

    /// Body of the message.
    pub body_template: String,
}

impl EmailTemplate {
    /// Creates a new template sent from the `from` mailbox, which must be parseable.
    pub fn new<S, B>(from: &str, subject_template: S, body_template: B) -> ModelResult<Self>
    where
        S: Into<String>,
        B: Into<String>,
    {
        let from = from
            .parse()
            .map_err(|e| ModelError(format!("Invalid sender mailbox '{}': {}", from, e)))?;
        Ok(Self {
            from,
            subject_template: subject_template.into(),
            body_template: body_template.into(),
        })
    }

    /// Creates a message sent to `to` based on the template by applying the collection of
    /// `replacements` to it.
    pub fn apply(&self, to: &EmailAddress, replacements: &[(&str, &str)]) -> ModelResult<Message> {
        let subject = template::apply(&self.subject_template, replacements);

        let body = Body::new_with_encoding(
            template::apply(&self.body_template, replacements),
            ContentTransferEncoding::QuotedPrintable,
        )
        .map_err(|e| ModelError(format!("Failed to encode message: {:?}", e)))?;

        Message::builder()
            .from(self.from.clone())
            .to(mailbox(to)?)
            .subject(subject)
            .body(body)
            .map_err(|e| ModelError(format!("Failed to build message: {}", e)))
    }
}

/// Utilities to help testing email messages.
#[cfg(any(test, feature = "testutils"))]
pub mod testutils {
    use super::*;
    use std::collections::HashMap;

    /// Given an SMTP `message`, parses it and extracts its headers and body.
    pub fn parse_message(message: &Message) -> (HashMap<String, String>, String) {
        let text = String::from_utf8(message.formatted()).unwrap();
        let (raw_headers, encoded_body) = text
            .split_once("\r\n\r\n")
            .unwrap_or_else(|| panic!("Message seems to have the wrong format: {}", text));

        let mut headers = HashMap::default();
        for raw_header in raw_headers.split("\r\n") {
            let (key, value) = raw_header
                .split_once(": ")
                .unwrap_or_else(|| panic!("Header seems to have the wrong format: {}", raw_header));
            let previous = headers.insert(key.to_owned(), value.to_owned());
            assert!(previous.is_none(), "Duplicate header {}", raw_header);
        }

        let decoded_body =
            quoted_printable::decode(encoded_body, quoted_printable::ParseMode::Robust).unwrap();
        let body = String::from_utf8(decoded_body).unwrap().replace("\r\n", "\n");

        (headers, body)
    }

    /// Extracts the decoded body of `message`.
    pub fn body_of(message: &Message) -> String {
        parse_message(message).1
    }
}
