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

//! A mailer for development environments that logs messages instead of delivering them.

use crate::driver::SmtpMailer;
use crate::model::recipients;
use async_trait::async_trait;
use iii_iv_core::driver::DriverResult;
use iii_iv_core::logging::{Logger, Tags};
use lettre::Message;
use serde_json::Value;
use std::sync::Arc;

/// Mailer that writes every message to a logger.
#[derive(Clone)]
pub struct LoggingMailer {
    /// Where to send the messages to.
    logger: Arc<dyn Logger>,
}

impl LoggingMailer {
    /// Creates a new mailer that emits messages to `logger`.
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self { logger }
    }
}

/// Gets the raw value of the `name` header of `message`, or an empty string.
fn header(message: &Message, name: &str) -> String {
    message.headers().get_raw(name).unwrap_or_default().to_owned()
}

#[async_trait]
impl SmtpMailer for LoggingMailer {
    async fn send(&self, message: Message) -> DriverResult<()> {
        let mut tags = Tags::new();
        tags.insert("from".to_owned(), Value::from(header(&message, "From")));
        tags.insert("to".to_owned(), Value::from(recipients(&message)));
        tags.insert("subject".to_owned(), Value::from(header(&message, "Subject")));
        tags.insert(
            "message".to_owned(),
            Value::from(String::from_utf8_lossy(&message.formatted()).into_owned()),
        );
        self.logger.with_tags(tags).info("Send email");
        Ok(())
    }
}
