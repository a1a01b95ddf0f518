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

//! Abstraction to deliver text messages to phone numbers.

use async_trait::async_trait;
use iii_iv_core::driver::DriverResult;
use iii_iv_core::logging::{Logger, Tags};
use iii_iv_core::model::PhoneNumber;
use serde_json::Value;
use std::sync::Arc;

/// Trait to abstract the integration with an SMS gateway.
#[async_trait]
pub trait SmsSender {
    /// Sends `message` to the phone number `to`.
    async fn send_sms(&self, to: &PhoneNumber, message: &str) -> DriverResult<()>;
}

/// SMS sender for development environments that logs messages instead of delivering them.
#[derive(Clone)]
pub struct LoggingSmsSender {
    /// Where to send the messages to.
    logger: Arc<dyn Logger>,
}

impl LoggingSmsSender {
    /// Creates a new sender that emits messages to `logger`.
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl SmsSender for LoggingSmsSender {
    async fn send_sms(&self, to: &PhoneNumber, message: &str) -> DriverResult<()> {
        let mut tags = Tags::new();
        tags.insert("phoneNumber".to_owned(), Value::from(to.as_str()));
        tags.insert("message".to_owned(), Value::from(message));
        self.logger.with_tags(tags).info("Send SMS");
        Ok(())
    }
}
