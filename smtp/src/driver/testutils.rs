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

//! Test utilities for email handling.

use crate::driver::SmtpMailer;
use crate::model::recipients;
use async_trait::async_trait;
use futures::lock::Mutex;
use iii_iv_core::driver::{DriverError, DriverResult};
use iii_iv_core::model::EmailAddress;
use lettre::Message;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[cfg(test)]
use {
    super::SmtpDriver,
    crate::db::init_schema,
    iii_iv_core::clocks::testutils::SettableClock,
    iii_iv_core::db::{Db, Executor, sqlite},
    time::macros::datetime,
};

/// Mailer that captures outgoing messages in per-recipient inboxes.
#[derive(Clone, Default)]
pub struct RecorderSmtpMailer {
    /// Storage for captured messages.
    pub inboxes: Arc<Mutex<HashMap<EmailAddress, Vec<Message>>>>,

    /// Addresses for which sending a message fails.
    errors: Arc<Mutex<HashSet<EmailAddress>>>,
}

impl RecorderSmtpMailer {
    /// Makes trying to send messages to `email` fail with an error.
    pub async fn inject_error_for<E: Into<EmailAddress>>(&self, email: E) {
        let mut errors = self.errors.lock().await;
        errors.insert(email.into());
    }

    /// Expects that no messages were sent.
    pub async fn expect_no_messages(&self) {
        let inboxes = self.inboxes.lock().await;
        assert_eq!(0, inboxes.len(), "Expected to find no messages");
    }

    /// Expects that messages were sent to `exp_to` and nobody else, and returns the list of
    /// messages to that recipient.
    pub async fn expect_one_inbox(&self, exp_to: &EmailAddress) -> Vec<Message> {
        let inboxes = self.inboxes.lock().await;
        assert_eq!(1, inboxes.len(), "Expected to find just one inbox");
        let (to, messages) = inboxes.iter().next().unwrap();
        assert_eq!(exp_to, to);
        messages.clone()
    }

    /// Expects that only one message was sent to `exp_to` and nobody else, and returns the
    /// message.
    pub async fn expect_one_message(&self, exp_to: &EmailAddress) -> Message {
        let mut messages = self.expect_one_inbox(exp_to).await;
        assert_eq!(1, messages.len(), "Expected to find just one message for {}", exp_to.as_str());
        messages.pop().unwrap()
    }

    /// Returns the messages sent to `to`, which may be none.
    pub async fn messages_to(&self, to: &EmailAddress) -> Vec<Message> {
        let inboxes = self.inboxes.lock().await;
        inboxes.get(to).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl SmtpMailer for RecorderSmtpMailer {
    async fn send(&self, message: Message) -> DriverResult<()> {
        let to = recipients(&message);
        assert!(!to.is_empty(), "Message must have at least one recipient");

        {
            let errors = self.errors.lock().await;
            for to in &to {
                if errors.contains(&EmailAddress::from(to.as_str())) {
                    let msg = format!("Sending email to {} failed", to);
                    return Err(DriverError::BackendError(msg));
                }
            }
        }

        let mut inboxes = self.inboxes.lock().await;
        for to in to {
            inboxes.entry(EmailAddress::from(to.as_str())).or_default().push(message.clone());
        }
        Ok(())
    }
}

/// Container for the state required to run a driver test.
#[cfg(test)]
pub(crate) struct TestContext {
    /// The driver under test.
    pub(crate) driver: SmtpDriver,

    /// The database backing the driver.
    db: Arc<dyn Db + Send + Sync>,

    /// The clock used by the driver.
    pub(crate) clock: Arc<SettableClock>,

    /// The transport used by the driver.
    pub(crate) mailer: RecorderSmtpMailer,
}

#[cfg(test)]
impl TestContext {
    /// Initializes a driver with an in-memory database and the `max_daily_emails` quota.
    pub(crate) async fn setup(max_daily_emails: Option<usize>) -> Self {
        let db = Arc::new(sqlite::testutils::setup().await);
        init_schema(&mut db.ex().await.unwrap()).await.unwrap();

        let clock = Arc::new(SettableClock::new(datetime!(2023-10-17 06:00:00 UTC)));
        let mailer = RecorderSmtpMailer::default();
        let driver =
            SmtpDriver::new(Arc::new(mailer.clone()), db.clone(), clock.clone(), max_daily_emails);

        Self { driver, db, clock, mailer }
    }

    /// Obtains a direct executor against the test database.
    pub(crate) async fn ex(&mut self) -> Executor {
        self.db.ex().await.unwrap()
    }
}
