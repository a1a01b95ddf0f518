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

//! Business logic to deliver email messages while respecting quotas.

use crate::db::{count_email_log, put_email_log, update_email_log};
use async_trait::async_trait;
use iii_iv_core::clocks::Clock;
use iii_iv_core::db::Db;
use iii_iv_core::driver::{DriverError, DriverResult};
use lettre::message::Message;
use log::warn;
use std::sync::Arc;

mod logging;
pub use logging::LoggingMailer;
mod relay;
pub use relay::{LettreSmtpMailer, SmtpOptions};
#[cfg(any(test, feature = "testutils"))]
pub mod testutils;

/// Trait to abstract the integration with the mailer.
#[async_trait]
pub trait SmtpMailer {
    /// Sends a message over SMTP.
    async fn send(&self, message: Message) -> DriverResult<()>;
}

/// Encapsulates logic to send email messages while respecting quotas.
///
/// The driver is itself a mailer so it can be handed to any component that needs to send email.
#[derive(Clone)]
pub struct SmtpDriver {
    /// The transport with which to deliver email messages.
    transport: Arc<dyn SmtpMailer + Send + Sync>,

    /// The database with which to track sent messages.
    db: Arc<dyn Db + Send + Sync>,

    /// The clock from which to obtain the current time.
    clock: Arc<dyn Clock + Send + Sync>,

    /// Maximum number of messages to send per day, if any.
    max_daily_emails: Option<usize>,
}

impl SmtpDriver {
    /// Creates a new driver with the given values.
    pub fn new(
        transport: Arc<dyn SmtpMailer + Send + Sync>,
        db: Arc<dyn Db + Send + Sync>,
        clock: Arc<dyn Clock + Send + Sync>,
        max_daily_emails: Option<usize>,
    ) -> Self {
        Self { transport, db, clock, max_daily_emails }
    }
}

#[async_trait]
impl SmtpMailer for SmtpDriver {
    /// Sends an email message after recording it and accounting for it for quota purposes.
    async fn send(&self, message: Message) -> DriverResult<()> {
        let mut tx = self.db.begin().await?;
        let now = self.clock.now_utc();

        // Insert before counting so that the transaction holds the write lock and concurrent
        // senders observe each other.
        let id = put_email_log(tx.ex(), &message, now).await?;

        if let Some(max_daily_emails) = self.max_daily_emails {
            let daily_emails = count_email_log(tx.ex(), now.date()).await?.saturating_sub(1);
            if daily_emails >= max_daily_emails {
                let msg = format!(
                    "Too many emails sent today ({} >= {})",
                    daily_emails, max_daily_emails,
                );
                update_email_log(tx.ex(), id, &msg).await?;
                tx.commit().await?;
                return Err(DriverError::NoSpace(msg));
            }
        }

        // Commit before delivery: a failed delivery still counts towards the quota and slow
        // servers must not serialize submissions.
        tx.commit().await?;

        let result = self.transport.send(message).await;

        let outcome = match &result {
            Ok(()) => "OK".to_owned(),
            Err(e) => e.to_string(),
        };
        if let Err(e) = update_email_log(&mut self.db.ex().await?, id, &outcome).await {
            warn!("Failed to record outcome of email {}: {}", id, e);
        }

        result
    }
}

/// Creates a new SMTP driver that sends email messages via the relay configured in `opts`.
///
/// `db` and `clock` are used to keep track of the messages that have been sent for quota
/// accounting purposes.
pub fn new_prod_driver(
    opts: SmtpOptions,
    db: Arc<dyn Db + Send + Sync>,
    clock: Arc<dyn Clock + Send + Sync>,
) -> Result<SmtpDriver, String> {
    let transport = LettreSmtpMailer::connect(&opts)?;
    Ok(SmtpDriver::new(Arc::new(transport), db, clock, opts.max_daily_emails))
}
