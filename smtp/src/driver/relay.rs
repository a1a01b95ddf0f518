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

//! Delivery of messages through an SMTP relay.

use crate::driver::SmtpMailer;
use async_trait::async_trait;
use derivative::Derivative;
use iii_iv_core::driver::{DriverError, DriverResult};
use iii_iv_core::env::{get_optional_var, get_required_var};
use lettre::message::Message;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use serde::Deserialize;

/// Options to establish an SMTP connection.
#[derive(Deserialize, Derivative)]
#[derivative(Debug)]
#[cfg_attr(test, derivative(PartialEq))]
pub struct SmtpOptions {
    /// SMTP server to use.
    pub relay: String,

    /// Username for logging into the SMTP server.
    pub username: String,

    /// Password for logging into the SMTP server.
    #[derivative(Debug = "ignore")]
    pub password: String,

    /// Maximum number of messages to send per day, if any.
    pub max_daily_emails: Option<usize>,
}

impl SmtpOptions {
    /// Initializes a set of options from environment variables whose name is prefixed with the
    /// given `prefix`.
    ///
    /// This will use variables such as `<prefix>_RELAY`, `<prefix>_USERNAME`, `<prefix>_PASSWORD`
    /// and `<prefix>_MAX_DAILY_EMAILS`.
    pub fn from_env(prefix: &str) -> Result<Self, String> {
        Ok(Self {
            relay: get_required_var::<String>(prefix, "RELAY")?,
            username: get_required_var::<String>(prefix, "USERNAME")?,
            password: get_required_var::<String>(prefix, "PASSWORD")?,
            max_daily_emails: get_optional_var::<usize>(prefix, "MAX_DAILY_EMAILS")?,
        })
    }
}

/// Mailer backed by a real SMTP connection using `lettre`.
#[derive(Clone)]
pub struct LettreSmtpMailer(AsyncSmtpTransport<Tokio1Executor>);

impl LettreSmtpMailer {
    /// Prepares a connection pool to the SMTP server described by `opts`.
    ///
    /// No connection is attempted until the first message is sent.
    pub fn connect(opts: &SmtpOptions) -> Result<Self, String> {
        let creds = Credentials::new(opts.username.clone(), opts.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&opts.relay)
            .map_err(|e| format!("Invalid SMTP relay {}: {}", opts.relay, e))?
            .credentials(creds)
            .build();
        Ok(LettreSmtpMailer(transport))
    }
}

#[async_trait]
impl SmtpMailer for LettreSmtpMailer {
    async fn send(&self, message: Message) -> DriverResult<()> {
        self.0
            .send(message)
            .await
            .map_err(|e| DriverError::BackendError(format!("SMTP communication failed: {}", e)))?;
        Ok(())
    }
}
