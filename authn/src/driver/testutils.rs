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

//! Utilities to help testing services that integrate with the `authn` features.

use crate::db;
use crate::driver::email::testutils::{
    get_latest_activation_code, get_latest_otp_code, get_latest_password_reset_code,
    make_test_templates,
};
use crate::driver::{AuthnDriver, AuthnOptions, SmsSender};
use crate::model::{AccessToken, Password};
use async_trait::async_trait;
use futures::lock::Mutex;
use iii_iv_core::clocks::testutils::SettableClock;
use iii_iv_core::db::{Db, Executor};
use iii_iv_core::driver::DriverResult;
use iii_iv_core::model::{EmailAddress, PhoneNumber, Username};
use iii_iv_core::rest::BaseUrls;
use iii_iv_smtp::driver::testutils::RecorderSmtpMailer;
use std::sync::Arc;
use time::macros::datetime;

/// SMS sender that captures outgoing messages in memory.
#[derive(Clone, Default)]
pub struct RecorderSmsSender {
    /// Storage for captured messages, in the order in which they were sent.
    pub messages: Arc<Mutex<Vec<(PhoneNumber, String)>>>,
}

impl RecorderSmsSender {
    /// Returns the messages sent to `to`, which may be none.
    pub async fn messages_to(&self, to: &PhoneNumber) -> Vec<String> {
        let messages = self.messages.lock().await;
        messages.iter().filter(|(phone, _)| phone == to).map(|(_, text)| text.clone()).collect()
    }

    /// Gets the verification code in the latest message sent to `to`, if any.
    pub async fn get_latest_code(&self, to: &PhoneNumber) -> Option<u64> {
        self.messages_to(to).await.last().map(|text| {
            text.strip_prefix("Verification Code: ")
                .and_then(|code| code.parse().ok())
                .unwrap_or_else(|| panic!("Unexpected message format: {}", text))
        })
    }
}

#[async_trait]
impl SmsSender for RecorderSmsSender {
    async fn send_sms(&self, to: &PhoneNumber, message: &str) -> DriverResult<()> {
        let mut messages = self.messages.lock().await;
        messages.push((to.clone(), message.to_owned()));
        Ok(())
    }
}

/// State of a running test.
pub struct TestContext {
    /// The clock used by the driver, which tests can move at will.
    pub clock: Arc<SettableClock>,

    /// The SMTP mailer to capture authentication flow request messages.
    pub mailer: Arc<RecorderSmtpMailer>,

    /// The SMS sender to capture one-time codes sent to phones.
    pub sms: Arc<RecorderSmsSender>,

    /// The driver to handle authentication flows.
    driver: AuthnDriver,
}

impl TestContext {
    /// Initializes the driver using an in-memory database, a settable clock and mock messengers
    /// that capture outgoing notifications.
    pub async fn setup(opts: AuthnOptions) -> Self {
        let db = Arc::from(iii_iv_core::db::sqlite::testutils::setup().await);
        let clock = Arc::from(SettableClock::new(datetime!(2023-12-01 05:50:00 UTC)));
        Self::setup_with(opts, db, clock, "the-realm").await
    }

    /// Initializes the test context using the given already-initialized objects.
    pub async fn setup_with(
        opts: AuthnOptions,
        db: Arc<dyn Db + Send + Sync>,
        clock: Arc<SettableClock>,
        realm: &'static str,
    ) -> Self {
        db::init_schema(&mut db.ex().await.unwrap()).await.unwrap();
        let mailer = Arc::from(RecorderSmtpMailer::default());
        let sms = Arc::from(RecorderSmsSender::default());
        let base_urls = Arc::from(BaseUrls::from_strs(
            "http://localhost:1234/",
            Some("http://no-frontend.example.com"),
        ));
        let driver = AuthnDriver::new(
            db,
            clock.clone(),
            mailer.clone(),
            sms.clone(),
            make_test_templates(),
            base_urls,
            realm,
            opts,
        );

        TestContext { clock, mailer, sms, driver }
    }

    /// Syntactic sugar to create a user for testing purposes.  The password is always
    /// `test0password` and the email address is derived from the `username`.
    pub async fn create_active_user(&self, username: &Username) {
        let password = Password::from("test0password");

        let email = EmailAddress::new(format!("{}@example.com", username.as_str())).unwrap();
        self.driver
            .clone()
            .signup(username.clone(), password.clone(), email.clone())
            .await
            .unwrap();
        let activation_code =
            get_latest_activation_code(&self.mailer, &email, username).await.unwrap();
        self.driver.clone().activate(username.clone(), activation_code).await.unwrap();
    }

    /// Syntactic sugar to create and log a user in for testing purposes.
    pub async fn do_test_login(&self, username: Username) -> AccessToken {
        let password = Password::from("test0password");
        self.create_active_user(&username).await;

        let response = self.driver.clone().login(username, password).await.unwrap();
        response.take_access_token()
    }

    /// Gets a direct executor against the database.
    pub async fn ex(&self) -> Executor {
        self.driver.db.ex().await.unwrap()
    }

    /// Gets a copy of the driver in this test context.
    pub fn driver(&self) -> AuthnDriver {
        self.driver.clone()
    }

    /// Gets the latest activation code sent to `email` which, if any, should be for the username
    /// given in `exp_username`.
    pub async fn get_latest_activation_code(
        &self,
        email: &EmailAddress,
        exp_username: &Username,
    ) -> Option<u64> {
        get_latest_activation_code(&self.mailer, email, exp_username).await
    }

    /// Gets the latest password reset code sent to `email`, if any.
    pub async fn get_latest_password_reset_code(&self, email: &EmailAddress) -> Option<u64> {
        get_latest_password_reset_code(&self.mailer, email).await
    }

    /// Gets the latest one-time login code sent to `email`, if any.
    pub async fn get_latest_otp_code(&self, email: &EmailAddress) -> Option<u64> {
        get_latest_otp_code(&self.mailer, email).await
    }
}
