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

//! Extends the driver with one-time code logins over email or text messages.

use crate::db;
use crate::driver::email::send_otp_code;
use crate::driver::login::start_session;
use crate::driver::{AuthnDriver, new_code};
use crate::model::{CodePurpose, Contact, OneTimeCode, Session, User};
use iii_iv_core::db::{DbError, DbResult, Executor};
use iii_iv_core::driver::{DriverError, DriverResult};
use iii_iv_core::model::Username;

/// Looks up the user that owns `contact`.
async fn get_user_by_contact(ex: &mut Executor, contact: &Contact) -> DbResult<User> {
    match contact {
        Contact::Email(email) => db::get_user_by_email(ex, email).await,
        Contact::Phone(phone) => db::get_user_by_phone(ex, phone).await,
    }
}

impl AuthnDriver {
    /// Sends a one-time login code to `contact`.
    ///
    /// If no user owns `contact` yet, a new passwordless user with a generated name is created
    /// for it.  Such user remains inactive until the first successful `otp_login`.
    pub async fn otp_request(self, contact: Contact) -> DriverResult<()> {
        let mut tx = self.db.begin().await?;
        let now = self.clock.now_utc();

        let code = new_code(self.opts.otp_code_len)?;

        match get_user_by_contact(tx.ex(), &contact).await {
            Ok(_user) => (),
            Err(DbError::NotFound) => {
                let (email, phone) = match &contact {
                    Contact::Email(email) => (Some(email.clone()), None),
                    Contact::Phone(phone) => (None, Some(phone.clone())),
                };
                let username = Username::generate();
                let user = db::create_user(tx.ex(), username, None, email, phone).await?;
                db::set_user_activation_code(tx.ex(), user, Some(code)).await?;
            }
            Err(e) => return Err(e.into()),
        }

        let otp = OneTimeCode {
            purpose: CodePurpose::Login,
            address: contact.as_str().to_owned(),
            code,
            expires: now + self.opts.otp_max_age,
        };
        db::put_code(tx.ex(), &otp).await?;

        match &contact {
            Contact::Email(email) => {
                send_otp_code(self.mailer.as_ref(), &self.templates.otp, email, code).await?
            }
            Contact::Phone(phone) => {
                self.sms.send_sms(phone, &format!("Verification Code: {}", code)).await?
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Starts a session for the user that owns `contact` after validating the one-time `code`
    /// previously sent to it.
    pub async fn otp_login(self, contact: Contact, code: u64) -> DriverResult<Session> {
        let mut tx = self.db.begin().await?;
        let now = self.clock.now_utc();

        let stored = match db::get_code(tx.ex(), CodePurpose::Login, contact.as_str()).await {
            Ok(stored) => stored,
            Err(DbError::NotFound) => {
                return Err(DriverError::Unauthorized("Invalid verification code".to_owned()));
            }
            Err(e) => return Err(e.into()),
        };
        stored.check(code, now).map_err(|e| DriverError::Unauthorized(e.to_string()))?;

        let user = match get_user_by_contact(tx.ex(), &contact).await {
            Ok(user) => user,
            Err(DbError::NotFound) => {
                return Err(DriverError::Unauthorized("Unknown user".to_owned()));
            }
            Err(e) => return Err(e.into()),
        };
        db::delete_code(tx.ex(), CodePurpose::Login, contact.as_str()).await?;

        let username = user.username().clone();
        if !user.is_active() {
            db::set_user_activation_code(tx.ex(), user, None).await?;
        }
        let session = start_session(tx.ex(), &username, now).await?;

        tx.commit().await?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::AuthnOptions;
    use crate::driver::testutils::*;
    use crate::model::Password;
    use iii_iv_core::model::{EmailAddress, PhoneNumber};
    use std::time::Duration;

    #[tokio::test]
    async fn test_email_new_user() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        let email = EmailAddress::from("new@example.com");
        context.driver().otp_request(Contact::from(email.clone())).await.unwrap();

        let user = db::get_user_by_email(&mut context.ex().await, &email).await.unwrap();
        assert!(user.username().as_str().starts_with("u-"));
        assert!(user.password().is_none());
        assert!(!user.is_active());

        let code = context.get_latest_otp_code(&email).await.unwrap();
        assert_eq!(4, code.to_string().len());

        let session = context.driver().otp_login(Contact::from(email.clone()), code).await.unwrap();
        assert_eq!(user.username(), session.username());

        let user = db::get_user_by_email(&mut context.ex().await, &email).await.unwrap();
        assert!(user.is_active());
        assert_eq!(Some(session.login_time()), user.last_login());

        let whoami = context.driver().get_session(session.take_access_token()).await.unwrap();
        assert_eq!(&email, whoami.email().unwrap());
    }

    #[tokio::test]
    async fn test_email_existing_user() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        let username = Username::from("someone");
        context.create_active_user(&username).await;
        let email = EmailAddress::from("someone@example.com");

        context.driver().otp_request(Contact::from(email.clone())).await.unwrap();
        let code = context.get_latest_otp_code(&email).await.unwrap();

        let session = context.driver().otp_login(Contact::from(email), code).await.unwrap();
        assert_eq!(&username, session.username());

        // The password still works.
        context.driver().login(username, Password::from("test0password")).await.unwrap();
    }

    #[tokio::test]
    async fn test_phone_new_user() {
        let context = TestContext::setup(AuthnOptions { otp_code_len: 6, ..Default::default() })
            .await;

        let phone = PhoneNumber::from("+15551234567");
        context.driver().otp_request(Contact::from(phone.clone())).await.unwrap();

        let messages = context.sms.messages_to(&phone).await;
        assert_eq!(1, messages.len());
        assert!(messages[0].starts_with("Verification Code: "));
        let code = context.sms.get_latest_code(&phone).await.unwrap();
        assert_eq!(6, code.to_string().len());
        context.mailer.expect_no_messages().await;

        let session = context.driver().otp_login(Contact::from(phone.clone()), code).await.unwrap();

        let user = db::get_user_by_phone(&mut context.ex().await, &phone).await.unwrap();
        assert_eq!(user.username(), session.username());
        assert!(user.email().is_none());
        assert!(user.is_active());
    }

    #[tokio::test]
    async fn test_repeated_requests_replace_code() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        let phone = PhoneNumber::from("+15551234567");
        context.driver().otp_request(Contact::from(phone.clone())).await.unwrap();
        context.driver().otp_request(Contact::from(phone.clone())).await.unwrap();

        let messages = context.sms.messages_to(&phone).await;
        assert_eq!(2, messages.len());
        let code = context.sms.get_latest_code(&phone).await.unwrap();

        let stored = db::get_code(&mut context.ex().await, CodePurpose::Login, phone.as_str())
            .await
            .unwrap();
        assert_eq!(code, stored.code);

        // Only one user exists for the phone even after multiple requests.
        context.driver().otp_login(Contact::from(phone), code).await.unwrap();
    }

    #[tokio::test]
    async fn test_login_bad_code() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        let email = EmailAddress::from("new@example.com");
        context.driver().otp_request(Contact::from(email.clone())).await.unwrap();
        let code = context.get_latest_otp_code(&email).await.unwrap();

        let bad_code = if code == 9999 { 1000 } else { code + 1 };
        match context.driver().otp_login(Contact::from(email.clone()), bad_code).await {
            Err(DriverError::Unauthorized(msg)) => assert!(msg.contains("Invalid verification")),
            e => panic!("{:?}", e),
        }

        let user = db::get_user_by_email(&mut context.ex().await, &email).await.unwrap();
        assert!(!user.is_active());
    }

    #[tokio::test]
    async fn test_login_expired_code() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        let email = EmailAddress::from("new@example.com");
        context.driver().otp_request(Contact::from(email.clone())).await.unwrap();
        let code = context.get_latest_otp_code(&email).await.unwrap();

        context.clock.advance(Duration::from_secs(5 * 60));

        match context.driver().otp_login(Contact::from(email), code).await {
            Err(DriverError::Unauthorized(msg)) => assert!(msg.contains("expired")),
            e => panic!("{:?}", e),
        }
    }

    #[tokio::test]
    async fn test_login_without_request() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        let email = EmailAddress::from("someone@example.com");
        match context.driver().otp_login(Contact::from(email), 1234).await {
            Err(DriverError::Unauthorized(msg)) => assert!(msg.contains("Invalid verification")),
            e => panic!("{:?}", e),
        }
    }

    #[tokio::test]
    async fn test_codes_are_single_use() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        let email = EmailAddress::from("new@example.com");
        context.driver().otp_request(Contact::from(email.clone())).await.unwrap();
        let code = context.get_latest_otp_code(&email).await.unwrap();

        context.driver().otp_login(Contact::from(email.clone()), code).await.unwrap();
        match context.driver().otp_login(Contact::from(email), code).await {
            Err(DriverError::Unauthorized(msg)) => assert!(msg.contains("Invalid verification")),
            e => panic!("{:?}", e),
        }
    }

    #[tokio::test]
    async fn test_send_failure_rolls_back() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        let email = EmailAddress::from("broken@example.com");
        context.mailer.inject_error_for(email.clone()).await;

        let err = context.driver().otp_request(Contact::from(email.clone())).await.unwrap_err();
        assert!(matches!(err, DriverError::BackendError(_)));

        assert_eq!(
            DbError::NotFound,
            db::get_user_by_email(&mut context.ex().await, &email).await.unwrap_err()
        );
    }
}
