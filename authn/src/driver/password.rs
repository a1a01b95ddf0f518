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

//! Extends the driver with the password management methods.

use crate::db;
use crate::driver::email::send_password_reset_code;
use crate::driver::{AuthnDriver, new_code};
use crate::model::{CodePurpose, OneTimeCode, Password, default_password_validator};
use iii_iv_core::db::DbError;
use iii_iv_core::driver::{DriverError, DriverResult};
use iii_iv_core::model::{EmailAddress, Username};

impl AuthnDriver {
    /// Sends a password reset code to the user that owns `email`.
    ///
    /// Requests for unknown addresses succeed without sending anything so that callers cannot
    /// probe for registered addresses.
    pub async fn request_password_reset(self, email: EmailAddress) -> DriverResult<()> {
        let mut tx = self.db.begin().await?;
        let now = self.clock.now_utc();

        let user = match db::get_user_by_email(tx.ex(), &email).await {
            Ok(user) => user,
            Err(DbError::NotFound) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let code = OneTimeCode {
            purpose: CodePurpose::PasswordReset,
            address: email.as_str().to_owned(),
            code: new_code(self.opts.password_reset_code_len)?,
            expires: now + self.opts.password_reset_max_age,
        };
        db::put_code(tx.ex(), &code).await?;

        send_password_reset_code(
            self.mailer.as_ref(),
            &self.templates.password_reset,
            user.username(),
            &email,
            code.code,
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Replaces the password of the user that owns `email` with `new_password` after validating
    /// the reset `code` previously sent to that address.
    pub async fn reset_password(
        self,
        email: EmailAddress,
        code: u64,
        new_password: Password,
    ) -> DriverResult<()> {
        let mut tx = self.db.begin().await?;
        let now = self.clock.now_utc();

        let result = db::get_code(tx.ex(), CodePurpose::PasswordReset, email.as_str()).await;
        let stored = match result {
            Ok(stored) => stored,
            Err(DbError::NotFound) => {
                return Err(DriverError::InvalidInput("Invalid verification code".to_owned()));
            }
            Err(e) => return Err(e.into()),
        };
        stored.check(code, now)?;

        let user = db::get_user_by_email(tx.ex(), &email).await?;
        let hash = new_password.validate_and_hash(default_password_validator)?;
        db::set_user_password(tx.ex(), user.username(), &hash).await?;
        db::delete_code(tx.ex(), CodePurpose::PasswordReset, email.as_str()).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Replaces the password of `username` with `new_password` after verifying that the user
    /// knows the `old_password`.
    pub async fn change_password(
        self,
        username: Username,
        old_password: Password,
        new_password: Password,
    ) -> DriverResult<()> {
        let mut tx = self.db.begin().await?;

        let user = db::get_user_by_username(tx.ex(), &username).await?;
        match user.password() {
            Some(hash) => {
                if !old_password.verify(hash)? {
                    return Err(DriverError::Unauthorized("Invalid password".to_owned()));
                }
            }
            None => return Err(DriverError::Unauthorized("Login not allowed".to_owned())),
        }

        let hash = new_password.validate_and_hash(default_password_validator)?;
        db::set_user_password(tx.ex(), &username, &hash).await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::AuthnOptions;
    use crate::driver::testutils::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_reset_flow_ok() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        let username = Username::from("someone");
        context.create_active_user(&username).await;
        let email = EmailAddress::from("someone@example.com");

        context.driver().request_password_reset(email.clone()).await.unwrap();
        let code = context.get_latest_password_reset_code(&email).await.unwrap();
        assert_eq!(8, code.to_string().len());

        context
            .driver()
            .reset_password(email.clone(), code, Password::from("new0password"))
            .await
            .unwrap();

        context.driver().login(username.clone(), Password::from("new0password")).await.unwrap();
        match context.driver().login(username, Password::from("test0password")).await {
            Err(DriverError::Unauthorized(msg)) => assert!(msg.contains("Invalid password")),
            e => panic!("{:?}", e),
        }

        // Codes are single use.
        let result =
            context.driver().reset_password(email, code, Password::from("other0password")).await;
        match result {
            Err(DriverError::InvalidInput(msg)) => assert!(msg.contains("Invalid verification")),
            e => panic!("{:?}", e),
        }
    }

    #[tokio::test]
    async fn test_request_unknown_email_is_silent() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        context
            .driver()
            .request_password_reset(EmailAddress::from("nobody@example.com"))
            .await
            .unwrap();

        context.mailer.expect_no_messages().await;
    }

    #[tokio::test]
    async fn test_reset_bad_code() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        context.create_active_user(&Username::from("someone")).await;
        let email = EmailAddress::from("someone@example.com");

        context.driver().request_password_reset(email.clone()).await.unwrap();
        let code = context.get_latest_password_reset_code(&email).await.unwrap();

        match context
            .driver()
            .reset_password(email.clone(), code + 1, Password::from("new0password"))
            .await
        {
            Err(DriverError::InvalidInput(msg)) => assert!(msg.contains("Invalid verification")),
            e => panic!("{:?}", e),
        }

        // The right code keeps working after a failed attempt.
        context.driver().reset_password(email, code, Password::from("new0password")).await.unwrap();
    }

    #[tokio::test]
    async fn test_reset_expired_code() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        context.create_active_user(&Username::from("someone")).await;
        let email = EmailAddress::from("someone@example.com");

        context.driver().request_password_reset(email.clone()).await.unwrap();
        let code = context.get_latest_password_reset_code(&email).await.unwrap();

        context.clock.advance(Duration::from_secs(60 * 60));

        match context.driver().reset_password(email, code, Password::from("new0password")).await {
            Err(DriverError::InvalidInput(msg)) => assert!(msg.contains("expired")),
            e => panic!("{:?}", e),
        }
    }

    #[tokio::test]
    async fn test_reset_weak_password() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        context.create_active_user(&Username::from("someone")).await;
        let email = EmailAddress::from("someone@example.com");

        context.driver().request_password_reset(email.clone()).await.unwrap();
        let code = context.get_latest_password_reset_code(&email).await.unwrap();

        match context.driver().reset_password(email, code, Password::from("weak")).await {
            Err(DriverError::InvalidInput(msg)) => assert!(msg.contains("Weak password")),
            e => panic!("{:?}", e),
        }
    }

    #[tokio::test]
    async fn test_change_password_ok() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        let username = Username::from("someone");
        context.create_active_user(&username).await;

        context
            .driver()
            .change_password(
                username.clone(),
                Password::from("test0password"),
                Password::from("new0password"),
            )
            .await
            .unwrap();

        context.driver().login(username, Password::from("new0password")).await.unwrap();
    }

    #[tokio::test]
    async fn test_change_password_wrong_old_password() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        let username = Username::from("someone");
        context.create_active_user(&username).await;

        match context
            .driver()
            .change_password(
                username.clone(),
                Password::from("bad0password"),
                Password::from("new0password"),
            )
            .await
        {
            Err(DriverError::Unauthorized(msg)) => assert!(msg.contains("Invalid password")),
            e => panic!("{:?}", e),
        }

        context.driver().login(username, Password::from("test0password")).await.unwrap();
    }

    #[tokio::test]
    async fn test_change_password_unknown_user() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        match context
            .driver()
            .change_password(
                Username::from("ghost"),
                Password::from("test0password"),
                Password::from("new0password"),
            )
            .await
        {
            Err(DriverError::NotFound(_)) => (),
            e => panic!("{:?}", e),
        }
    }
}
