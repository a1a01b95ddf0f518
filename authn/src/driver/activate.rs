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

//! Extends the driver with the `activate` and `resend_activation_code` methods.

use crate::db;
use crate::driver::AuthnDriver;
use crate::driver::email::send_activation_code;
use iii_iv_core::driver::{DriverError, DriverResult};
use iii_iv_core::model::Username;

impl AuthnDriver {
    /// Marks a user as active based on a confirmation code.
    pub async fn activate(self, username: Username, code: u64) -> DriverResult<()> {
        let mut tx = self.db.begin().await?;

        let user = db::get_user_by_username(tx.ex(), &username).await?;
        match user.activation_code() {
            Some(exp_code) => {
                if exp_code != code {
                    return Err(DriverError::InvalidInput("Invalid activation code".to_owned()));
                }
            }
            None => return Err(DriverError::InvalidInput("User is already active".to_owned())),
        }

        db::set_user_activation_code(tx.ex(), user, None).await?;
        tx.commit().await?;

        Ok(())
    }

    /// Sends the pending activation code of `username` to its email address again.
    ///
    /// The code is not rotated so that any previously-sent message stays valid.
    pub async fn resend_activation_code(self, username: Username) -> DriverResult<()> {
        let mut ex = self.db.ex().await?;

        let user = db::get_user_by_username(&mut ex, &username).await?;
        let Some(code) = user.activation_code() else {
            return Err(DriverError::InvalidInput("User is already active".to_owned()));
        };
        let Some(email) = user.email() else {
            return Err(DriverError::InvalidInput("User has no email address".to_owned()));
        };

        send_activation_code(
            self.mailer.as_ref(),
            &self.templates.activation,
            &self.base_urls,
            user.username(),
            email,
            code,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::AuthnOptions;
    use crate::driver::testutils::*;
    use crate::model::Password;
    use iii_iv_core::model::{EmailAddress, PhoneNumber};

    /// Creates a test user with an optional activation `code` and returns its username.
    async fn create_test_user(context: &TestContext, code: Option<u64>) -> Username {
        let username = Username::from("some-username");

        let mut ex = context.ex().await;
        let user = db::create_user(
            &mut ex,
            username.clone(),
            None,
            Some(EmailAddress::from("a@example.com")),
            None,
        )
        .await
        .unwrap();
        db::set_user_activation_code(&mut ex, user, code).await.unwrap();

        username
    }

    #[tokio::test]
    async fn test_activate_ok() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        let username = create_test_user(&context, Some(42)).await;

        context.driver().activate(username.clone(), 42).await.unwrap();

        let user = db::get_user_by_username(&mut context.ex().await, &username).await.unwrap();
        assert!(user.is_active());
    }

    #[tokio::test]
    async fn test_activate_bad_code() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        let username = create_test_user(&context, Some(42)).await;

        match context.driver().activate(username.clone(), 41).await {
            Err(DriverError::InvalidInput(msg)) => assert!(msg.contains("Invalid activation")),
            e => panic!("{:?}", e),
        }

        let user = db::get_user_by_username(&mut context.ex().await, &username).await.unwrap();
        assert_eq!(Some(42), user.activation_code());
    }

    #[tokio::test]
    async fn test_activate_already_active() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        let username = create_test_user(&context, None).await;

        match context.driver().activate(username, 1).await {
            Err(DriverError::InvalidInput(msg)) => assert!(msg.contains("already active")),
            e => panic!("{:?}", e),
        }
    }

    #[tokio::test]
    async fn test_activate_unknown_user() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        match context.driver().activate(Username::from("missing"), 1).await {
            Err(DriverError::NotFound(_)) => (),
            e => panic!("{:?}", e),
        }
    }

    #[tokio::test]
    async fn test_resend_activation_code_ok() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        let username = Username::from("hello");
        let email = EmailAddress::from("hello@example.com");
        context
            .driver()
            .signup(username.clone(), Password::from("the1password"), email.clone())
            .await
            .unwrap();
        let code = context.get_latest_activation_code(&email, &username).await.unwrap();
        assert_eq!(1, context.mailer.messages_to(&email).await.len());

        context.driver().resend_activation_code(username.clone()).await.unwrap();
        assert_eq!(2, context.mailer.messages_to(&email).await.len());
        assert_eq!(Some(code), context.get_latest_activation_code(&email, &username).await);

        context.driver().activate(username, code).await.unwrap();
    }

    #[tokio::test]
    async fn test_resend_activation_code_already_active() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        let username = create_test_user(&context, None).await;

        match context.driver().resend_activation_code(username).await {
            Err(DriverError::InvalidInput(msg)) => assert!(msg.contains("already active")),
            e => panic!("{:?}", e),
        }
        context.mailer.expect_no_messages().await;
    }

    #[tokio::test]
    async fn test_resend_activation_code_no_email() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        let username = Username::from("texter");
        let mut ex = context.ex().await;
        let user = db::create_user(
            &mut ex,
            username.clone(),
            None,
            None,
            Some(PhoneNumber::from("+15551234567")),
        )
        .await
        .unwrap();
        db::set_user_activation_code(&mut ex, user, Some(42)).await.unwrap();

        match context.driver().resend_activation_code(username).await {
            Err(DriverError::InvalidInput(msg)) => assert!(msg.contains("no email address")),
            e => panic!("{:?}", e),
        }
        context.mailer.expect_no_messages().await;
    }

    #[tokio::test]
    async fn test_resend_activation_code_unknown_user() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        match context.driver().resend_activation_code(Username::from("missing")).await {
            Err(DriverError::NotFound(_)) => (),
            e => panic!("{:?}", e),
        }
    }
}
