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

//! Extends the driver with the `login` method.

use crate::db;
use crate::driver::AuthnDriver;
use crate::model::{AccessToken, Password, Session};
use iii_iv_core::db::{DbError, Executor};
use iii_iv_core::driver::{DriverError, DriverResult};
use iii_iv_core::model::Username;
use time::OffsetDateTime;

/// Creates a new session for `username` at `now` and records the login time in the user.
pub(super) async fn start_session(
    ex: &mut Executor,
    username: &Username,
    now: OffsetDateTime,
) -> DriverResult<Session> {
    let session = Session::new(AccessToken::generate(), username.clone(), now);
    db::put_session(ex, &session).await?;
    db::update_user_last_login(ex, username, now).await?;
    Ok(session)
}

impl AuthnDriver {
    /// Logs a user with `username` and `password`.
    pub async fn login(self, username: Username, password: Password) -> DriverResult<Session> {
        let mut tx = self.db.begin().await?;
        let now = self.clock.now_utc();

        let user = match db::get_user_by_username(tx.ex(), &username).await {
            Ok(user) => user,
            Err(DbError::NotFound) => {
                return Err(DriverError::Unauthorized("Unknown user".to_owned()));
            }
            Err(e) => return Err(e.into()),
        };

        match user.password() {
            Some(hash) => {
                if !password.verify(hash)? {
                    return Err(DriverError::Unauthorized("Invalid password".to_owned()));
                }
            }
            None => return Err(DriverError::Unauthorized("Login not allowed".to_owned())),
        };

        if !user.is_active() {
            return Err(DriverError::NotActivated);
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
    use iii_iv_core::clocks::Clock;
    use iii_iv_core::model::EmailAddress;
    use std::time::Duration;

    /// Creates a user named `username` that can log in with `password`.
    async fn create_user_with_password(
        context: &TestContext,
        username: &Username,
        password: &'static str,
    ) {
        db::create_user(
            &mut context.ex().await,
            username.clone(),
            Some(Password::from(password).validate_and_hash(|_| None).unwrap()),
            Some(EmailAddress::from("some@example.com")),
            None,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_login_ok_first_time() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        let username = Username::from("hello");
        create_user_with_password(&context, &username, "password").await;

        let now = context.clock.now_utc();
        let response = context.driver().login(username.clone(), Password::from("password")).await;
        let session = response.unwrap();

        let mut ex = context.ex().await;
        let stored = db::get_session(&mut ex, session.access_token()).await.unwrap();
        assert_eq!(session, stored);
        assert_eq!(&username, stored.username());
        assert_eq!(now, stored.login_time());
        let user = db::get_user_by_username(&mut ex, &username).await.unwrap();
        assert_eq!(Some(now), user.last_login());
    }

    #[tokio::test]
    async fn test_login_ok_returning() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        let username = Username::from("hello");
        create_user_with_password(&context, &username, "password").await;

        let session1 =
            context.driver().login(username.clone(), Password::from("password")).await.unwrap();
        context.clock.advance(Duration::from_secs(60));
        let session2 =
            context.driver().login(username.clone(), Password::from("password")).await.unwrap();
        assert_ne!(session1.access_token(), session2.access_token());

        let user = db::get_user_by_username(&mut context.ex().await, &username).await.unwrap();
        assert_eq!(Some(session2.login_time()), user.last_login());
    }

    #[tokio::test]
    async fn test_login_unknown_user() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        match context.driver().login(Username::from("foo"), Password::from("bar")).await {
            Err(DriverError::Unauthorized(msg)) => assert!(msg.contains("Unknown user")),
            e => panic!("{:?}", e),
        }
    }

    #[tokio::test]
    async fn test_login_invalid_password() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        let username = Username::from("hello");
        create_user_with_password(&context, &username, "ABC").await;

        match context.driver().login(username, Password::from("abc")).await {
            Err(DriverError::Unauthorized(msg)) => assert!(msg.contains("Invalid password")),
            e => panic!("{:?}", e),
        }
    }

    #[tokio::test]
    async fn test_login_not_allowed() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        let username = Username::from("hello");
        db::create_user(
            &mut context.ex().await,
            username.clone(),
            None,
            Some(EmailAddress::from("some@example.com")),
            None,
        )
        .await
        .unwrap();

        match context.driver().login(username, Password::from("irrelevant")).await {
            Err(DriverError::Unauthorized(msg)) => assert!(msg.contains("Login not allowed")),
            e => panic!("{:?}", e),
        }
    }

    #[tokio::test]
    async fn test_login_not_activated() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        let username = Username::from("hello");
        create_user_with_password(&context, &username, "password").await;
        let mut ex = context.ex().await;
        let user = db::get_user_by_username(&mut ex, &username).await.unwrap();
        db::set_user_activation_code(&mut ex, user, Some(50)).await.unwrap();

        match context.driver().login(username, Password::from("password")).await {
            Err(DriverError::NotActivated) => (),
            e => panic!("{:?}", e),
        }
    }
}
