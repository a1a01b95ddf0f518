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

//! Extends the driver with sessions for anonymous users.

use crate::db;
use crate::driver::AuthnDriver;
use crate::driver::login::start_session;
use crate::model::Session;
use iii_iv_core::driver::DriverResult;
use iii_iv_core::model::Username;
use log::info;

impl AuthnDriver {
    /// Creates a new anonymous user with a generated name and starts a session for it.
    ///
    /// Anonymous users have no password nor contact details, so the returned session is the only
    /// way to act on their behalf.
    pub async fn create_anonymous_session(self) -> DriverResult<Session> {
        let mut tx = self.db.begin().await?;
        let now = self.clock.now_utc();

        let user = db::create_user(tx.ex(), Username::generate(), None, None, None).await?;
        let session = start_session(tx.ex(), user.username(), now).await?;
        info!("Created anonymous user {}", user.username().as_str());

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
    use iii_iv_core::driver::DriverError;

    #[tokio::test]
    async fn test_create_anonymous_session_ok() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        let session = context.driver().create_anonymous_session().await.unwrap();
        let username = session.username().clone();
        assert!(username.as_str().starts_with("u-"));

        let user = db::get_user_by_username(&mut context.ex().await, &username).await.unwrap();
        assert!(user.is_anonymous());
        assert!(user.is_active());
        assert_eq!(Some(session.login_time()), user.last_login());

        let whoami = context.driver().get_session(session.take_access_token()).await.unwrap();
        assert_eq!(&username, whoami.username());
        context.mailer.expect_no_messages().await;
    }

    #[tokio::test]
    async fn test_create_anonymous_session_distinct_users() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        let session1 = context.driver().create_anonymous_session().await.unwrap();
        let session2 = context.driver().create_anonymous_session().await.unwrap();
        assert_ne!(session1.username(), session2.username());
        assert_ne!(session1.access_token(), session2.access_token());
    }

    #[tokio::test]
    async fn test_anonymous_user_cannot_log_in() {
        let context = TestContext::setup(AuthnOptions::default()).await;

        let session = context.driver().create_anonymous_session().await.unwrap();
        let username = session.username().clone();

        match context.driver().login(username, Password::from("anything")).await {
            Err(DriverError::Unauthorized(msg)) => assert!(msg.contains("Login not allowed")),
            e => panic!("{:?}", e),
        }
    }
}
