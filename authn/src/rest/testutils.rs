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

//! Utilities to help testing services that integrate with the `authn` REST interface.

use crate::db;
use crate::model::{AccessToken, Password, User};
use crate::rest::LoginResponse;
use axum::Router;
use iii_iv_core::db::Executor;
use iii_iv_core::model::{EmailAddress, Username};
use iii_iv_core::rest::testutils::OneShotBuilder;
use time::macros::datetime;

#[cfg(test)]
use {
    crate::driver::AuthnOptions,
    crate::driver::testutils::TestContext as DriverTestContext,
    crate::rest::api_routes,
    iii_iv_core::db::DbError,
    iii_iv_core::rest::build_router,
};

/// Creates an active test user by directly modifying the backing database.
pub async fn create_test_user(
    ex: &mut Executor,
    username: Username,
    password: Password,
    email: EmailAddress,
) -> User {
    let password = password.validate_and_hash(|_| None).unwrap();

    let user =
        db::create_user(ex, username.clone(), Some(password), Some(email), None).await.unwrap();
    let last_login = datetime!(2023-01-01 00:00:00 UTC);
    db::update_user_last_login(ex, &username, last_login).await.unwrap();
    user.with_last_login(last_login)
}

/// Logs the `username` in with `password` and returns the access token for the session.
///
/// The `app` is a REST router serving the `authn` interface under the `base` prefix.
pub async fn do_test_login(
    app: Router,
    base: &str,
    username: &Username,
    password: &Password,
) -> AccessToken {
    let response = OneShotBuilder::new(app, (http::Method::POST, &format!("{}/login", base)))
        .with_basic_auth(username.as_str(), password.as_str())
        .send_empty()
        .await
        .expect_json::<LoginResponse>()
        .await;
    response.access_token
}

/// State of a running test.
#[cfg(test)]
pub(crate) struct TestContext {
    /// Driver-level test state, which gives access to the recorded messages.
    pub(crate) authn: DriverTestContext,

    /// Router serving the authentication API under `/api/test`.
    app: Router,

    /// Name of the user that issues requests in the test.  Need not be valid.
    whoami: String,

    /// Password of the `whoami` user.
    whoami_password: Password,
}

#[cfg(test)]
impl TestContext {
    /// Creates the `whoami` user by directly modifying the backing database. The user is marked
    /// as active.
    pub(crate) async fn create_whoami_user(&self) -> User {
        create_test_user(
            &mut self.authn.ex().await,
            Username::new(self.whoami.clone()).unwrap(),
            self.whoami_password.clone(),
            EmailAddress::new(format!("{}@example.com", self.whoami)).unwrap(),
        )
        .await
    }

    /// Creates the `whoami` user by directly modifying the backing database. The user is marked
    /// as inactive with a pending activation `code`.
    pub(crate) async fn create_inactive_whoami_user(&self, code: u64) -> User {
        let user = self.create_whoami_user().await;
        assert!(user.activation_code().is_none());

        db::set_user_activation_code(&mut self.authn.ex().await, user, Some(code)).await.unwrap()
    }

    /// Consumes the context and transforms it into the app router.
    pub(crate) fn into_app(self) -> Router {
        self.app
    }

    /// Gets a clone of the app router.
    pub(crate) fn app(&self) -> Router {
        self.app.clone()
    }

    /// Checks if the user with `username` exists by directly querying the backing database.
    pub(crate) async fn user_exists(&self, username: &Username) -> bool {
        match db::get_user_by_username(&mut self.authn.ex().await, username).await {
            Ok(_) => true,
            Err(DbError::NotFound) => false,
            Err(e) => panic!("{:?}", e),
        }
    }

    /// Checks if the user with `username` exists and is active by directly querying the backing
    /// database.
    pub(crate) async fn user_is_active(&self, username: &Username) -> bool {
        let user =
            db::get_user_by_username(&mut self.authn.ex().await, username).await.unwrap();
        user.is_active()
    }

    /// Checks if the session with `token` exists by directly querying the backing database.
    pub(crate) async fn session_exists(&self, token: &AccessToken) -> bool {
        match db::get_session(&mut self.authn.ex().await, token).await {
            Ok(_) => true,
            Err(DbError::NotFound) => false,
            Err(e) => panic!("{:?}", e),
        }
    }

    /// Logs the `whoami` user in and returns its access token.
    pub(crate) async fn access_token(&self) -> AccessToken {
        do_test_login(self.app.clone(), "/api/test", &self.whoami(), &self.whoami_password).await
    }

    /// Returns the "who am I" identifier of the running test. Panics if this context was built
    /// with an invalid value using the `TestContextBuilder::with_whoami` method.
    pub(crate) fn whoami(&self) -> Username {
        Username::new(&self.whoami).expect("Cannot query invalid whoami")
    }

    /// Returns the email address of the "who am I" user.
    pub(crate) fn whoami_email(&self) -> EmailAddress {
        EmailAddress::new(format!("{}@example.com", self.whoami)).unwrap()
    }

    /// Returns the password generated for the "who am I" user of the running test.
    pub(crate) fn whoami_password(&self) -> &Password {
        &self.whoami_password
    }
}

/// Builder pattern for the test context.
#[cfg(test)]
#[must_use]
pub(crate) struct TestContextBuilder {
    /// Name of the user that issues requests in the test.
    whoami: String,

    /// HTML to return on successful activations, if not the default.
    activated_template: Option<&'static str>,
}

#[cfg(test)]
impl TestContextBuilder {
    /// Initializes a new builder with the default test settings.
    pub(crate) fn new() -> Self {
        Self { whoami: "whoami".to_owned(), activated_template: None }
    }

    /// Overrides the default activated template.
    pub(crate) fn with_activated_template(mut self, template: &'static str) -> Self {
        self.activated_template = Some(template);
        self
    }

    /// Overrides the default test user's identifier.  The identifier needn't be valid.
    pub(crate) fn with_whoami<S: Into<String>>(mut self, whoami: S) -> Self {
        self.whoami = whoami.into();
        self
    }

    /// Sets up the test environment with the configured settings.
    pub(crate) async fn build(self) -> TestContext {
        let authn = DriverTestContext::setup(AuthnOptions::default()).await;

        let routes = api_routes(authn.driver(), "/api/test", self.activated_template).unwrap();
        let app = build_router(routes, &[]);

        let whoami_password =
            Password::new(format!("random0{}", iii_iv_core::random::alphanumeric(8))).unwrap();

        TestContext { authn, app, whoami: self.whoami, whoami_password }
    }
}
