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

//! API to change the password of the logged-in user.

use crate::driver::AuthnDriver;
use crate::model::Password;
use crate::rest::get_session_user;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use iii_iv_core::model::Username;
use iii_iv_core::rest::{JsonBody, RestError, RestResult};
use serde::{Deserialize, Serialize};

/// Message sent to the server to change the password of a user.
#[derive(Deserialize, Serialize)]
pub struct ChangePasswordRequest {
    /// Current password, to confirm that the user knows it.
    pub old_password: Password,

    /// Replacement password.
    pub new_password: Password,
}

/// PUT handler for this API.
pub(crate) async fn handler(
    State(driver): State<AuthnDriver>,
    Path(user): Path<String>,
    headers: HeaderMap,
    JsonBody(request): JsonBody<ChangePasswordRequest>,
) -> RestResult<()> {
    let user = Username::new(user)?;

    let session_user = get_session_user(&driver, &headers).await?;
    if session_user.username() != &user {
        return Err(RestError::Forbidden("Cannot change the password of another user".to_owned()));
    }

    driver.change_password(user, request.old_password, request.new_password).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::testutils::*;
    use axum::http;
    use iii_iv_core::rest::testutils::OneShotBuilder;
    use iii_iv_core::test_payload_must_be_json;

    fn route(username: &str) -> (http::Method, String) {
        (http::Method::PUT, format!("/api/test/users/{}/password", username))
    }

    #[tokio::test]
    async fn test_ok() {
        let context = TestContextBuilder::new().build().await;
        context.create_whoami_user().await;
        let token = context.access_token().await;

        let request = ChangePasswordRequest {
            old_password: context.whoami_password().clone(),
            new_password: "Other1234Password".into(),
        };
        OneShotBuilder::new(context.app(), route(context.whoami().as_str()))
            .with_bearer_auth(token.as_str())
            .send_json(request)
            .await
            .expect_empty()
            .await;

        let new_password = Password::from("Other1234Password");
        do_test_login(context.app(), "/api/test", &context.whoami(), &new_password).await;
    }

    #[tokio::test]
    async fn test_wrong_old_password() {
        let context = TestContextBuilder::new().build().await;
        context.create_whoami_user().await;
        let token = context.access_token().await;

        let request = ChangePasswordRequest {
            old_password: "Not1234ThePassword".into(),
            new_password: "Other1234Password".into(),
        };
        OneShotBuilder::new(context.app(), route(context.whoami().as_str()))
            .with_bearer_auth(token.as_str())
            .send_json(request)
            .await
            .expect_status(http::StatusCode::FORBIDDEN)
            .expect_error("Invalid password")
            .await;
    }

    #[tokio::test]
    async fn test_weak_new_password() {
        let context = TestContextBuilder::new().build().await;
        context.create_whoami_user().await;
        let token = context.access_token().await;

        let request = ChangePasswordRequest {
            old_password: context.whoami_password().clone(),
            new_password: "weak".into(),
        };
        OneShotBuilder::new(context.app(), route(context.whoami().as_str()))
            .with_bearer_auth(token.as_str())
            .send_json(request)
            .await
            .expect_status(http::StatusCode::BAD_REQUEST)
            .expect_error("Weak password")
            .await;
    }

    #[tokio::test]
    async fn test_other_user() {
        let context = TestContextBuilder::new().build().await;
        context.create_whoami_user().await;
        let token = context.access_token().await;

        let request = ChangePasswordRequest {
            old_password: context.whoami_password().clone(),
            new_password: "Other1234Password".into(),
        };
        OneShotBuilder::new(context.app(), route("someone-else"))
            .with_bearer_auth(token.as_str())
            .send_json(request)
            .await
            .expect_status(http::StatusCode::FORBIDDEN)
            .expect_error("another user")
            .await;
    }

    #[tokio::test]
    async fn test_not_logged_in() {
        let context = TestContextBuilder::new().build().await;
        context.create_whoami_user().await;

        let request = ChangePasswordRequest {
            old_password: context.whoami_password().clone(),
            new_password: "Other1234Password".into(),
        };
        OneShotBuilder::new(context.app(), route(context.whoami().as_str()))
            .send_json(request)
            .await
            .expect_status(http::StatusCode::UNAUTHORIZED)
            .expect_error("Missing Authorization")
            .await;
    }

    test_payload_must_be_json!(TestContextBuilder::new().build().await.into_app(), route("a"));
}
