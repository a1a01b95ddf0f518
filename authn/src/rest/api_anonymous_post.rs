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

//! API to create a session for a new anonymous user.

use crate::driver::AuthnDriver;
use crate::model::AccessToken;
use axum::Json;
use axum::extract::State;
use iii_iv_core::model::Username;
use iii_iv_core::rest::{EmptyBody, RestResult};
use serde::{Deserialize, Serialize};

/// Message returned by the server after creating an anonymous session.
#[derive(Debug, Deserialize, Serialize)]
pub struct AnonymousSessionResponse {
    /// Generated name of the anonymous user.
    pub username: Username,

    /// Access token for this session.
    pub access_token: AccessToken,
}

/// POST handler for this API.
pub(crate) async fn handler(
    State(driver): State<AuthnDriver>,
    _: EmptyBody,
) -> RestResult<Json<AnonymousSessionResponse>> {
    let session = driver.create_anonymous_session().await?;
    let username = session.username().clone();
    let response = AnonymousSessionResponse { username, access_token: session.take_access_token() };
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::testutils::*;
    use axum::http;
    use iii_iv_core::rest::testutils::OneShotBuilder;
    use iii_iv_core::test_payload_must_be_empty;

    fn route() -> (http::Method, String) {
        (http::Method::POST, "/api/test/anonymous".to_owned())
    }

    #[tokio::test]
    async fn test_ok() {
        let context = TestContextBuilder::new().build().await;

        let response = OneShotBuilder::new(context.app(), route())
            .send_empty()
            .await
            .expect_json::<AnonymousSessionResponse>()
            .await;

        assert!(context.session_exists(&response.access_token).await);
        assert!(context.user_is_active(&response.username).await);

        let user = context.authn.driver().get_session(response.access_token).await.unwrap();
        assert_eq!(&response.username, user.username());
        assert!(user.is_anonymous());
    }

    #[tokio::test]
    async fn test_each_call_creates_a_user() {
        let context = TestContextBuilder::new().build().await;

        let mut usernames = vec![];
        for _ in 0..3 {
            let response = OneShotBuilder::new(context.app(), route())
                .send_empty()
                .await
                .expect_json::<AnonymousSessionResponse>()
                .await;
            assert!(context.user_exists(&response.username).await);
            usernames.push(response.username);
        }
        usernames.sort();
        usernames.dedup();
        assert_eq!(3, usernames.len());
    }

    test_payload_must_be_empty!(TestContextBuilder::new().build().await.into_app(), route());
}
