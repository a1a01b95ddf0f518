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

//! API to fetch a note.

use crate::driver::Driver;
use crate::model::NoteId;
use crate::rest::NoteResponse;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use iii_iv_authn::driver::AuthnDriver;
use iii_iv_authn::rest::get_session_user;
use iii_iv_core::rest::{EmptyBody, RestResult};

/// GET handler for this API.
pub(crate) async fn handler(
    State((driver, authn)): State<(Driver, AuthnDriver)>,
    Path(id): Path<String>,
    headers: HeaderMap,
    _: EmptyBody,
) -> RestResult<Json<NoteResponse>> {
    let id = NoteId::new(id)?;
    let user = get_session_user(&authn, &headers).await?;

    let note = driver.clone().get_note(user.username(), &id).await?;
    let tags = driver.get_note_tags(&id).await?;

    Ok(Json(NoteResponse::new(note, Some(tags))?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::testutils::*;
    use axum::http;
    use iii_iv_core::rest::testutils::OneShotBuilder;
    use iii_iv_core::test_payload_must_be_empty;

    fn route(id: &str) -> (http::Method, String) {
        (http::Method::GET, format!("/api/notes/{}", id))
    }

    #[tokio::test]
    async fn test_ok_with_tags() {
        let context = TestContext::setup().await;
        let token = context.login("alice").await;
        context.create_note(&token, "n1", "Remember the #milk").await;
        context.notes.run_tasks().await;

        let response = OneShotBuilder::new(context.app(), route("n1"))
            .with_bearer_auth(token.as_str())
            .send_empty()
            .await
            .expect_json::<NoteResponse>()
            .await;
        let exp_response = NoteResponse {
            id: "n1".to_owned(),
            owner: "alice".to_owned(),
            text: "Remember the #milk".to_owned(),
            updated: "2023-06-01T10:00:00Z".to_owned(),
            tags: Some(vec!["milk".to_owned()]),
        };
        assert_eq!(exp_response, response);
    }

    #[tokio::test]
    async fn test_denied() {
        let context = TestContext::setup().await;
        let alice = context.login("alice").await;
        context.create_note(&alice, "n1", "Private").await;
        let bob = context.login("bob").await;

        OneShotBuilder::new(context.app(), route("n1"))
            .with_bearer_auth(bob.as_str())
            .send_empty()
            .await
            .expect_status(http::StatusCode::FORBIDDEN)
            .expect_error("bob is not allowed to READ notes/n1")
            .await;
    }

    #[tokio::test]
    async fn test_not_logged_in() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), route("n1"))
            .send_empty()
            .await
            .expect_status(http::StatusCode::UNAUTHORIZED)
            .expect_error("Missing Authorization")
            .await;
    }

    test_payload_must_be_empty!(TestContext::setup().await.into_app(), route("n1"));
}
