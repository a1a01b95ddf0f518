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

//! Test utilities for the REST API.

use crate::driver::testutils::TestContext as DriverTestContext;
use crate::rest::api_routes;
use crate::rest::note_put::NoteRequest;
use axum::Router;
use axum::http;
use iii_iv_authn::driver::AuthnOptions;
use iii_iv_authn::driver::testutils::TestContext as AuthnTestContext;
use iii_iv_authn::model::AccessToken;
use iii_iv_core::model::Username;
use iii_iv_core::rest::build_router;
use iii_iv_core::rest::testutils::OneShotBuilder;

/// State of a running test.
pub(crate) struct TestContext {
    /// Driver-level test state, which gives access to the backing services.
    pub(crate) notes: DriverTestContext,

    /// Authentication test state sharing the database and clock of `notes`.
    authn: AuthnTestContext,

    /// Router serving the notes API under `/api`.
    app: Router,
}

impl TestContext {
    /// Initializes the notes API backed by an in-memory database.
    pub(crate) async fn setup() -> Self {
        let notes = DriverTestContext::setup().await;
        let authn = AuthnTestContext::setup_with(
            AuthnOptions::default(),
            notes.db.clone(),
            notes.clock.clone(),
            "notes-test",
        )
        .await;
        let app = build_router(api_routes(notes.driver(), authn.driver(), "/api").unwrap(), &[]);
        Self { notes, authn, app }
    }

    /// Gets a clone of the app router.
    pub(crate) fn app(&self) -> Router {
        self.app.clone()
    }

    /// Consumes the context and transforms it into the app router.
    pub(crate) fn into_app(self) -> Router {
        self.app
    }

    /// Creates an active user called `username` and logs them in.
    pub(crate) async fn login(&self, username: &'static str) -> AccessToken {
        self.authn.do_test_login(Username::from(username)).await
    }

    /// Creates the note `id` with `text` via the API on behalf of the owner of `token`.
    pub(crate) async fn create_note(&self, token: &AccessToken, id: &str, text: &str) {
        OneShotBuilder::new(self.app(), (http::Method::PUT, format!("/api/notes/{}", id)))
            .with_bearer_auth(token.as_str())
            .send_json(NoteRequest { text: text.to_owned() })
            .await
            .expect_status(http::StatusCode::CREATED)
            .take_response()
            .await;
    }
}
