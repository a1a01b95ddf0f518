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

//! API to create a new session for an existing user.

use crate::driver::AuthnDriver;
use crate::model::AccessToken;
use crate::rest::get_basic_auth;
use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use iii_iv_core::rest::{EmptyBody, RestResult};
use serde::{Deserialize, Serialize};

/// Message returned by the server after a successful login attempt.
#[derive(Debug, Deserialize, Serialize)]
pub struct LoginResponse {
    /// Access token for this session.
    pub access_token: AccessToken,
}

/// POST handler for this API.
pub(crate) async fn handler(
    State(driver): State<AuthnDriver>,
    headers: HeaderMap,
    _: EmptyBody,
) -> RestResult<Json<LoginResponse>> {
    let (username, password) = get_basic_auth(&headers, driver.realm())?;

    let session = driver.login(username, password).await?;
    let response = LoginResponse { access_token: session.take_access_token() };

    Ok(Json(response))
}
