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

//! API to create a new session using a one-time login code.

use crate::driver::AuthnDriver;
use crate::model::Contact;
use crate::rest::LoginResponse;
use axum::Json;
use axum::extract::State;
use iii_iv_core::rest::{JsonBody, RestResult};
use serde::{Deserialize, Serialize};

/// Message sent to the server to log in with a one-time code.
#[derive(Deserialize, Serialize)]
pub struct OtpLoginRequest {
    /// Email address or phone number that received the code.
    pub contact: Contact,

    /// One-time code delivered to `contact`.
    pub code: u64,
}

/// POST handler for this API.
pub(crate) async fn handler(
    State(driver): State<AuthnDriver>,
    JsonBody(request): JsonBody<OtpLoginRequest>,
) -> RestResult<Json<LoginResponse>> {
    let session = driver.otp_login(request.contact, request.code).await?;
    let response = LoginResponse { access_token: session.take_access_token() };
    Ok(Json(response))
}
