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

//! API to request a one-time login code.

use crate::driver::AuthnDriver;
use crate::model::Contact;
use axum::extract::State;
use iii_iv_core::rest::{JsonBody, RestResult};
use serde::{Deserialize, Serialize};

/// Message sent to the server to request a one-time login code.
#[derive(Deserialize, Serialize)]
pub struct OtpRequest {
    /// Email address or phone number that will receive the code.  An account is registered for
    /// this contact if it did not exist yet.
    pub contact: Contact,
}

/// POST handler for this API.
pub(crate) async fn handler(
    State(driver): State<AuthnDriver>,
    JsonBody(request): JsonBody<OtpRequest>,
) -> RestResult<()> {
    driver.otp_request(request.contact).await?;
    Ok(())
}
