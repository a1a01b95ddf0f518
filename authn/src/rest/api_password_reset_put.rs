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

//! API to set a new password using a previously-requested reset code.

use crate::driver::AuthnDriver;
use crate::model::Password;
use axum::extract::State;
use iii_iv_core::model::EmailAddress;
use iii_iv_core::rest::{JsonBody, RestResult};
use serde::{Deserialize, Serialize};

/// Message sent to the server to complete a password reset.
#[derive(Deserialize, Serialize)]
pub struct PasswordResetConfirmRequest {
    /// Email address of the account to recover.
    pub email: EmailAddress,

    /// Reset code delivered to `email`.
    pub code: u64,

    /// Replacement password.
    pub new_password: Password,
}

/// PUT handler for this API.
pub(crate) async fn handler(
    State(driver): State<AuthnDriver>,
    JsonBody(request): JsonBody<PasswordResetConfirmRequest>,
) -> RestResult<()> {
    driver.reset_password(request.email, request.code, request.new_password).await?;
    Ok(())
}
