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

//! API to request a password reset code by email.

use crate::driver::AuthnDriver;
use axum::extract::State;
use iii_iv_core::model::EmailAddress;
use iii_iv_core::rest::{JsonBody, RestResult};
use serde::{Deserialize, Serialize};

/// Message sent to the server to request a password reset.
#[derive(Deserialize, Serialize)]
pub struct PasswordResetRequest {
    /// Email address of the account to recover.
    pub email: EmailAddress,
}

/// POST handler for this API.
///
/// Succeeds even if no account is registered with the given email address.
pub(crate) async fn handler(
    State(driver): State<AuthnDriver>,
    JsonBody(request): JsonBody<PasswordResetRequest>,
) -> RestResult<()> {
    driver.request_password_reset(request.email).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::testutils::*;
    use axum::http;
    use iii_iv_core::rest::testutils::OneShotBuilder;
    use iii_iv_core::test_payload_must_be_json;

    fn route() -> (http::Method, String) {
        (http::Method::POST, "/api/test/password-reset".to_owned())
    }

    #[tokio::test]
    async fn test_ok() {
        let context = TestContextBuilder::new().build().await;
        context.create_whoami_user().await;

        let request = PasswordResetRequest { email: context.whoami_email() };
        OneShotBuilder::new(context.app(), route()).send_json(request).await.expect_empty().await;

        let code = context.authn.get_latest_password_reset_code(&context.whoami_email()).await;
        assert!(code.is_some());
    }

    #[tokio::test]
    async fn test_unknown_email() {
        let context = TestContextBuilder::new().build().await;

        let request = PasswordResetRequest { email: "nobody@example.com".into() };
        OneShotBuilder::new(context.app(), route()).send_json(request).await.expect_empty().await;

        context.authn.mailer.expect_no_messages().await;
    }

    test_payload_must_be_json!(TestContextBuilder::new().build().await.into_app(), route());
}
