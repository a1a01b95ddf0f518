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

//! Utilities to send canned messages to users over email.

use crate::driver::DriverResult;
use iii_iv_core::driver::DriverError;
use iii_iv_core::model::{EmailAddress, Username};
use iii_iv_core::rest::BaseUrls;
use iii_iv_smtp::driver::SmtpMailer;
use iii_iv_smtp::model::EmailTemplate;

/// Collection of email templates used by the authentication flows.
#[derive(Clone, Debug)]
pub struct AuthnTemplates {
    /// Template for the account activation email.  Receives the `activate_url` and `username`
    /// replacements.
    pub activation: EmailTemplate,

    /// Template for the password reset email.  Receives the `code` and `username` replacements.
    pub password_reset: EmailTemplate,

    /// Template for the one-time login email.  Receives the `code` replacement.
    pub otp: EmailTemplate,
}

/// Sends the activation code `code` for `username` to the given `email` address.
///
/// The email contents are constructed from the `template` and are sent via `mailer`.
/// `base_urls` is used to compute the address to the account activation endpoint.
pub(super) async fn send_activation_code(
    mailer: &(dyn SmtpMailer + Send + Sync),
    template: &EmailTemplate,
    base_urls: &BaseUrls,
    username: &Username,
    email: &EmailAddress,
    code: u64,
) -> DriverResult<()> {
    // TODO(jmmv): This doesn't really belong here because it's leaking details about the REST
    // router into the driver.
    let activate_url = base_urls
        .make_backend_url(&format!("api/users/{}/activate?code={}", username.as_str(), code))
        .map_err(DriverError::BackendError)?;

    let replacements = [("activate_url", activate_url.as_str()), ("username", username.as_str())];
    let message = template.apply(email, &replacements)?;

    mailer.send(message).await
}

/// Sends the password reset `code` for `username` to the given `email` address.
pub(super) async fn send_password_reset_code(
    mailer: &(dyn SmtpMailer + Send + Sync),
    template: &EmailTemplate,
    username: &Username,
    email: &EmailAddress,
    code: u64,
) -> DriverResult<()> {
    let code = code.to_string();
    let replacements = [("code", code.as_str()), ("username", username.as_str())];
    let message = template.apply(email, &replacements)?;

    mailer.send(message).await
}

/// Sends the one-time login `code` to the given `email` address.
pub(super) async fn send_otp_code(
    mailer: &(dyn SmtpMailer + Send + Sync),
    template: &EmailTemplate,
    email: &EmailAddress,
    code: u64,
) -> DriverResult<()> {
    let code = code.to_string();
    let message = template.apply(email, &[("code", code.as_str())])?;

    mailer.send(message).await
}

#[cfg(any(test, feature = "testutils"))]
pub(crate) mod testutils {
    use super::*;
    use iii_iv_smtp::driver::testutils::RecorderSmtpMailer;
    use iii_iv_smtp::model::testutils::parse_message;
    use url::Url;

    /// Creates a set of templates whose bodies only contain the interesting replacement so that
    /// tests can easily extract it.
    pub(crate) fn make_test_templates() -> AuthnTemplates {
        AuthnTemplates {
            activation: EmailTemplate::new("from@example.com", "Test activation", "%activate_url%")
                .unwrap(),
            password_reset: EmailTemplate::new(
                "from@example.com",
                "Test password reset",
                "%code%",
            )
            .unwrap(),
            otp: EmailTemplate::new("from@example.com", "Test login code", "%code%").unwrap(),
        }
    }

    /// Gets the body of the latest message sent to `to` with the given `subject`, if any.
    async fn get_latest_body(
        mailer: &RecorderSmtpMailer,
        to: &EmailAddress,
        subject: &str,
    ) -> Option<String> {
        mailer.messages_to(to).await.iter().rev().find_map(|message| {
            let (headers, body) = parse_message(message);
            if headers.get("Subject").map(String::as_str) == Some(subject) {
                Some(body)
            } else {
                None
            }
        })
    }

    /// Gets the latest activation URL sent to `to` which, if any, should be for the username
    /// given in `exp_username`.
    pub(crate) async fn get_latest_activation_url(
        mailer: &RecorderSmtpMailer,
        to: &EmailAddress,
        exp_username: &Username,
    ) -> Option<Url> {
        let body = get_latest_body(mailer, to, "Test activation").await?;
        let url = Url::parse(&body).expect("Email was not built by make_test_templates");
        assert!(url.as_str().contains(&format!("api/users/{}/", exp_username.as_str())));
        Some(url)
    }

    /// Gets the latest activation code sent to `to` which, if any, should be for the username
    /// given in `exp_username`.
    pub(crate) async fn get_latest_activation_code(
        mailer: &RecorderSmtpMailer,
        to: &EmailAddress,
        exp_username: &Username,
    ) -> Option<u64> {
        let activation_url = get_latest_activation_url(mailer, to, exp_username).await;
        activation_url.map(|url| {
            url.as_str()
                .split_once('=')
                .map(|(_, code)| {
                    str::parse(code).expect("Want only one numerical parameter in query string")
                })
                .expect("No parameter found in query string")
        })
    }

    /// Gets the latest password reset code sent to `to`, if any.
    pub(crate) async fn get_latest_password_reset_code(
        mailer: &RecorderSmtpMailer,
        to: &EmailAddress,
    ) -> Option<u64> {
        get_latest_body(mailer, to, "Test password reset")
            .await
            .map(|body| body.trim().parse().expect("Body should only contain the code"))
    }

    /// Gets the latest one-time login code sent to `to`, if any.
    pub(crate) async fn get_latest_otp_code(
        mailer: &RecorderSmtpMailer,
        to: &EmailAddress,
    ) -> Option<u64> {
        get_latest_body(mailer, to, "Test login code")
            .await
            .map(|body| body.trim().parse().expect("Body should only contain the code"))
    }
}
