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

//! REST interface for a generic authentication service.

use crate::driver::AuthnDriver;
use crate::model::User;
use axum::http::{HeaderMap, Method};
use iii_iv_core::rest::{Route, RestResult};
use std::sync::Arc;

mod api_activate_get;
pub use api_activate_get::ActivateRequest;
mod api_activate_resend_post;
mod api_anonymous_post;
pub use api_anonymous_post::AnonymousSessionResponse;
mod api_login_post;
pub use api_login_post::LoginResponse;
mod api_logout_post;
mod api_otp_login_post;
pub use api_otp_login_post::OtpLoginRequest;
mod api_otp_post;
pub use api_otp_post::OtpRequest;
mod api_password_put;
pub use api_password_put::ChangePasswordRequest;
mod api_password_reset_post;
pub use api_password_reset_post::PasswordResetRequest;
mod api_password_reset_put;
pub use api_password_reset_put::PasswordResetConfirmRequest;
mod api_signup_post;
pub use api_signup_post::SignupRequest;
mod httputils;
pub use httputils::{get_basic_auth, get_bearer_auth, has_bearer_auth};
#[cfg(any(test, feature = "testutils"))]
pub mod testutils;

/// Extracts the bearer token from `headers` and returns the user that owns the session.
///
/// This is the entry point for other services to authenticate their requests.
pub async fn get_session_user(driver: &AuthnDriver, headers: &HeaderMap) -> RestResult<Arc<User>> {
    let token = get_bearer_auth(headers, driver.realm())?;
    Ok(driver.get_session(token).await?)
}

/// Creates the routes for the authentication endpoints mounted under `prefix`, which should
/// not have a trailing slash.
///
/// The `driver` is a configured instance of the `AuthnDriver` to handle accounts.
///
/// The `activated_template` HTML template is used when confirming the successful activation of
/// a new account.
pub fn api_routes(
    driver: AuthnDriver,
    prefix: &str,
    activated_template: Option<&'static str>,
) -> Result<Vec<Route>, String> {
    Ok(vec![
        Route::with_state(
            &format!("{}/signup", prefix),
            &[Method::POST],
            api_signup_post::handler,
            driver.clone(),
        )?,
        Route::with_state(
            &format!("{}/users/{{user}}/activate", prefix),
            &[Method::GET],
            api_activate_get::handler,
            (driver.clone(), activated_template),
        )?,
        Route::with_state(
            &format!("{}/users/{{user}}/activate/resend", prefix),
            &[Method::POST],
            api_activate_resend_post::handler,
            driver.clone(),
        )?,
        Route::with_state(
            &format!("{}/anonymous", prefix),
            &[Method::POST],
            api_anonymous_post::handler,
            driver.clone(),
        )?,
        Route::with_state(
            &format!("{}/login", prefix),
            &[Method::POST],
            api_login_post::handler,
            driver.clone(),
        )?,
        Route::with_state(
            &format!("{}/users/{{user}}/logout", prefix),
            &[Method::POST],
            api_logout_post::handler,
            driver.clone(),
        )?,
        Route::with_state(
            &format!("{}/users/{{user}}/password", prefix),
            &[Method::PUT],
            api_password_put::handler,
            driver.clone(),
        )?,
        Route::with_state(
            &format!("{}/password-reset", prefix),
            &[Method::POST],
            api_password_reset_post::handler,
            driver.clone(),
        )?,
        Route::with_state(
            &format!("{}/password-reset", prefix),
            &[Method::PUT],
            api_password_reset_put::handler,
            driver.clone(),
        )?,
        Route::with_state(
            &format!("{}/otp", prefix),
            &[Method::POST],
            api_otp_post::handler,
            driver.clone(),
        )?,
        Route::with_state(
            &format!("{}/otp/login", prefix),
            &[Method::POST],
            api_otp_login_post::handler,
            driver,
        )?,
    ])
}
