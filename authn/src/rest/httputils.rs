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

//! Utilities to deal with HTTP authorization.

use crate::model::{AccessToken, Password};
use base64::Engine;
use base64::engine::general_purpose;
use http::header::HeaderMap;
use iii_iv_core::model::Username;
use iii_iv_core::rest::{RestError, RestResult, get_unique_header};

/// Builds the error returned when the credentials for `scheme` in `realm` are unusable.
fn challenge<M: Into<String>>(scheme: &'static str, realm: &'static str, message: M) -> RestError {
    RestError::Unauthorized { scheme, realm, message: message.into() }
}

/// Validates that the `Authorization` HTTP header contains a textual payload for the
/// `exp_scheme` scheme and returns it.
fn get_authorization_header<'a>(
    headers: &'a HeaderMap,
    exp_scheme: &'static str,
    exp_realm: &'static str,
) -> RestResult<&'a str> {
    let fail = |message: String| challenge(exp_scheme, exp_realm, message);

    let authz = get_unique_header(headers, "Authorization")
        .map_err(|e| fail(e.to_string()))?
        .ok_or_else(|| fail("Missing Authorization header".to_owned()))?;
    let authz = authz
        .to_str()
        .map_err(|e| fail(format!("Bad encoding in Authorization header: {}", e)))?;

    let (scheme, payload) = match authz.split_once(' ') {
        Some((scheme, payload)) if !scheme.is_empty() => (scheme, payload),
        None if !authz.is_empty() => {
            return Err(fail("Bad Authorization header: missing payload".to_owned()));
        }
        _ => return Err(fail("Bad Authorization header: missing scheme".to_owned())),
    };
    if scheme != exp_scheme {
        return Err(fail("Unsupported scheme".to_owned()));
    }

    Ok(payload)
}

/// Assumes that the `headers` contain basic authentication credentials and extracts them.
pub fn get_basic_auth(
    headers: &HeaderMap,
    exp_realm: &'static str,
) -> RestResult<(Username, Password)> {
    let fail = |message: String| challenge("Basic", exp_realm, message);

    let encoded = get_authorization_header(headers, "Basic", exp_realm)?;
    let decoded = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| fail(format!("Bad base64 encoding in payload: {}", e)))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|e| fail(format!("Bad UTF-8 encoding in payload: {}", e)))?;

    // Passwords may contain colons but usernames cannot.
    let (username, password) =
        decoded.split_once(':').ok_or_else(|| fail("Bad content".to_owned()))?;

    Ok((Username::new(username)?, Password::new(password)?))
}

/// Checks if the request carries bearer credentials.
///
/// A missing `Authorization` header is not an error, but a header for any other scheme is.
pub fn has_bearer_auth(headers: &HeaderMap, exp_realm: &'static str) -> RestResult<bool> {
    match get_unique_header(headers, "Authorization") {
        Ok(None) => Ok(false),
        _ => get_authorization_header(headers, "Bearer", exp_realm).map(|_| true),
    }
}

/// Assumes that the `headers` contain a bearer access token and extracts it.
pub fn get_bearer_auth(headers: &HeaderMap, exp_realm: &'static str) -> RestResult<AccessToken> {
    let payload = get_authorization_header(headers, "Bearer", exp_realm)?;
    AccessToken::new(payload).map_err(|e| challenge("Bearer", exp_realm, e.to_string()))
}
