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

//! REST interface to manage permissions.
//!
//! These endpoints perform no authentication of their own, so services should only mount them
//! where the caller is trusted to administer permissions.

use crate::driver::AclDriver;
use crate::model::{Action, Grantee, Resource};
use axum::http::Method;
use iii_iv_core::rest::{RestResult, Route};
use std::str::FromStr;

mod permission_delete;
mod permission_get;
pub use permission_get::HasPermissionResponse;
mod permission_put;
mod permissions_get;
#[cfg(test)]
mod testutils;

/// Parses the raw path components that identify a permission.
fn parse_permission_path(
    grantee: String,
    resource: String,
    action: String,
) -> RestResult<(Grantee, Resource, Action)> {
    let grantee = Grantee::new(grantee)?;
    let resource = Resource::new(resource)?;
    let action = Action::from_str(&action)?;
    Ok((grantee, resource, action))
}

/// Creates the routes to manage permissions mounted under `prefix`, which should not have a
/// trailing slash.
///
/// Resource names that contain slashes must be percent-encoded in the request path.
pub fn api_routes(driver: AclDriver, prefix: &str) -> Result<Vec<Route>, String> {
    let one = format!("{}/permissions/{{grantee}}/{{resource}}/{{action}}", prefix);
    Ok(vec![
        Route::with_state(
            &format!("{}/permissions/{{grantee}}", prefix),
            &[Method::GET],
            permissions_get::handler,
            driver.clone(),
        )?,
        Route::with_state(&one, &[Method::GET], permission_get::handler, driver.clone())?,
        Route::with_state(&one, &[Method::PUT], permission_put::handler, driver.clone())?,
        Route::with_state(&one, &[Method::DELETE], permission_delete::handler, driver)?,
    ])
}
