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

//! API to revoke a permission from a grantee.

use crate::driver::AclDriver;
use crate::rest::parse_permission_path;
use axum::extract::{Path, State};
use iii_iv_core::rest::{EmptyBody, RestResult};

/// DELETE handler for this API.
pub(crate) async fn handler(
    State(driver): State<AclDriver>,
    Path((grantee, resource, action)): Path<(String, String, String)>,
    _: EmptyBody,
) -> RestResult<()> {
    let (grantee, resource, action) = parse_permission_path(grantee, resource, action)?;
    driver.revoke_permission(grantee, resource, action).await?;
    Ok(())
}
