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

//! API to check whether a grantee holds a permission.

use crate::driver::AclDriver;
use crate::rest::parse_permission_path;
use axum::Json;
use axum::extract::{Path, State};
use iii_iv_core::rest::{EmptyBody, RestResult};
use serde::{Deserialize, Serialize};

/// Message returned by the server after checking a permission.
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct HasPermissionResponse {
    /// Whether the permission is held, directly or through a role.
    pub allowed: bool,
}

/// GET handler for this API.
pub(crate) async fn handler(
    State(driver): State<AclDriver>,
    Path((grantee, resource, action)): Path<(String, String, String)>,
    _: EmptyBody,
) -> RestResult<Json<HasPermissionResponse>> {
    let (grantee, resource, action) = parse_permission_path(grantee, resource, action)?;
    let allowed = driver.has_permission(&grantee, &resource, action).await?;
    Ok(Json(HasPermissionResponse { allowed }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testutils::*;
    use crate::model::{Action, Grantee, RoleName};
    use crate::rest::testutils::*;
    use axum::http;
    use iii_iv_core::rest::testutils::OneShotBuilder;

    fn route(grantee: &str, resource: &str, action: &str) -> (http::Method, String) {
        (http::Method::GET, format!("/api/acl/permissions/{}/{}/{}", grantee, resource, action))
    }

    #[tokio::test]
    async fn test_allowed_and_denied() {
        let context = TestContext::setup().await;
        context.driver().give_permission("alice".into(), "doc".into(), Action::Read).await.unwrap();

        let response = OneShotBuilder::new(app(&context), route("alice", "doc", "READ"))
            .send_empty()
            .await
            .expect_json::<HasPermissionResponse>()
            .await;
        assert_eq!(HasPermissionResponse { allowed: true }, response);

        let response = OneShotBuilder::new(app(&context), route("alice", "doc", "WRITE"))
            .send_empty()
            .await
            .expect_json::<HasPermissionResponse>()
            .await;
        assert_eq!(HasPermissionResponse { allowed: false }, response);
    }

    #[tokio::test]
    async fn test_through_role_and_encoded_resource() {
        let context = TestContext::setup().await;
        let role = RoleName::from("readers");
        context.driver().create_role(role.clone()).await.unwrap();
        context
            .driver()
            .give_permission(Grantee::from(role.clone()), "notes/1".into(), Action::Read)
            .await
            .unwrap();
        context.driver().add_role_member(role, "bob".into()).await.unwrap();

        let response = OneShotBuilder::new(app(&context), route("bob", "notes%2F1", "READ"))
            .send_empty()
            .await
            .expect_json::<HasPermissionResponse>()
            .await;
        assert_eq!(HasPermissionResponse { allowed: true }, response);
    }

    #[tokio::test]
    async fn test_bad_action() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(app(&context), route("alice", "doc", "EXECUTE"))
            .send_empty()
            .await
            .expect_status(http::StatusCode::BAD_REQUEST)
            .expect_error("Unknown action 'EXECUTE'")
            .await;
    }

    iii_iv_core::test_payload_must_be_empty!(
        app(&TestContext::setup().await),
        route("alice", "doc", "READ")
    );
}
