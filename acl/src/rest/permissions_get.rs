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

//! API to list the permissions given directly to a grantee.

use crate::driver::AclDriver;
use crate::model::{Grantee, Permission};
use axum::Json;
use axum::extract::{Path, State};
use iii_iv_core::rest::{EmptyBody, RestResult};

/// GET handler for this API.
pub(crate) async fn handler(
    State(driver): State<AclDriver>,
    Path(grantee): Path<String>,
    _: EmptyBody,
) -> RestResult<Json<Vec<Permission>>> {
    let grantee = Grantee::new(grantee)?;
    let permissions = driver.list_permissions(&grantee).await?;
    Ok(Json(permissions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testutils::*;
    use crate::model::Action;
    use crate::rest::testutils::*;
    use axum::http;
    use iii_iv_core::rest::testutils::OneShotBuilder;
    use serde_json::json;

    fn route(grantee: &str) -> (http::Method, String) {
        (http::Method::GET, format!("/api/acl/permissions/{}", grantee))
    }

    #[tokio::test]
    async fn test_ok() {
        let context = TestContext::setup().await;
        let alice = Grantee::from("alice");
        context.driver().give_permission(alice.clone(), "x".into(), Action::Write).await.unwrap();
        context.driver().give_permission(alice, "notes/1".into(), Action::Read).await.unwrap();

        let response = OneShotBuilder::new(app(&context), route("alice"))
            .send_empty()
            .await
            .expect_json::<serde_json::Value>()
            .await;
        assert_eq!(
            json!([
                {"grantee": "alice", "resource": "notes/1", "action": "READ"},
                {"grantee": "alice", "resource": "x", "action": "WRITE"},
            ]),
            response
        );
    }

    #[tokio::test]
    async fn test_none() {
        let context = TestContext::setup().await;

        let response = OneShotBuilder::new(app(&context), route("alice"))
            .send_empty()
            .await
            .expect_json::<Vec<Permission>>()
            .await;
        assert!(response.is_empty());
    }

    iii_iv_core::test_payload_must_be_empty!(app(&TestContext::setup().await), route("alice"));
}
