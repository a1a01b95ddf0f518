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

//! API to give a permission to a grantee.

use crate::driver::AclDriver;
use crate::rest::parse_permission_path;
use axum::extract::{Path, State};
use iii_iv_core::rest::{EmptyBody, RestResult};

/// PUT handler for this API.
pub(crate) async fn handler(
    State(driver): State<AclDriver>,
    Path((grantee, resource, action)): Path<(String, String, String)>,
    _: EmptyBody,
) -> RestResult<()> {
    let (grantee, resource, action) = parse_permission_path(grantee, resource, action)?;
    driver.give_permission(grantee, resource, action).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::driver::testutils::*;
    use crate::model::{Action, Grantee, Resource};
    use crate::rest::testutils::*;
    use axum::http;
    use iii_iv_core::rest::testutils::OneShotBuilder;

    fn route(grantee: &str, resource: &str, action: &str) -> (http::Method, String) {
        (http::Method::PUT, format!("/api/acl/permissions/{}/{}/{}", grantee, resource, action))
    }

    #[tokio::test]
    async fn test_ok_and_idempotent() {
        let context = TestContext::setup().await;

        for _ in 0..2 {
            OneShotBuilder::new(app(&context), route("alice", "doc", "WRITE"))
                .send_empty()
                .await
                .expect_empty()
                .await;
        }

        let alice = Grantee::from("alice");
        let doc = Resource::from("doc");
        assert!(context.driver().has_permission(&alice, &doc, Action::Write).await.unwrap());
        assert_eq!(1, context.driver().list_permissions(&alice).await.unwrap().len());
    }

    #[tokio::test]
    async fn test_bad_action() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(app(&context), route("alice", "doc", "write"))
            .send_empty()
            .await
            .expect_status(http::StatusCode::BAD_REQUEST)
            .expect_error("Unknown action")
            .await;
    }

    iii_iv_core::test_payload_must_be_empty!(
        app(&TestContext::setup().await),
        route("alice", "doc", "READ")
    );
}
