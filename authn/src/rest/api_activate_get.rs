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

//! API to activate a newly-created user account.

use crate::driver::AuthnDriver;
use axum::extract::{Path, Query, State};
use axum::response::Html;
use iii_iv_core::model::Username;
use iii_iv_core::rest::{EmptyBody, RestResult};
use iii_iv_core::template;
use serde::{Deserialize, Serialize};

/// Default HTML to return when an account is successfully activated.
const DEFAULT_ACTIVATED_TEMPLATE: &str = r#"<html>
<head><title>Account activated</title></head>

<body>
<h1>Success!</h1>

<p>%username%, your account has been successfully activated.</p>

</body>
</html>
"#;

/// Message sent to the server to activate a user account.
#[derive(Default, Deserialize, Serialize)]
pub struct ActivateRequest {
    /// Activation code.
    pub code: u64,
}

/// GET handler for this API.
#[allow(clippy::type_complexity)]
pub(crate) async fn handler(
    State((driver, activated_template)): State<(AuthnDriver, Option<&'static str>)>,
    Path(user): Path<String>,
    Query(request): Query<ActivateRequest>,
    _: EmptyBody,
) -> RestResult<Html<String>> {
    let user = Username::new(user)?;

    driver.activate(user.clone(), request.code).await?;

    let body = template::apply(
        activated_template.unwrap_or(DEFAULT_ACTIVATED_TEMPLATE),
        &[("username", user.as_str())],
    );

    Ok(Html(body))
}
