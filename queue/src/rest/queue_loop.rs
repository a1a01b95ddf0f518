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

//! API to start a processing cycle as invoked by an external scheduler.

use crate::driver::Notifier;
use axum::Json;
use axum::extract::State;
use iii_iv_core::rest::RestResult;
use std::collections::HashMap;

/// POST handler for this cron trigger.
///
/// This handler **must** be installed at the root of the web server, not within the standard
/// `/api` path.  The request body is whatever the scheduler sends and is ignored.
pub(crate) async fn cron_post_handler(
    State(notifiers): State<Vec<Notifier>>,
    _body: String,
) -> RestResult<Json<HashMap<String, String>>> {
    for notifier in &notifiers {
        notifier.notify();
    }

    // Some schedulers consider the invocation unfinished unless they get a JSON object back.
    Ok(Json(HashMap::default()))
}
