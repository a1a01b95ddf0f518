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

//! Common REST endpoints to interact with the queue.
//!
//! The worker trigger is meant for runtimes that cannot keep long-lived worker loops running
//! (such as serverless deployments): an external scheduler invokes it periodically.  The runtime
//! must enforce a maximum execution time for the process to guarantee correctness.

use crate::driver::{Client, Notifier};
use axum::http::Method;
use iii_iv_core::rest::Route;

mod queue_loop;
mod tasks_get;
pub use tasks_get::TaskResponse;
#[cfg(test)]
mod testutils;

/// Creates the routes to inspect queue tasks via `client`.
pub fn api_routes(client: Client) -> Result<Vec<Route>, String> {
    Ok(vec![Route::with_state(
        "/api/queue/tasks/{id}",
        &[Method::GET],
        tasks_get::handler,
        client,
    )?])
}

/// Creates the routes that poke the workers behind `notifiers` on external request.  These
/// routes **must not** be nested under other paths.
pub fn worker_cron_routes(notifiers: Vec<Notifier>) -> Result<Vec<Route>, String> {
    Ok(vec![Route::with_state(
        "/queue-loop",
        &[Method::POST],
        queue_loop::cron_post_handler,
        notifiers,
    )?])
}
