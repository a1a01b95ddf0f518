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

//! Test utilities for the REST layer.

use crate::driver::testutils::TestContext;
use crate::rest::{api_routes, worker_cron_routes};
use axum::Router;
use iii_iv_core::rest::build_router;

/// Creates the app under test with all queue routes for the client and worker in `context`.
pub(super) fn app(context: &TestContext) -> Router {
    let mut routes = api_routes(context.client.clone()).unwrap();
    routes.extend(worker_cron_routes(vec![context.worker.notifier()]).unwrap());
    build_router(routes, &[])
}
