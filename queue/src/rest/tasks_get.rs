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

//! API to fetch the state of a task.

use crate::driver::Client;
use crate::model::Task;
use axum::Json;
use axum::extract::{Path, State};
use iii_iv_core::rest::{EmptyBody, RestError, RestResult};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// Message returned by the server after fetching a task.
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct TaskResponse {
    /// Unique identifier of the task.
    pub id: Uuid,

    /// When the task was enqueued, in RFC 3339 format.
    pub created: String,

    /// When the task last changed state, in RFC 3339 format.
    pub updated: String,

    /// Kind of the task.
    #[serde(rename = "type")]
    pub task_type: String,

    /// Task description.
    pub payload: serde_json::Value,

    /// Processing state of the task.
    pub status: String,

    /// Details about the last failure, if any.
    pub error: Option<String>,

    /// Result of a successful run, if any.
    pub result: Option<String>,
}

/// Formats `ts` for a response.
fn format_timestamp(ts: OffsetDateTime) -> RestResult<String> {
    ts.format(&Rfc3339)
        .map_err(|e| RestError::InternalError(format!("Cannot format timestamp: {}", e)))
}

impl TryFrom<Task> for TaskResponse {
    type Error = RestError;

    fn try_from(task: Task) -> RestResult<Self> {
        Ok(Self {
            id: task.id,
            created: format_timestamp(task.created)?,
            updated: format_timestamp(task.updated)?,
            task_type: task.task_type,
            payload: task.payload,
            status: task.status.to_string(),
            error: task.error,
            result: task.result,
        })
    }
}

/// GET handler for this API.
pub(crate) async fn handler(
    State(client): State<Client>,
    Path(id): Path<String>,
    _: EmptyBody,
) -> RestResult<Json<TaskResponse>> {
    let id = Uuid::parse_str(&id)
        .map_err(|e| RestError::InvalidRequest(format!("Invalid task id '{}': {}", id, e)))?;

    let task = client.get_task(id).await?;
    Ok(Json(TaskResponse::try_from(task)?))
}
