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

//! Generic data types for the queue.
//!
//! Task execution is decoupled from task representation.  The queue only cares about the
//! ability to serialize and deserialize task definitions, and it must be possible for the
//! clients of the queue to enqueue tasks without knowing how to execute them.  Each kind of task
//! is identified by a type name, which is what workers use to pick the tasks they know how to
//! run.

use iii_iv_core::db::DbError;
use iii_iv_core::driver::DriverError;
use iii_iv_core::model::{ModelError, ModelResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// Processing state of a task.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskStatus {
    /// The task is waiting for a worker to pick it up.
    Queued,

    /// A worker claimed the task and is running it.
    Processing,

    /// The task finished successfully.
    Completed,

    /// The task finished with an error or was abandoned.
    Failed,
}

impl TaskStatus {
    /// Returns the textual representation of the status as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "QUEUED",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }

    /// Returns true if the task will not change state anymore.
    pub fn is_done(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        match s {
            "QUEUED" => Ok(TaskStatus::Queued),
            "PROCESSING" => Ok(TaskStatus::Processing),
            "COMPLETED" => Ok(TaskStatus::Completed),
            "FAILED" => Ok(TaskStatus::Failed),
            _ => Err(ModelError(format!("Unknown task status '{}'", s))),
        }
    }
}

/// A task as stored in the queue.
#[derive(Clone, Debug, PartialEq)]
pub struct Task {
    /// Unique identifier of the task.
    pub id: Uuid,

    /// Name of the kind of task, which determines the worker that runs it.
    pub task_type: String,

    /// Serialized task description.
    pub payload: serde_json::Value,

    /// Current processing state.
    pub status: TaskStatus,

    /// Details about the last failure, if any.
    pub error: Option<String>,

    /// Free-form result attached by a successful run, if any.
    pub result: Option<String>,

    /// Number of times a worker claimed this task.
    pub runs: u16,

    /// When the task was enqueued.
    pub created: OffsetDateTime,

    /// When the task last changed state.
    pub updated: OffsetDateTime,

    /// Earliest time at which the task may run, if deferred.
    pub only_after: Option<OffsetDateTime>,
}

/// A kind of task that can be enqueued and run.
///
/// The `TYPE` string is persisted with every task and must remain stable across releases.
pub trait TaskKind: DeserializeOwned + Serialize + Send + Sync + 'static {
    /// Name of this kind of task.
    const TYPE: &'static str;
}

/// Error type returned by the closure used to run tasks.
#[derive(Debug, PartialEq)]
pub enum ExecError {
    /// Indicates that the task has failed in a controlled manner.
    Failed(String),

    /// Indicates that the task wants to rerun after the specified delay.  A zero delay asks for
    /// the worker's default retry delay.
    Retry(Duration, String),
}

impl From<DbError> for ExecError {
    fn from(value: DbError) -> Self {
        // All we do with this error is persist it as a string, so flatten it now.
        ExecError::Failed(value.to_string())
    }
}

impl From<DriverError> for ExecError {
    fn from(value: DriverError) -> Self {
        ExecError::Failed(value.to_string())
    }
}

/// Result type returned by the closure used to run tasks.
pub type ExecResult = Result<Option<String>, ExecError>;
