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

//! Provides the task queue client implementation.

use crate::db::{get_task, put_new_task};
use crate::driver::{Notifier, Worker};
use crate::model::{Task, TaskKind};
use iii_iv_core::clocks::Clock;
use iii_iv_core::db::Db;
use iii_iv_core::driver::{DriverError, DriverResult};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// The queue client.
///
/// This driver talks to the database to manipulate and query tasks, delegating execution to the
/// workers.
#[derive(Clone)]
pub struct Client {
    /// The database that the driver uses for persistence.
    db: Arc<dyn Db + Send + Sync>,

    /// Clock instance to obtain the current time.
    clock: Arc<dyn Clock + Send + Sync>,

    /// Workers to notify when a task is enqueued.  This is only useful when the client and the
    /// workers live in the same process.
    notifiers: Vec<Notifier>,
}

impl Client {
    /// Creates a new driver backed by `db` and a `clock`.
    pub fn new(db: Arc<dyn Db + Send + Sync>, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self { db, clock, notifiers: vec![] }
    }

    /// Configures the client to poke `worker` when new tasks are enqueued.
    pub fn with_worker(mut self, worker: &Worker) -> Self {
        self.notifiers.push(worker.notifier());
        self
    }

    /// Pokes the connected workers, if any, to ensure we make forward progress as early as
    /// possible.
    fn notify_workers(&self) {
        for notifier in &self.notifiers {
            notifier.notify();
        }
    }

    /// Inserts a new `task` into the queue that will only run after `only_after`, if given, and
    /// returns its identifier.
    async fn put<T: TaskKind>(
        &self,
        task: &T,
        only_after: Option<OffsetDateTime>,
    ) -> DriverResult<Uuid> {
        let payload = serde_json::to_value(task).map_err(|e| {
            DriverError::InvalidInput(format!("Cannot serialize task for storage: {}", e))
        })?;

        let mut tx = self.db.begin().await?;
        let now = self.clock.now_utc();
        let id = put_new_task(tx.ex(), T::TYPE, &payload, now, only_after).await?;
        tx.commit().await?;

        self.notify_workers();

        Ok(id)
    }

    /// Inserts a new `task` into the queue and returns its identifier.
    pub async fn enqueue<T: TaskKind>(&self, task: &T) -> DriverResult<Uuid> {
        self.put(task, None).await
    }

    /// Inserts a new `task` into the queue that will only run after `only_after` and returns
    /// its identifier.
    pub async fn enqueue_after<T: TaskKind>(
        &self,
        task: &T,
        only_after: OffsetDateTime,
    ) -> DriverResult<Uuid> {
        self.put(task, Some(only_after)).await
    }

    /// Gets the current state of task `id`.
    pub async fn get_task(&self, id: Uuid) -> DriverResult<Task> {
        let mut tx = self.db.begin().await?;
        let task = get_task(tx.ex(), id).await?;
        tx.commit().await?;
        Ok(task)
    }

    /// Returns task `id` if it has already completed or failed.
    pub async fn poll(&self, id: Uuid) -> DriverResult<Option<Task>> {
        let task = self.get_task(id).await?;
        if task.status.is_done() { Ok(Some(task)) } else { Ok(None) }
    }

    /// Waits for task `id` until it has completed execution by polling its state every `period`.
    pub async fn wait(&self, id: Uuid, period: Duration) -> DriverResult<Task> {
        loop {
            if let Some(task) = self.poll(id).await? {
                break Ok(task);
            }

            self.notify_workers();

            tokio::time::sleep(period).await;
        }
    }
}
