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

//! Background loops to extract tasks from the queue and run them.

use crate::db::{claim_task, finish_task, requeue_task};
use crate::model::{ExecError, ExecResult, Task, TaskKind, TaskStatus};
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use futures::lock::Mutex;
use iii_iv_core::clocks::Clock;
use iii_iv_core::db::Db;
use iii_iv_core::driver::DriverResult;
use iii_iv_core::env::get_optional_var;
use iii_iv_core::lifecycle::{Lifecycle, Shutdown, panic_message};
use iii_iv_core::logging::{Logger, Tags};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Default number of tasks a worker runs at once.
const DEFAULT_CONCURRENCY: usize = 1;

/// Default time to wait for new tasks when the queue is empty.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default time a single task is allowed to run for.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default max runs for a task.
const DEFAULT_MAX_RUNS: u16 = 4;

/// Default time after which a task claimed by a worker that never reported back is considered
/// lost and becomes runnable again.
const DEFAULT_MAX_RUNTIME: Duration = Duration::from_secs(10 * 60);

/// Default delay by which to retry a task that asks to be retried with the default delay.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5 * 60);

/// Configuration options for a queue worker.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerOptions {
    /// Number of tasks to run concurrently.
    pub concurrency: usize,

    /// Time to wait before looking for new tasks when there was nothing to do, unless poked.
    #[serde(with = "iii_iv_core::env::serde_duration")]
    pub poll_interval: Duration,

    /// Maximum time a single task run is allowed to take.
    #[serde(with = "iii_iv_core::env::serde_duration")]
    pub timeout: Duration,

    /// Minimum spacing between task starts within this worker, if any.
    #[serde(with = "iii_iv_core::env::serde_duration::option")]
    pub rate_limit: Option<Duration>,

    /// Number of times a task is allowed to run before being abandoned.
    pub max_runs: u16,

    /// Time after which a processing task without a result is considered lost.  This must be
    /// longer than `timeout`.
    #[serde(with = "iii_iv_core::env::serde_duration")]
    pub max_runtime: Duration,

    /// Delay to use when retrying tasks that ask to use the default delay.
    #[serde(with = "iii_iv_core::env::serde_duration")]
    pub retry_delay: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            rate_limit: None,
            max_runs: DEFAULT_MAX_RUNS,
            max_runtime: DEFAULT_MAX_RUNTIME,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl WorkerOptions {
    /// Creates a new set of options from environment variables whose name is prefixed by
    /// `prefix`.
    pub fn from_env(prefix: &str) -> Result<Self, String> {
        Ok(Self {
            concurrency: get_optional_var::<usize>(prefix, "CONCURRENCY")?
                .unwrap_or(DEFAULT_CONCURRENCY),
            poll_interval: get_optional_var::<Duration>(prefix, "POLL_INTERVAL")?
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            timeout: get_optional_var::<Duration>(prefix, "TIMEOUT")?.unwrap_or(DEFAULT_TIMEOUT),
            rate_limit: get_optional_var::<Duration>(prefix, "RATE_LIMIT")?,
            max_runs: get_optional_var::<u16>(prefix, "MAX_RUNS")?.unwrap_or(DEFAULT_MAX_RUNS),
            max_runtime: get_optional_var::<Duration>(prefix, "MAX_RUNTIME")?
                .unwrap_or(DEFAULT_MAX_RUNTIME),
            retry_delay: get_optional_var::<Duration>(prefix, "RETRY_DELAY")?
                .unwrap_or(DEFAULT_RETRY_DELAY),
        })
    }
}

/// Deserializes a task payload and returns the future that runs it.
type Runner = Arc<
    dyn Fn(serde_json::Value) -> Result<BoxFuture<'static, ExecResult>, serde_json::Error>
        + Send
        + Sync,
>;

/// Handle to wake up the loops of a worker when new tasks are available.
#[derive(Clone)]
pub struct Notifier(Arc<Notify>);

impl Notifier {
    /// Asks the worker to look for tasks right away.
    pub fn notify(&self) {
        self.0.notify_waiters();
    }
}

/// What to do with a task after one of its runs.
#[derive(Debug, PartialEq)]
enum Outcome {
    /// Mark the task as completed with an optional result.
    Completed(Option<String>),

    /// Mark the task as failed with the given reason.
    Failed(String),

    /// Return the task to the queue until the given time with the given reason.
    Retry(OffsetDateTime, String),
}

/// The queue worker for a single kind of task.
///
/// The worker is cheap to clone and all clones share the same notification channel and rate
/// limiter.
#[derive(Clone)]
pub struct Worker {
    /// Name of the kind of tasks handled by this worker.
    task_type: &'static str,

    /// Function to run the tasks.
    runner: Runner,

    /// The database holding the queue.
    db: Arc<dyn Db + Send + Sync>,

    /// Clock instance to obtain the current time.
    clock: Arc<dyn Clock + Send + Sync>,

    /// Logger tagged with the task type.
    logger: Arc<dyn Logger>,

    /// Configuration of the worker.
    opts: WorkerOptions,

    /// Wakes up idle loops.
    notify: Arc<Notify>,

    /// Earliest time at which the next task may start when rate limiting.
    next_start: Arc<Mutex<Option<Instant>>>,
}

impl Worker {
    /// Creates a new worker for tasks of kind `T` backed by `db` and `clock`, configured
    /// according to `opts` and using `exec` to run the tasks.
    pub fn new<T, F, Fut>(
        db: Arc<dyn Db + Send + Sync>,
        clock: Arc<dyn Clock + Send + Sync>,
        logger: Arc<dyn Logger>,
        opts: WorkerOptions,
        exec: F,
    ) -> Self
    where
        T: TaskKind,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ExecResult> + Send + 'static,
    {
        let runner: Runner = Arc::new(move |payload| {
            let task = serde_json::from_value::<T>(payload)?;
            Ok(exec(task).boxed())
        });

        let mut tags = Tags::new();
        tags.insert("taskType".to_owned(), json!(T::TYPE));
        let logger = logger.with_tags(tags);

        Self {
            task_type: T::TYPE,
            runner,
            db,
            clock,
            logger,
            opts,
            notify: Arc::new(Notify::new()),
            next_start: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns the name of the kind of tasks this worker runs.
    pub fn task_type(&self) -> &'static str {
        self.task_type
    }

    /// Returns a handle to poke this worker.
    pub fn notifier(&self) -> Notifier {
        Notifier(self.notify.clone())
    }

    /// Waits until the rate limit allows starting another task.
    async fn wait_for_rate_limit(&self) {
        let Some(rate_limit) = self.opts.rate_limit else {
            return;
        };

        let start = {
            let mut next_start = self.next_start.lock().await;
            let now = Instant::now();
            let start = match *next_start {
                Some(next) if next > now => next,
                _ => now,
            };
            *next_start = Some(start + rate_limit);
            start
        };
        tokio::time::sleep_until(start).await;
    }

    /// Runs one claimed `task` to completion and decides what to do with it.
    async fn execute(&self, task: &Task) -> Outcome {
        if task.runs > self.opts.max_runs {
            return Outcome::Failed(format!("Abandoned after {} runs", task.runs - 1));
        }

        let fut = match (self.runner)(task.payload.clone()) {
            Ok(fut) => fut,
            Err(e) => return Outcome::Failed(format!("Cannot deserialize task payload: {}", e)),
        };

        let fut = AssertUnwindSafe(fut).catch_unwind();
        match tokio::time::timeout(self.opts.timeout, fut).await {
            Err(_) => Outcome::Failed(format!("Task timed out after {:?}", self.opts.timeout)),
            Ok(Err(payload)) => {
                Outcome::Failed(format!("Task panicked: {}", panic_message(&*payload)))
            }
            Ok(Ok(Ok(result))) => Outcome::Completed(result),
            Ok(Ok(Err(ExecError::Failed(msg)))) => Outcome::Failed(msg),
            Ok(Ok(Err(ExecError::Retry(delay, msg)))) => {
                let delay = if delay.is_zero() { self.opts.retry_delay } else { delay };
                Outcome::Retry(self.clock.now_utc() + delay, msg)
            }
        }
    }

    /// Claims and runs the oldest runnable task, if any.
    ///
    /// Returns whether a task was processed.  Task failures are recorded in the task itself, so
    /// this only returns errors if it encounters problems talking to the database.
    pub async fn run_once(&self) -> DriverResult<bool> {
        let task = {
            let mut tx = self.db.begin().await?;
            let task = claim_task(
                tx.ex(),
                self.task_type,
                self.opts.max_runtime,
                self.clock.now_utc(),
            )
            .await?;
            tx.commit().await?;
            task
        };
        let Some(task) = task else {
            return Ok(false);
        };

        let mut tags = Tags::new();
        tags.insert("taskId".to_owned(), json!(task.id.to_string()));
        let logger = self.logger.with_tags(tags);

        logger.info("Running task");
        let outcome = self.execute(&task).await;

        // If persisting the outcome fails, the task stays in the processing state and will be
        // reclaimed after `max_runtime`.
        let mut tx = self.db.begin().await?;
        let now = self.clock.now_utc();
        match outcome {
            Outcome::Completed(result) => {
                finish_task(tx.ex(), task.id, TaskStatus::Completed, None, result.as_deref(), now)
                    .await?;
                logger.info("Task completed");
            }
            Outcome::Failed(msg) => {
                finish_task(tx.ex(), task.id, TaskStatus::Failed, Some(&msg), None, now).await?;
                logger.warn(&format!("Task failed: {}", msg), None);
            }
            Outcome::Retry(only_after, msg) => {
                requeue_task(tx.ex(), task.id, only_after, &msg, now).await?;
                logger.info(&format!("Task will retry after {}: {}", only_after, msg));
            }
        }
        tx.commit().await?;

        Ok(true)
    }

    /// Processes tasks until `shutdown` is requested.
    async fn run_loop(self, mut shutdown: Shutdown) {
        while !shutdown.is_stopping() {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = self.wait_for_rate_limit() => (),
            }

            // Register interest in notifications before looking for work so that a poke that
            // arrives while we query the database is not lost.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.run_once().await {
                Ok(true) => continue,
                Ok(false) => (),
                Err(e) => self.logger.warn("Failed to process tasks; will retry later", Some(&e)),
            }

            tokio::select! {
                _ = shutdown.wait() => break,
                _ = &mut notified => (),
                _ = tokio::time::sleep(self.opts.poll_interval) => (),
            }
        }
    }

    /// Runs `concurrency` processing loops until `shutdown` is requested.
    pub async fn run(self, shutdown: Shutdown) {
        self.logger.info("Starting background worker");
        let loops = (0..self.opts.concurrency.max(1))
            .map(|_| self.clone().run_loop(shutdown.clone()))
            .collect::<Vec<_>>();
        join_all(loops).await;
        self.logger.info("Exiting background worker");
    }

    /// Starts the worker as a background task of `lifecycle`.
    pub async fn start(self, lifecycle: &Lifecycle) {
        let name = format!("queue-worker-{}", self.task_type);
        lifecycle.spawn(&name, move |shutdown| self.run(shutdown)).await;
    }
}
