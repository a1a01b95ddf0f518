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

//! Coordination of background tasks and cleanup actions across a service's lifetime.
//!
//! A service creates one `Lifecycle` at startup, hands its `Shutdown` handles to the long-running
//! tasks it spawns (servers, queue workers) and calls `Lifecycle::stop` when it is asked to exit.

use futures::future::BoxFuture;
use futures::lock::Mutex;
use futures::FutureExt;
use log::{debug, error, info, warn};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default amount of time to wait for background tasks to finish during shutdown.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Cleanup action registered with `Lifecycle::on_stop`.
type StopFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), String>> + Send>;

/// Handle given to background tasks to learn when the service is shutting down.
#[derive(Clone)]
pub struct Shutdown(watch::Receiver<bool>);

impl Shutdown {
    /// Returns true if shutdown has already been requested.
    pub fn is_stopping(&self) -> bool {
        *self.0.borrow()
    }

    /// Waits until shutdown is requested.
    pub async fn wait(&mut self) {
        // An error means the `Lifecycle` is gone, which is as good as a stop request.
        let _ = self.0.wait_for(|stopping| *stopping).await;
    }
}

/// Extracts a printable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// Tracker of background tasks and of the cleanup actions to run when the service stops.
pub struct Lifecycle {
    /// Maximum time `stop` waits for cleanup actions and background tasks combined.
    stop_timeout: Duration,

    /// Sender side of the shutdown signal.
    stop_tx: watch::Sender<bool>,

    /// Background tasks started via `spawn`, keyed by their name.
    tasks: Mutex<Vec<(String, JoinHandle<()>)>>,

    /// Cleanup actions to run on stop, in registration order.
    on_stop: Mutex<Vec<StopFn>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new(DEFAULT_STOP_TIMEOUT)
    }
}

impl Lifecycle {
    /// Creates a new lifecycle whose `stop` waits at most `stop_timeout`.
    pub fn new(stop_timeout: Duration) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            stop_timeout,
            stop_tx,
            tasks: Mutex::default(),
            on_stop: Mutex::default(),
        }
    }

    /// Returns the maximum time `stop` waits for.
    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }

    /// Returns a new handle to observe the shutdown signal.
    pub fn shutdown(&self) -> Shutdown {
        Shutdown(self.stop_tx.subscribe())
    }

    /// Starts a background task called `name` that runs the future returned by `f`.
    ///
    /// The task receives a `Shutdown` handle and is expected to return soon after shutdown is
    /// requested.  Panics within the task are logged and do not propagate.
    pub async fn spawn<F, Fut>(&self, name: &str, f: F)
    where
        F: FnOnce(Shutdown) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let fut = f(self.shutdown());
        let task_name = name.to_owned();
        let handle = tokio::spawn(async move {
            if let Err(payload) = AssertUnwindSafe(fut).catch_unwind().await {
                error!("Panic in background task {}: {}", task_name, panic_message(&*payload));
            }
        });
        debug!("Started background task {}", name);
        self.tasks.lock().await.push((name.to_owned(), handle));
    }

    /// Registers a cleanup action `f` to run when the lifecycle stops.
    pub async fn on_stop<F, Fut>(&self, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.on_stop.lock().await.push(Box::new(move || f().boxed()));
    }

    /// Requests all background tasks to stop, runs the cleanup actions in registration order and
    /// then waits for the background tasks to finish.
    ///
    /// Tasks that are still running once the stop timeout expires are aborted.  Returns true if
    /// every cleanup action and background task completed in time.  Cleanup actions that fail
    /// are logged but do not make this return false.
    pub async fn stop(&self) -> bool {
        self.stop_tx.send_replace(true);
        let deadline = Instant::now() + self.stop_timeout;

        let mut all_done = true;
        let callbacks = std::mem::take(&mut *self.on_stop.lock().await);
        for callback in callbacks {
            match tokio::time::timeout_at(deadline, callback()).await {
                Ok(Ok(())) => (),
                Ok(Err(e)) => error!("Failed to run cleanup action: {}", e),
                Err(_) => {
                    error!("Cleanup action did not complete within timeout");
                    all_done = false;
                }
            }
        }

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for (name, mut handle) in tasks {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                warn!("Background task {} did not complete within timeout", name);
                handle.abort();
                all_done = false;
            }
        }
        if all_done {
            info!("All background tasks completed successfully");
        }
        all_done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_stop_signals_tasks() {
        let lifecycle = Lifecycle::new(Duration::from_secs(10));

        let done = Arc::from(AtomicBool::new(false));
        let done2 = done.clone();
        lifecycle
            .spawn("waiter", move |mut shutdown| async move {
                assert!(!shutdown.is_stopping());
                shutdown.wait().await;
                done2.store(true, Ordering::SeqCst);
            })
            .await;

        assert!(!done.load(Ordering::SeqCst));
        assert!(lifecycle.stop().await);
        assert!(done.load(Ordering::SeqCst));
        assert!(lifecycle.shutdown().is_stopping());
    }

    #[tokio::test]
    async fn test_stop_runs_callbacks_in_order() {
        let lifecycle = Lifecycle::default();

        let order = Arc::from(Mutex::new(vec![]));
        for i in 0..3 {
            let order = order.clone();
            lifecycle
                .on_stop(move || async move {
                    order.lock().await.push(i);
                    if i == 1 { Err("ignored".to_owned()) } else { Ok(()) }
                })
                .await;
        }

        assert!(lifecycle.stop().await);
        assert_eq!(vec![0, 1, 2], *order.lock().await);
    }

    #[tokio::test]
    async fn test_stop_times_out_on_stuck_tasks() {
        let lifecycle = Lifecycle::new(Duration::from_millis(10));

        lifecycle
            .spawn("stuck", |_shutdown| async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            })
            .await;

        assert!(!lifecycle.stop().await);
    }

    #[tokio::test]
    async fn test_stop_times_out_on_stuck_callbacks() {
        let lifecycle = Lifecycle::new(Duration::from_millis(10));

        lifecycle
            .on_stop(|| async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
            .await;

        assert!(!lifecycle.stop().await);
    }

    #[tokio::test]
    async fn test_spawn_survives_panics() {
        let lifecycle = Lifecycle::new(Duration::from_secs(10));

        lifecycle
            .spawn("broken", |_shutdown| async move {
                panic!("Oops");
            })
            .await;

        assert!(lifecycle.stop().await);
    }

    #[test]
    fn test_panic_message() {
        assert_eq!("static", panic_message(&"static"));
        assert_eq!("owned", panic_message(&"owned".to_owned()));
        assert_eq!("unknown panic payload", panic_message(&3));
    }
}
