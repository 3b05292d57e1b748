//! Background loops with deterministic shutdown
//!
//! Every loop spawned here watches one shutdown channel. `shutdown` flips it
//! and waits for each loop to finish its current tick, so no task outlives
//! the cache that owns it. Dropping the scheduler aborts whatever is left.

use crate::error::{CacheError, Result};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

struct Task {
    name: String,
    handle: JoinHandle<()>,
}

/// Owner of the facade's background loops
pub struct Scheduler {
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<Task>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Number of loops still registered
    pub fn task_count(&self) -> usize {
        self.tasks.lock().map(|tasks| tasks.len()).unwrap_or(0)
    }

    /// Run `tick` every `interval` until shutdown.
    ///
    /// The first run happens one interval after spawning. Failed ticks are
    /// logged and the loop keeps going. Must be called within a tokio runtime.
    pub fn spawn_periodic<F, Fut>(
        &self,
        name: impl Into<String>,
        interval: Duration,
        tick: F,
    ) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        if self.is_shut_down() {
            return Err(CacheError::Other(format!(
                "cannot start '{}': scheduler is shut down",
                name
            )));
        }
        if interval.is_zero() {
            return Err(CacheError::InvalidArgument(format!(
                "interval for '{}' must be greater than 0",
                name
            )));
        }

        let mut shutdown = self.shutdown_tx.subscribe();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            info!("Starting background task '{}' (interval: {:?})", task_name, interval);

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = tick().await {
                            warn!("Background task '{}' failed: {}", task_name, e);
                        }
                    }
                }
            }

            debug!("Background task '{}' stopped", task_name);
        });

        match self.tasks.lock() {
            Ok(mut tasks) => {
                tasks.push(Task { name, handle });
                Ok(())
            }
            Err(_) => {
                handle.abort();
                Err(CacheError::Other("scheduler task list poisoned".to_string()))
            }
        }
    }

    /// Signal every loop to stop and wait for them to exit
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);

        let tasks = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(_) => return,
        };

        for task in tasks {
            if let Err(e) = task.handle.await {
                if !e.is_cancelled() {
                    error!("Background task '{}' panicked: {}", task.name, e);
                }
            }
        }

        info!("Scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
        if let Ok(tasks) = self.tasks.get_mut() {
            for task in tasks.drain(..) {
                task.handle.abort();
            }
        }
    }
}
