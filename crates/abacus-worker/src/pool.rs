//! Polling worker pool.
//!
//! Each worker loops: lease a task from the coordinator, sleep the task's
//! configured operation time, compute, report back. When nothing is ready
//! the worker sleeps the poll interval. Per-task execution is strictly
//! sequential inside one worker; parallelism comes from running several.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use abacus_core::config::WorkerSettings;
use abacus_core::store::OperationStore;
use abacus_engine::Coordinator;

use crate::compute;

/// Pool of polling workers bound to one coordinator.
pub struct WorkerPool<S: OperationStore + ?Sized> {
    coordinator: Arc<Coordinator<S>>,
    settings: WorkerSettings,
    shutdown: Arc<RwLock<bool>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: OperationStore + ?Sized + 'static> WorkerPool<S> {
    /// Create a pool; no workers run until [`WorkerPool::start`].
    pub fn new(coordinator: Arc<Coordinator<S>>, settings: WorkerSettings) -> Self {
        Self {
            coordinator,
            settings,
            shutdown: Arc::new(RwLock::new(false)),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the configured number of workers.
    pub async fn start(&self) {
        let mut handles = self.handles.lock().await;
        for worker_id in 0..self.settings.computing_power {
            let coordinator = self.coordinator.clone();
            let shutdown = self.shutdown.clone();
            let poll_interval = self.settings.poll_interval;
            handles.push(tokio::spawn(async move {
                run_worker(worker_id, coordinator, poll_interval, shutdown).await;
            }));
        }
        info!(workers = self.settings.computing_power, "worker pool started");
    }

    /// Stop all workers and wait for them to finish their current task.
    pub async fn shutdown(&self) {
        *self.shutdown.write().await = true;
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        info!("worker pool shut down");
    }
}

async fn run_worker<S: OperationStore + ?Sized + 'static>(
    worker_id: usize,
    coordinator: Arc<Coordinator<S>>,
    poll_interval: std::time::Duration,
    shutdown: Arc<RwLock<bool>>,
) {
    debug!(worker_id, "worker starting");
    loop {
        if *shutdown.read().await {
            debug!(worker_id, "worker shutting down");
            break;
        }

        match coordinator.next_task().await {
            Some(task) => {
                debug!(
                    worker_id,
                    operation_id = %task.id,
                    operation = task.operation.as_str(),
                    "task leased"
                );
                // The configured latency is what makes the simulated
                // computation take time.
                tokio::time::sleep(task.operation_time()).await;

                let reply = compute::execute(&task);
                if let Err(err) = coordinator.submit_result(reply).await {
                    // The operation stays leased; the coordinator's retry
                    // story for storage failures applies.
                    error!(worker_id, operation_id = %task.id, error = %err, "failed to report result");
                }
            }
            None => {
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}
