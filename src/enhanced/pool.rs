use crate::error::{PeleeError, PeleeResult};
use futures::future::join_all;
use std::sync::{Mutex, PoisonError};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::debug;

pub const DEFAULT_WORKERS: usize = 4;

/// Bounded worker pool owned by one enhanced pipeline
///
/// Backed by a dedicated tokio runtime whose blocking pool is capped at the
/// configured worker count. The runtime is built on first use, so
/// pipelines that never run in parallel never start threads. Once shut
/// down the pool refuses new work.
pub struct WorkerPool {
    workers: usize,
    state: Mutex<PoolState>,
}

enum PoolState {
    Idle,
    Running(Runtime),
    Shutdown,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            state: Mutex::new(PoolState::Idle),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self.state.lock().as_deref(),
            Ok(PoolState::Running(_))
        )
    }

    /// Handle to the pool's runtime, starting it if needed
    ///
    /// # Errors
    ///
    /// Fails with [`PeleeError::WorkerPool`] after shutdown or when the
    /// runtime cannot be built.
    pub fn handle(&self) -> PeleeResult<Handle> {
        let mut state = self.state.lock()?;
        if let PoolState::Idle = *state {
            let runtime = Builder::new_multi_thread()
                .worker_threads(1)
                .max_blocking_threads(self.workers)
                .thread_name("pelee-worker")
                .enable_all()
                .build()
                .map_err(|e| PeleeError::WorkerPool(format!("Failed to start worker pool: {}", e)))?;
            debug!(workers = self.workers, "Worker pool started");
            *state = PoolState::Running(runtime);
        }
        match &*state {
            PoolState::Running(runtime) => Ok(runtime.handle().clone()),
            _ => Err(PeleeError::WorkerPool("Worker pool has been shut down".to_string())),
        }
    }

    /// Stop accepting work; already dispatched jobs run to completion in the background
    pub fn shutdown(&self) {
        let previous = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *state, PoolState::Shutdown)
        };
        if let PoolState::Running(runtime) = previous {
            runtime.shutdown_background();
            debug!("Worker pool shut down");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Block until every handle has settled, keeping submission order
///
/// Jobs that panicked or were cancelled come back as
/// [`PeleeError::ParallelExecution`].
pub fn join_blocking<T>(handles: Vec<JoinHandle<PeleeResult<T>>>) -> Vec<PeleeResult<T>> {
    futures::executor::block_on(join_all(handles))
        .into_iter()
        .map(|joined| {
            joined.unwrap_or_else(|e| {
                Err(PeleeError::ParallelExecution(format!("Worker task failed: {}", e)))
            })
        })
        .collect()
}
