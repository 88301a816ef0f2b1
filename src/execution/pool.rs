//! Bounded worker pool for blocking pipeline stages.
//!
//! Jobs run on a fixed-size rayon pool and hand their result back to the
//! awaiting task through a tokio oneshot channel, so the async side never
//! blocks. Jobs beyond the worker count wait in rayon's queue; with
//! `max_queued` set, jobs beyond that limit are refused instead.

use crate::core::{PoolConfig, PoolError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Decrements the in-flight count when the job finishes, even by panicking.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

/// Fixed-capacity pool shared by every request.
pub struct WorkerPool {
    pool: Mutex<Option<Arc<rayon::ThreadPool>>>,
    capacity: usize,
    max_queued: Option<usize>,
    in_flight: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Start the worker threads.
    pub fn new(config: &PoolConfig) -> Result<Self, PoolError> {
        if config.workers == 0 {
            return Err(PoolError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|index| format!("fluxcheck-worker-{index}"))
            .panic_handler(|payload| {
                log::error!("Worker panicked: {}", panic_message(payload.as_ref()));
            })
            .build()
            .map_err(|e| PoolError::Build(e.to_string()))?;

        log::info!(
            "Started worker pool with {} threads{}",
            config.workers,
            config
                .max_queued
                .map(|limit| format!(" (queue limit {limit})"))
                .unwrap_or_default()
        );
        Ok(Self {
            pool: Mutex::new(Some(Arc::new(pool))),
            capacity: config.workers,
            max_queued: config.max_queued,
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Number of worker threads.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs submitted and not yet finished, running or queued.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Whether every worker is busy.
    pub fn is_saturated(&self) -> bool {
        self.in_flight() >= self.capacity
    }

    /// Run a blocking job on a worker and await its result.
    ///
    /// `stage` names the job in logs and errors. A job that panics yields
    /// [`PoolError::WorkerLost`].
    pub async fn run<F, T>(&self, stage: &str, job: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.lock().clone().ok_or(PoolError::ShutDown)?;

        let current = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        let guard = InFlightGuard(Arc::clone(&self.in_flight));
        if current > self.capacity {
            let queued = current - self.capacity;
            if let Some(limit) = self.max_queued {
                if queued > limit {
                    log::warn!("Refusing stage '{stage}': {queued} jobs queued (limit {limit})");
                    return Err(PoolError::Saturated { queued, limit });
                }
            }
            log::debug!("All {} workers busy; stage '{stage}' queued behind {} job(s)", self.capacity, queued - 1);
        }

        let (tx, rx) = oneshot::channel();
        pool.spawn(move || {
            let _guard = guard;
            // The receiver may be gone if the request was dropped.
            let _ = tx.send(job());
        });

        rx.await.map_err(|_| PoolError::WorkerLost {
            stage: stage.to_string(),
        })
    }

    /// Stop accepting jobs and release the worker threads once queued jobs finish.
    pub fn shutdown(&self) {
        if self.pool.lock().take().is_some() {
            log::info!("Worker pool shut down ({} job(s) still in flight)", self.in_flight());
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.pool.lock().is_none()
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("capacity", &self.capacity)
            .field("max_queued", &self.max_queued)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
