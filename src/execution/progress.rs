//! Stage tracking for validation requests.

use crate::core::{RequestId, ValidationOutcome};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A blocking step of the validation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Undo gzip or bzip2 compression.
    Decompress,
    /// Build a model from the document.
    Parse,
    /// Check SBML markup against the format rules.
    StructuralCheck,
    /// Run the consistency stages on the model.
    Consistency,
    /// Solve the flux balance problem.
    Solve,
}

impl Stage {
    /// Name used in logs and pool errors.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Decompress => "decompress",
            Stage::Parse => "parse",
            Stage::StructuralCheck => "structural_check",
            Stage::Consistency => "consistency",
            Stage::Solve => "solve",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A stage tracking event.
#[derive(Debug, Clone, PartialEq)]
pub enum StageUpdate {
    /// A request has been accepted for validation.
    Started {
        request: RequestId,
        filename: String,
    },
    /// A stage was submitted to the worker pool.
    StageStarted { request: RequestId, stage: Stage },
    /// A stage returned.
    StageCompleted {
        request: RequestId,
        stage: Stage,
        duration_ms: u64,
    },
    /// The upload was rejected; no further stage runs.
    Rejected { request: RequestId, reason: String },
    /// A stage could not run on the pool.
    Failed {
        request: RequestId,
        stage: Stage,
        message: String,
    },
    /// The request produced a report.
    Completed {
        request: RequestId,
        total_duration_ms: u64,
        errors: usize,
        warnings: usize,
    },
}

/// Callback type for stage updates.
pub type StageCallback = Arc<dyn Fn(StageUpdate) + Send + Sync>;

/// Tracks the stages of one request.
pub struct StageTracker {
    request: RequestId,
    start_time: Instant,
    completed_stages: AtomicU64,
    callback: Option<StageCallback>,
    /// Start instants of stages still running. SBML parsing and the
    /// structural check overlap, so more than one can be open.
    open: parking_lot::Mutex<Vec<(Stage, Instant)>>,
    stage_times: parking_lot::Mutex<Vec<(Stage, u64)>>,
}

impl StageTracker {
    /// Create a tracker for a new request.
    pub fn new(request: RequestId) -> Self {
        Self {
            request,
            start_time: Instant::now(),
            completed_stages: AtomicU64::new(0),
            callback: None,
            open: parking_lot::Mutex::new(Vec::new()),
            stage_times: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Set a callback for stage updates.
    pub fn with_callback(mut self, callback: Option<StageCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// The request being tracked.
    pub fn request(&self) -> RequestId {
        self.request
    }

    /// Report that the request has been accepted.
    pub fn start(&self, filename: &str) {
        log::debug!("[{}] validating '{}'", self.request, filename);
        self.send_update(StageUpdate::Started {
            request: self.request,
            filename: filename.to_string(),
        });
    }

    /// Report that a stage has been submitted.
    pub fn stage_started(&self, stage: Stage) {
        self.open.lock().push((stage, Instant::now()));
        self.send_update(StageUpdate::StageStarted {
            request: self.request,
            stage,
        });
    }

    /// Report that a stage has returned.
    pub fn stage_completed(&self, stage: Stage) {
        let duration_ms = self.take_open(stage);
        self.completed_stages.fetch_add(1, Ordering::Relaxed);
        self.stage_times.lock().push((stage, duration_ms));
        log::debug!("[{}] {} finished in {} ms", self.request, stage, duration_ms);
        self.send_update(StageUpdate::StageCompleted {
            request: self.request,
            stage,
            duration_ms,
        });
    }

    /// Report that a stage could not run.
    pub fn stage_failed(&self, stage: Stage, message: String) {
        self.take_open(stage);
        log::error!("[{}] {} failed: {}", self.request, stage, message);
        self.send_update(StageUpdate::Failed {
            request: self.request,
            stage,
            message,
        });
    }

    /// Report that the upload was rejected.
    pub fn rejected(&self, reason: &str) {
        log::info!(
            "[{}] rejected after {} ms: {}",
            self.request,
            self.elapsed_ms(),
            reason
        );
        self.send_update(StageUpdate::Rejected {
            request: self.request,
            reason: reason.to_string(),
        });
    }

    /// Complete tracking with the final report.
    pub fn complete(&self, outcome: &ValidationOutcome) {
        let total_duration_ms = self.elapsed_ms();
        log::info!(
            "[{}] validated in {} ms: {}",
            self.request,
            total_duration_ms,
            outcome.summary()
        );
        self.send_update(StageUpdate::Completed {
            request: self.request,
            total_duration_ms,
            errors: outcome.errors.len(),
            warnings: outcome.warnings.len(),
        });
    }

    /// Number of stages that have returned.
    pub fn completed_stages(&self) -> usize {
        self.completed_stages.load(Ordering::Relaxed) as usize
    }

    /// Duration of every finished stage, in completion order.
    pub fn stage_times(&self) -> Vec<(Stage, u64)> {
        self.stage_times.lock().clone()
    }

    /// Milliseconds since the tracker was created.
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    fn take_open(&self, stage: Stage) -> u64 {
        let mut open = self.open.lock();
        match open.iter().position(|(s, _)| *s == stage) {
            Some(index) => open.swap_remove(index).1.elapsed().as_millis() as u64,
            None => 0,
        }
    }

    fn send_update(&self, update: StageUpdate) {
        if let Some(ref callback) = self.callback {
            callback(update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (StageCallback, Arc<parking_lot::Mutex<Vec<StageUpdate>>>) {
        let updates = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&updates);
        let callback: StageCallback = Arc::new(move |update| sink.lock().push(update));
        (callback, updates)
    }

    #[test]
    fn test_stage_sequence() {
        let (callback, updates) = recorder();
        let request = RequestId::new();
        let tracker = StageTracker::new(request).with_callback(Some(callback));

        tracker.start("model.xml");
        tracker.stage_started(Stage::Parse);
        tracker.stage_started(Stage::StructuralCheck);
        tracker.stage_completed(Stage::StructuralCheck);
        tracker.stage_completed(Stage::Parse);
        tracker.complete(&ValidationOutcome::new());

        let updates = updates.lock();
        assert_eq!(updates.len(), 6);
        assert_eq!(
            updates[0],
            StageUpdate::Started {
                request,
                filename: "model.xml".to_string()
            }
        );
        assert!(matches!(
            updates[3],
            StageUpdate::StageCompleted { stage: Stage::StructuralCheck, .. }
        ));
        assert!(matches!(
            updates[5],
            StageUpdate::Completed { errors: 0, warnings: 0, .. }
        ));
        assert_eq!(tracker.completed_stages(), 2);
        let stages: Vec<Stage> = tracker.stage_times().into_iter().map(|(s, _)| s).collect();
        assert_eq!(stages, vec![Stage::StructuralCheck, Stage::Parse]);
    }

    #[test]
    fn test_rejection_reported() {
        let (callback, updates) = recorder();
        let tracker = StageTracker::new(RequestId::new()).with_callback(Some(callback));
        tracker.stage_started(Stage::Decompress);
        tracker.stage_completed(Stage::Decompress);
        tracker.rejected("Error decompressing gzip file: invalid gzip header");

        let updates = updates.lock();
        assert!(matches!(
            updates.last(),
            Some(StageUpdate::Rejected { reason, .. }) if reason.starts_with("Error decompressing")
        ));
    }

    #[test]
    fn test_without_callback() {
        let tracker = StageTracker::new(RequestId::new());
        tracker.stage_started(Stage::Solve);
        tracker.stage_failed(Stage::Solve, "worker lost".to_string());
        assert_eq!(tracker.completed_stages(), 0);
        assert!(tracker.stage_times().is_empty());
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::StructuralCheck.to_string(), "structural_check");
        assert_eq!(Stage::Decompress.name(), "decompress");
    }
}
