//! Execution of validation requests.
//!
//! This module runs the pipeline stages on a bounded worker pool.

pub mod orchestrator;
pub mod pool;
pub mod progress;

pub use orchestrator::ValidationService;
pub use pool::WorkerPool;
pub use progress::{Stage, StageCallback, StageTracker, StageUpdate};
