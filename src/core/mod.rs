//! Core types for the fluxcheck validation service.
//!
//! This module contains the foundational types shared by every pipeline stage:
//! - Upload and content types, compression and format tags
//! - Error types and the accumulated validation outcome
//! - Process configuration

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{Config, PoolConfig, ServerConfig, SolverConfig};
pub use error::{
    ConsistencyError, ConsistencyWarning, DecompressError, FluxcheckError, PipelineError,
    PoolError, RequestId, StageResult, ValidationOutcome,
};
pub use types::{Compression, DecompressedContent, ModelFormat, UploadedFile};
