//! # fluxcheck - Metabolic Model Validation
//!
//! fluxcheck validates metabolic network models uploaded as SBML or COBRA
//! JSON, optionally compressed with gzip or bzip2, and reports parse errors,
//! structural and consistency warnings and, when the model solves, the
//! optimal objective value.
//!
//! ## Pipeline
//!
//! Each upload goes through the same stages:
//!
//! 1. **Decompress** by filename suffix (`.gz`, `.bz2`)
//! 2. **Dispatch** on the remaining suffix (`.json` or SBML)
//! 3. **Parse** into a [`model::Model`]; SBML uploads get a structural check
//!    at the same time
//! 4. **Consistency checks** on bounds, gene rules, metabolites and mass balance
//! 5. **Feasibility solve** of the flux balance LP
//!
//! A corrupt archive or unreadable document rejects the upload. Everything
//! else is collected into a [`core::ValidationOutcome`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fluxcheck::prelude::*;
//! use std::sync::Arc;
//!
//! let pool = Arc::new(WorkerPool::new(&PoolConfig::default())?);
//! let service = ValidationService::new(pool, SolverConfig::default());
//!
//! let upload = UploadedFile::new("e_coli_core.xml.gz", std::fs::read("e_coli_core.xml.gz")?);
//! let outcome = service.validate(upload).await?;
//! println!("{}", outcome.summary());
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: Upload types, errors, the validation outcome and configuration
//! - [`model`]: The in-memory network, gene rules and formula arithmetic
//! - [`io`]: Decompression, the JSON and SBML loaders and the JSON schema
//! - [`validation`]: Consistency stages and the SBML structural checker
//! - [`solver`]: The feasibility LP and classification of its result
//! - [`execution`]: Worker pool, stage tracking and the per-request orchestrator
//! - [`server`]: The HTTP upload endpoint

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod core;
pub mod execution;
pub mod io;
pub mod model;
pub mod server;
pub mod solver;
pub mod validation;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use fluxcheck::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use crate::core::types::{Compression, DecompressedContent, ModelFormat, UploadedFile};
    pub use crate::core::config::{Config, PoolConfig, ServerConfig, SolverConfig};

    // Errors and outcome
    pub use crate::core::error::{
        DecompressError, FluxcheckError, PipelineError, PoolError, RequestId, StageResult,
        ValidationOutcome,
    };

    // Model
    pub use crate::model::{Gene, Gpr, Metabolite, Model, Reaction};

    // Loading
    pub use crate::io::{decompress, load_json, load_sbml, LoadedModel};

    // Validation
    pub use crate::validation::pipeline::ValidationPipeline;
    pub use crate::validation::stages::ValidationStage;
    pub use crate::validation::structural::{StructuralChecker, XmlStructureChecker};

    // Solving
    pub use crate::solver::{ClarabelSolver, FeasibilitySolver, SolveStatus, Solution};

    // Execution
    pub use crate::execution::orchestrator::ValidationService;
    pub use crate::execution::pool::WorkerPool;
    pub use crate::execution::progress::{Stage, StageCallback, StageTracker, StageUpdate};
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
