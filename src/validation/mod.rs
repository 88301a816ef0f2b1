//! Validation of parsed models and SBML documents.
//!
//! The consistency pipeline runs on a built model; the structural checker
//! runs on the SBML document itself, alongside parsing.

pub mod pipeline;
pub mod stages;
pub mod structural;

pub use pipeline::ValidationPipeline;
pub use stages::{
    BoundsValidation, GprValidation, MassBalanceValidation, MetaboliteValidation,
    ValidationStage,
};
pub use structural::{
    run_structural_validation, Severity, StructuralChecker, StructuralFailure,
    XmlStructureChecker,
};
