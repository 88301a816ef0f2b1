//! Consistency pipeline implementation.

use crate::core::ValidationOutcome;
use crate::model::Model;
use crate::validation::stages::{
    BoundsValidation, GprValidation, MassBalanceValidation, MetaboliteValidation, ValidationStage,
};
use std::time::Instant;

/// Multi-stage consistency pipeline.
///
/// Runs every stage on a parsed model and appends their findings in stage
/// order. No stage can stop the others.
pub struct ValidationPipeline {
    stages: Vec<Box<dyn ValidationStage>>,
}

impl ValidationPipeline {
    /// Create a new pipeline with the given stages.
    pub fn new(stages: Vec<Box<dyn ValidationStage>>) -> Self {
        Self { stages }
    }

    /// Create the default pipeline: bounds, gene rules, metabolites, mass balance.
    pub fn default_pipeline() -> Self {
        Self {
            stages: vec![
                Box::new(BoundsValidation),
                Box::new(GprValidation),
                Box::new(MetaboliteValidation),
                Box::new(MassBalanceValidation),
            ],
        }
    }

    /// Add a custom validation stage.
    pub fn add_stage(&mut self, stage: Box<dyn ValidationStage>) {
        self.stages.push(stage);
    }

    /// Names of the configured stages, in run order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Validate a model through all stages.
    pub fn validate(&self, model: &Model) -> ValidationOutcome {
        let start = Instant::now();
        let mut outcome = ValidationOutcome::new();

        for stage in &self.stages {
            match stage.validate(model) {
                Ok(warnings) => {
                    for warning in warnings {
                        outcome.add_warning(warning.to_string());
                    }
                }
                Err(errors) => {
                    for error in errors {
                        outcome.add_error(error.to_string());
                    }
                }
            }
        }

        log::debug!(
            "Consistency checks on {} reactions took {:?}: {}",
            model.reactions.len(),
            start.elapsed(),
            outcome.summary()
        );
        outcome
    }
}

impl Default for ValidationPipeline {
    fn default() -> Self {
        Self::default_pipeline()
    }
}
