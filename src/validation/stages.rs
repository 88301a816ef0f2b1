//! Individual consistency checks.
//!
//! Each stage checks for a specific category of problems in a parsed model.

use crate::core::error::{ConsistencyError, ConsistencyWarning};
use crate::model::formula::{is_alphanumeric_formula, reaction_imbalance};
use crate::model::{parse_gpr, Model};

/// Trait for consistency stages.
pub trait ValidationStage: Send + Sync {
    /// Name of this validation stage.
    fn name(&self) -> &str;

    /// Check the model.
    ///
    /// Returns Ok with warnings, or Err with errors.
    fn validate(&self, model: &Model) -> Result<Vec<ConsistencyWarning>, Vec<ConsistencyError>>;
}

fn into_result(errors: Vec<ConsistencyError>) -> Result<Vec<ConsistencyWarning>, Vec<ConsistencyError>> {
    if errors.is_empty() {
        Ok(Vec::new())
    } else {
        Err(errors)
    }
}

/// Bounds validation - checks flux ranges.
///
/// Verifies:
/// - Lower bound does not exceed upper bound
/// - Bounds are finite numbers
pub struct BoundsValidation;

impl ValidationStage for BoundsValidation {
    fn name(&self) -> &str {
        "Bounds Validation"
    }

    fn validate(&self, model: &Model) -> Result<Vec<ConsistencyWarning>, Vec<ConsistencyError>> {
        let mut errors = Vec::new();

        for reaction in model.reactions.values() {
            if reaction.lower_bound > reaction.upper_bound {
                errors.push(ConsistencyError::InvertedBounds {
                    reaction: reaction.id.clone(),
                });
            }
            for (bound, value) in [
                ("lower_bound", reaction.lower_bound),
                ("upper_bound", reaction.upper_bound),
            ] {
                if value.is_nan() {
                    errors.push(ConsistencyError::NanBound {
                        reaction: reaction.id.clone(),
                        bound,
                    });
                } else if value.is_infinite() {
                    errors.push(ConsistencyError::InfiniteBound {
                        reaction: reaction.id.clone(),
                        bound,
                    });
                }
            }
        }

        into_result(errors)
    }
}

/// Gene rule validation - checks gene-reaction rule syntax.
pub struct GprValidation;

impl ValidationStage for GprValidation {
    fn name(&self) -> &str {
        "GPR Validation"
    }

    fn validate(&self, model: &Model) -> Result<Vec<ConsistencyWarning>, Vec<ConsistencyError>> {
        let errors = model
            .reactions
            .values()
            .filter(|r| parse_gpr(&r.gene_reaction_rule).is_err())
            .map(|r| ConsistencyError::InvalidGpr {
                reaction: r.id.clone(),
                rule: r.gene_reaction_rule.clone(),
            })
            .collect();
        into_result(errors)
    }
}

/// Metabolite validation - checks compartments and formulas.
///
/// Verifies:
/// - Each metabolite's compartment is declared (when the model declares any)
/// - Formulas contain only letters and digits
pub struct MetaboliteValidation;

impl ValidationStage for MetaboliteValidation {
    fn name(&self) -> &str {
        "Metabolite Validation"
    }

    fn validate(&self, model: &Model) -> Result<Vec<ConsistencyWarning>, Vec<ConsistencyError>> {
        let mut errors = Vec::new();
        let check_compartments = !model.compartments.is_empty();

        for metabolite in model.metabolites.values() {
            if let Some(compartment) = metabolite.compartment.as_deref() {
                if check_compartments && !model.compartments.contains_key(compartment) {
                    errors.push(ConsistencyError::UnknownCompartment {
                        metabolite: metabolite.id.clone(),
                        compartment: compartment.to_string(),
                    });
                }
            }
            if let Some(formula) = metabolite.formula.as_deref() {
                if !formula.is_empty() && !is_alphanumeric_formula(formula) {
                    errors.push(ConsistencyError::NonAlphanumericFormula {
                        metabolite: metabolite.id.clone(),
                        formula: formula.to_string(),
                    });
                }
            }
        }

        into_result(errors)
    }
}

/// Mass balance validation - flags reactions whose elements do not cancel.
///
/// Exchange, demand, biomass, sink and other pseudo-reactions (by SBO term)
/// are skipped. Findings are warnings only.
pub struct MassBalanceValidation;

impl ValidationStage for MassBalanceValidation {
    fn name(&self) -> &str {
        "Mass Balance Validation"
    }

    fn validate(&self, model: &Model) -> Result<Vec<ConsistencyWarning>, Vec<ConsistencyError>> {
        let mut warnings = Vec::new();

        for reaction in model.reactions.values() {
            if reaction.is_pseudo_reaction() {
                continue;
            }
            // Unreadable formulas are reported by the metabolite stage.
            let imbalance = match reaction_imbalance(model, reaction) {
                Ok(imbalance) => imbalance,
                Err(e) => {
                    log::warn!("skipping mass balance of reaction '{}': {}", reaction.id, e);
                    continue;
                }
            };
            if imbalance.is_empty() {
                continue;
            }

            let warning = if reaction.metabolites.len() == 1 {
                ConsistencyWarning::SingleMetabolite(reaction.id.clone())
            } else if reaction.id.to_lowercase().contains("biomass") {
                ConsistencyWarning::UnannotatedBiomass(reaction.id.clone())
            } else {
                // BTreeMap keys are already sorted
                ConsistencyWarning::Unbalanced {
                    reaction: reaction.id.clone(),
                    elements: imbalance.into_keys().collect(),
                }
            };
            warnings.push(warning);
        }

        Ok(warnings)
    }
}
