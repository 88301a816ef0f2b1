//! In-memory metabolic network.
//!
//! A [`Model`] holds compartments, metabolites, reactions and genes keyed by
//! id in insertion order. It is built by one of the loaders in [`crate::io`],
//! checked, solved and then dropped.

pub mod formula;
pub mod gpr;

use crate::core::error::ModelError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use formula::{element_counts, reaction_imbalance};
pub use gpr::{parse_gpr, Gpr};

/// SBO terms for reactions that are not expected to be mass balanced.
pub const PSEUDO_REACTION_TERMS: [&str; 5] = [
    "SBO:0000627", // exchange
    "SBO:0000628", // demand
    "SBO:0000629", // biomass
    "SBO:0000631", // pseudoreaction
    "SBO:0000632", // sink
];

/// Default flux bound magnitude used when a document gives none.
pub const DEFAULT_BOUND: f64 = 1000.0;

/// A chemical species in a compartment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metabolite {
    /// Unique id.
    pub id: String,
    /// Display name.
    pub name: Option<String>,
    /// Compartment id.
    pub compartment: Option<String>,
    /// Chemical formula, e.g. `C6H12O6`.
    pub formula: Option<String>,
    /// Net charge.
    pub charge: Option<i32>,
}

impl Metabolite {
    /// Create a metabolite with just an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Set the compartment.
    pub fn with_compartment(mut self, compartment: impl Into<String>) -> Self {
        self.compartment = Some(compartment.into());
        self
    }

    /// Set the formula.
    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    /// Set the charge.
    pub fn with_charge(mut self, charge: i32) -> Self {
        self.charge = Some(charge);
        self
    }
}

/// A flux-carrying edge of the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    /// Unique id.
    pub id: String,
    /// Display name.
    pub name: Option<String>,
    /// Metabolite id to stoichiometric coefficient; negative means consumed.
    pub metabolites: IndexMap<String, f64>,
    /// Minimum flux.
    pub lower_bound: f64,
    /// Maximum flux.
    pub upper_bound: f64,
    /// Boolean gene association, e.g. `b0001 and (b0002 or b0003)`.
    pub gene_reaction_rule: String,
    /// Coefficient of this reaction's flux in the objective.
    pub objective_coefficient: f64,
    /// Systems Biology Ontology term, e.g. `SBO:0000627`.
    pub sbo_term: Option<String>,
}

impl Reaction {
    /// Create an irreversible reaction with default bounds.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            metabolites: IndexMap::new(),
            lower_bound: 0.0,
            upper_bound: DEFAULT_BOUND,
            gene_reaction_rule: String::new(),
            objective_coefficient: 0.0,
            sbo_term: None,
        }
    }

    /// Add a participant.
    pub fn with_metabolite(mut self, metabolite: impl Into<String>, coefficient: f64) -> Self {
        *self.metabolites.entry(metabolite.into()).or_insert(0.0) += coefficient;
        self
    }

    /// Set both bounds.
    pub fn with_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.lower_bound = lower;
        self.upper_bound = upper;
        self
    }

    /// Set the gene-reaction rule.
    pub fn with_gene_rule(mut self, rule: impl Into<String>) -> Self {
        self.gene_reaction_rule = rule.into();
        self
    }

    /// Set the objective coefficient.
    pub fn with_objective(mut self, coefficient: f64) -> Self {
        self.objective_coefficient = coefficient;
        self
    }

    /// Set the SBO term.
    pub fn with_sbo(mut self, term: impl Into<String>) -> Self {
        self.sbo_term = Some(term.into());
        self
    }

    /// Whether the SBO annotation marks this as an exchange, demand, biomass,
    /// sink or other pseudo-reaction.
    pub fn is_pseudo_reaction(&self) -> bool {
        self.sbo_term
            .as_deref()
            .map(|term| PSEUDO_REACTION_TERMS.contains(&term))
            .unwrap_or(false)
    }
}

/// A gene referenced by gene-reaction rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Gene {
    /// Unique id.
    pub id: String,
    /// Display name.
    pub name: Option<String>,
}

impl Gene {
    /// Create a gene with just an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }
}

/// Represents a genome-scale metabolic model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Model id.
    pub id: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Compartment id to display name.
    pub compartments: IndexMap<String, String>,
    /// Metabolites by id.
    pub metabolites: IndexMap<String, Metabolite>,
    /// Reactions by id.
    pub reactions: IndexMap<String, Reaction>,
    /// Genes by id.
    pub genes: IndexMap<String, Gene>,
}

impl Model {
    /// Create an empty model.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Declare a compartment.
    pub fn add_compartment(&mut self, id: impl Into<String>, name: impl Into<String>) {
        self.compartments.insert(id.into(), name.into());
    }

    /// Add a metabolite; ids must be unique.
    pub fn add_metabolite(&mut self, metabolite: Metabolite) -> Result<(), ModelError> {
        if self.metabolites.contains_key(&metabolite.id) {
            return Err(ModelError::DuplicateId(metabolite.id));
        }
        self.metabolites.insert(metabolite.id.clone(), metabolite);
        Ok(())
    }

    /// Add a reaction; ids must be unique and every participant must exist.
    pub fn add_reaction(&mut self, reaction: Reaction) -> Result<(), ModelError> {
        if self.reactions.contains_key(&reaction.id) {
            return Err(ModelError::DuplicateId(reaction.id));
        }
        if let Some(missing) = reaction
            .metabolites
            .keys()
            .find(|id| !self.metabolites.contains_key(*id))
        {
            return Err(ModelError::UnknownMetabolite {
                reaction: reaction.id.clone(),
                metabolite: missing.clone(),
            });
        }
        self.reactions.insert(reaction.id.clone(), reaction);
        Ok(())
    }

    /// Add a gene; ids must be unique.
    pub fn add_gene(&mut self, gene: Gene) -> Result<(), ModelError> {
        if self.genes.contains_key(&gene.id) {
            return Err(ModelError::DuplicateId(gene.id));
        }
        self.genes.insert(gene.id.clone(), gene);
        Ok(())
    }

    /// Reactions with a nonzero objective coefficient.
    pub fn objective(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.reactions
            .values()
            .filter(|r| r.objective_coefficient != 0.0)
            .map(|r| (r.id.as_str(), r.objective_coefficient))
    }

    /// Number of reactions in the objective.
    pub fn objective_len(&self) -> usize {
        self.objective().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_model() -> Model {
        let mut model = Model::new("small");
        model.add_compartment("c", "cytosol");
        model
            .add_metabolite(Metabolite::new("a_c").with_compartment("c").with_formula("C2H4"))
            .unwrap();
        model
            .add_metabolite(Metabolite::new("b_c").with_compartment("c").with_formula("C2H4"))
            .unwrap();
        model
            .add_reaction(
                Reaction::new("A2B")
                    .with_metabolite("a_c", -1.0)
                    .with_metabolite("b_c", 1.0)
                    .with_objective(1.0),
            )
            .unwrap();
        model
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut model = small_model();
        let err = model.add_metabolite(Metabolite::new("a_c")).unwrap_err();
        assert_eq!(err, ModelError::DuplicateId("a_c".to_string()));
        assert!(model.add_gene(Gene::new("g1")).is_ok());
        assert!(model.add_gene(Gene::new("g1")).is_err());
    }

    #[test]
    fn test_unknown_metabolite_rejected() {
        let mut model = small_model();
        let err = model
            .add_reaction(Reaction::new("R2").with_metabolite("zzz", 1.0))
            .unwrap_err();
        assert!(err.to_string().contains("zzz"));
    }

    #[test]
    fn test_objective_terms() {
        let model = small_model();
        let terms: Vec<_> = model.objective().collect();
        assert_eq!(terms, vec![("A2B", 1.0)]);
        assert_eq!(model.objective_len(), 1);
    }

    #[test]
    fn test_pseudo_reaction_terms() {
        assert!(Reaction::new("EX_a").with_sbo("SBO:0000627").is_pseudo_reaction());
        assert!(!Reaction::new("R").with_sbo("SBO:0000176").is_pseudo_reaction());
        assert!(!Reaction::new("R").is_pseudo_reaction());
    }

    #[test]
    fn test_repeated_participant_accumulates() {
        let reaction = Reaction::new("R")
            .with_metabolite("a", -1.0)
            .with_metabolite("a", -1.0);
        assert_eq!(reaction.metabolites["a"], -2.0);
    }
}
