//! SBML loading.
//!
//! Reads SBML level 2 and 3 documents, with flux bounds, gene associations
//! and objectives taken from the `fbc` package when present and from the
//! legacy kinetic-law parameters and notes otherwise.

use crate::core::error::GprError;
use crate::core::types::DecompressedContent;
use crate::core::StageResult;
use crate::io::xml::{parse_document, Document, Element};
use crate::io::LoadedModel;
use crate::model::gpr::MAX_NESTING;
use crate::model::{Gene, Gpr, Metabolite, Model, Reaction, DEFAULT_BOUND};
use std::collections::{HashMap, HashSet};

/// Prefix conventionally added to gene product ids.
const GENE_PREFIX: &str = "G_";

/// Load an SBML document.
///
/// Fails fatally only if no model can be built at all: malformed XML, a
/// root that is not `<sbml>`, or no `<model>` element.
pub fn load_sbml(content: &DecompressedContent) -> StageResult<LoadedModel> {
    let document = match parse_document(content.as_bytes()) {
        Ok(document) => document,
        Err(e) => return StageResult::FatalParseError(e.to_string()),
    };
    if document.root.local_name() != "sbml" {
        return StageResult::FatalParseError(format!(
            "document root is <{}>, expected <sbml>",
            document.root.name
        ));
    }
    let Some(model_element) = document.root.child("model") else {
        return StageResult::FatalParseError("SBML document has no <model> element".to_string());
    };

    let mut builder = ModelBuilder::new(&document);
    builder.build(model_element);
    log::debug!(
        "Loaded SBML model with {} reactions, {} metabolites, {} construction errors",
        builder.model.reactions.len(),
        builder.model.metabolites.len(),
        builder.errors.len()
    );
    StageResult::Success(LoadedModel::new(builder.model).with_errors(builder.errors))
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok()
}

fn strip_gene_prefix(id: &str) -> &str {
    id.strip_prefix(GENE_PREFIX).unwrap_or(id)
}

/// `KEY: value` lines from a `<notes>` block, keys upper-cased.
fn notes_entries(element: &Element) -> HashMap<String, String> {
    let Some(notes) = element.child("notes") else {
        return HashMap::new();
    };
    notes
        .descendants()
        .into_iter()
        .filter_map(|e| e.text.split_once(':'))
        .map(|(key, value)| (key.trim().to_uppercase(), value.trim().to_string()))
        .collect()
}

struct ModelBuilder<'a> {
    document: &'a Document,
    model: Model,
    errors: Vec<String>,
    parameters: HashMap<String, f64>,
    boundary_species: HashSet<String>,
    gene_products: HashMap<String, String>,
}

impl<'a> ModelBuilder<'a> {
    fn new(document: &'a Document) -> Self {
        Self {
            document,
            model: Model::default(),
            errors: Vec::new(),
            parameters: HashMap::new(),
            boundary_species: HashSet::new(),
            gene_products: HashMap::new(),
        }
    }

    fn missing_id(&mut self, what: &str, element: &Element) {
        let (line, column) = self.document.position_of(element);
        self.errors
            .push(format!("{what} without id at line {line} column {column}"));
    }

    fn build(&mut self, model: &Element) {
        self.model.id = model.attr("id").map(str::to_string);
        self.model.name = model.attr("name").map(str::to_string);

        self.read_compartments(model);
        self.read_parameters(model);
        self.read_species(model);
        self.read_gene_products(model);
        self.read_reactions(model);
        self.read_objective(model);
    }

    fn read_compartments(&mut self, model: &Element) {
        for compartment in model.list_items("listOfCompartments", "compartment") {
            match compartment.attr("id") {
                Some(id) => {
                    let name = compartment.attr("name").unwrap_or(id);
                    self.model.add_compartment(id, name);
                }
                None => self.missing_id("compartment", compartment),
            }
        }
    }

    fn read_parameters(&mut self, model: &Element) {
        for parameter in model.list_items("listOfParameters", "parameter") {
            let Some(id) = parameter.attr("id") else {
                self.missing_id("parameter", parameter);
                continue;
            };
            match parameter.attr("value").map(parse_number) {
                Some(Some(value)) => {
                    self.parameters.insert(id.to_string(), value);
                }
                Some(None) => self.errors.push(format!(
                    "parameter '{id}' has unparsable value '{}'",
                    parameter.attr("value").unwrap_or_default()
                )),
                None => self
                    .errors
                    .push(format!("parameter '{id}' has no value")),
            }
        }
    }

    fn read_species(&mut self, model: &Element) {
        for species in model.list_items("listOfSpecies", "species") {
            let Some(id) = species.attr("id") else {
                self.missing_id("species", species);
                continue;
            };
            if species.attr("boundaryCondition") == Some("true") {
                self.boundary_species.insert(id.to_string());
                continue;
            }

            let notes = notes_entries(species);
            let formula = species
                .attr_local("chemicalFormula")
                .map(str::to_string)
                .or_else(|| notes.get("FORMULA").cloned())
                .filter(|f| !f.is_empty());
            let charge_text = species
                .attr_local("charge")
                .map(str::to_string)
                .or_else(|| notes.get("CHARGE").cloned());
            let charge = match charge_text.as_deref().map(str::trim) {
                None | Some("") => None,
                Some(text) => match text.parse::<i32>() {
                    Ok(charge) => Some(charge),
                    Err(_) => {
                        self.errors
                            .push(format!("species '{id}' has unparsable charge '{text}'"));
                        None
                    }
                },
            };

            let metabolite = Metabolite {
                id: id.to_string(),
                name: species.attr("name").map(str::to_string),
                compartment: species.attr("compartment").map(str::to_string),
                formula,
                charge,
            };
            if let Err(e) = self.model.add_metabolite(metabolite) {
                self.errors.push(e.to_string());
            }
        }
    }

    fn read_gene_products(&mut self, model: &Element) {
        for product in model.list_items("listOfGeneProducts", "geneProduct") {
            let Some(raw_id) = product.attr_local("id") else {
                self.missing_id("gene product", product);
                continue;
            };
            let gene_id = strip_gene_prefix(raw_id).to_string();
            self.gene_products.insert(raw_id.to_string(), gene_id.clone());
            let gene = Gene {
                id: gene_id,
                name: product
                    .attr_local("name")
                    .or_else(|| product.attr_local("label"))
                    .map(str::to_string),
            };
            if let Err(e) = self.model.add_gene(gene) {
                self.errors.push(e.to_string());
            }
        }
    }

    fn association(&self, element: &Element, depth: usize) -> Result<Option<Gpr>, GprError> {
        if depth > MAX_NESTING {
            return Err(GprError::TooDeep {
                limit: MAX_NESTING,
                position: element.offset,
            });
        }
        match element.local_name() {
            "geneProductRef" => {
                let Some(reference) = element.attr_local("geneProduct") else {
                    return Ok(None);
                };
                let gene = self
                    .gene_products
                    .get(reference)
                    .cloned()
                    .unwrap_or_else(|| strip_gene_prefix(reference).to_string());
                Ok(Some(Gpr::Gene(gene)))
            }
            name @ ("and" | "or") => {
                let mut items = Vec::new();
                for child in &element.children {
                    if let Some(item) = self.association(child, depth + 1)? {
                        items.push(item);
                    }
                }
                Ok(match items.len() {
                    0 => None,
                    1 => items.pop(),
                    _ if name == "and" => Some(Gpr::And(items)),
                    _ => Some(Gpr::Or(items)),
                })
            }
            _ => Ok(None),
        }
    }

    fn participants(&mut self, reaction_id: &str, element: &Element, list: &str, sign: f64, reaction: &mut Reaction) {
        for reference in element.list_items(list, "speciesReference") {
            let Some(species) = reference.attr("species") else {
                self.errors
                    .push(format!("reaction '{reaction_id}' has a species reference without species"));
                continue;
            };
            if self.boundary_species.contains(species) {
                continue;
            }
            if !self.model.metabolites.contains_key(species) {
                self.errors.push(format!(
                    "reaction '{reaction_id}' references unknown species '{species}'"
                ));
                continue;
            }
            let stoichiometry = match reference.attr("stoichiometry") {
                None => 1.0,
                Some(text) => match parse_number(text) {
                    Some(value) => value,
                    None => {
                        self.errors.push(format!(
                            "reaction '{reaction_id}' has unparsable stoichiometry '{text}' for '{species}'"
                        ));
                        continue;
                    }
                },
            };
            *reaction.metabolites.entry(species.to_string()).or_insert(0.0) += sign * stoichiometry;
        }
    }

    fn flux_bound(&mut self, reaction_id: &str, element: &Element, key: &str) -> Option<f64> {
        let reference = element.attr_local(key)?;
        match self.parameters.get(reference) {
            Some(value) => Some(*value),
            None => {
                self.errors.push(format!(
                    "reaction '{reaction_id}' references unknown parameter '{reference}'"
                ));
                None
            }
        }
    }

    fn kinetic_parameters(&mut self, reaction_id: &str, element: &Element) -> HashMap<String, f64> {
        let mut values = HashMap::new();
        let Some(law) = element.child("kineticLaw") else {
            return values;
        };
        let parameters = law
            .list_items("listOfParameters", "parameter")
            .chain(law.list_items("listOfLocalParameters", "localParameter"));
        for parameter in parameters {
            let Some(key) = parameter.attr("id").or_else(|| parameter.attr("name")) else {
                continue;
            };
            match parameter.attr("value").and_then(parse_number) {
                Some(value) => {
                    values.insert(key.to_uppercase(), value);
                }
                None => self.errors.push(format!(
                    "reaction '{reaction_id}' has unparsable kinetic law parameter '{key}'"
                )),
            }
        }
        values
    }

    fn read_reactions(&mut self, model: &Element) {
        for element in model.list_items("listOfReactions", "reaction") {
            let Some(id) = element.attr("id") else {
                self.missing_id("reaction", element);
                continue;
            };
            let mut reaction = Reaction::new(id);
            reaction.name = element.attr("name").map(str::to_string);
            reaction.sbo_term = element.attr("sboTerm").map(str::to_string);

            self.participants(id, element, "listOfReactants", -1.0, &mut reaction);
            self.participants(id, element, "listOfProducts", 1.0, &mut reaction);

            let kinetic = self.kinetic_parameters(id, element);
            let lower = self
                .flux_bound(id, element, "lowerFluxBound")
                .or_else(|| kinetic.get("LOWER_BOUND").copied());
            let upper = self
                .flux_bound(id, element, "upperFluxBound")
                .or_else(|| kinetic.get("UPPER_BOUND").copied());
            let reversible = element.attr("reversible") != Some("false");
            if lower.is_none() || upper.is_none() {
                self.errors
                    .push(format!("reaction '{id}' is missing flux bounds"));
            }
            reaction.lower_bound = lower.unwrap_or(if reversible { -DEFAULT_BOUND } else { 0.0 });
            reaction.upper_bound = upper.unwrap_or(DEFAULT_BOUND);
            reaction.objective_coefficient = kinetic.get("OBJECTIVE_COEFFICIENT").copied().unwrap_or(0.0);

            let association = match element
                .child("geneProductAssociation")
                .and_then(|a| a.children.first())
            {
                Some(root) => self.association(root, 0).unwrap_or_else(|e| {
                    self.errors
                        .push(format!("reaction '{id}' has an unreadable gene association: {e}"));
                    None
                }),
                None => None,
            };
            reaction.gene_reaction_rule = match association {
                Some(gpr) => gpr.to_string(),
                None => notes_entries(element)
                    .remove("GENE_ASSOCIATION")
                    .unwrap_or_default(),
            };

            if let Err(e) = self.model.add_reaction(reaction) {
                self.errors.push(e.to_string());
            }
        }
    }

    fn read_objective(&mut self, model: &Element) {
        let Some(list) = model.child("listOfObjectives") else {
            return;
        };
        let active = list.attr_local("activeObjective");
        let objective = list
            .children_named("objective")
            .find(|o| active.is_some() && o.attr_local("id") == active)
            .or_else(|| list.children_named("objective").next());
        let Some(objective) = objective else {
            return;
        };

        let sign = if objective.attr_local("type") == Some("minimize") { -1.0 } else { 1.0 };
        // fbc objectives replace any kinetic-law coefficients
        for reaction in self.model.reactions.values_mut() {
            reaction.objective_coefficient = 0.0;
        }
        for flux in objective.list_items("listOfFluxObjectives", "fluxObjective") {
            let Some(reaction_id) = flux.attr_local("reaction") else {
                self.errors
                    .push("flux objective without reaction".to_string());
                continue;
            };
            let coefficient = flux.attr_local("coefficient").and_then(parse_number);
            let Some(coefficient) = coefficient else {
                self.errors.push(format!(
                    "flux objective for '{reaction_id}' has no usable coefficient"
                ));
                continue;
            };
            match self.model.reactions.get_mut(reaction_id) {
                Some(reaction) => reaction.objective_coefficient = sign * coefficient,
                None => self.errors.push(format!(
                    "objective references unknown reaction '{reaction_id}'"
                )),
            }
        }
    }
}
