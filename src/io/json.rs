//! COBRA JSON loading.

use crate::core::types::DecompressedContent;
use crate::core::StageResult;
use crate::core::error::ModelError;
use crate::io::schema;
use crate::io::LoadedModel;
use crate::model::{parse_gpr, Gene, Metabolite, Model, Reaction, DEFAULT_BOUND};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
struct JsonModel {
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    compartments: IndexMap<String, String>,
    metabolites: Vec<JsonMetabolite>,
    reactions: Vec<JsonReaction>,
    #[serde(default)]
    genes: Vec<JsonGene>,
}

#[derive(Deserialize)]
struct JsonMetabolite {
    id: String,
    name: Option<String>,
    compartment: Option<String>,
    formula: Option<String>,
    charge: Option<f64>,
}

fn default_upper_bound() -> f64 {
    DEFAULT_BOUND
}

#[derive(Deserialize)]
struct JsonReaction {
    id: String,
    name: Option<String>,
    #[serde(default)]
    metabolites: IndexMap<String, f64>,
    #[serde(default)]
    lower_bound: f64,
    #[serde(default = "default_upper_bound")]
    upper_bound: f64,
    #[serde(default)]
    gene_reaction_rule: String,
    #[serde(default)]
    objective_coefficient: f64,
    annotation: Option<Value>,
}

#[derive(Deserialize)]
struct JsonGene {
    id: String,
    name: Option<String>,
}

fn sbo_term(annotation: Option<&Value>) -> Option<String> {
    let annotation = annotation?;
    annotation
        .get("sbo")
        .or_else(|| annotation.get("SBO"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn integral_charge(metabolite: &str, charge: f64) -> Result<i32, ModelError> {
    if charge.fract() != 0.0 || charge.abs() > f64::from(i32::MAX) {
        return Err(ModelError::Malformed(format!(
            "metabolite '{metabolite}' has non-integer charge {charge}"
        )));
    }
    Ok(charge as i32)
}

impl JsonModel {
    fn into_model(self) -> Result<Model, ModelError> {
        let mut model = Model {
            id: self.id,
            name: self.name,
            compartments: self.compartments,
            ..Model::default()
        };

        for m in self.metabolites {
            let charge = m.charge.map(|c| integral_charge(&m.id, c)).transpose()?;
            model.add_metabolite(Metabolite {
                id: m.id,
                name: m.name,
                compartment: m.compartment,
                formula: m.formula,
                charge,
            })?;
        }

        for g in self.genes {
            model.add_gene(Gene {
                id: g.id,
                name: g.name,
            })?;
        }

        for r in self.reactions {
            // Genes named only in a rule are added implicitly; bad rules are
            // reported by the consistency checks, not here.
            if let Ok(Some(gpr)) = parse_gpr(&r.gene_reaction_rule) {
                for gene in gpr.genes() {
                    if !model.genes.contains_key(gene) {
                        model.add_gene(Gene::new(gene))?;
                    }
                }
            }
            model.add_reaction(Reaction {
                sbo_term: sbo_term(r.annotation.as_ref()),
                id: r.id,
                name: r.name,
                metabolites: r.metabolites,
                lower_bound: r.lower_bound,
                upper_bound: r.upper_bound,
                gene_reaction_rule: r.gene_reaction_rule,
                objective_coefficient: r.objective_coefficient,
            })?;
        }

        Ok(model)
    }
}

fn build_model(document: &Value) -> Result<Model, String> {
    let parsed = JsonModel::deserialize(document).map_err(|e| e.to_string())?;
    parsed.into_model().map_err(|e| e.to_string())
}

/// Load a COBRA JSON document.
///
/// Malformed JSON is fatal. A document that parses but cannot be turned into
/// a model yields soft errors only. Schema violations are always appended.
pub fn load_json(content: &DecompressedContent) -> StageResult<LoadedModel> {
    let document: Value = match serde_json::from_slice(content.as_bytes()) {
        Ok(document) => document,
        Err(e) => return StageResult::FatalParseError(format!("Invalid JSON: {e}")),
    };

    let mut errors = Vec::new();
    let model = match build_model(&document) {
        Ok(model) => Some(model),
        Err(detail) => {
            errors.push(format!("Invalid model: {detail}"));
            None
        }
    };

    errors.extend(schema::validate(&document).iter().map(ToString::to_string));

    match model {
        Some(model) => {
            log::debug!(
                "Loaded JSON model with {} reactions, {} metabolites",
                model.reactions.len(),
                model.metabolites.len()
            );
            StageResult::Success(LoadedModel::new(model).with_errors(errors))
        }
        None => StageResult::SoftErrors(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn load(value: Value) -> StageResult<LoadedModel> {
        load_json(&DecompressedContent::new(value.to_string().into_bytes()))
    }

    fn mini() -> Value {
        json!({
            "id": "mini",
            "compartments": {"e": "extracellular", "c": "cytosol"},
            "metabolites": [
                {"id": "glc_e", "name": "glucose", "compartment": "e", "formula": "C6H12O6", "charge": 0},
                {"id": "glc_c", "name": "glucose", "compartment": "c", "formula": "C6H12O6", "charge": 0}
            ],
            "reactions": [
                {"id": "EX_glc", "name": "exchange", "metabolites": {"glc_e": -1},
                 "lower_bound": -10, "upper_bound": 1000, "gene_reaction_rule": "",
                 "annotation": {"sbo": "SBO:0000627"}},
                {"id": "GLCt", "name": "transport", "metabolites": {"glc_e": -1, "glc_c": 1},
                 "lower_bound": 0, "upper_bound": 1000, "gene_reaction_rule": "b0001"},
                {"id": "BIOMASS", "name": "biomass", "metabolites": {"glc_c": -1},
                 "lower_bound": 0, "upper_bound": 1000, "gene_reaction_rule": "",
                 "objective_coefficient": 1, "annotation": {"SBO": "SBO:0000629"}}
            ],
            "genes": [{"id": "b0001", "name": "ptsG"}]
        })
    }

    #[test]
    fn test_load_valid_model() {
        let StageResult::Success(loaded) = load(mini()) else {
            panic!("expected a model");
        };
        assert!(loaded.errors.is_empty(), "{:?}", loaded.errors);
        let model = loaded.model;
        assert_eq!(model.id.as_deref(), Some("mini"));
        assert_eq!(model.reactions.len(), 3);
        assert_eq!(model.reactions["EX_glc"].lower_bound, -10.0);
        assert_eq!(model.reactions["EX_glc"].sbo_term.as_deref(), Some("SBO:0000627"));
        assert_eq!(model.reactions["BIOMASS"].sbo_term.as_deref(), Some("SBO:0000629"));
        assert_eq!(model.objective_len(), 1);
        assert_eq!(model.metabolites["glc_c"].charge, Some(0));
    }

    #[test]
    fn test_invalid_json_is_fatal() {
        let result = load_json(&DecompressedContent::new(b"{\"id\": ".to_vec()));
        match result {
            StageResult::FatalParseError(message) => assert!(message.starts_with("Invalid JSON: ")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_missing_reactions_is_soft() {
        let result = load(json!({"id": "m", "metabolites": [], "genes": []}));
        let StageResult::SoftErrors(errors) = result else {
            panic!("expected soft errors");
        };
        assert!(errors[0].starts_with("Invalid model: "));
        assert!(errors.contains(&"'reactions' is a required property".to_string()));
    }

    #[test]
    fn test_unknown_metabolite_is_soft() {
        let mut doc = mini();
        doc["reactions"][1]["metabolites"]["nope"] = json!(1);
        let StageResult::SoftErrors(errors) = load(doc) else {
            panic!("expected soft errors");
        };
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("nope"));
    }

    #[test]
    fn test_schema_errors_kept_with_model() {
        let mut doc = mini();
        doc["reactions"][2]["lower_bound"] = json!("abc");
        // the bound no longer deserializes, so no model either
        let StageResult::SoftErrors(errors) = load(doc) else {
            panic!("expected soft errors");
        };
        assert!(errors
            .iter()
            .any(|e| e == "Error in reactions[2].lower_bound: 'abc' is not of type 'number'"));

        let mut doc = mini();
        doc["metabolites"][0]["compartment"] = json!("E");
        let StageResult::Success(loaded) = load(doc) else {
            panic!("expected a model");
        };
        assert_eq!(
            loaded.errors,
            vec!["Error in metabolites[0].compartment: 'E' does not match '[a-z]{1,2}'"]
        );
    }

    #[test]
    fn test_genes_from_rules_added() {
        let mut doc = mini();
        doc["reactions"][1]["gene_reaction_rule"] = json!("b0001 and b0002");
        let StageResult::Success(loaded) = load(doc) else {
            panic!("expected a model");
        };
        assert!(loaded.model.genes.contains_key("b0002"));
    }

    #[test]
    fn test_defaults() {
        let doc = json!({
            "metabolites": [{"id": "a"}],
            "reactions": [{"id": "R", "metabolites": {"a": 1}}]
        });
        let StageResult::Success(loaded) = load(doc) else {
            panic!("expected a model");
        };
        let reaction = &loaded.model.reactions["R"];
        assert_eq!((reaction.lower_bound, reaction.upper_bound), (0.0, 1000.0));
        assert_eq!(reaction.gene_reaction_rule, "");
        assert_eq!(reaction.objective_coefficient, 0.0);
        // schema still complains about what the loader tolerated
        assert!(!loaded.errors.is_empty());
    }
}
