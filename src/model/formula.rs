//! Chemical formulas and reaction mass balance.

use crate::core::error::FormulaError;
use crate::model::{Model, Reaction};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Imbalances smaller than this are treated as balanced.
pub const BALANCE_TOLERANCE: f64 = 1e-9;

const ELEMENT_PATTERN: &str = r"([A-Z][a-z]*)([\d.]*)";

fn element_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| match Regex::new(ELEMENT_PATTERN) {
            Ok(regex) => Some(regex),
            Err(e) => {
                log::error!("formula pattern is invalid: {}", e);
                None
            }
        })
        .as_ref()
}

/// Count atoms per element in a formula such as `C6H12O6`.
///
/// Elements are read as `[A-Z][a-z]*` followed by an optional decimal count
/// (default 1). Characters that do not start an element are skipped. A count
/// that is not a number, such as `2.5.3`, fails the whole formula.
pub fn element_counts(formula: &str) -> Result<BTreeMap<String, f64>, FormulaError> {
    let mut counts = BTreeMap::new();
    let Some(pattern) = element_pattern() else {
        return Ok(counts);
    };
    for captures in pattern.captures_iter(formula) {
        let element = &captures[1];
        let digits = &captures[2];
        let count = if digits.is_empty() {
            1.0
        } else {
            digits.parse::<f64>().map_err(|_| FormulaError {
                formula: formula.to_string(),
                element: element.to_string(),
                count: digits.to_string(),
            })?
        };
        *counts.entry(element.to_string()).or_insert(0.0) += count;
    }
    Ok(counts)
}

/// Whether a formula contains only ASCII letters and digits.
pub fn is_alphanumeric_formula(formula: &str) -> bool {
    !formula.is_empty() && formula.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Net element (and charge) totals across a reaction, keeping only the
/// nonzero ones.
///
/// Charge is included under the key `charge` when any participant declares
/// one. Participants missing from the model contribute nothing. Fails if any
/// participant's formula cannot be read.
pub fn reaction_imbalance(model: &Model, reaction: &Reaction) -> Result<BTreeMap<String, f64>, FormulaError> {
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    for (metabolite_id, coefficient) in &reaction.metabolites {
        let Some(metabolite) = model.metabolites.get(metabolite_id) else {
            continue;
        };
        if let Some(formula) = metabolite.formula.as_deref() {
            for (element, count) in element_counts(formula)? {
                *totals.entry(element).or_insert(0.0) += coefficient * count;
            }
        }
        if let Some(charge) = metabolite.charge {
            *totals.entry("charge".to_string()).or_insert(0.0) += coefficient * f64::from(charge);
        }
    }
    totals.retain(|_, value| value.abs() > BALANCE_TOLERANCE);
    Ok(totals)
}
