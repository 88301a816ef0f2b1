//! Structural validation of SBML documents.
//!
//! Checkers work on a file path, so the decompressed content is written to a
//! scoped temporary file first. The file is removed when the guard drops,
//! whether the checker returns, fails or panics.

use crate::core::error::StructuralCheckError;
use crate::core::types::{Compression, DecompressedContent};
use crate::execution::pool::panic_message;
use crate::io::xml::{parse_document, Document, Element};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

/// How serious a structural failure is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Informational only.
    Info,
    /// Suspicious but allowed.
    Warning,
    /// Violates the format.
    Error,
    /// The document could not be read at all.
    Fatal,
}

impl Severity {
    /// Whether failures of this severity are reported.
    pub fn is_reported(&self) -> bool {
        matches!(self, Severity::Error | Severity::Fatal)
    }
}

/// One finding from a structural checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralFailure {
    /// 1-based line.
    pub line: usize,
    /// 1-based column.
    pub column: usize,
    /// Severity.
    pub severity: Severity,
    /// Description.
    pub message: String,
}

impl fmt::Display for StructuralFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{} C{}: {}", self.line, self.column, self.message)
    }
}

/// A validator for SBML files on disk.
pub trait StructuralChecker: Send + Sync {
    /// Name used to tag this checker's findings.
    fn name(&self) -> &str;

    /// Check the file at `path`.
    fn check_file(&self, path: &Path) -> Result<Vec<StructuralFailure>, StructuralCheckError>;
}

fn temp_suffix(filename: &str) -> String {
    Path::new(Compression::strip(filename))
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default()
}

fn check_content(
    checker: &dyn StructuralChecker,
    content: &DecompressedContent,
    filename: &str,
) -> Result<Vec<StructuralFailure>, StructuralCheckError> {
    let mut file = tempfile::Builder::new()
        .prefix("fluxcheck-")
        .suffix(&temp_suffix(filename))
        .tempfile()?;
    content.write_to(file.as_file_mut())?;
    file.as_file_mut().flush()?;
    match panic::catch_unwind(AssertUnwindSafe(|| checker.check_file(file.path()))) {
        Ok(result) => result,
        Err(payload) => Err(StructuralCheckError::Panicked(panic_message(payload.as_ref()))),
    }
}

/// Run a structural checker over decompressed content.
///
/// Returns `L<line> C<column>: <message>` for every error or fatal failure.
/// A checker that cannot run, or panics, yields a single line saying so; this
/// stage never fails the request.
pub fn run_structural_validation(
    checker: &dyn StructuralChecker,
    content: &DecompressedContent,
    filename: &str,
) -> Vec<String> {
    match check_content(checker, content, filename) {
        Ok(failures) => failures
            .iter()
            .filter(|failure| failure.severity.is_reported())
            .map(ToString::to_string)
            .collect(),
        Err(e) => {
            log::warn!("Structural checker '{}' failed on {}: {}", checker.name(), filename, e);
            vec![format!("structural check could not run: {e}")]
        }
    }
}

// ============================================================================
// Built-in checker
// ============================================================================

/// Structural checker for SBML core and the `fbc` package.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlStructureChecker;

impl XmlStructureChecker {
    /// Create the checker.
    pub fn new() -> Self {
        Self
    }

    /// Check an in-memory document.
    pub fn check_bytes(&self, source: &[u8]) -> Vec<StructuralFailure> {
        match parse_document(source) {
            Ok(document) => Findings::new(&document).run(),
            Err(e) => vec![StructuralFailure {
                line: e.line,
                column: e.column,
                severity: Severity::Fatal,
                message: format!("document is not well-formed XML: {}", e.message),
            }],
        }
    }
}

impl StructuralChecker for XmlStructureChecker {
    fn name(&self) -> &str {
        "sbml-structure"
    }

    fn check_file(&self, path: &Path) -> Result<Vec<StructuralFailure>, StructuralCheckError> {
        let source = std::fs::read(path)?;
        Ok(self.check_bytes(&source))
    }
}

fn is_sbo_term(term: &str) -> bool {
    term.strip_prefix("SBO:")
        .map(|digits| digits.len() == 7 && digits.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

struct Findings<'a> {
    document: &'a Document,
    failures: Vec<StructuralFailure>,
    ids: HashSet<String>,
}

impl<'a> Findings<'a> {
    fn new(document: &'a Document) -> Self {
        Self {
            document,
            failures: Vec::new(),
            ids: HashSet::new(),
        }
    }

    fn push(&mut self, element: &Element, severity: Severity, message: String) {
        let (line, column) = self.document.position_of(element);
        self.failures.push(StructuralFailure {
            line,
            column,
            severity,
            message,
        });
    }

    /// Record an identifier; returns it when present.
    fn declare(&mut self, element: &'a Element, what: &str, id: Option<&'a str>) -> Option<&'a str> {
        match id {
            None => {
                self.push(element, Severity::Error, format!("{what} is missing required attribute 'id'"));
                None
            }
            Some(id) => {
                if !self.ids.insert(id.to_string()) {
                    self.push(element, Severity::Error, format!("duplicate identifier '{id}'"));
                }
                Some(id)
            }
        }
    }

    fn sbo(&mut self, element: &Element) {
        if let Some(term) = element.attr("sboTerm") {
            if !is_sbo_term(term) {
                self.push(element, Severity::Warning, format!("malformed sboTerm '{term}'"));
            }
        }
    }

    fn run(mut self) -> Vec<StructuralFailure> {
        let document = self.document;
        let root = &document.root;
        if root.local_name() != "sbml" {
            self.push(root, Severity::Error, format!("root element is <{}>, expected <sbml>", root.name));
            return self.failures;
        }
        for attribute in ["level", "version"] {
            if root.attr(attribute).is_none() {
                self.push(root, Severity::Error, format!("<sbml> is missing required attribute '{attribute}'"));
            }
        }
        let level3 = root.attr("level") == Some("3");

        let models: Vec<&Element> = root.children_named("model").collect();
        if models.len() != 1 {
            self.push(
                root,
                Severity::Error,
                format!("<sbml> must contain exactly one <model>, found {}", models.len()),
            );
        }
        if let Some(model) = models.first() {
            self.check_model(model, level3);
        }
        self.failures
    }

    fn check_model(&mut self, model: &'a Element, level3: bool) {
        let mut compartments = HashSet::new();
        for compartment in model.list_items("listOfCompartments", "compartment") {
            if let Some(id) = self.declare(compartment, "compartment", compartment.attr("id")) {
                compartments.insert(id);
            }
        }

        let mut species_ids = HashSet::new();
        for species in model.list_items("listOfSpecies", "species") {
            self.sbo(species);
            let Some(id) = self.declare(species, "species", species.attr("id")) else {
                continue;
            };
            species_ids.insert(id);
            if let Some(compartment) = species.attr("compartment") {
                if !compartments.contains(compartment) {
                    self.push(
                        species,
                        Severity::Error,
                        format!("species '{id}' references undeclared compartment '{compartment}'"),
                    );
                }
            }
        }

        let mut parameters = HashSet::new();
        for parameter in model.list_items("listOfParameters", "parameter") {
            if let Some(id) = self.declare(parameter, "parameter", parameter.attr("id")) {
                parameters.insert(id);
            }
        }

        for product in model.list_items("listOfGeneProducts", "geneProduct") {
            self.declare(product, "gene product", product.attr_local("id"));
        }

        let mut reactions = HashSet::new();
        for reaction in model.list_items("listOfReactions", "reaction") {
            self.sbo(reaction);
            let Some(id) = self.declare(reaction, "reaction", reaction.attr("id")) else {
                continue;
            };
            reactions.insert(id);
            if level3 && reaction.attr("reversible").is_none() {
                self.push(
                    reaction,
                    Severity::Error,
                    format!("reaction '{id}' is missing required attribute 'reversible'"),
                );
            }
            for list in ["listOfReactants", "listOfProducts"] {
                for reference in reaction.list_items(list, "speciesReference") {
                    match reference.attr("species") {
                        Some(species) if !species_ids.contains(species) => self.push(
                            reference,
                            Severity::Error,
                            format!("reaction '{id}' references undeclared species '{species}'"),
                        ),
                        Some(_) => {}
                        None => self.push(
                            reference,
                            Severity::Error,
                            format!("species reference in reaction '{id}' is missing required attribute 'species'"),
                        ),
                    }
                }
            }
            for bound in ["lowerFluxBound", "upperFluxBound"] {
                if let Some(parameter) = reaction.attr_local(bound) {
                    if !parameters.contains(parameter) {
                        self.push(
                            reaction,
                            Severity::Error,
                            format!("reaction '{id}' {bound} references undeclared parameter '{parameter}'"),
                        );
                    }
                }
            }
        }

        if let Some(objectives) = model.child("listOfObjectives") {
            for objective in objectives.children_named("objective") {
                for flux in objective.list_items("listOfFluxObjectives", "fluxObjective") {
                    if let Some(reaction) = flux.attr_local("reaction") {
                        if !reactions.contains(reaction) {
                            self.push(
                                flux,
                                Severity::Error,
                                format!("flux objective references undeclared reaction '{reaction}'"),
                            );
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::path::PathBuf;

    const VALID: &str = r#"<?xml version="1.0"?>
<sbml level="3" version="1">
  <model id="m">
    <listOfCompartments><compartment id="c"/></listOfCompartments>
    <listOfSpecies><species id="a" compartment="c"/></listOfSpecies>
    <listOfParameters><parameter id="ub" value="1000"/></listOfParameters>
    <listOfReactions>
      <reaction id="R" reversible="false" sboTerm="SBO:0000176" fbc:upperFluxBound="ub">
        <listOfReactants><speciesReference species="a"/></listOfReactants>
      </reaction>
    </listOfReactions>
  </model>
</sbml>
"#;

    fn reported(source: &str) -> Vec<String> {
        XmlStructureChecker
            .check_bytes(source.as_bytes())
            .iter()
            .filter(|f| f.severity.is_reported())
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn test_valid_document() {
        assert!(reported(VALID).is_empty());
    }

    #[test]
    fn test_reference_errors() {
        let source = VALID
            .replace("species=\"a\"/>", "species=\"zz\"/>")
            .replace("compartment=\"c\"/></listOfSpecies>", "compartment=\"q\"/></listOfSpecies>")
            .replace("upperFluxBound=\"ub\"", "upperFluxBound=\"nope\"")
            .replace(" reversible=\"false\"", "")
            .replace("SBO:0000176", "SBO:176");
        assert_eq!(
            reported(&source),
            vec![
                "L5 C20: species 'a' references undeclared compartment 'q'",
                "L8 C7: reaction 'R' is missing required attribute 'reversible'",
                "L9 C26: reaction 'R' references undeclared species 'zz'",
                "L8 C7: reaction 'R' upperFluxBound references undeclared parameter 'nope'",
            ]
        );
    }

    #[test]
    fn test_duplicates_and_missing_ids() {
        let source = VALID.replace(
            "<compartment id=\"c\"/>",
            "<compartment id=\"c\"/><compartment id=\"a\"/><compartment/>",
        );
        let lines = reported(&source);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("compartment is missing required attribute 'id'"));
        assert!(lines[1].ends_with("duplicate identifier 'a'"));
    }

    #[test]
    fn test_not_well_formed() {
        let failures = XmlStructureChecker.check_bytes(b"<sbml>\n  <model>\n</sbml>");
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].severity, Severity::Fatal);
    }

    #[test]
    fn test_root_and_model_count() {
        assert_eq!(
            reported("<sbml level=\"3\" version=\"1\"/>"),
            vec!["L1 C1: <sbml> must contain exactly one <model>, found 0"]
        );
        assert_eq!(
            reported("<model/>"),
            vec!["L1 C1: root element is <model>, expected <sbml>"]
        );
    }

    struct Recording {
        seen: Mutex<Option<PathBuf>>,
        outcome: fn() -> Result<Vec<StructuralFailure>, StructuralCheckError>,
    }

    impl StructuralChecker for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        fn check_file(&self, path: &Path) -> Result<Vec<StructuralFailure>, StructuralCheckError> {
            assert!(path.exists());
            *self.seen.lock() = Some(path.to_path_buf());
            (self.outcome)()
        }
    }

    fn failures() -> Result<Vec<StructuralFailure>, StructuralCheckError> {
        Ok(vec![
            StructuralFailure {
                line: 3,
                column: 7,
                severity: Severity::Error,
                message: "bad".to_string(),
            },
            StructuralFailure {
                line: 4,
                column: 1,
                severity: Severity::Warning,
                message: "meh".to_string(),
            },
        ])
    }

    #[test]
    fn test_temp_file_removed_and_warnings_dropped() {
        let checker = Recording {
            seen: Mutex::new(None),
            outcome: failures,
        };
        let content = DecompressedContent::new(VALID.as_bytes().to_vec());
        let lines = run_structural_validation(&checker, &content, "model.xml.gz");
        assert_eq!(lines, vec!["L3 C7: bad"]);

        let path = checker.seen.lock().clone().unwrap();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("xml"));
        assert!(!path.exists());
    }

    #[test]
    fn test_checker_error_is_single_line() {
        let checker = Recording {
            seen: Mutex::new(None),
            outcome: || Err(StructuralCheckError::Other("validator crashed".to_string())),
        };
        let content = DecompressedContent::new(b"<sbml/>".to_vec());
        let lines = run_structural_validation(&checker, &content, "model.sbml");
        assert_eq!(lines, vec!["structural check could not run: validator crashed"]);
        assert!(!checker.seen.lock().clone().unwrap().exists());
    }

    #[test]
    fn test_panicking_checker_is_single_line() {
        let checker = Recording {
            seen: Mutex::new(None),
            outcome: || panic!("checker blew up"),
        };
        let content = DecompressedContent::new(b"<sbml/>".to_vec());
        let lines = run_structural_validation(&checker, &content, "model.xml");
        assert_eq!(lines, vec!["structural check could not run: checker blew up"]);
        assert!(!checker.seen.lock().clone().unwrap().exists());

        let formatted = Recording {
            seen: Mutex::new(None),
            outcome: || panic!("index {} out of range", 7),
        };
        let lines = run_structural_validation(&formatted, &content, "model.xml");
        assert_eq!(lines, vec!["structural check could not run: index 7 out of range"]);
    }

    #[test]
    fn test_deeply_nested_document_is_fatal() {
        let source = format!(
            "<sbml level=\"3\" version=\"1\"><model id=\"m\">{}{}</model></sbml>",
            "<a>".repeat(200_000),
            "</a>".repeat(200_000)
        );
        let failures = XmlStructureChecker.check_bytes(source.as_bytes());
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].severity, Severity::Fatal);
        assert!(failures[0].message.contains("nested deeper than"), "{}", failures[0].message);
    }

    #[test]
    fn test_real_checker_through_file() {
        let content = DecompressedContent::new(VALID.as_bytes().to_vec());
        assert!(run_structural_validation(&XmlStructureChecker, &content, "m.xml").is_empty());
    }

    #[test]
    fn test_temp_suffix() {
        assert_eq!(temp_suffix("model.xml.bz2"), ".xml");
        assert_eq!(temp_suffix("model"), "");
        assert_eq!(temp_suffix("model.x-ml"), "");
    }
}
