//! Error types for fluxcheck.
//!
//! Uses thiserror for structured errors. Errors are split by concern:
//! - Fatal pipeline errors reject an upload outright
//! - Soft problems are rendered to strings and collected in a [`ValidationOutcome`]
//! - Infrastructure errors (config, worker pool) surface through [`FluxcheckError`]

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for one validation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Create a new random request ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Top-level error type for fluxcheck.
#[derive(Error, Debug)]
pub enum FluxcheckError {
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Corrupt compressed payloads.
///
/// The message identifies the compression format and is sent back to the
/// client verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecompressError {
    #[error("Error decompressing gzip file: {0}")]
    Gzip(String),

    #[error("Error decompressing bz2 file: {0}")]
    Bzip2(String),

    #[error("Error decompressing {format} file: content exceeds {limit} bytes")]
    TooLarge { format: &'static str, limit: usize },
}

/// Errors that abort a validation request.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The upload could not be decompressed.
    #[error("{0}")]
    Decompress(#[from] DecompressError),

    /// The document could not be parsed into anything model-like.
    #[error("{0}")]
    Parse(String),

    /// A stage could not be scheduled or its worker died.
    #[error("{0}")]
    Pool(#[from] PoolError),
}

impl PipelineError {
    /// Whether this error is the client's fault (the upload is rejected).
    pub fn is_rejection(&self) -> bool {
        matches!(self, PipelineError::Decompress(_) | PipelineError::Parse(_))
    }
}

/// Errors from the bounded worker pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to start worker threads: {0}")]
    Build(String),

    #[error("Worker pool saturated: {queued} jobs queued (limit {limit})")]
    Saturated { queued: usize, limit: usize },

    #[error("Worker running stage '{stage}' terminated before returning a result")]
    WorkerLost { stage: String },

    #[error("Worker pool has been shut down")]
    ShutDown,
}

/// Errors while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

/// Errors building a model from a parsed document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("id '{0}' is already present in the model")]
    DuplicateId(String),

    #[error("reaction '{reaction}' references unknown metabolite '{metabolite}'")]
    UnknownMetabolite { reaction: String, metabolite: String },

    #[error("{0}")]
    Malformed(String),
}

/// Gene-reaction-rule syntax errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GprError {
    #[error("unexpected '{token}' at position {position}")]
    UnexpectedToken { token: String, position: usize },

    #[error("unexpected end of rule")]
    UnexpectedEnd,

    #[error("unbalanced parenthesis at position {0}")]
    UnbalancedParenthesis(usize),

    #[error("rule nested deeper than {limit} levels at position {position}")]
    TooDeep { limit: usize, position: usize },
}

/// A chemical formula whose atom counts cannot be read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("formula '{formula}' has unreadable count '{count}' for {element}")]
pub struct FormulaError {
    /// The whole formula.
    pub formula: String,
    /// Element the count belongs to.
    pub element: String,
    /// The count as written.
    pub count: String,
}

/// Consistency problems that make a model invalid.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsistencyError {
    #[error("reaction '{reaction}' has lower_bound > upper_bound")]
    InvertedBounds { reaction: String },

    #[error("reaction '{reaction}' has infinite {bound}")]
    InfiniteBound { reaction: String, bound: &'static str },

    #[error("reaction '{reaction}' has NaN for {bound}")]
    NanBound { reaction: String, bound: &'static str },

    #[error("reaction '{reaction}' has invalid gpr '{rule}'")]
    InvalidGpr { reaction: String, rule: String },

    #[error("metabolite '{metabolite}' compartment '{compartment}' not found")]
    UnknownCompartment { metabolite: String, compartment: String },

    #[error("metabolite '{metabolite}' formula '{formula}' not alphanumeric")]
    NonAlphanumericFormula { metabolite: String, formula: String },
}

/// Consistency problems worth reporting that do not invalidate a model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsistencyWarning {
    #[error("reaction '{0}' is not balanced. Should it be annotated as a demand or exchange reaction?")]
    SingleMetabolite(String),

    #[error("reaction '{0}' is not balanced. Should it be annotated as a biomass reaction?")]
    UnannotatedBiomass(String),

    #[error("reaction '{reaction}' is not balanced for {}", .elements.join(", "))]
    Unbalanced { reaction: String, elements: Vec<String> },
}

/// Errors from the XML reader.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("XML parse error at line {line} column {column}: {message}")]
pub struct XmlError {
    /// Human-readable description.
    pub message: String,
    /// Byte offset of the failure.
    pub offset: usize,
    /// 1-based line.
    pub line: usize,
    /// 1-based column.
    pub column: usize,
}

/// Errors raised by a solver before it could report a status.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("invalid problem: {0}")]
    InvalidProblem(String),
}

/// Errors from the structural checker itself (not findings about the file).
#[derive(Error, Debug)]
pub enum StructuralCheckError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The checker panicked; holds the panic message.
    #[error("{0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for fluxcheck operations.
pub type FluxcheckResult<T> = Result<T, FluxcheckError>;

/// Result type alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

// ============================================================================
// Stage Results
// ============================================================================

/// Outcome of a pipeline stage that may short-circuit the request.
#[derive(Debug, Clone, PartialEq)]
pub enum StageResult<T> {
    /// The stage produced its value; the pipeline continues.
    Success(T),
    /// The stage produced no value but the problems are reportable.
    SoftErrors(Vec<String>),
    /// The upload is rejected.
    FatalParseError(String),
}

// ============================================================================
// Validation Outcome
// ============================================================================

/// Accumulated report for one upload.
///
/// Entries are only ever appended; a later stage cannot drop an earlier
/// stage's findings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Problems that make the model invalid.
    pub errors: Vec<String>,
    /// Non-fatal issues worth a look.
    pub warnings: Vec<String>,
    /// Optimal objective value, present only when the solver reached optimality.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub objective: Option<f64>,
}

impl ValidationOutcome {
    /// Create a new empty outcome.
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcome for a document that parsed but produced no model.
    pub fn without_model(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            errors,
            warnings,
            objective: None,
        }
    }

    /// Add an error.
    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// Add a warning.
    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Append another stage's findings after this one's.
    pub fn merge(&mut self, other: ValidationOutcome) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        if other.objective.is_some() {
            self.objective = other.objective;
        }
    }

    /// Check if no errors were recorded.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Get a one-line summary for logs.
    pub fn summary(&self) -> String {
        let objective = match self.objective {
            Some(value) => format!("objective {value}"),
            None => "no objective".to_string(),
        };
        format!(
            "{} error(s), {} warning(s), {}",
            self.errors.len(),
            self.warnings.len(),
            objective
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_display() {
        let id = RequestId::new();
        assert_eq!(format!("{}", id).len(), 8);
    }

    #[test]
    fn test_decompress_error_messages() {
        let gz = DecompressError::Gzip("invalid gzip header".to_string());
        assert_eq!(gz.to_string(), "Error decompressing gzip file: invalid gzip header");
        let bz = DecompressError::Bzip2("data error".to_string());
        assert!(bz.to_string().starts_with("Error decompressing bz2 file: "));
        let big = DecompressError::TooLarge {
            format: "gzip",
            limit: 1024,
        };
        assert_eq!(
            big.to_string(),
            "Error decompressing gzip file: content exceeds 1024 bytes"
        );
    }

    #[test]
    fn test_pipeline_error_is_rejection() {
        assert!(PipelineError::Parse("Invalid JSON".to_string()).is_rejection());
        let pool = PipelineError::Pool(PoolError::WorkerLost {
            stage: "solve".to_string(),
        });
        assert!(!pool.is_rejection());
    }

    #[test]
    fn test_outcome_merge_appends() {
        let mut outcome = ValidationOutcome::new();
        outcome.add_error("first");
        outcome.add_warning("w1");

        let mut later = ValidationOutcome::new();
        later.add_error("second");
        later.objective = Some(0.8);
        outcome.merge(later);

        assert_eq!(outcome.errors, vec!["first", "second"]);
        assert_eq!(outcome.warnings, vec!["w1"]);
        assert_eq!(outcome.objective, Some(0.8));
        assert!(!outcome.is_valid());
    }

    #[test]
    fn test_outcome_serialization_omits_missing_objective() {
        let outcome = ValidationOutcome::without_model(vec!["Invalid model: x".to_string()], vec![]);
        let json = serde_json::to_string(&outcome).unwrap();
        assert_eq!(json, r#"{"errors":["Invalid model: x"],"warnings":[]}"#);
    }
}
