//! Per-request orchestration of the validation pipeline.
//!
//! Every blocking stage runs on the shared [`WorkerPool`]; the request task
//! only awaits stage results. Stages are chained in order, except that SBML
//! parsing and the structural check are submitted together.

use crate::core::config::DEFAULT_MAX_DECOMPRESSED_BYTES;
use crate::core::{
    DecompressedContent, ModelFormat, PipelineError, RequestId, SolverConfig, StageResult,
    UploadedFile, ValidationOutcome,
};
use crate::execution::pool::WorkerPool;
use crate::execution::progress::{Stage, StageCallback, StageTracker};
use crate::io::{self, LoadedModel};
use crate::solver::{assess, ClarabelSolver, FeasibilitySolver};
use crate::validation::pipeline::ValidationPipeline;
use crate::validation::structural::{
    run_structural_validation, StructuralChecker, XmlStructureChecker,
};
use std::sync::Arc;

/// The validation service shared by all requests.
#[derive(Clone)]
pub struct ValidationService {
    pool: Arc<WorkerPool>,
    checker: Arc<dyn StructuralChecker>,
    solver: Arc<dyn FeasibilitySolver>,
    consistency: Arc<ValidationPipeline>,
    solver_config: SolverConfig,
    max_decompressed_bytes: usize,
    callback: Option<StageCallback>,
}

impl ValidationService {
    /// Create a service with the built-in checker, solver and consistency stages.
    pub fn new(pool: Arc<WorkerPool>, solver_config: SolverConfig) -> Self {
        Self {
            pool,
            checker: Arc::new(XmlStructureChecker::new()),
            solver: Arc::new(ClarabelSolver::from_config(&solver_config)),
            consistency: Arc::new(ValidationPipeline::default_pipeline()),
            solver_config,
            max_decompressed_bytes: DEFAULT_MAX_DECOMPRESSED_BYTES,
            callback: None,
        }
    }

    /// Limit the inflated size of compressed uploads.
    pub fn with_decompressed_limit(mut self, limit: usize) -> Self {
        self.max_decompressed_bytes = limit;
        self
    }

    /// Replace the structural checker.
    pub fn with_checker(mut self, checker: Arc<dyn StructuralChecker>) -> Self {
        self.checker = checker;
        self
    }

    /// Replace the feasibility solver.
    pub fn with_solver(mut self, solver: Arc<dyn FeasibilitySolver>) -> Self {
        self.solver = solver;
        self
    }

    /// Replace the consistency stages.
    pub fn with_pipeline(mut self, pipeline: ValidationPipeline) -> Self {
        self.consistency = Arc::new(pipeline);
        self
    }

    /// Receive stage updates for every request.
    pub fn with_callback(mut self, callback: StageCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// The worker pool stages run on.
    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Validate one upload.
    ///
    /// Returns the report for any upload that could be read, and an error for
    /// uploads that are rejected or for stages the pool could not run.
    pub async fn validate(&self, file: UploadedFile) -> Result<ValidationOutcome, PipelineError> {
        let tracker = StageTracker::new(RequestId::new()).with_callback(self.callback.clone());
        tracker.start(&file.filename);

        let filename = file.filename.clone();
        let format = file.format();

        let limit = self.max_decompressed_bytes;
        let decompressed = self
            .run_stage(&tracker, Stage::Decompress, move || io::decompress(&file, limit))
            .await?;
        let content = match decompressed {
            Ok(content) => content,
            Err(e) => {
                tracker.rejected(&e.to_string());
                return Err(PipelineError::Decompress(e));
            }
        };

        let (loaded, structural) = match format {
            ModelFormat::Json => {
                let loaded = self
                    .run_stage(&tracker, Stage::Parse, move || io::load_json(&content))
                    .await?;
                (loaded, Vec::new())
            }
            ModelFormat::Sbml => self.parse_sbml(&tracker, content, filename).await?,
        };

        let LoadedModel { model, errors } = match loaded {
            StageResult::Success(loaded) => loaded,
            StageResult::SoftErrors(errors) => {
                let outcome = ValidationOutcome::without_model(errors, structural);
                tracker.complete(&outcome);
                return Ok(outcome);
            }
            StageResult::FatalParseError(message) => {
                tracker.rejected(&message);
                return Err(PipelineError::Parse(message));
            }
        };

        let mut outcome = ValidationOutcome::without_model(errors, structural);
        let model = Arc::new(model);

        let consistency = Arc::clone(&self.consistency);
        let checked = Arc::clone(&model);
        outcome.merge(
            self.run_stage(&tracker, Stage::Consistency, move || consistency.validate(&checked))
                .await?,
        );

        let solver = Arc::clone(&self.solver);
        let config = self.solver_config.clone();
        outcome.merge(
            self.run_stage(&tracker, Stage::Solve, move || {
                let result = solver.optimize(&model);
                if let Err(ref e) = result {
                    log::debug!("{} could not build the problem: {}", solver.name(), e);
                }
                assess(&model, result, &config)
            })
            .await?,
        );

        tracker.complete(&outcome);
        Ok(outcome)
    }

    /// Parse SBML and run the structural check side by side.
    ///
    /// Structural findings come back prefixed with the checker name, ready to
    /// be reported as warnings.
    async fn parse_sbml(
        &self,
        tracker: &StageTracker,
        content: DecompressedContent,
        filename: String,
    ) -> Result<(StageResult<LoadedModel>, Vec<String>), PipelineError> {
        let checker = Arc::clone(&self.checker);
        let parse_content = content.clone();

        let (loaded, structural) = tokio::join!(
            self.run_stage(tracker, Stage::Parse, move || io::load_sbml(&parse_content)),
            self.run_stage(tracker, Stage::StructuralCheck, move || {
                let prefix = format!("(from {}) ", checker.name());
                run_structural_validation(checker.as_ref(), &content, &filename)
                    .into_iter()
                    .map(|line| format!("{prefix}{line}"))
                    .collect::<Vec<_>>()
            }),
        );
        Ok((loaded?, structural?))
    }

    async fn run_stage<F, T>(
        &self,
        tracker: &StageTracker,
        stage: Stage,
        job: F,
    ) -> Result<T, PipelineError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        tracker.stage_started(stage);
        match self.pool.run(stage.name(), job).await {
            Ok(value) => {
                tracker.stage_completed(stage);
                Ok(value)
            }
            Err(e) => {
                tracker.stage_failed(stage, e.to_string());
                Err(PipelineError::Pool(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::StructuralCheckError;
    use crate::core::PoolConfig;
    use crate::execution::progress::StageUpdate;
    use crate::validation::structural::StructuralFailure;
    use std::path::Path;

    const MINI_SBML: &str = include_str!("../../tests/fixtures/mini.xml");
    const MINI_JSON: &str = include_str!("../../tests/fixtures/mini.json");

    fn service() -> ValidationService {
        let pool = WorkerPool::new(&PoolConfig::default().with_workers(2)).unwrap();
        ValidationService::new(Arc::new(pool), SolverConfig::default())
    }

    fn recorder() -> (StageCallback, Arc<parking_lot::Mutex<Vec<StageUpdate>>>) {
        let updates = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&updates);
        let callback: StageCallback = Arc::new(move |update| sink.lock().push(update));
        (callback, updates)
    }

    fn started_stages(updates: &[StageUpdate]) -> Vec<Stage> {
        updates
            .iter()
            .filter_map(|update| match update {
                StageUpdate::StageStarted { stage, .. } => Some(*stage),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_json_model() {
        let outcome = service()
            .validate(UploadedFile::new("mini.json", MINI_JSON))
            .await
            .unwrap();
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
        let objective = outcome.objective.unwrap();
        assert!((objective - 10.0).abs() < 1e-5, "{objective}");
    }

    #[tokio::test]
    async fn test_sbml_model_runs_structural_check() {
        let (callback, updates) = recorder();
        let outcome = service()
            .with_callback(callback)
            .validate(UploadedFile::new("mini.xml", MINI_SBML))
            .await
            .unwrap();
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        assert!((outcome.objective.unwrap() - 10.0).abs() < 1e-5);

        let mut stages = started_stages(&updates.lock());
        // parse and structural check are submitted together
        stages[1..3].sort_by_key(|stage| stage.name());
        assert_eq!(
            stages,
            vec![
                Stage::Decompress,
                Stage::Parse,
                Stage::StructuralCheck,
                Stage::Consistency,
                Stage::Solve
            ]
        );
    }

    #[tokio::test]
    async fn test_corrupt_gzip_rejected() {
        let (callback, updates) = recorder();
        let err = service()
            .with_callback(callback)
            .validate(UploadedFile::new("model.xml.gz", b"not gzip".to_vec()))
            .await
            .unwrap_err();
        assert!(err.is_rejection());
        assert!(err.to_string().starts_with("Error decompressing gzip file: "));
        assert_eq!(started_stages(&updates.lock()), vec![Stage::Decompress]);
    }

    #[tokio::test]
    async fn test_fatal_parse_short_circuits() {
        let (callback, updates) = recorder();
        let err = service()
            .with_callback(callback)
            .validate(UploadedFile::new("model.json", "{ not json"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Parse(ref m) if m.starts_with("Invalid JSON: ")));

        let updates = updates.lock();
        assert_eq!(started_stages(&updates), vec![Stage::Decompress, Stage::Parse]);
        assert!(matches!(updates.last(), Some(StageUpdate::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_soft_errors_skip_solver() {
        let (callback, updates) = recorder();
        let broken = MINI_JSON.replace("\"charge\": 0}", "\"charge\": 0.5}");
        let outcome = service()
            .with_callback(callback)
            .validate(UploadedFile::new("mini.json", broken))
            .await
            .unwrap();
        assert!(outcome.errors[0].starts_with("Invalid model: "), "{:?}", outcome.errors);
        assert_eq!(outcome.objective, None);
        assert!(!started_stages(&updates.lock()).contains(&Stage::Solve));
    }

    #[tokio::test]
    async fn test_inverted_bounds_reported_before_solver_error() {
        let inverted = MINI_JSON.replace(
            "\"lower_bound\": -10.0,\n      \"upper_bound\": 1000.0",
            "\"lower_bound\": 10.0,\n      \"upper_bound\": 5.0",
        );
        let outcome = service()
            .validate(UploadedFile::new("mini.json", inverted))
            .await
            .unwrap();
        assert_eq!(
            outcome.errors.first().map(String::as_str),
            Some("reaction 'EX_glc' has lower_bound > upper_bound")
        );
        assert!(outcome.errors[1].starts_with("model can not be solved"));
        assert_eq!(outcome.objective, None);
    }

    struct FailingChecker;

    impl StructuralChecker for FailingChecker {
        fn name(&self) -> &str {
            "strict"
        }

        fn check_file(&self, _path: &Path) -> Result<Vec<StructuralFailure>, StructuralCheckError> {
            Ok(vec![StructuralFailure {
                line: 1,
                column: 1,
                severity: crate::validation::structural::Severity::Error,
                message: "not strict enough".to_string(),
            }])
        }
    }

    #[tokio::test]
    async fn test_structural_findings_are_prefixed_warnings() {
        let outcome = service()
            .with_checker(Arc::new(FailingChecker))
            .validate(UploadedFile::new("mini.xml", MINI_SBML))
            .await
            .unwrap();
        assert_eq!(outcome.warnings, vec!["(from strict) L1 C1: not strict enough"]);
        assert!(outcome.errors.is_empty());
    }

    struct PanickingChecker;

    impl StructuralChecker for PanickingChecker {
        fn name(&self) -> &str {
            "panicking"
        }

        fn check_file(&self, _path: &Path) -> Result<Vec<StructuralFailure>, StructuralCheckError> {
            panic!("checker crashed")
        }
    }

    #[tokio::test]
    async fn test_panicking_checker_becomes_warning() {
        let outcome = service()
            .with_checker(Arc::new(PanickingChecker))
            .validate(UploadedFile::new("mini.xml", MINI_SBML))
            .await
            .unwrap();
        assert_eq!(
            outcome.warnings,
            vec!["(from panicking) structural check could not run: checker crashed"]
        );
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        assert!((outcome.objective.unwrap() - 10.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_deeply_nested_gene_rule_is_reported() {
        let rule = format!("{}b0001{}", "(".repeat(100_000), ")".repeat(100_000));
        let json = MINI_JSON.replacen("\"b0001\"", &format!("\"{rule}\""), 1);
        assert_ne!(json, MINI_JSON);
        let outcome = service()
            .validate(UploadedFile::new("m.json", json))
            .await
            .unwrap();
        assert_eq!(outcome.errors.len(), 1, "{}", outcome.summary());
        assert!(outcome.errors[0].starts_with("reaction 'GLCt' has invalid gpr '((("));
        assert!((outcome.objective.unwrap() - 10.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_deeply_nested_sbml_rejected() {
        let sbml = format!(
            "<sbml level=\"3\" version=\"1\"><model id=\"m\">{}{}</model></sbml>",
            "<a>".repeat(200_000),
            "</a>".repeat(200_000)
        );
        let err = service()
            .validate(UploadedFile::new("m.xml", sbml))
            .await
            .unwrap_err();
        assert!(err.is_rejection());
        assert!(
            matches!(err, PipelineError::Parse(ref m) if m.contains("nested deeper than")),
            "{err}"
        );
    }

    #[tokio::test]
    async fn test_inflation_limit_rejects() {
        use flate2::write::GzEncoder;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::best());
        encoder.write_all(&vec![b' '; 1 << 20]).unwrap();
        let bomb = encoder.finish().unwrap();

        let err = service()
            .with_decompressed_limit(1 << 16)
            .validate(UploadedFile::new("m.xml.gz", bomb))
            .await
            .unwrap_err();
        assert!(err.is_rejection());
        assert_eq!(
            err.to_string(),
            "Error decompressing gzip file: content exceeds 65536 bytes"
        );
    }
}
