//! Error types for skillbench operations.
//!
//! Defines error types for the major subsystems:
//! - Spec and task-case parsing
//! - Template rendering
//! - Tabular dataset loading
//! - Task loading and filtering
//! - Grader construction and invocation
//! - Lifecycle hooks
//! - Result caching
//! - Benchmark orchestration

use thiserror::Error;

/// Errors that can occur while loading or validating a benchmark spec or task file.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("trials_per_task must be at least 1, got {0}")]
    InvalidTrials(u32),

    #[error("timeout_seconds must be at least 1, got {0}")]
    InvalidTimeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur during stimulus template rendering.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template rendering error: {0}")]
    Render(#[from] tera::Error),
}

/// Errors that can occur while loading a tabular dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to open dataset '{path}': {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse dataset '{path}': {source}")]
    Parse { path: String, source: csv::Error },

    #[error("Dataset '{0}' is empty (no header row)")]
    Empty(String),

    #[error("Row {row} has {got} columns, expected {expected}")]
    ColumnMismatch {
        row: usize,
        got: usize,
        expected: usize,
    },

    #[error("Range start must be >= 1, got {0}")]
    RangeStart(i64),

    #[error("Range end ({end}) must be >= start ({start})")]
    RangeOrder { start: i64, end: i64 },
}

/// Errors that can occur while producing the test-case list.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("No task files matched patterns {patterns:?} in directory '{base_dir}'")]
    NoMatches {
        patterns: Vec<String>,
        base_dir: String,
    },

    #[error("Invalid task file pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: globset::Error,
    },

    #[error("Failed to load task case '{path}': {source}")]
    Case { path: String, source: SpecError },

    #[error("tasks_from path '{0}' escapes spec directory")]
    DatasetEscapes(String),

    #[error("Invalid range: both values must be > 0, got [{0}, {1}]")]
    RangeNotPositive(i64, i64),

    #[error("Invalid range: start ({0}) must be <= end ({1})")]
    RangeInverted(i64, i64),

    #[error("Loading dataset: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Resolving prompt template for row {row}: {source}")]
    RowTemplate { row: usize, source: TemplateError },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while filtering test cases by task or tag patterns.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Invalid task filter pattern '{pattern}': {source}")]
    InvalidTaskPattern {
        pattern: String,
        source: globset::Error,
    },

    #[error("Invalid tag filter pattern '{pattern}': {source}")]
    InvalidTagPattern {
        pattern: String,
        source: globset::Error,
    },
}

/// Errors that can occur during grader construction or invocation.
#[derive(Debug, Error)]
pub enum GraderError {
    #[error("Unknown grader kind '{kind}' for grader '{identifier}'")]
    UnknownKind { kind: String, identifier: String },

    #[error("No kind associated with grader '{0}'")]
    MissingKind(String),

    #[error("Grader kind '{0}' is already registered")]
    DuplicateKind(String),

    #[error("Invalid parameters for grader '{identifier}': {reason}")]
    InvalidParams { identifier: String, reason: String },

    #[error("Invalid regex pattern '{pattern}' in grader '{identifier}': {source}")]
    InvalidRegex {
        identifier: String,
        pattern: String,
        source: regex::Error,
    },

    #[error("Grader '{identifier}' failed: {reason}")]
    Grade { identifier: String, reason: String },
}

/// Errors that can occur while executing lifecycle hooks.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("Hook {phase}[{index}]: empty command")]
    EmptyCommand { phase: String, index: usize },

    #[error("Hook {phase}[{index}]: failed to run command: {source}")]
    Spawn {
        phase: String,
        index: usize,
        source: std::io::Error,
    },

    #[error("Hook {phase}[{index}]: command exited with code {code}")]
    ExitCode {
        phase: String,
        index: usize,
        code: i32,
    },

    #[error("Hook {phase}[{index}]: command exited with code {code} but expected {expected:?}")]
    UnexpectedExit {
        phase: String,
        index: usize,
        code: i32,
        expected: Vec<i32>,
    },
}

/// Errors that can occur during cache operations.
///
/// Cache failures are best-effort: the orchestrator logs them and continues.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cache directory contains {0} - refusing to delete for safety")]
    UnsafeClear(String),
}

/// Errors that can occur during benchmark orchestration.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("Failed to load test cases: {0}")]
    Load(#[from] LoadError),

    #[error("Task/tag filter error: {0}")]
    Filter(#[from] FilterError),

    #[error("No test cases found")]
    NoTestCases,

    #[error("before_run hook failed: {0}")]
    BeforeRunHook(HookError),

    #[error("required_skills specified but no skill_directories configured")]
    NoSkillDirectories,

    #[error("Skill validation failed:\n{0}")]
    SkillValidation(String),

    #[error("Failed to initialize engine: {0}")]
    EngineInit(String),

    #[error("Skills-enabled run failed: {0}")]
    SkillsPass(Box<OrchestrationError>),

    #[error("Baseline run (skills disabled) failed: {0}")]
    BaselinePass(Box<OrchestrationError>),

    #[error(
        "Baseline mismatch: tasks missing from baseline pass: {missing_in_baseline:?}; \
         tasks only in baseline pass: {extra_in_baseline:?}"
    )]
    BaselineMismatch {
        missing_in_baseline: Vec<String>,
        extra_in_baseline: Vec<String>,
    },
}
