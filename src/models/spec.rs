//! Benchmark specification loading and validation.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SpecError;
use crate::hooks::HooksConfig;

/// Identifies the type of grader (e.g. `regex`, `keyword`, `prompt`).
///
/// Kinds are open-ended strings resolved against the grader registry at
/// construction time, so external grader implementations can plug in
/// without touching this crate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraderKind(pub String);

impl GraderKind {
    pub const REGEX: &'static str = "regex";
    pub const KEYWORD: &'static str = "keyword";
    pub const PROMPT: &'static str = "prompt";
    pub const BEHAVIOR: &'static str = "behavior";

    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for GraderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GraderKind {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A complete evaluation specification.
///
/// Immutable for the duration of one orchestration pass; the baseline
/// comparator derives a per-pass copy rather than mutating shared state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkSpec {
    /// Benchmark name.
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Name of the skill under evaluation.
    #[serde(rename = "skill", default)]
    pub skill_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Execution configuration.
    pub config: ExecConfig,
    /// Lifecycle hook commands.
    #[serde(default)]
    pub hooks: HooksConfig,
    /// Global graders applied to every task.
    #[serde(default)]
    pub graders: Vec<GraderConfig>,
    /// Glob patterns for task description files, relative to the spec directory.
    #[serde(default)]
    pub tasks: Vec<String>,
    /// Tabular dataset path; when set, takes precedence over `tasks`.
    #[serde(default)]
    pub tasks_from: Option<String>,
    /// Inclusive 1-based row range applied to the dataset.
    #[serde(rename = "range", default)]
    pub row_range: Option<[i64; 2]>,
    /// Spec-level input variables available to stimulus templates.
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
}

impl BenchmarkSpec {
    /// Loads and validates a spec from a YAML file.
    pub fn load(path: &Path) -> Result<Self, SpecError> {
        let data = fs::read_to_string(path)?;
        let spec: Self = serde_yaml::from_str(&data)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Checks that the spec is valid.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.config.trials_per_task < 1 {
            return Err(SpecError::InvalidTrials(self.config.trials_per_task));
        }
        if self.config.timeout_seconds < 1 {
            return Err(SpecError::InvalidTimeout(self.config.timeout_seconds));
        }
        Ok(())
    }
}

/// Controls execution behavior for one benchmark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Number of trials per task.
    #[serde(rename = "trials_per_task", default = "default_trials")]
    pub trials_per_task: u32,
    /// Per-request execution timeout in seconds.
    #[serde(rename = "timeout_seconds", default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Whether tasks run through the bounded worker pool.
    #[serde(rename = "parallel", default)]
    pub concurrent: bool,
    /// Worker pool width; 0 falls back to the default of 4.
    #[serde(rename = "max_workers", default)]
    pub workers: usize,
    /// Stop the pass as soon as any prior task is not passed.
    #[serde(default)]
    pub fail_fast: bool,
    /// Execution backend kind (e.g. `mock`, `agent`).
    #[serde(rename = "executor", default)]
    pub engine_kind: String,
    /// Model identifier passed to the execution backend.
    #[serde(rename = "model", default)]
    pub model_id: String,
    /// Override model injected into prompt-kind graders.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub judge_model: String,
    /// Directories searched for skill descriptors.
    #[serde(rename = "skill_directories", default)]
    pub skill_paths: Vec<String>,
    /// Skills that must be discoverable before any execution starts.
    #[serde(default)]
    pub required_skills: Vec<String>,
    /// Retry budget per trial; values below 1 are treated as 1.
    #[serde(default)]
    pub max_attempts: u32,
    /// Grouping key for digest group stats (only `model` is recognized).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group_by: String,
    /// Enables the two-pass A/B baseline comparison.
    #[serde(default)]
    pub baseline: bool,
}

fn default_trials() -> u32 {
    1
}

fn default_timeout() -> u64 {
    300
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            trials_per_task: default_trials(),
            timeout_seconds: default_timeout(),
            concurrent: false,
            workers: 0,
            fail_fast: false,
            engine_kind: String::new(),
            model_id: String::new(),
            judge_model: String::new(),
            skill_paths: Vec::new(),
            required_skills: Vec::new(),
            max_attempts: 0,
            group_by: String::new(),
            baseline: false,
        }
    }
}

/// Defines a grader, either globally in the spec or per task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraderConfig {
    /// Grader kind; empty on a task-level grader is a hard error.
    #[serde(rename = "type", default)]
    pub kind: GraderKind,
    /// Grader identifier used in results and error messages.
    #[serde(rename = "name")]
    pub identifier: String,
    /// Weight for composite scoring; non-positive values default to 1.0.
    #[serde(default)]
    pub weight: f64,
    /// Kind-specific parameters.
    #[serde(rename = "config", default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// Shorthand assertion list folded into the parameters as `assertions`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<String>,
}

impl GraderConfig {
    /// Returns the weight to apply, coercing non-positive values to 1.0.
    pub fn effective_weight(&self) -> f64 {
        if self.weight > 0.0 {
            self.weight
        } else {
            1.0
        }
    }
}
