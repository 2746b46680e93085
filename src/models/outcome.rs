//! Outcome types produced by the orchestrator.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::events::SessionEvent;
use crate::models::spec::GraderKind;
use crate::statistics::ConfidenceInterval;

/// The outcome status of a test or run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Passed,
    Failed,
    /// The harness could not run the task (backend failure, timeout,
    /// cancellation), as opposed to the agent failing it.
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Passed => write!(f, "passed"),
            Status::Failed => write!(f, "failed"),
            Status::Error => write!(f, "error"),
        }
    }
}

/// Complete result of one evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub run_id: String,
    /// Name of the skill under evaluation.
    pub skill_tested: String,
    pub bench_name: String,
    pub timestamp: DateTime<Utc>,
    pub setup: OutcomeSetup,
    pub digest: OutcomeDigest,
    pub test_outcomes: Vec<TestOutcome>,
    /// Set when this outcome is the merged result of a baseline comparison.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_baseline: bool,
    /// The full skills-disabled pass, embedded for traceability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_outcome: Option<Box<EvaluationOutcome>>,
}

/// Snapshot of the resolved execution setup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutcomeSetup {
    pub trials_per_task: u32,
    pub model_id: String,
    pub engine_kind: String,
    pub timeout_seconds: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub judge_model: String,
}

/// Aggregate totals for one evaluation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutcomeDigest {
    pub total_tests: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: usize,
    pub skipped: usize,
    pub success_rate: f64,
    pub aggregate_score: f64,
    pub weighted_score: f64,
    pub min_score: f64,
    pub max_score: f64,
    pub std_dev: f64,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupStats>,
    /// Populated when trials_per_task > 1 and at least 2 tasks have stats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<StatisticalSummary>,
}

/// Aggregate statistics for one group of test outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupStats {
    pub name: String,
    pub passed: usize,
    pub total: usize,
    pub avg_score: f64,
}

/// Digest-level bootstrap summary for multi-trial runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticalSummary {
    pub bootstrap_ci: ConfidenceInterval,
    pub is_significant: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_gain: Option<f64>,
}

/// The result of one test case across all its trials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestOutcome {
    pub test_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
    pub status: Status,
    pub runs: Vec<RunResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<TestStats>,
    /// Populated only in baseline mode, during merge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_impact: Option<SkillImpactMetric>,
}

/// The result of a single run (trial).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunResult {
    pub run_number: u32,
    /// Number of attempts consumed, including the final one.
    pub attempts: u32,
    /// Overall run status. When `Error`, `error_msg` carries the reason.
    pub status: Status,
    pub duration_ms: u64,
    /// Per-grader results, keyed by grader identifier.
    pub graders: BTreeMap<String, GraderResult>,
    pub session_digest: SessionDigest,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transcript: Vec<SessionEvent>,
    pub final_output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
}

impl Default for Status {
    fn default() -> Self {
        Status::Failed
    }
}

impl RunResult {
    /// Average score across all graders, unweighted.
    pub fn run_score(&self) -> f64 {
        if self.graders.is_empty() {
            return 0.0;
        }
        let total: f64 = self.graders.values().map(|g| g.score).sum();
        total / self.graders.len() as f64
    }

    /// Weighted composite score in [0.0, 1.0] using each grader's weight.
    /// Non-positive weights count as 1.0.
    pub fn weighted_run_score(&self) -> f64 {
        if self.graders.is_empty() {
            return 0.0;
        }
        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;
        for g in self.graders.values() {
            let w = if g.weight > 0.0 { g.weight } else { 1.0 };
            weighted_sum += g.score * w;
            total_weight += w;
        }
        if total_weight == 0.0 {
            return 0.0;
        }
        weighted_sum / total_weight
    }

    /// Whether every grader passed.
    pub fn all_graders_passed(&self) -> bool {
        self.graders.values().all(|g| g.passed)
    }
}

/// One grader's verdict for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraderResult {
    #[serde(rename = "identifier")]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: GraderKind,
    pub score: f64,
    pub weight: f64,
    pub passed: bool,
    pub feedback: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub duration_ms: u64,
}

/// Compact summary of the session behind one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionDigest {
    pub total_turns: usize,
    pub tool_call_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools_used: Vec<String>,
}

/// Per-task statistics over all runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestStats {
    pub pass_rate: f64,
    pub avg_score: f64,
    pub avg_weighted_score: f64,
    pub min_score: f64,
    pub max_score: f64,
    pub std_dev_score: f64,
    pub avg_duration_ms: u64,
    /// True when the task neither always passed nor always failed.
    pub flaky: bool,
    /// Bootstrap interval over weighted run scores (trials >= 2 only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_ci: Option<ConfidenceInterval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_significant: Option<bool>,
}

/// A/B comparison metric for a single task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkillImpactMetric {
    pub pass_rate_with_skills: f64,
    pub pass_rate_baseline: f64,
    pub delta: f64,
    pub percent_change: f64,
}

/// Population standard deviation of a slice of values.
pub fn compute_std_dev(values: &[f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    variance.sqrt()
}
