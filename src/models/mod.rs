//! Core data model: specs, test cases, events, and outcomes.

pub mod events;
pub mod outcome;
pub mod spec;
pub mod testcase;

pub use events::{filter_tool_calls, SessionEvent, SessionEventType, ToolCall};
pub use outcome::{
    compute_std_dev, EvaluationOutcome, GraderResult, GroupStats, OutcomeDigest, OutcomeSetup,
    RunResult, SessionDigest, SkillImpactMetric, StatisticalSummary, Status, TestOutcome,
    TestStats,
};
pub use spec::{BenchmarkSpec, ExecConfig, GraderConfig, GraderKind};
pub use testcase::{ResourceRef, Stimulus, TestCase};
