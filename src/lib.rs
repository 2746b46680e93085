//! skillbench: Benchmark harness for evaluating agent skills.
//!
//! This library loads a declarative benchmark spec, runs its test cases
//! against an execution backend across one or more trials, grades the
//! output, and aggregates statistics. Baseline mode runs the whole
//! benchmark twice (with and without skills) to measure skill impact.

// Core modules
pub mod cache;
pub mod dataset;
pub mod error;
pub mod execution;
pub mod graders;
pub mod hooks;
pub mod models;
pub mod orchestration;
pub mod statistics;
pub mod template;

// Re-export commonly used error types
pub use error::{
    CacheError, DatasetError, FilterError, GraderError, HookError, LoadError,
    OrchestrationError, SpecError, TemplateError,
};
