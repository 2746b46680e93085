//! Benchmark orchestration: loading, filtering, execution, aggregation.

pub mod discovery;
pub mod filter;
pub mod loader;
pub mod resources;
pub mod runner;

pub use filter::filter_test_cases;
pub use loader::load_test_cases;
pub use runner::{EventType, ProgressEvent, ProgressListener, RunnerConfig, TestRunner};
