//! Execution backends.
//!
//! The orchestrator never inspects which backend is active beyond the
//! [`ExecutionClient`] contract; the mock and any live agent session are
//! interchangeable.

pub mod mock;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{SessionEvent, SessionEventType, ToolCall};

pub use mock::MockEngine;

/// Errors reported by execution backends.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Execution failed: {0}")]
    Failed(String),

    #[error("Execution timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Execution canceled: {0}")]
    Canceled(String),

    #[error("Workspace error: {0}")]
    Workspace(#[from] std::io::Error),
}

/// A test execution request.
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    pub test_id: String,
    /// The stimulus message.
    pub message: String,
    /// Inline metadata from the test case.
    pub context: BTreeMap<String, serde_json::Value>,
    /// Files materialized into the workspace before the session starts.
    pub resources: Vec<ResourceFile>,
    /// Name of the skill under evaluation, if any.
    pub skill_name: String,
    /// Directories the backend searches for skill descriptors.
    pub skill_paths: Vec<PathBuf>,
    pub timeout: Duration,
}

/// A fully materialized input file.
#[derive(Debug, Clone)]
pub struct ResourceFile {
    /// Workspace-relative destination path.
    pub path: String,
    pub content: String,
}

/// A skill the backend loaded during the session.
#[derive(Debug, Clone)]
pub struct SkillInvocation {
    pub name: String,
    /// Path of the invoked skill descriptor.
    pub path: PathBuf,
}

/// The result of one execution.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResponse {
    pub final_output: String,
    pub events: Vec<SessionEvent>,
    pub model_id: String,
    pub skill_invocations: Vec<SkillInvocation>,
    pub duration_ms: u64,
    pub tool_calls: Vec<ToolCall>,
    /// Set when the backend ran but the session itself failed.
    pub error_msg: Option<String>,
    pub success: bool,
    /// Sandbox directory used for this session, for file-inspecting graders.
    pub workspace_dir: Option<PathBuf>,
    pub session_id: Option<String>,
}

impl ExecutionResponse {
    /// All assistant messages from the session events, in order.
    pub fn assistant_messages(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter(|e| e.event_type == SessionEventType::AssistantMessage)
            .filter_map(|e| e.content.as_deref())
            .collect()
    }
}

/// The contract every execution backend implements.
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    /// Sets up the backend before the first execution.
    async fn initialize(&self) -> Result<(), ExecutionError>;

    /// Runs one stimulus and returns output, telemetry, and a transcript.
    async fn execute(&self, req: ExecutionRequest) -> Result<ExecutionResponse, ExecutionError>;

    /// Releases backend resources.
    async fn shutdown(&self) -> Result<(), ExecutionError>;
}
