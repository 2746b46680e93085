//! Deterministic mock backend for offline runs and tests.

use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use tempfile::TempDir;
use uuid::Uuid;

use super::{ExecutionClient, ExecutionError, ExecutionRequest, ExecutionResponse, ResourceFile};

/// A mock engine that answers every stimulus with a fixed-form response and
/// makes no tool calls.
///
/// Each execution gets its own temp workspace so file-inspecting graders
/// have a directory to look at; workspaces live until [`shutdown`] so
/// grading can run after the call returns.
///
/// [`shutdown`]: ExecutionClient::shutdown
pub struct MockEngine {
    model_id: String,
    workspaces: Mutex<Vec<TempDir>>,
}

impl MockEngine {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            workspaces: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ExecutionClient for MockEngine {
    async fn initialize(&self) -> Result<(), ExecutionError> {
        Ok(())
    }

    async fn execute(&self, req: ExecutionRequest) -> Result<ExecutionResponse, ExecutionError> {
        let start = Instant::now();

        let workspace = TempDir::with_prefix("skillbench-mock-")?;
        write_resources(workspace.path(), &req.resources)?;

        let mut output = format!("Mock response for: {}", req.message);
        if !req.resources.is_empty() {
            output.push_str(&format!("\nAnalyzed {} file(s)", req.resources.len()));
        }

        let workspace_dir = workspace.path().to_path_buf();
        self.workspaces
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(workspace);

        Ok(ExecutionResponse {
            final_output: output,
            events: Vec::new(),
            model_id: self.model_id.clone(),
            skill_invocations: Vec::new(),
            duration_ms: start.elapsed().as_millis() as u64,
            tool_calls: Vec::new(),
            error_msg: None,
            success: true,
            workspace_dir: Some(workspace_dir),
            session_id: Some(format!("mock-{}", Uuid::new_v4())),
        })
    }

    async fn shutdown(&self) -> Result<(), ExecutionError> {
        // Dropping the TempDirs removes the workspaces.
        self.workspaces
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        Ok(())
    }
}

fn write_resources(workspace: &Path, resources: &[ResourceFile]) -> Result<(), ExecutionError> {
    for res in resources {
        let dest = workspace.join(&res.path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&dest, &res.content)?;
    }
    Ok(())
}
