//! Lifecycle hook execution.
//!
//! Hooks are shell commands run at run/task boundaries. Failure handling is
//! phase-dependent and decided by the orchestrator; this module only reports
//! whether a hook list succeeded.

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::HookError;

/// A single hook command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookConfig {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    /// Acceptable exit codes; empty means only 0 is acceptable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exit_codes: Vec<i32>,
    /// When true, an unacceptable exit is an error; otherwise it is logged.
    #[serde(default)]
    pub error_on_fail: bool,
}

/// All lifecycle hooks for one benchmark.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HooksConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub before_run: Vec<HookConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after_run: Vec<HookConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub before_task: Vec<HookConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after_task: Vec<HookConfig>,
}

/// Executes hook commands at lifecycle points.
#[derive(Debug, Clone, Default)]
pub struct HookRunner;

impl HookRunner {
    /// Runs all hooks for a lifecycle point, stopping at the first error.
    ///
    /// `phase` identifies the lifecycle point (e.g. `before_run`) for
    /// logging and error context.
    pub async fn execute(&self, phase: &str, hooks: &[HookConfig]) -> Result<(), HookError> {
        for (index, hook) in hooks.iter().enumerate() {
            self.run_hook(phase, index, hook).await?;
        }
        Ok(())
    }

    async fn run_hook(&self, phase: &str, index: usize, hook: &HookConfig) -> Result<(), HookError> {
        let mut parts = hook.command.split_whitespace();
        let Some(program) = parts.next() else {
            return Err(HookError::EmptyCommand {
                phase: phase.to_string(),
                index,
            });
        };

        let mut cmd = Command::new(program);
        cmd.args(parts);
        if let Some(dir) = &hook.working_directory {
            cmd.current_dir(dir);
        }

        let output = match cmd.output().await {
            Ok(out) => out,
            Err(source) => {
                if hook.error_on_fail {
                    return Err(HookError::Spawn {
                        phase: phase.to_string(),
                        index,
                        source,
                    });
                }
                warn!(phase, index, error = %source, "hook failed to start (continuing)");
                return Ok(());
            }
        };

        if !output.stdout.is_empty() || !output.stderr.is_empty() {
            debug!(
                phase,
                index,
                stdout = %String::from_utf8_lossy(&output.stdout),
                stderr = %String::from_utf8_lossy(&output.stderr),
                "hook output"
            );
        }

        let code = output.status.code().unwrap_or(-1);
        if !is_acceptable_exit(code, &hook.exit_codes) {
            if hook.error_on_fail {
                if hook.exit_codes.is_empty() {
                    return Err(HookError::ExitCode {
                        phase: phase.to_string(),
                        index,
                        code,
                    });
                }
                return Err(HookError::UnexpectedExit {
                    phase: phase.to_string(),
                    index,
                    code,
                    expected: hook.exit_codes.clone(),
                });
            }
            warn!(phase, index, code, "hook exited with unacceptable code (continuing)");
        }

        Ok(())
    }
}

/// Whether `exit_code` is in the allowed list. An empty list allows only 0.
fn is_acceptable_exit(exit_code: i32, allowed: &[i32]) -> bool {
    if allowed.is_empty() {
        return exit_code == 0;
    }
    allowed.contains(&exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hook(command: &str, error_on_fail: bool) -> HookConfig {
        HookConfig {
            command: command.to_string(),
            error_on_fail,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_successful_hook() {
        let runner = HookRunner;
        runner
            .execute("before_run", &[hook("true", true)])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failing_hook_with_error_on_fail() {
        let runner = HookRunner;
        let err = runner
            .execute("before_task", &[hook("false", true)])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("before_task[0]"));
    }

    #[tokio::test]
    async fn test_failing_hook_without_error_on_fail_is_logged_only() {
        let runner = HookRunner;
        runner
            .execute("after_task", &[hook("false", false)])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_empty_command_is_error() {
        let runner = HookRunner;
        let err = runner
            .execute("before_run", &[hook("   ", true)])
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::EmptyCommand { .. }));
    }

    #[tokio::test]
    async fn test_custom_exit_codes() {
        let runner = HookRunner;
        let cfg = HookConfig {
            command: "false".to_string(),
            exit_codes: vec![1],
            error_on_fail: true,
            ..Default::default()
        };
        runner.execute("before_run", &[cfg]).await.unwrap();

        // Exit 0 is unacceptable when the allowed list says 1.
        let cfg = HookConfig {
            command: "true".to_string(),
            exit_codes: vec![1],
            error_on_fail: true,
            ..Default::default()
        };
        let err = runner.execute("before_run", &[cfg]).await.unwrap_err();
        assert!(matches!(err, HookError::UnexpectedExit { code: 0, .. }));
    }

    #[tokio::test]
    async fn test_missing_command_without_error_on_fail() {
        let runner = HookRunner;
        runner
            .execute("after_run", &[hook("definitely-not-a-command-xyz", false)])
            .await
            .unwrap();
    }
}
