//! Stimulus template rendering and path resolution.
//!
//! Dataset-sourced test cases may carry template markup in their prompt
//! column. Templates are rendered with Tera against a per-row context that
//! merges spec-level input variables with the row's columns.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::TemplateError;

/// Variables available during template resolution.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    /// Identifier for the current orchestration pass.
    pub job_id: String,
    /// Display name of the task being rendered.
    pub task_name: String,
    /// Trial number within the task (0 during loading).
    pub iteration: u32,
    /// Attempt number within the trial (0 during loading).
    pub attempt: u32,
    /// RFC 3339 timestamp of the pass start.
    pub timestamp: String,
    /// User-defined variables (spec inputs merged with dataset columns).
    pub vars: BTreeMap<String, String>,
}

/// Renders template expressions in the given string.
///
/// Uses Tera syntax: `{{ column }}` for user variables, `{{ task_name }}`
/// and friends for system variables. Missing variables are a hard error.
/// Returns the input unchanged if it contains no template delimiters.
pub fn render(text: &str, ctx: &TemplateContext) -> Result<String, TemplateError> {
    // Fast path: no template delimiters means no work to do.
    if !text.contains("{{") {
        return Ok(text.to_string());
    }

    let mut tera_ctx = tera::Context::new();
    tera_ctx.insert("job_id", &ctx.job_id);
    tera_ctx.insert("task_name", &ctx.task_name);
    tera_ctx.insert("iteration", &ctx.iteration);
    tera_ctx.insert("attempt", &ctx.attempt);
    tera_ctx.insert("timestamp", &ctx.timestamp);
    for (key, value) in &ctx.vars {
        tera_ctx.insert(key, value);
    }

    let rendered = tera::Tera::one_off(text, &tera_ctx, false)?;
    Ok(rendered)
}

/// Resolves a list of possibly-relative paths against a base directory.
///
/// Absolute entries are kept as-is; relative entries are joined onto `base`.
pub fn resolve_paths(paths: &[String], base: &Path) -> Vec<PathBuf> {
    paths
        .iter()
        .map(|p| {
            let path = Path::new(p);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                base.join(path)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with(vars: &[(&str, &str)]) -> TemplateContext {
        TemplateContext {
            job_id: "run-1".to_string(),
            task_name: "demo".to_string(),
            vars: vars
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_plain_text_passthrough() {
        let ctx = ctx_with(&[]);
        let out = render("no templates here", &ctx).unwrap();
        assert_eq!(out, "no templates here");
    }

    #[test]
    fn test_render_user_variable() {
        let ctx = ctx_with(&[("city", "Lisbon")]);
        let out = render("weather in {{ city }}", &ctx).unwrap();
        assert_eq!(out, "weather in Lisbon");
    }

    #[test]
    fn test_render_system_variable() {
        let ctx = ctx_with(&[]);
        let out = render("task {{ task_name }} of {{ job_id }}", &ctx).unwrap();
        assert_eq!(out, "task demo of run-1");
    }

    #[test]
    fn test_render_missing_variable_fails() {
        let ctx = ctx_with(&[]);
        assert!(render("hello {{ nope }}", &ctx).is_err());
    }

    #[test]
    fn test_resolve_paths_mixed() {
        let resolved = resolve_paths(
            &["skills/a".to_string(), "/abs/b".to_string()],
            Path::new("/base"),
        );
        assert_eq!(resolved[0], PathBuf::from("/base/skills/a"));
        assert_eq!(resolved[1], PathBuf::from("/abs/b"));
    }
}
