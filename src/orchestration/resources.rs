//! Resource materialization for execution requests.
//!
//! Resource references are untrusted input: file-backed references are
//! sandboxed to the fixture root, and violations are logged and skipped
//! rather than failing the run.

use std::fs;
use std::path::{Component, Path};

use tracing::warn;

use crate::execution::ResourceFile;
use crate::models::TestCase;

use super::loader::normalize;

/// Resolves a test case's resource references into concrete files.
///
/// Inline bodies are used verbatim. File references are read from the
/// fixture root (the case's `context_root` wins over the runner-wide
/// fixture directory); absolute paths, parent traversal, and paths that
/// resolve outside the fixture root are rejected.
pub fn load_resources(tc: &TestCase, fixture_dir: Option<&Path>) -> Vec<ResourceFile> {
    let fixture_dir = tc
        .context_root
        .as_deref()
        .map(Path::new)
        .or(fixture_dir);

    let mut resources = Vec::new();
    for r in &tc.stimulus.resources {
        if !r.body.is_empty() {
            resources.push(ResourceFile {
                path: r.location.clone(),
                content: r.body.clone(),
            });
            continue;
        }
        if r.location.is_empty() {
            continue;
        }
        let Some(fixture_dir) = fixture_dir else {
            warn!(path = %r.location, "resource reference without a fixture directory, skipping");
            continue;
        };
        if let Some(content) = read_sandboxed(fixture_dir, &r.location) {
            resources.push(ResourceFile {
                path: r.location.clone(),
                content,
            });
        }
    }

    resources
}

fn read_sandboxed(fixture_dir: &Path, location: &str) -> Option<String> {
    let path = Path::new(location);

    if path.is_absolute() {
        warn!(path = %location, "absolute resource path rejected");
        return None;
    }
    if path.components().any(|c| c == Component::ParentDir) {
        warn!(path = %location, "resource path with parent traversal rejected");
        return None;
    }

    let base = normalize(fixture_dir);
    let full = normalize(&fixture_dir.join(path));
    if !full.starts_with(&base) {
        warn!(path = %location, "resource path escapes fixture directory, rejected");
        return None;
    }

    match fs::read_to_string(&full) {
        Ok(content) => Some(content),
        Err(e) => {
            warn!(path = %full.display(), error = %e, "failed to read resource file, skipping");
            None
        }
    }
}
