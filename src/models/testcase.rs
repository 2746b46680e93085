//! Test case definitions and loading.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SpecError;
use crate::models::spec::GraderConfig;

/// One unit of evaluation: a stimulus plus expected-behavior checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestCase {
    /// Stable identifier.
    #[serde(rename = "id")]
    pub test_id: String,
    /// Human-readable name.
    #[serde(rename = "name")]
    pub display_name: String,
    /// Tags used by the task/tag filter.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// The stimulus sent to the execution backend.
    #[serde(rename = "inputs", default)]
    pub stimulus: Stimulus,
    /// Per-case timeout override in seconds.
    #[serde(rename = "timeout_seconds", default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    /// Per-case graders, run in addition to the spec's global graders.
    #[serde(rename = "validators", default, skip_serializing_if = "Vec::is_empty")]
    pub graders: Vec<GraderConfig>,
    /// Fixture root override for this case's resource references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_root: Option<String>,
    /// Whether the case participates in the run. Absent means active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl TestCase {
    /// Loads a test case from a YAML task description file.
    pub fn load(path: &Path) -> Result<Self, SpecError> {
        let data = fs::read_to_string(path)?;
        let tc: Self = serde_yaml::from_str(&data)?;
        Ok(tc)
    }

    /// Returns whether the case should be executed (defaults to true).
    pub fn is_active(&self) -> bool {
        self.active.unwrap_or(true)
    }
}

/// The message and supporting material sent to the execution backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stimulus {
    /// Message text sent to the agent.
    #[serde(rename = "prompt", default)]
    pub message: String,
    /// Inline metadata forwarded with the request.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Input files materialized into the workspace before execution.
    #[serde(rename = "files", default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceRef>,
}

/// A reference to one input file: either inline body text or a path
/// relative to the fixture root. Never both meaningfully used together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Destination path of the resource inside the workspace, and the
    /// fixture-relative source path when `body` is empty.
    #[serde(rename = "path", default)]
    pub location: String,
    /// Inline content; when non-empty it is used verbatim.
    #[serde(rename = "content", default)]
    pub body: String,
}
