//! Grading strategies and their registry.
//!
//! Graders are capability-typed: a spec names a grader by kind string, and
//! the registry maps that kind to a constructor closure. Unknown kinds are
//! a hard error naming the offending grader identifier.

pub mod keyword;
pub mod regex;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::GraderError;
use crate::execution::SkillInvocation;
use crate::models::{GraderKind, GraderResult, SessionDigest, SessionEvent, TestCase};

pub use self::keyword::KeywordGrader;
pub use self::regex::RegexGrader;

/// Everything a grader may inspect about one run.
#[derive(Debug, Clone, Default)]
pub struct GradingContext {
    pub test_case: TestCase,
    pub transcript: Vec<SessionEvent>,
    /// The agent's final output text.
    pub output: String,
    pub duration_ms: u64,
    /// Sandbox directory of the session, for file-inspecting graders.
    pub workspace_dir: Option<PathBuf>,
    /// Chronological list of skills invoked during the session.
    pub skill_invocations: Vec<SkillInvocation>,
    pub session: Option<SessionDigest>,
    pub session_id: Option<String>,
}

/// A pluggable scoring strategy producing a pass/fail verdict and a numeric
/// score for one run.
#[async_trait]
pub trait Grader: Send + Sync + std::fmt::Debug {
    /// The grader identifier, used in results and error messages.
    fn name(&self) -> &str;

    /// The grader kind.
    fn kind(&self) -> GraderKind;

    /// Grades one run.
    async fn grade(&self, ctx: &GradingContext) -> Result<GraderResult, GraderError>;
}

/// Constructor closure for one grader kind.
pub type GraderConstructor =
    Box<dyn Fn(&str, &BTreeMap<String, Value>) -> Result<Box<dyn Grader>, GraderError> + Send + Sync>;

/// Maps kind strings to grader constructors.
pub struct GraderRegistry {
    constructors: HashMap<String, GraderConstructor>,
}

impl GraderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Creates a registry with the built-in grader kinds registered.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        // Builtin kinds are distinct, so registration cannot fail.
        let _ = registry.register(GraderKind::REGEX, Box::new(self::regex::construct));
        let _ = registry.register(GraderKind::KEYWORD, Box::new(self::keyword::construct));
        registry
    }

    /// Registers a constructor for a kind. Duplicate kinds are rejected.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        constructor: GraderConstructor,
    ) -> Result<(), GraderError> {
        let kind = kind.into();
        if self.constructors.contains_key(&kind) {
            return Err(GraderError::DuplicateKind(kind));
        }
        self.constructors.insert(kind, constructor);
        Ok(())
    }

    /// Instantiates a grader of the given kind.
    pub fn create(
        &self,
        kind: &GraderKind,
        identifier: &str,
        params: &BTreeMap<String, Value>,
    ) -> Result<Box<dyn Grader>, GraderError> {
        if kind.is_empty() {
            return Err(GraderError::MissingKind(identifier.to_string()));
        }
        let constructor =
            self.constructors
                .get(kind.as_str())
                .ok_or_else(|| GraderError::UnknownKind {
                    kind: kind.to_string(),
                    identifier: identifier.to_string(),
                })?;
        constructor(identifier, params)
    }
}

impl Default for GraderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Decodes a grader's parameter map into a typed params struct.
pub(crate) fn decode_params<T: DeserializeOwned + Default>(
    identifier: &str,
    params: &BTreeMap<String, Value>,
) -> Result<T, GraderError> {
    if params.is_empty() {
        return Ok(T::default());
    }
    let value = Value::Object(params.clone().into_iter().collect());
    serde_json::from_value(value).map_err(|e| GraderError::InvalidParams {
        identifier: identifier.to_string(),
        reason: e.to_string(),
    })
}

/// Runs a grading closure and stamps the elapsed time onto its result.
pub(crate) fn measure<F>(f: F) -> Result<GraderResult, GraderError>
where
    F: FnOnce() -> Result<GraderResult, GraderError>,
{
    let start = Instant::now();
    let mut result = f()?;
    result.duration_ms = start.elapsed().as_millis() as u64;
    Ok(result)
}
