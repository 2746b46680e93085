//! Regex grader: validates the final output against regular expressions.

use std::collections::BTreeMap;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::{decode_params, measure, Grader, GradingContext};
use crate::error::GraderError;
use crate::models::{GraderKind, GraderResult};

#[derive(Debug, Clone, Default, Deserialize)]
struct RegexGraderParams {
    #[serde(default)]
    must_match: Vec<String>,
    #[serde(default)]
    must_not_match: Vec<String>,
}

/// Validates output by checking that patterns do or do not match.
#[derive(Debug)]
pub struct RegexGrader {
    name: String,
    must_match: Vec<Regex>,
    must_not_match: Vec<Regex>,
}

/// Registry constructor for the `regex` kind.
pub(crate) fn construct(
    identifier: &str,
    params: &BTreeMap<String, Value>,
) -> Result<Box<dyn Grader>, GraderError> {
    let params: RegexGraderParams = decode_params(identifier, params)?;
    Ok(Box::new(RegexGrader::new(
        identifier,
        &params.must_match,
        &params.must_not_match,
    )?))
}

impl RegexGrader {
    pub fn new(
        name: impl Into<String>,
        must_match: &[String],
        must_not_match: &[String],
    ) -> Result<Self, GraderError> {
        let name = name.into();
        Ok(Self {
            must_match: compile(&name, must_match)?,
            must_not_match: compile(&name, must_not_match)?,
            name,
        })
    }
}

fn compile(name: &str, patterns: &[String]) -> Result<Vec<Regex>, GraderError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|source| GraderError::InvalidRegex {
                identifier: name.to_string(),
                pattern: p.clone(),
                source,
            })
        })
        .collect()
}

#[async_trait]
impl Grader for RegexGrader {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> GraderKind {
        GraderKind::from(GraderKind::REGEX)
    }

    async fn grade(&self, ctx: &GradingContext) -> Result<GraderResult, GraderError> {
        measure(|| {
            let mut failures = Vec::new();

            for re in &self.must_match {
                if !re.is_match(&ctx.output) {
                    failures.push(format!("Expected pattern not found: {}", re.as_str()));
                }
            }
            for re in &self.must_not_match {
                if re.is_match(&ctx.output) {
                    failures.push(format!("Forbidden pattern found: {}", re.as_str()));
                }
            }

            let total = self.must_match.len() + self.must_not_match.len();
            let score = if total > 0 {
                (total - failures.len()) as f64 / total as f64
            } else {
                1.0
            };

            let feedback = if failures.is_empty() {
                "All regex checks passed".to_string()
            } else {
                failures.join("; ")
            };

            Ok(GraderResult {
                name: self.name.clone(),
                kind: self.kind(),
                score,
                weight: 0.0,
                passed: failures.is_empty(),
                feedback,
                details: Some(serde_json::json!({ "failures": failures })),
                duration_ms: 0,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(output: &str) -> GradingContext {
        GradingContext {
            output: output.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_regex_grader_passes() {
        let grader =
            RegexGrader::new("g", &["Mock response".to_string()], &["panic".to_string()]).unwrap();
        let result = grader.grade(&ctx("Mock response for: hi")).await.unwrap();
        assert!(result.passed);
        assert_eq!(result.score, 1.0);
    }

    #[tokio::test]
    async fn test_regex_grader_partial_score() {
        let grader = RegexGrader::new(
            "g",
            &["alpha".to_string(), "beta".to_string()],
            &[],
        )
        .unwrap();
        let result = grader.grade(&ctx("only alpha here")).await.unwrap();
        assert!(!result.passed);
        assert!((result.score - 0.5).abs() < 1e-9);
        assert!(result.feedback.contains("beta"));
    }

    #[tokio::test]
    async fn test_regex_grader_forbidden_pattern() {
        let grader = RegexGrader::new("g", &[], &["error".to_string()]).unwrap();
        let result = grader.grade(&ctx("an error occurred")).await.unwrap();
        assert!(!result.passed);
    }

    #[test]
    fn test_invalid_pattern_is_named() {
        let err = RegexGrader::new("g", &["(unclosed".to_string()], &[]).unwrap_err();
        assert!(err.to_string().contains("(unclosed"));
    }
}
