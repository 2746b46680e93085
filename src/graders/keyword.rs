//! Keyword grader: case-insensitive presence/absence checks on the output.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{decode_params, measure, Grader, GradingContext};
use crate::error::GraderError;
use crate::models::{GraderKind, GraderResult};

#[derive(Debug, Clone, Default, Deserialize)]
struct KeywordGraderParams {
    #[serde(default)]
    must_contain: Vec<String>,
    #[serde(default)]
    must_not_contain: Vec<String>,
}

/// Validates output by checking for keyword presence or absence.
#[derive(Debug)]
pub struct KeywordGrader {
    name: String,
    must_contain: Vec<String>,
    must_not_contain: Vec<String>,
}

/// Registry constructor for the `keyword` kind.
pub(crate) fn construct(
    identifier: &str,
    params: &BTreeMap<String, Value>,
) -> Result<Box<dyn Grader>, GraderError> {
    let params: KeywordGraderParams = decode_params(identifier, params)?;
    Ok(Box::new(KeywordGrader::new(
        identifier,
        params.must_contain,
        params.must_not_contain,
    )))
}

impl KeywordGrader {
    pub fn new(
        name: impl Into<String>,
        must_contain: Vec<String>,
        must_not_contain: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            must_contain,
            must_not_contain,
        }
    }
}

#[async_trait]
impl Grader for KeywordGrader {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> GraderKind {
        GraderKind::from(GraderKind::KEYWORD)
    }

    async fn grade(&self, ctx: &GradingContext) -> Result<GraderResult, GraderError> {
        measure(|| {
            let output_lower = ctx.output.to_lowercase();
            let mut failures = Vec::new();

            for keyword in &self.must_contain {
                if !output_lower.contains(&keyword.to_lowercase()) {
                    failures.push(format!("Missing expected keyword: {keyword}"));
                }
            }
            for keyword in &self.must_not_contain {
                if output_lower.contains(&keyword.to_lowercase()) {
                    failures.push(format!("Found forbidden keyword: {keyword}"));
                }
            }

            let total = self.must_contain.len() + self.must_not_contain.len();
            let score = if total > 0 {
                (total - failures.len()) as f64 / total as f64
            } else {
                1.0
            };

            let feedback = if failures.is_empty() {
                "All keyword checks passed".to_string()
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
