//! Task and tag filtering.

use globset::{Glob, GlobMatcher};

use crate::error::FilterError;
use crate::models::TestCase;

/// Returns the subset of test cases matching the given task and tag patterns.
///
/// Task patterns match either the display name or the test id; tag patterns
/// match any tag. When both pattern lists are given the result is the
/// intersection. Empty lists match everything.
pub fn filter_test_cases(
    cases: Vec<TestCase>,
    task_patterns: &[String],
    tag_patterns: &[String],
) -> Result<Vec<TestCase>, FilterError> {
    if task_patterns.is_empty() && tag_patterns.is_empty() {
        return Ok(cases);
    }

    let task_matchers = compile(task_patterns, |pattern, source| {
        FilterError::InvalidTaskPattern { pattern, source }
    })?;
    let tag_matchers = compile(tag_patterns, |pattern, source| {
        FilterError::InvalidTagPattern { pattern, source }
    })?;

    Ok(cases
        .into_iter()
        .filter(|tc| matches_task(tc, &task_matchers) && matches_tags(tc, &tag_matchers))
        .collect())
}

fn compile(
    patterns: &[String],
    on_err: impl Fn(String, globset::Error) -> FilterError,
) -> Result<Vec<GlobMatcher>, FilterError> {
    patterns
        .iter()
        .map(|p| {
            Glob::new(p)
                .map(|g| g.compile_matcher())
                .map_err(|e| on_err(p.clone(), e))
        })
        .collect()
}

fn matches_task(tc: &TestCase, matchers: &[GlobMatcher]) -> bool {
    if matchers.is_empty() {
        return true;
    }
    matchers
        .iter()
        .any(|m| m.is_match(&tc.display_name) || m.is_match(&tc.test_id))
}

fn matches_tags(tc: &TestCase, matchers: &[GlobMatcher]) -> bool {
    if matchers.is_empty() {
        return true;
    }
    tc.tags
        .iter()
        .any(|tag| matchers.iter().any(|m| m.is_match(tag)))
}
