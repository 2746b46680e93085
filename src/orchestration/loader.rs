//! Test case loading from task files and tabular datasets.

use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use globset::{Glob, GlobSetBuilder};
use tracing::debug;
use walkdir::WalkDir;

use crate::dataset;
use crate::error::LoadError;
use crate::models::{BenchmarkSpec, Stimulus, TestCase};
use crate::template::{self, TemplateContext};

/// Produces the test case list for one pass.
///
/// A spec sources cases either from a tabular dataset (`tasks_from`) or
/// from YAML task files matched by glob patterns (`tasks`); the dataset
/// takes precedence when both are set.
pub fn load_test_cases(spec: &BenchmarkSpec, spec_dir: &Path) -> Result<Vec<TestCase>, LoadError> {
    if spec.tasks_from.is_some() {
        return load_from_dataset(spec, spec_dir);
    }
    load_from_files(spec, spec_dir)
}

/// Loads task files matching the spec's glob patterns, relative to the spec
/// directory. Matches are sorted for deterministic ordering; inactive cases
/// are dropped.
fn load_from_files(spec: &BenchmarkSpec, spec_dir: &Path) -> Result<Vec<TestCase>, LoadError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in &spec.tasks {
        let glob = Glob::new(pattern).map_err(|source| LoadError::Pattern {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    let globs = builder.build().map_err(|source| LoadError::Pattern {
        pattern: spec.tasks.join(", "),
        source,
    })?;

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(spec_dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(spec_dir) else {
            continue;
        };
        if globs.is_match(relative) {
            paths.push(entry.path().to_path_buf());
        }
    }
    paths.sort();

    if paths.is_empty() {
        return Err(LoadError::NoMatches {
            patterns: spec.tasks.clone(),
            base_dir: spec_dir.display().to_string(),
        });
    }

    let mut cases = Vec::with_capacity(paths.len());
    for path in paths {
        let tc = TestCase::load(&path).map_err(|source| LoadError::Case {
            path: path.display().to_string(),
            source,
        })?;
        if tc.is_active() {
            cases.push(tc);
        } else {
            debug!(test_id = %tc.test_id, "skipping inactive test case");
        }
    }

    Ok(cases)
}

/// Generates in-memory test cases from the spec's dataset rows.
fn load_from_dataset(spec: &BenchmarkSpec, spec_dir: &Path) -> Result<Vec<TestCase>, LoadError> {
    let Some(tasks_from) = spec.tasks_from.as_deref() else {
        return Ok(Vec::new());
    };

    let dataset_path = if Path::new(tasks_from).is_absolute() {
        PathBuf::from(tasks_from)
    } else {
        spec_dir.join(tasks_from)
    };

    // The dataset must live inside the spec directory.
    let base = normalize(spec_dir);
    let resolved = normalize(&dataset_path);
    if !resolved.starts_with(&base) || resolved == base {
        return Err(LoadError::DatasetEscapes(tasks_from.to_string()));
    }

    let rows = match spec.row_range {
        Some([start, end]) => {
            if start <= 0 || end <= 0 {
                return Err(LoadError::RangeNotPositive(start, end));
            }
            if start > end {
                return Err(LoadError::RangeInverted(start, end));
            }
            dataset::load_csv_range(&dataset_path, start, end)?
        }
        None => dataset::load_csv(&dataset_path)?,
    };

    let now = Utc::now();
    let job_id = format!("run-{}", now.timestamp());
    let timestamp = now.to_rfc3339();

    let mut cases = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let row_num = i + 1;

        // Identity falls back: id column, then name column, then row number.
        let fallback = format!("row-{row_num}");
        let test_id = non_empty(row.get("id"))
            .or_else(|| non_empty(row.get("name")))
            .unwrap_or(&fallback)
            .to_string();
        let display_name = non_empty(row.get("name")).unwrap_or(&fallback).to_string();

        // Per-row variables: spec inputs first, row columns win on conflict.
        let mut vars = spec.inputs.clone();
        for (k, v) in row {
            vars.insert(k.clone(), v.clone());
        }
        let ctx = TemplateContext {
            job_id: job_id.clone(),
            task_name: display_name.clone(),
            timestamp: timestamp.clone(),
            vars,
            ..Default::default()
        };

        let prompt = row.get("prompt").map(String::as_str).unwrap_or_default();
        let message = template::render(prompt, &ctx)
            .map_err(|source| LoadError::RowTemplate { row: row_num, source })?;

        cases.push(TestCase {
            test_id,
            display_name,
            stimulus: Stimulus {
                message,
                ..Default::default()
            },
            ..Default::default()
        });
    }

    Ok(cases)
}

fn non_empty(value: Option<&String>) -> Option<&String> {
    value.filter(|v| !v.is_empty())
}

/// Lexically normalizes a path, resolving `.` and `..` components without
/// touching the filesystem.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn spec_with_tasks(patterns: &[&str]) -> BenchmarkSpec {
        BenchmarkSpec {
            name: "bench".to_string(),
            description: String::new(),
            skill_name: String::new(),
            version: String::new(),
            config: Default::default(),
            hooks: Default::default(),
            graders: vec![],
            tasks: patterns.iter().map(|p| p.to_string()).collect(),
            tasks_from: None,
            row_range: None,
            inputs: Default::default(),
        }
    }

    fn write_task(dir: &Path, file: &str, id: &str, active: Option<bool>) {
        let active_line = match active {
            Some(v) => format!("active: {v}\n"),
            None => String::new(),
        };
        let path = dir.join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            path,
            format!("id: {id}\nname: task {id}\n{active_line}inputs:\n  prompt: hello\n"),
        )
        .unwrap();
    }

    #[test]
    fn test_glob_loading_is_sorted_and_skips_inactive() {
        let dir = TempDir::new().unwrap();
        write_task(dir.path(), "tasks/b.yaml", "b", None);
        write_task(dir.path(), "tasks/a.yaml", "a", None);
        write_task(dir.path(), "tasks/c.yaml", "c", Some(false));

        let spec = spec_with_tasks(&["tasks/*.yaml"]);
        let cases = load_test_cases(&spec, dir.path()).unwrap();

        let ids: Vec<&str> = cases.iter().map(|c| c.test_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_no_matches_is_an_error() {
        let dir = TempDir::new().unwrap();
        let spec = spec_with_tasks(&["tasks/*.yaml"]);
        let err = load_test_cases(&spec, dir.path()).unwrap_err();
        assert!(matches!(err, LoadError::NoMatches { .. }));
    }

    #[test]
    fn test_invalid_pattern_is_named() {
        let dir = TempDir::new().unwrap();
        let spec = spec_with_tasks(&["[unclosed"]);
        let err = load_test_cases(&spec, dir.path()).unwrap_err();
        assert!(err.to_string().contains("[unclosed"));
    }

    fn spec_with_dataset(tasks_from: &str, range: Option<[i64; 2]>) -> BenchmarkSpec {
        let mut spec = spec_with_tasks(&[]);
        spec.tasks_from = Some(tasks_from.to_string());
        spec.row_range = range;
        spec
    }

    #[test]
    fn test_dataset_identity_fallback() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("cases.csv"),
            "id,name,prompt\ntc-1,first,say hi\n,second,say bye\n,,say hm\n",
        )
        .unwrap();

        let spec = spec_with_dataset("cases.csv", None);
        let cases = load_test_cases(&spec, dir.path()).unwrap();

        assert_eq!(cases.len(), 3);
        assert_eq!(cases[0].test_id, "tc-1");
        assert_eq!(cases[0].display_name, "first");
        assert_eq!(cases[1].test_id, "second");
        assert_eq!(cases[2].test_id, "row-3");
        assert_eq!(cases[2].display_name, "row-3");
    }

    #[test]
    fn test_dataset_prompt_templates_render_with_row_precedence() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("cases.csv"),
            "id,city,prompt\nt1,Lisbon,\"weather in {{ city }} ({{ region }})\"\n",
        )
        .unwrap();

        let mut spec = spec_with_dataset("cases.csv", None);
        spec.inputs.insert("region".to_string(), "emea".to_string());
        spec.inputs.insert("city".to_string(), "Porto".to_string());

        let cases = load_test_cases(&spec, dir.path()).unwrap();
        assert_eq!(cases[0].stimulus.message, "weather in Lisbon (emea)");
    }

    #[test]
    fn test_dataset_range_applies() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("cases.csv"), "id\na\nb\nc\nd\n").unwrap();

        let spec = spec_with_dataset("cases.csv", Some([2, 3]));
        let cases = load_test_cases(&spec, dir.path()).unwrap();
        let ids: Vec<&str> = cases.iter().map(|c| c.test_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_dataset_range_validation() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("cases.csv"), "id\na\n").unwrap();

        let err =
            load_test_cases(&spec_with_dataset("cases.csv", Some([0, 3])), dir.path()).unwrap_err();
        assert!(matches!(err, LoadError::RangeNotPositive(0, 3)));

        let err =
            load_test_cases(&spec_with_dataset("cases.csv", Some([3, 2])), dir.path()).unwrap_err();
        assert!(matches!(err, LoadError::RangeInverted(3, 2)));
    }

    #[test]
    fn test_dataset_escape_is_rejected() {
        let dir = TempDir::new().unwrap();
        let spec = spec_with_dataset("../outside.csv", None);
        let err = load_test_cases(&spec, dir.path()).unwrap_err();
        assert!(matches!(err, LoadError::DatasetEscapes(_)));
        assert!(err.to_string().contains("escapes spec directory"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(normalize(Path::new("a/../../b")), PathBuf::from("../b"));
    }
}
