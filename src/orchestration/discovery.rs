//! Skill discovery and preflight validation.
//!
//! A skill is a directory containing a `SKILL.md` descriptor whose YAML
//! frontmatter carries a `name` field. Validation runs before any execution
//! so a misconfigured benchmark fails fast instead of half-way through.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

/// Scans the given directories for `SKILL.md` descriptors and returns a map
/// of skill name to descriptor path. Missing directories are skipped;
/// unparsable descriptors are logged and skipped.
pub fn discover_skills(directories: &[PathBuf]) -> BTreeMap<String, PathBuf> {
    let mut discovered = BTreeMap::new();

    for dir in directories {
        let descriptor = dir.join("SKILL.md");
        if !descriptor.is_file() {
            continue;
        }
        match parse_skill_name(&descriptor) {
            Some(name) if !name.is_empty() => {
                discovered.insert(name, descriptor);
            }
            _ => {
                warn!(path = %descriptor.display(), "failed to parse skill descriptor, skipping");
            }
        }
    }

    discovered
}

/// Extracts the skill name from a descriptor's YAML frontmatter.
pub fn parse_skill_name(path: &Path) -> Option<String> {
    let data = fs::read_to_string(path).ok()?;

    let mut lines = data.lines();
    if lines.next()?.trim() != "---" {
        return None;
    }

    for line in lines {
        if line.trim() == "---" {
            break;
        }
        if let Some(value) = line.strip_prefix("name:") {
            return Some(value.trim().to_string());
        }
    }

    None
}

/// Checks that every required skill was discovered. On failure returns an
/// itemized diagnostic naming the missing skills, the searched directories,
/// and whatever skills were found.
pub fn validate_required_skills(
    required: &[String],
    discovered: &BTreeMap<String, PathBuf>,
    searched: &[PathBuf],
) -> Result<(), String> {
    let missing: Vec<&String> = required
        .iter()
        .filter(|name| !discovered.contains_key(*name))
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    let mut msg = String::from("required skills not found:\n");
    for name in &missing {
        let _ = writeln!(msg, "  - {name}");
    }
    msg.push_str("\nSearched directories:\n");
    for dir in searched {
        let _ = writeln!(msg, "  - {}", dir.display());
    }
    if discovered.is_empty() {
        msg.push_str("\nNo skills were found in the searched directories.\n");
    } else {
        msg.push_str("\nFound skills:\n");
        for name in discovered.keys() {
            let _ = writeln!(msg, "  - {name}");
        }
    }

    Err(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_skill(root: &Path, dir: &str, name: &str) -> PathBuf {
        let skill_dir = root.join(dir);
        fs::create_dir_all(&skill_dir).unwrap();
        fs::write(
            skill_dir.join("SKILL.md"),
            format!("---\nname: {name}\ndescription: test skill\n---\n\n# {name}\n"),
        )
        .unwrap();
        skill_dir
    }

    #[test]
    fn test_discover_skills() {
        let root = TempDir::new().unwrap();
        let a = write_skill(root.path(), "weather", "weather-helper");
        let b = write_skill(root.path(), "math", "math-helper");
        let empty = root.path().join("empty");
        fs::create_dir_all(&empty).unwrap();

        let found = discover_skills(&[a, b, empty, root.path().join("missing")]);
        assert_eq!(found.len(), 2);
        assert!(found.contains_key("weather-helper"));
        assert!(found.contains_key("math-helper"));
    }

    #[test]
    fn test_parse_skill_name_requires_frontmatter() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("SKILL.md");
        fs::write(&path, "# no frontmatter\nname: nope\n").unwrap();
        assert_eq!(parse_skill_name(&path), None);
    }

    #[test]
    fn test_validate_passes_when_all_found() {
        let root = TempDir::new().unwrap();
        let dir = write_skill(root.path(), "weather", "weather-helper");
        let found = discover_skills(&[dir.clone()]);

        validate_required_skills(&["weather-helper".to_string()], &found, &[dir]).unwrap();
    }

    #[test]
    fn test_validate_diagnostic_is_itemized() {
        let root = TempDir::new().unwrap();
        let dir = write_skill(root.path(), "math", "math-helper");
        let found = discover_skills(&[dir.clone()]);

        let err = validate_required_skills(&["weather-helper".to_string()], &found, &[dir.clone()])
            .unwrap_err();
        assert!(err.contains("weather-helper"));
        assert!(err.contains(&dir.display().to_string()));
        assert!(err.contains("math-helper"));
    }
}
