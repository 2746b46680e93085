//! Content-addressed result caching.
//!
//! A cache key is derived from the spec, the task case, and the content of
//! the fixture files the case references, so editing any of them invalidates
//! the entry. Caching is a performance optimization: write failures are
//! logged by the orchestrator and never fail a run.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use crate::error::CacheError;
use crate::models::{BenchmarkSpec, GraderKind, TestCase, TestOutcome};

/// A directory-backed key-to-outcome store.
#[derive(Debug)]
pub struct ResultCache {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl ResultCache {
    /// Creates a cache over the given directory. The directory is created
    /// lazily on the first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    /// Retrieves a cached outcome. Unreadable or unparsable entries are
    /// treated as misses.
    pub fn get(&self, key: &str) -> Option<TestOutcome> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let data = fs::read(self.entry_path(key)).ok()?;
        serde_json::from_slice(&data).ok()
    }

    /// Stores an outcome under the given key.
    pub fn put(&self, key: &str, outcome: &TestOutcome) -> Result<(), CacheError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        fs::create_dir_all(&self.dir)?;
        let data = serde_json::to_vec_pretty(outcome)?;
        fs::write(self.entry_path(key), data)?;
        Ok(())
    }

    /// Removes all cached results.
    ///
    /// Refuses to delete a directory that contains anything other than
    /// cache entries.
    pub fn clear(&self) -> Result<(), CacheError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        if !self.dir.exists() {
            return Ok(());
        }

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.path().is_dir() {
                return Err(CacheError::UnsafeClear("subdirectories".to_string()));
            }
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                return Err(CacheError::UnsafeClear("non-cache files".to_string()));
            }
        }

        fs::remove_dir_all(&self.dir)?;
        Ok(())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

/// Derives a deterministic cache key for one task under one spec.
///
/// The key covers spec identity, execution config, grader configuration,
/// the task definition, and the content of every fixture file the task
/// references (missing fixtures hash their path so additions and removals
/// still invalidate).
pub fn cache_key(
    spec: &BenchmarkSpec,
    case: &TestCase,
    fixture_dir: Option<&Path>,
) -> Result<String, CacheError> {
    let mut hasher = Sha256::new();

    write_str(&mut hasher, &spec.name);
    write_str(&mut hasher, &spec.skill_name);
    write_str(&mut hasher, &spec.config.model_id);
    write_str(&mut hasher, &spec.config.engine_kind);
    write_str(&mut hasher, &spec.config.timeout_seconds.to_string());
    write_str(&mut hasher, &spec.config.trials_per_task.to_string());
    for path in &spec.config.skill_paths {
        write_str(&mut hasher, path);
    }

    hasher.update(serde_json::to_vec(&spec.graders)?);
    hasher.update(serde_json::to_vec(case)?);

    let mut fixtures: Vec<&str> = case
        .stimulus
        .resources
        .iter()
        .filter(|r| r.body.is_empty() && !r.location.is_empty())
        .map(|r| r.location.as_str())
        .collect();
    fixtures.sort_unstable();

    for fixture in fixtures {
        let path = match fixture_dir {
            Some(dir) if !Path::new(fixture).is_absolute() => dir.join(fixture),
            _ => PathBuf::from(fixture),
        };
        match fs::File::open(&path) {
            Ok(mut file) => {
                let mut buf = [0u8; 8192];
                loop {
                    let n = file.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                write_str(&mut hasher, fixture);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Whether the spec configures any grader whose verdict is not reproducible
/// across runs (prompt- or behavior-kind), making caching inadvisable.
pub fn has_nondeterministic_graders(spec: &BenchmarkSpec) -> bool {
    spec.graders
        .iter()
        .any(|g| g.kind.as_str() == GraderKind::PROMPT || g.kind.as_str() == GraderKind::BEHAVIOR)
}

fn write_str(hasher: &mut Sha256, s: &str) {
    // Null delimiter prevents concatenation collisions.
    hasher.update(s.as_bytes());
    hasher.update([0u8]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExecConfig, GraderConfig, ResourceRef, Status, Stimulus};
    use tempfile::TempDir;

    fn spec() -> BenchmarkSpec {
        BenchmarkSpec {
            name: "bench".to_string(),
            description: String::new(),
            skill_name: "skill".to_string(),
            version: String::new(),
            config: ExecConfig {
                model_id: "m1".to_string(),
                ..Default::default()
            },
            hooks: Default::default(),
            graders: vec![],
            tasks: vec![],
            tasks_from: None,
            row_range: None,
            inputs: Default::default(),
        }
    }

    fn case(id: &str) -> TestCase {
        TestCase {
            test_id: id.to_string(),
            display_name: id.to_string(),
            ..Default::default()
        }
    }

    fn outcome(id: &str) -> TestOutcome {
        TestOutcome {
            test_id: id.to_string(),
            display_name: id.to_string(),
            group: String::new(),
            status: Status::Passed,
            runs: vec![],
            stats: None,
            skill_impact: None,
        }
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        let k1 = cache_key(&spec(), &case("a"), None).unwrap();
        let k2 = cache_key(&spec(), &case("a"), None).unwrap();
        assert_eq!(k1, k2);
    }

    #[test]
    fn test_cache_key_varies_with_task_and_spec() {
        let base = cache_key(&spec(), &case("a"), None).unwrap();

        assert_ne!(base, cache_key(&spec(), &case("b"), None).unwrap());

        let mut other = spec();
        other.config.model_id = "m2".to_string();
        assert_ne!(base, cache_key(&other, &case("a"), None).unwrap());

        let mut graded = spec();
        graded.graders.push(GraderConfig {
            kind: GraderKind::from("regex"),
            identifier: "g".to_string(),
            ..Default::default()
        });
        assert_ne!(base, cache_key(&graded, &case("a"), None).unwrap());
    }

    #[test]
    fn test_cache_key_varies_with_fixture_content() {
        let fixtures = TempDir::new().unwrap();
        fs::write(fixtures.path().join("data.txt"), "v1").unwrap();

        let mut tc = case("a");
        tc.stimulus = Stimulus {
            resources: vec![ResourceRef {
                location: "data.txt".to_string(),
                body: String::new(),
            }],
            ..Default::default()
        };

        let k1 = cache_key(&spec(), &tc, Some(fixtures.path())).unwrap();
        fs::write(fixtures.path().join("data.txt"), "v2").unwrap();
        let k2 = cache_key(&spec(), &tc, Some(fixtures.path())).unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn test_cache_key_missing_fixture_still_hashes() {
        let fixtures = TempDir::new().unwrap();
        let mut tc = case("a");
        tc.stimulus = Stimulus {
            resources: vec![ResourceRef {
                location: "absent.txt".to_string(),
                body: String::new(),
            }],
            ..Default::default()
        };

        let with_ref = cache_key(&spec(), &tc, Some(fixtures.path())).unwrap();
        let without_ref = cache_key(&spec(), &case("a"), Some(fixtures.path())).unwrap();
        assert_ne!(with_ref, without_ref);
    }

    #[test]
    fn test_get_put_round_trip() {
        let dir = TempDir::new().unwrap();
        let cache = ResultCache::new(dir.path().join("cache"));

        assert!(cache.get("k1").is_none());
        cache.put("k1", &outcome("a")).unwrap();

        let cached = cache.get("k1").unwrap();
        assert_eq!(cached.test_id, "a");
        assert_eq!(cached.status, Status::Passed);
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = ResultCache::new(dir.path());
        fs::write(dir.path().join("bad.json"), "not json").unwrap();
        assert!(cache.get("bad").is_none());
    }

    #[test]
    fn test_clear_refuses_foreign_files() {
        let dir = TempDir::new().unwrap();
        let cache = ResultCache::new(dir.path());
        cache.put("k", &outcome("a")).unwrap();
        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();

        let err = cache.clear().unwrap_err();
        assert!(matches!(err, CacheError::UnsafeClear(_)));
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_clear_removes_cache_entries() {
        let dir = TempDir::new().unwrap();
        let cache_dir = dir.path().join("cache");
        let cache = ResultCache::new(&cache_dir);
        cache.put("k", &outcome("a")).unwrap();

        cache.clear().unwrap();
        assert!(!cache_dir.exists());
    }

    #[test]
    fn test_has_nondeterministic_graders() {
        let mut s = spec();
        assert!(!has_nondeterministic_graders(&s));
        s.graders.push(GraderConfig {
            kind: GraderKind::from("prompt"),
            identifier: "judge".to_string(),
            ..Default::default()
        });
        assert!(has_nondeterministic_graders(&s));
    }
}
