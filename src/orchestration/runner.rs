//! The benchmark orchestrator.
//!
//! [`TestRunner`] drives a pass end to end: engine lifecycle, hooks, test
//! case loading and filtering, per-task execution with trials and retries,
//! grading, caching, and outcome aggregation. In baseline mode it runs two
//! passes (skills enabled, skills stripped) and merges them into a single
//! A/B comparison outcome.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::cache::{self, ResultCache};
use crate::error::{GraderError, OrchestrationError};
use crate::execution::{ExecutionClient, ExecutionError, ExecutionRequest, ExecutionResponse};
use crate::graders::{GraderRegistry, GradingContext};
use crate::hooks::HookRunner;
use crate::models::{
    BenchmarkSpec, EvaluationOutcome, GraderKind, GraderResult, GroupStats, OutcomeDigest,
    OutcomeSetup, RunResult, SessionDigest, SkillImpactMetric, StatisticalSummary, Status,
    TestCase, TestOutcome, TestStats, compute_std_dev,
};
use crate::statistics::{bootstrap_ci, is_significant, normalized_gain};
use crate::template;

use super::discovery;
use super::filter::filter_test_cases;
use super::loader;
use super::resources;

/// Worker pool width used when the spec leaves `max_workers` unset.
const DEFAULT_WORKERS: usize = 4;

/// The kind of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventType {
    #[default]
    BenchmarkStart,
    BenchmarkComplete,
    BenchmarkStopped,
    TestStart,
    TestComplete,
    TestCached,
    RunStart,
    RunComplete,
}

/// A progress update emitted while a pass executes.
#[derive(Debug, Clone, Default)]
pub struct ProgressEvent {
    pub event_type: EventType,
    pub test_name: String,
    pub test_num: usize,
    pub total_tests: usize,
    pub run_num: u32,
    pub total_runs: u32,
    pub status: Option<Status>,
    pub duration_ms: u64,
}

/// Receives progress updates. Listeners run on the orchestrator's tasks and
/// should return quickly.
pub type ProgressListener = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Immutable configuration for one runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    spec: BenchmarkSpec,
    spec_dir: PathBuf,
    fixture_dir: Option<PathBuf>,
}

impl RunnerConfig {
    /// Creates a config from a loaded spec and the directory it was loaded
    /// from (task patterns and skill paths resolve against it).
    pub fn new(spec: BenchmarkSpec, spec_dir: impl Into<PathBuf>) -> Self {
        Self {
            spec,
            spec_dir: spec_dir.into(),
            fixture_dir: None,
        }
    }

    /// Sets the root directory for file-backed resource references.
    pub fn with_fixture_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fixture_dir = Some(dir.into());
        self
    }

    pub fn spec(&self) -> &BenchmarkSpec {
        &self.spec
    }

    pub fn spec_dir(&self) -> &Path {
        &self.spec_dir
    }

    pub fn fixture_dir(&self) -> Option<&Path> {
        self.fixture_dir.as_deref()
    }
}

/// Orchestrates the execution of a benchmark.
#[derive(Clone)]
pub struct TestRunner {
    config: Arc<RunnerConfig>,
    engine: Arc<dyn ExecutionClient>,
    registry: Arc<GraderRegistry>,
    cache: Option<Arc<ResultCache>>,
    hook_runner: HookRunner,
    task_filters: Vec<String>,
    tag_filters: Vec<String>,
    listeners: Arc<Mutex<Vec<ProgressListener>>>,
}

impl TestRunner {
    pub fn new(config: RunnerConfig, engine: Arc<dyn ExecutionClient>) -> Self {
        Self {
            config: Arc::new(config),
            engine,
            registry: Arc::new(GraderRegistry::builtin()),
            cache: None,
            hook_runner: HookRunner,
            task_filters: Vec::new(),
            tag_filters: Vec::new(),
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Replaces the grader registry, e.g. to add external grader kinds.
    pub fn with_registry(mut self, registry: GraderRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Restricts the pass to test cases whose name or id matches a pattern.
    pub fn with_task_filters(mut self, patterns: Vec<String>) -> Self {
        self.task_filters = patterns;
        self
    }

    /// Restricts the pass to test cases carrying a matching tag.
    pub fn with_tag_filters(mut self, patterns: Vec<String>) -> Self {
        self.tag_filters = patterns;
        self
    }

    /// Enables result caching.
    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    /// Registers a progress listener.
    pub fn on_progress(&self, listener: ProgressListener) {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    fn notify(&self, event: ProgressEvent) {
        // Snapshot under the lock, invoke outside it.
        let listeners: Vec<ProgressListener> = self
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for listener in listeners {
            listener(event.clone());
        }
    }

    /// Executes the benchmark. In baseline mode this runs two passes and
    /// merges them; otherwise it runs a single pass.
    pub async fn run_benchmark(&self) -> Result<EvaluationOutcome, OrchestrationError> {
        if self.config.spec.config.baseline {
            return self.run_baseline_comparison().await;
        }
        self.run_pass(self.pass_spec(false)).await
    }

    /// Derives the effective spec for one pass. The shared spec is never
    /// mutated; the baseline pass gets a copy with its skills stripped.
    fn pass_spec(&self, baseline: bool) -> Arc<BenchmarkSpec> {
        let mut spec = self.config.spec.clone();
        spec.config.baseline = false;
        if baseline {
            spec.config.skill_paths.clear();
            spec.config.required_skills.clear();
        }
        Arc::new(spec)
    }

    async fn run_baseline_comparison(&self) -> Result<EvaluationOutcome, OrchestrationError> {
        let cfg = &self.config.spec.config;
        if cfg.skill_paths.is_empty() && cfg.required_skills.is_empty() {
            warn!("baseline enabled but no skills configured, running a single pass");
            return self.run_pass(self.pass_spec(false)).await;
        }

        info!("pass 1: skills enabled");
        let with_skills = self
            .run_pass(self.pass_spec(false))
            .await
            .map_err(|e| OrchestrationError::SkillsPass(Box::new(e)))?;

        info!("pass 2: skills baseline (skills stripped)");
        let without_skills = self
            .run_pass(self.pass_spec(true))
            .await
            .map_err(|e| OrchestrationError::BaselinePass(Box::new(e)))?;

        self.merge_baseline_outcomes(with_skills, without_skills)
    }

    /// Runs one full pass: engine lifecycle, run hooks, loading, filtering,
    /// execution, aggregation. The `after_run` hooks and engine shutdown
    /// happen even when the pass fails.
    async fn run_pass(
        &self,
        spec: Arc<BenchmarkSpec>,
    ) -> Result<EvaluationOutcome, OrchestrationError> {
        self.engine
            .initialize()
            .await
            .map_err(|e| OrchestrationError::EngineInit(e.to_string()))?;

        let result = self.run_pass_inner(&spec).await;

        if !spec.hooks.after_run.is_empty() {
            if let Err(e) = self
                .hook_runner
                .execute("after_run", &spec.hooks.after_run)
                .await
            {
                warn!(error = %e, "after_run hook failed");
            }
        }
        if let Err(e) = self.engine.shutdown().await {
            warn!(error = %e, "engine shutdown failed");
        }

        result
    }

    async fn run_pass_inner(
        &self,
        spec: &Arc<BenchmarkSpec>,
    ) -> Result<EvaluationOutcome, OrchestrationError> {
        let start = Instant::now();
        let started_at = Utc::now();

        if !spec.hooks.before_run.is_empty() {
            self.hook_runner
                .execute("before_run", &spec.hooks.before_run)
                .await
                .map_err(OrchestrationError::BeforeRunHook)?;
        }

        self.validate_required_skills(spec)?;

        if self.cache.is_some() && cache::has_nondeterministic_graders(spec) {
            warn!("spec uses nondeterministic graders; cached outcomes may hide run-to-run variance");
        }

        let mut cases = loader::load_test_cases(spec, &self.config.spec_dir)?;

        if !self.task_filters.is_empty() || !self.tag_filters.is_empty() {
            cases = filter_test_cases(cases, &self.task_filters, &self.tag_filters)?;
            info!(matched = cases.len(), "task and tag filters applied");
        }

        if cases.is_empty() {
            return Err(OrchestrationError::NoTestCases);
        }

        self.notify(ProgressEvent {
            event_type: EventType::BenchmarkStart,
            total_tests: cases.len(),
            ..Default::default()
        });

        let outcomes = if spec.config.concurrent {
            self.run_concurrent(spec, cases).await
        } else {
            self.run_sequential(spec, cases).await
        };

        let outcome = self.build_outcome(spec, outcomes, start, started_at);

        self.notify(ProgressEvent {
            event_type: EventType::BenchmarkComplete,
            duration_ms: start.elapsed().as_millis() as u64,
            ..Default::default()
        });

        Ok(outcome)
    }

    /// Preflight check that every required skill is discoverable.
    fn validate_required_skills(&self, spec: &BenchmarkSpec) -> Result<(), OrchestrationError> {
        if spec.config.required_skills.is_empty() {
            return Ok(());
        }

        let resolved = template::resolve_paths(&spec.config.skill_paths, &self.config.spec_dir);
        if resolved.is_empty() {
            return Err(OrchestrationError::NoSkillDirectories);
        }

        let discovered = discovery::discover_skills(&resolved);
        discovery::validate_required_skills(&spec.config.required_skills, &discovered, &resolved)
            .map_err(OrchestrationError::SkillValidation)?;

        debug!(
            found = discovered.len(),
            required = spec.config.required_skills.len(),
            "required skills validated"
        );
        Ok(())
    }

    async fn run_sequential(
        &self,
        spec: &Arc<BenchmarkSpec>,
        cases: Vec<TestCase>,
    ) -> Vec<TestOutcome> {
        let total = cases.len();
        let mut outcomes = Vec::with_capacity(total);

        for (i, tc) in cases.into_iter().enumerate() {
            if spec.config.fail_fast && outcomes.iter().any(|o: &TestOutcome| o.status != Status::Passed) {
                self.notify(ProgressEvent {
                    event_type: EventType::BenchmarkStopped,
                    ..Default::default()
                });
                break;
            }

            let outcome = self.run_case(spec, tc, i + 1, total).await;
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn run_concurrent(
        &self,
        spec: &Arc<BenchmarkSpec>,
        cases: Vec<TestCase>,
    ) -> Vec<TestOutcome> {
        let workers = if spec.config.workers > 0 {
            spec.config.workers
        } else {
            DEFAULT_WORKERS
        };
        let semaphore = Arc::new(Semaphore::new(workers));
        let total = cases.len();

        let mut handles = Vec::with_capacity(total);
        for (i, tc) in cases.into_iter().enumerate() {
            let runner = self.clone();
            let spec = Arc::clone(spec);
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                // The semaphore is never closed, so acquisition only fails
                // if the pool is dropped mid-pass.
                let _permit = semaphore.acquire_owned().await.ok();
                (i, runner.run_case(&spec, tc, i + 1, total).await)
            }));
        }

        // Results land in their submission slot so output order matches the
        // sequential path regardless of completion order.
        let mut slots: Vec<Option<TestOutcome>> = (0..total).map(|_| None).collect();
        for handle in handles {
            match handle.await {
                Ok((i, outcome)) => slots[i] = Some(outcome),
                Err(e) => warn!(error = %e, "task worker panicked"),
            }
        }
        slots.into_iter().flatten().collect()
    }

    /// Runs one task including its task-scoped hooks and progress events.
    async fn run_case(
        &self,
        spec: &Arc<BenchmarkSpec>,
        tc: TestCase,
        test_num: usize,
        total: usize,
    ) -> TestOutcome {
        if !spec.hooks.before_task.is_empty() {
            if let Err(e) = self
                .hook_runner
                .execute("before_task", &spec.hooks.before_task)
                .await
            {
                warn!(task = %tc.display_name, error = %e, "before_task hook failed, marking task failed");
                let outcome = TestOutcome {
                    test_id: tc.test_id,
                    display_name: tc.display_name,
                    group: String::new(),
                    status: Status::Failed,
                    runs: Vec::new(),
                    stats: None,
                    skill_impact: None,
                };
                self.notify(ProgressEvent {
                    event_type: EventType::TestComplete,
                    test_name: outcome.display_name.clone(),
                    test_num,
                    total_tests: total,
                    status: Some(Status::Failed),
                    ..Default::default()
                });
                return outcome;
            }
        }

        self.notify(ProgressEvent {
            event_type: EventType::TestStart,
            test_name: tc.display_name.clone(),
            test_num,
            total_tests: total,
            ..Default::default()
        });

        let (outcome, cached) = self.run_test(spec, &tc, test_num, total).await;

        if !spec.hooks.after_task.is_empty() {
            if let Err(e) = self
                .hook_runner
                .execute("after_task", &spec.hooks.after_task)
                .await
            {
                warn!(task = %tc.display_name, error = %e, "after_task hook failed");
            }
        }

        self.notify(ProgressEvent {
            event_type: if cached {
                EventType::TestCached
            } else {
                EventType::TestComplete
            },
            test_name: tc.display_name.clone(),
            test_num,
            total_tests: total,
            status: Some(outcome.status),
            duration_ms: outcome
                .stats
                .as_ref()
                .map(|s| s.avg_duration_ms)
                .unwrap_or(0),
            ..Default::default()
        });

        outcome
    }

    /// Runs one task through the cache. Cache failures never fail the task.
    async fn run_test(
        &self,
        spec: &Arc<BenchmarkSpec>,
        tc: &TestCase,
        test_num: usize,
        total: usize,
    ) -> (TestOutcome, bool) {
        let Some(cache) = &self.cache else {
            return (self.run_test_uncached(spec, tc, test_num, total).await, false);
        };

        let key = match cache::cache_key(spec, tc, self.config.fixture_dir()) {
            Ok(key) => key,
            Err(e) => {
                warn!(task = %tc.display_name, error = %e, "cache key derivation failed, running uncached");
                return (self.run_test_uncached(spec, tc, test_num, total).await, false);
            }
        };

        if let Some(hit) = cache.get(&key) {
            debug!(task = %tc.display_name, "cache hit");
            return (hit, true);
        }

        let outcome = self.run_test_uncached(spec, tc, test_num, total).await;
        if let Err(e) = cache.put(&key, &outcome) {
            warn!(task = %tc.display_name, error = %e, "failed to write cache entry");
        }
        (outcome, false)
    }

    async fn run_test_uncached(
        &self,
        spec: &Arc<BenchmarkSpec>,
        tc: &TestCase,
        test_num: usize,
        total: usize,
    ) -> TestOutcome {
        let trials = spec.config.trials_per_task;
        let max_attempts = spec.config.max_attempts.max(1);

        let mut runs = Vec::with_capacity(trials as usize);
        for run_num in 1..=trials {
            self.notify(ProgressEvent {
                event_type: EventType::RunStart,
                test_name: tc.display_name.clone(),
                test_num,
                total_tests: total,
                run_num,
                total_runs: trials,
                ..Default::default()
            });

            let mut run = RunResult::default();
            for attempt in 1..=max_attempts {
                run = self.execute_run(spec, tc, run_num).await;
                run.attempts = attempt;

                // A pass needs no retry; an infrastructure error will not
                // improve by retrying.
                if run.status == Status::Passed || run.status == Status::Error {
                    break;
                }
                if attempt < max_attempts {
                    debug!(
                        task = %tc.display_name,
                        run = run_num,
                        attempt,
                        max_attempts,
                        "attempt failed, retrying"
                    );
                }
            }

            if let Some(msg) = &run.error_msg {
                warn!(task = %tc.display_name, run = run_num, error = %msg, "run errored");
            }

            self.notify(ProgressEvent {
                event_type: EventType::RunComplete,
                test_name: tc.display_name.clone(),
                test_num,
                total_tests: total,
                run_num,
                total_runs: trials,
                status: Some(run.status),
                duration_ms: run.duration_ms,
            });

            runs.push(run);
        }

        let stats = compute_test_stats(&runs);
        // A task passes only if every run passed.
        let status = if runs.iter().all(|r| r.status == Status::Passed) {
            Status::Passed
        } else {
            Status::Failed
        };

        TestOutcome {
            test_id: tc.test_id.clone(),
            display_name: tc.display_name.clone(),
            group: resolve_group(spec),
            status,
            runs,
            stats,
            skill_impact: None,
        }
    }

    /// Executes a single run: one stimulus, one grading sweep, one verdict.
    async fn execute_run(&self, spec: &BenchmarkSpec, tc: &TestCase, run_num: u32) -> RunResult {
        let start = Instant::now();
        let req = self.build_request(spec, tc);
        let timeout = req.timeout;

        let result = match tokio::time::timeout(timeout, self.engine.execute(req)).await {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::Timeout {
                seconds: timeout.as_secs(),
            }),
        };

        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                return RunResult {
                    run_number: run_num,
                    status: Status::Error,
                    duration_ms: start.elapsed().as_millis() as u64,
                    error_msg: Some(e.to_string()),
                    ..Default::default()
                };
            }
        };

        let ctx = build_grading_context(tc, &resp);
        let graders = match self.run_graders(spec, tc, &ctx).await {
            Ok(graders) => graders,
            Err(e) => {
                return RunResult {
                    run_number: run_num,
                    status: Status::Error,
                    duration_ms: start.elapsed().as_millis() as u64,
                    error_msg: Some(format!("running graders: {e}")),
                    ..Default::default()
                };
            }
        };

        // An execution error trumps grader verdicts; otherwise a single
        // failing grader fails the run.
        let status = if resp.error_msg.is_some() {
            Status::Error
        } else if graders.values().any(|g| !g.passed) {
            Status::Failed
        } else {
            Status::Passed
        };

        RunResult {
            run_number: run_num,
            attempts: 0,
            status,
            duration_ms: resp.duration_ms,
            graders,
            session_digest: build_session_digest(&resp),
            transcript: resp.events,
            final_output: resp.final_output,
            error_msg: resp.error_msg,
        }
    }

    fn build_request(&self, spec: &BenchmarkSpec, tc: &TestCase) -> ExecutionRequest {
        let resources = resources::load_resources(tc, self.config.fixture_dir());
        let timeout_seconds = tc.timeout_seconds.unwrap_or(spec.config.timeout_seconds);
        let skill_paths =
            template::resolve_paths(&spec.config.skill_paths, &self.config.spec_dir);

        ExecutionRequest {
            test_id: tc.test_id.clone(),
            message: tc.stimulus.message.clone(),
            context: tc.stimulus.metadata.clone(),
            resources,
            skill_name: spec.skill_name.clone(),
            skill_paths,
            timeout: Duration::from_secs(timeout_seconds),
        }
    }

    /// Runs the spec's global graders followed by the task's own graders.
    /// Returns an error if any grader cannot be constructed or fails to run.
    async fn run_graders(
        &self,
        spec: &BenchmarkSpec,
        tc: &TestCase,
        ctx: &GradingContext,
    ) -> Result<BTreeMap<String, GraderResult>, GraderError> {
        let mut results = BTreeMap::new();
        let judge_model = spec.config.judge_model.as_str();

        for cfg in &spec.graders {
            let params = if !judge_model.is_empty() && cfg.kind.as_str() == GraderKind::PROMPT {
                inject_judge_model(&cfg.parameters, judge_model)
            } else {
                cfg.parameters.clone()
            };
            let grader = self.registry.create(&cfg.kind, &cfg.identifier, &params)?;
            let mut result = grader.grade(ctx).await?;
            result.weight = cfg.effective_weight();
            results.insert(result.name.clone(), result);
        }

        for cfg in &tc.graders {
            let mut params = cfg.parameters.clone();
            if !cfg.checks.is_empty() {
                params.insert(
                    "assertions".to_string(),
                    serde_json::json!(cfg.checks.clone()),
                );
            }
            if !judge_model.is_empty() && cfg.kind.as_str() == GraderKind::PROMPT {
                params = inject_judge_model(&params, judge_model);
            }
            let grader = self.registry.create(&cfg.kind, &cfg.identifier, &params)?;
            let mut result = grader.grade(ctx).await?;
            result.weight = cfg.effective_weight();
            results.insert(result.name.clone(), result);
        }

        Ok(results)
    }

    fn build_outcome(
        &self,
        spec: &BenchmarkSpec,
        test_outcomes: Vec<TestOutcome>,
        start: Instant,
        started_at: chrono::DateTime<Utc>,
    ) -> EvaluationOutcome {
        let total_tests = test_outcomes.len();
        let succeeded = count_status(&test_outcomes, Status::Passed);
        let failed = count_status(&test_outcomes, Status::Failed);
        let errors = count_status(&test_outcomes, Status::Error);

        let success_rate = if total_tests > 0 {
            succeeded as f64 / total_tests as f64
        } else {
            0.0
        };

        // Digest scores are means over per-test averages; tests without
        // stats count as zero.
        let avg_scores: Vec<f64> = test_outcomes
            .iter()
            .map(|to| to.stats.as_ref().map(|s| s.avg_score).unwrap_or(0.0))
            .collect();
        let aggregate_score = mean_or_zero(&avg_scores);
        let weighted_scores: Vec<f64> = test_outcomes
            .iter()
            .map(|to| {
                to.stats
                    .as_ref()
                    .map(|s| s.avg_weighted_score)
                    .unwrap_or(0.0)
            })
            .collect();
        let weighted_score = mean_or_zero(&weighted_scores);

        let min_score = avg_scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max_score = avg_scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let (min_score, max_score) = if avg_scores.is_empty() {
            (0.0, 0.0)
        } else {
            (min_score, max_score)
        };

        let mut digest = OutcomeDigest {
            total_tests,
            succeeded,
            failed,
            errors,
            skipped: 0,
            success_rate,
            aggregate_score,
            weighted_score,
            min_score,
            max_score,
            std_dev: compute_std_dev(&avg_scores),
            duration_ms: start.elapsed().as_millis() as u64,
            groups: compute_group_stats(&test_outcomes),
            statistics: None,
        };

        if spec.config.trials_per_task > 1 {
            let per_test: Vec<f64> = test_outcomes
                .iter()
                .filter_map(|to| to.stats.as_ref().map(|s| s.avg_weighted_score))
                .collect();
            if per_test.len() >= 2 {
                let ci = bootstrap_ci(&per_test, 0.95);
                digest.statistics = Some(StatisticalSummary {
                    bootstrap_ci: ci,
                    is_significant: is_significant(&ci),
                    normalized_gain: None,
                });
            }
        }

        EvaluationOutcome {
            run_id: format!("run-{}", started_at.timestamp()),
            skill_tested: spec.skill_name.clone(),
            bench_name: spec.name.clone(),
            timestamp: started_at,
            setup: OutcomeSetup {
                trials_per_task: spec.config.trials_per_task,
                model_id: spec.config.model_id.clone(),
                engine_kind: spec.config.engine_kind.clone(),
                timeout_seconds: spec.config.timeout_seconds,
                judge_model: spec.config.judge_model.clone(),
            },
            digest,
            test_outcomes,
            is_baseline: false,
            baseline_outcome: None,
        }
    }

    /// Pairs the two passes task by task, attaches per-task impact metrics,
    /// and returns the skills-enabled pass as the primary outcome with the
    /// baseline embedded.
    fn merge_baseline_outcomes(
        &self,
        mut with_skills: EvaluationOutcome,
        without_skills: EvaluationOutcome,
    ) -> Result<EvaluationOutcome, OrchestrationError> {
        let baseline_by_id: BTreeMap<&str, &TestOutcome> = without_skills
            .test_outcomes
            .iter()
            .map(|to| (to.test_id.as_str(), to))
            .collect();
        let with_ids: BTreeMap<&str, ()> = with_skills
            .test_outcomes
            .iter()
            .map(|to| (to.test_id.as_str(), ()))
            .collect();

        let missing_in_baseline: Vec<String> = with_ids
            .keys()
            .filter(|id| !baseline_by_id.contains_key(*id))
            .map(|id| id.to_string())
            .collect();
        let extra_in_baseline: Vec<String> = baseline_by_id
            .keys()
            .filter(|id| !with_ids.contains_key(*id))
            .map(|id| id.to_string())
            .collect();
        if !missing_in_baseline.is_empty() || !extra_in_baseline.is_empty() {
            return Err(OrchestrationError::BaselineMismatch {
                missing_in_baseline,
                extra_in_baseline,
            });
        }

        for to in &mut with_skills.test_outcomes {
            // Every id is present in both maps at this point.
            if let Some(baseline) = baseline_by_id.get(to.test_id.as_str()) {
                to.skill_impact = Some(compute_skill_impact(to, baseline));
            }
        }

        let delta = with_skills.digest.success_rate - without_skills.digest.success_rate;
        info!(
            with_skills = format!("{:.1}%", with_skills.digest.success_rate * 100.0),
            baseline = format!("{:.1}%", without_skills.digest.success_rate * 100.0),
            delta_pp = format!("{:+.1}", delta * 100.0),
            "skill impact analysis"
        );
        for to in &with_skills.test_outcomes {
            if let Some(impact) = &to.skill_impact {
                info!(
                    task = %to.display_name,
                    baseline = format!("{:.0}%", impact.pass_rate_baseline * 100.0),
                    with_skills = format!("{:.0}%", impact.pass_rate_with_skills * 100.0),
                    delta_pp = format!("{:+.0}", impact.delta * 100.0),
                    "per-task skill impact"
                );
            }
        }

        if let Some(stats) = &mut with_skills.digest.statistics {
            stats.normalized_gain = Some(normalized_gain(
                without_skills.digest.success_rate,
                with_skills.digest.success_rate,
            ));
        }

        with_skills.is_baseline = true;
        with_skills.baseline_outcome = Some(Box::new(without_skills));
        Ok(with_skills)
    }
}

/// Mean of per-run scores, pass rates, and durations for one task.
/// Returns `None` when there are no runs.
fn compute_test_stats(runs: &[RunResult]) -> Option<TestStats> {
    if runs.is_empty() {
        return None;
    }

    let scores: Vec<f64> = runs.iter().map(|r| r.run_score()).collect();
    let weighted: Vec<f64> = runs.iter().map(|r| r.weighted_run_score()).collect();
    let passed = runs.iter().filter(|r| r.all_graders_passed()).count();
    let total_duration: u64 = runs.iter().map(|r| r.duration_ms).sum();

    let pass_rate = passed as f64 / runs.len() as f64;

    let mut stats = TestStats {
        pass_rate,
        avg_score: mean_or_zero(&scores),
        avg_weighted_score: mean_or_zero(&weighted),
        min_score: scores.iter().copied().fold(f64::INFINITY, f64::min),
        max_score: scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        std_dev_score: compute_std_dev(&scores),
        avg_duration_ms: total_duration / runs.len() as u64,
        flaky: pass_rate > 0.0 && pass_rate < 1.0,
        bootstrap_ci: None,
        is_significant: None,
    };

    if runs.len() >= 2 {
        let ci = bootstrap_ci(&weighted, 0.95);
        stats.is_significant = Some(is_significant(&ci));
        stats.bootstrap_ci = Some(ci);
    }

    Some(stats)
}

/// Per-task A/B impact: delta of pass rates, with a floor on the divisor so
/// a zero baseline still yields a finite percentage.
fn compute_skill_impact(with_skills: &TestOutcome, baseline: &TestOutcome) -> SkillImpactMetric {
    let pass_rate_with_skills = compute_pass_rate(with_skills);
    let pass_rate_baseline = compute_pass_rate(baseline);
    let delta = pass_rate_with_skills - pass_rate_baseline;
    let percent_change = delta / pass_rate_baseline.max(0.01) * 100.0;

    SkillImpactMetric {
        pass_rate_with_skills,
        pass_rate_baseline,
        delta,
        percent_change,
    }
}

fn compute_pass_rate(outcome: &TestOutcome) -> f64 {
    if let Some(stats) = &outcome.stats {
        return stats.pass_rate;
    }
    if outcome.runs.is_empty() {
        return 0.0;
    }
    let passed = outcome
        .runs
        .iter()
        .filter(|r| r.status == Status::Passed)
        .count();
    passed as f64 / outcome.runs.len() as f64
}

fn resolve_group(spec: &BenchmarkSpec) -> String {
    match spec.config.group_by.as_str() {
        "model" => spec.config.model_id.clone(),
        "" => String::new(),
        other => {
            warn!(group_by = other, "unknown group_by value, grouping disabled");
            String::new()
        }
    }
}

/// Aggregates pass counts and average scores per group, preserving first
/// appearance order.
fn compute_group_stats(outcomes: &[TestOutcome]) -> Vec<GroupStats> {
    let mut order: Vec<&str> = Vec::new();
    let mut acc: BTreeMap<&str, (usize, usize, f64, usize)> = BTreeMap::new();

    for to in outcomes {
        if to.group.is_empty() {
            continue;
        }
        let entry = acc.entry(to.group.as_str()).or_insert_with(|| {
            order.push(to.group.as_str());
            (0, 0, 0.0, 0)
        });
        entry.1 += 1;
        if to.status == Status::Passed {
            entry.0 += 1;
        }
        if let Some(stats) = &to.stats {
            entry.2 += stats.avg_score;
            entry.3 += 1;
        }
    }

    order
        .into_iter()
        .filter_map(|name| acc.get(name).map(|&(passed, total, sum, count)| GroupStats {
            name: name.to_string(),
            passed,
            total,
            avg_score: if count > 0 { sum / count as f64 } else { 0.0 },
        }))
        .collect()
}

fn build_grading_context(tc: &TestCase, resp: &ExecutionResponse) -> GradingContext {
    GradingContext {
        test_case: tc.clone(),
        transcript: resp.events.clone(),
        output: resp.final_output.clone(),
        duration_ms: resp.duration_ms,
        workspace_dir: resp.workspace_dir.clone(),
        skill_invocations: resp.skill_invocations.clone(),
        session: Some(build_session_digest(resp)),
        session_id: resp.session_id.clone(),
    }
}

fn build_session_digest(resp: &ExecutionResponse) -> SessionDigest {
    SessionDigest {
        total_turns: resp.events.len(),
        tool_call_count: resp.tool_calls.len(),
        tools_used: resp.tool_calls.iter().map(|c| c.name.clone()).collect(),
    }
}

/// Returns a copy of the parameters with the judge model injected under the
/// `model` key.
fn inject_judge_model(
    params: &BTreeMap<String, serde_json::Value>,
    judge_model: &str,
) -> BTreeMap<String, serde_json::Value> {
    let mut merged = params.clone();
    merged.insert(
        "model".to_string(),
        serde_json::Value::String(judge_model.to_string()),
    );
    merged
}

fn count_status(outcomes: &[TestOutcome], status: Status) -> usize {
    outcomes.iter().filter(|o| o.status == status).count()
}

fn mean_or_zero(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GraderResult;

    fn run(status: Status, graders: Vec<(&str, f64, f64, bool)>) -> RunResult {
        RunResult {
            run_number: 1,
            attempts: 1,
            status,
            duration_ms: 100,
            graders: graders
                .into_iter()
                .map(|(name, score, weight, passed)| {
                    (
                        name.to_string(),
                        GraderResult {
                            name: name.to_string(),
                            score,
                            weight,
                            passed,
                            ..Default::default()
                        },
                    )
                })
                .collect(),
            ..Default::default()
        }
    }

    fn outcome(id: &str, statuses: &[Status]) -> TestOutcome {
        let runs: Vec<RunResult> = statuses
            .iter()
            .map(|&s| {
                let passed = s == Status::Passed;
                run(s, vec![("g", if passed { 1.0 } else { 0.0 }, 1.0, passed)])
            })
            .collect();
        TestOutcome {
            test_id: id.to_string(),
            display_name: id.to_string(),
            group: String::new(),
            status: if statuses.iter().all(|&s| s == Status::Passed) {
                Status::Passed
            } else {
                Status::Failed
            },
            stats: compute_test_stats(&runs),
            runs,
            skill_impact: None,
        }
    }

    #[test]
    fn test_compute_test_stats_pass_rate() {
        let runs = vec![
            run(Status::Passed, vec![("g", 1.0, 1.0, true)]),
            run(Status::Passed, vec![("g", 1.0, 1.0, true)]),
            run(Status::Failed, vec![("g", 0.0, 1.0, false)]),
        ];
        let stats = compute_test_stats(&runs).unwrap();
        assert!((stats.pass_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!(stats.flaky);
        assert!(stats.bootstrap_ci.is_some());
    }

    #[test]
    fn test_compute_test_stats_empty() {
        assert!(compute_test_stats(&[]).is_none());
    }

    #[test]
    fn test_single_run_has_no_ci() {
        let runs = vec![run(Status::Passed, vec![("g", 1.0, 1.0, true)])];
        let stats = compute_test_stats(&runs).unwrap();
        assert!(stats.bootstrap_ci.is_none());
        assert!(!stats.flaky);
    }

    #[test]
    fn test_compute_skill_impact() {
        let with = outcome("t", &[Status::Passed, Status::Passed, Status::Failed]);
        let without = outcome("t", &[Status::Passed, Status::Failed, Status::Failed]);

        let impact = compute_skill_impact(&with, &without);
        assert!((impact.pass_rate_with_skills - 2.0 / 3.0).abs() < 1e-9);
        assert!((impact.pass_rate_baseline - 1.0 / 3.0).abs() < 1e-9);
        assert!((impact.delta - 1.0 / 3.0).abs() < 1e-9);
        assert!((impact.percent_change - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_skill_impact_zero_baseline_divisor_floor() {
        let with = outcome("t", &[Status::Passed]);
        let without = outcome("t", &[Status::Failed]);

        let impact = compute_skill_impact(&with, &without);
        assert_eq!(impact.delta, 1.0);
        assert!((impact.percent_change - 10_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_group_stats_preserve_order() {
        let mut a = outcome("a", &[Status::Passed]);
        a.group = "model-b".to_string();
        let mut b = outcome("b", &[Status::Failed]);
        b.group = "model-a".to_string();
        let mut c = outcome("c", &[Status::Passed]);
        c.group = "model-b".to_string();

        let groups = compute_group_stats(&[a, b, c]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "model-b");
        assert_eq!(groups[0].passed, 2);
        assert_eq!(groups[0].total, 2);
        assert_eq!(groups[1].name, "model-a");
        assert_eq!(groups[1].total, 1);
    }

    fn test_spec() -> BenchmarkSpec {
        BenchmarkSpec {
            name: "bench".to_string(),
            description: String::new(),
            skill_name: "skill".to_string(),
            version: String::new(),
            config: Default::default(),
            hooks: Default::default(),
            graders: vec![],
            tasks: vec![],
            tasks_from: None,
            row_range: None,
            inputs: Default::default(),
        }
    }

    fn eval_outcome(test_outcomes: Vec<TestOutcome>) -> EvaluationOutcome {
        EvaluationOutcome {
            run_id: "run-0".to_string(),
            skill_tested: "skill".to_string(),
            bench_name: "bench".to_string(),
            timestamp: Utc::now(),
            setup: Default::default(),
            digest: OutcomeDigest {
                total_tests: test_outcomes.len(),
                ..Default::default()
            },
            test_outcomes,
            is_baseline: false,
            baseline_outcome: None,
        }
    }

    fn test_runner() -> TestRunner {
        TestRunner::new(
            RunnerConfig::new(test_spec(), "."),
            Arc::new(crate::execution::MockEngine::new("m")),
        )
    }

    #[test]
    fn test_merge_baseline_attaches_impact() {
        let with = eval_outcome(vec![outcome("a", &[Status::Passed, Status::Passed])]);
        let without = eval_outcome(vec![outcome("a", &[Status::Passed, Status::Failed])]);

        let merged = test_runner().merge_baseline_outcomes(with, without).unwrap();
        assert!(merged.is_baseline);
        assert!(merged.baseline_outcome.is_some());
        let impact = merged.test_outcomes[0].skill_impact.as_ref().unwrap();
        assert!((impact.delta - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_merge_baseline_mismatch_is_itemized() {
        let with = eval_outcome(vec![
            outcome("a", &[Status::Passed]),
            outcome("b", &[Status::Passed]),
        ]);
        let without = eval_outcome(vec![
            outcome("a", &[Status::Passed]),
            outcome("c", &[Status::Passed]),
        ]);

        let err = test_runner()
            .merge_baseline_outcomes(with, without)
            .unwrap_err();
        match err {
            OrchestrationError::BaselineMismatch {
                missing_in_baseline,
                extra_in_baseline,
            } => {
                assert_eq!(missing_in_baseline, vec!["b".to_string()]);
                assert_eq!(extra_in_baseline, vec!["c".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_pass_spec_strips_skills_without_mutating_shared_spec() {
        let mut spec = test_spec();
        spec.config.baseline = true;
        spec.config.skill_paths = vec!["skills/a".to_string()];
        spec.config.required_skills = vec!["a".to_string()];
        let runner = TestRunner::new(
            RunnerConfig::new(spec, "."),
            Arc::new(crate::execution::MockEngine::new("m")),
        );

        let baseline = runner.pass_spec(true);
        assert!(baseline.config.skill_paths.is_empty());
        assert!(baseline.config.required_skills.is_empty());
        assert!(!baseline.config.baseline);

        let with_skills = runner.pass_spec(false);
        assert_eq!(with_skills.config.skill_paths, vec!["skills/a".to_string()]);
        assert_eq!(runner.config.spec.config.skill_paths, vec!["skills/a".to_string()]);
        assert!(runner.config.spec.config.baseline);
    }

    #[test]
    fn test_inject_judge_model_does_not_mutate_input() {
        let params: BTreeMap<String, serde_json::Value> =
            [("threshold".to_string(), serde_json::json!(0.8))]
                .into_iter()
                .collect();
        let merged = inject_judge_model(&params, "judge-1");

        assert_eq!(merged["model"], serde_json::json!("judge-1"));
        assert_eq!(merged["threshold"], serde_json::json!(0.8));
        assert!(!params.contains_key("model"));
    }
}
