//! The build state machine.
//!
//! ```text
//! Init → Deciding → Running(0..n) → PostProcessing → Done
//!   └──────┴────────────┴─────────────────┴──→ Failed
//! ```
//!
//! Steps run one at a time in plan order. A checkpoint is written only after
//! a dump-flagged step has fully integrated, so a build killed at any point
//! can be resumed from the last checkpoint on disk.

use super::{Mine, Resumption, ResumptionDecision, plan_resumption};
use crate::checkpoint::{CheckpointRecord, CheckpointStore};
use crate::models::{BuildPlan, MineBuildError, Result};
use crate::process::CommandRunner;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::time::Instant;
use tracing::{error, info, warn};

/// Where a build is.
#[derive(Debug)]
pub enum BuildState {
    Init,
    Deciding,
    /// About to integrate the remaining step at `index`
    Running { index: usize },
    PostProcessing,
    Done,
    Failed(BuildFailure),
}

impl BuildState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }
}

/// Why a build ended in [`BuildState::Failed`].
#[derive(Debug)]
pub struct BuildFailure {
    /// Source being integrated or checkpointed, when the failure belongs to one
    pub step: Option<String>,
    pub error: MineBuildError,
}

impl From<MineBuildError> for BuildFailure {
    fn from(error: MineBuildError) -> Self {
        Self {
            step: error.step().map(str::to_string),
            error,
        }
    }
}

impl fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.step {
            Some(step) => write!(f, "build failed at source '{step}': {}", self.error),
            None => write!(f, "build failed: {}", self.error),
        }
    }
}

/// Outcome of one engine run.
#[derive(Debug)]
pub struct BuildReport {
    /// `None` when the build failed before deciding
    pub decision: Option<ResumptionDecision>,
    /// Sources integrated by this run, in order
    pub integrated: Vec<String>,
    /// Checkpoints taken by this run
    pub checkpoints: Vec<CheckpointRecord>,
    /// Always `Done` or `Failed`
    pub state: BuildState,
    pub runtime_secs: f64,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        matches!(self.state, BuildState::Done)
    }

    pub fn failure(&self) -> Option<&BuildFailure> {
        match &self.state {
            BuildState::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Mutable bookkeeping of a single run.
struct RunContext {
    resumption: Option<Resumption>,
    integrated: Vec<String>,
    checkpoints: Vec<CheckpointRecord>,
    progress: ProgressBar,
}

/// Drives a build from the checkpoint directory's state to `Done` or `Failed`.
///
/// Concurrent engines against the same checkpoint directory or database are
/// unsupported; neither is locked.
pub struct ResumptionEngine<R> {
    plan: BuildPlan,
    store: CheckpointStore,
    mine: Mine<R>,
    show_progress: bool,
}

impl<R: CommandRunner> ResumptionEngine<R> {
    pub fn new(plan: BuildPlan, store: CheckpointStore, mine: Mine<R>) -> Self {
        Self {
            plan,
            store,
            mine,
            show_progress: false,
        }
    }

    /// Draw a progress bar over the remaining steps.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Run the build to a terminal state.
    pub fn run(&self) -> BuildReport {
        let start = Instant::now();
        let mut ctx = RunContext {
            resumption: None,
            integrated: Vec::new(),
            checkpoints: Vec::new(),
            progress: ProgressBar::hidden(),
        };

        let mut state = BuildState::Init;
        while !state.is_terminal() {
            state = match self.advance(state, &mut ctx) {
                Ok(next) => next,
                Err(e) => BuildState::Failed(BuildFailure::from(e)),
            };
        }

        match &state {
            BuildState::Failed(failure) => {
                ctx.progress.abandon();
                error!(
                    step = failure.step.as_deref().unwrap_or("-"),
                    error = %failure.error,
                    "Build failed"
                );
                if let MineBuildError::CheckpointWrite { step, .. } = &failure.error {
                    warn!(
                        step = %step,
                        "Source is integrated in the live database but has no checkpoint; \
                         resuming will restore the previous checkpoint and integrate it again"
                    );
                }
            }
            _ => {
                ctx.progress.finish_and_clear();
                info!(integrated = ctx.integrated.len(), "Build finished");
            }
        }

        BuildReport {
            decision: ctx.resumption.map(|r| r.decision),
            integrated: ctx.integrated,
            checkpoints: ctx.checkpoints,
            state,
            runtime_secs: start.elapsed().as_secs_f64(),
        }
    }

    fn advance(&self, state: BuildState, ctx: &mut RunContext) -> Result<BuildState> {
        match state {
            BuildState::Init => Ok(BuildState::Deciding),

            BuildState::Deciding => {
                let resumption = plan_resumption(&self.store, &self.plan)?;
                info!(
                    decision = %resumption.decision,
                    remaining = resumption.remaining.len(),
                    dry_run = self.mine.runner().is_dry_run(),
                    "Resumption decided"
                );

                ctx.progress = self.progress_bar(resumption.remaining.len());
                let decision = ctx.resumption.insert(resumption).decision.clone();

                match &decision {
                    ResumptionDecision::Fresh => {
                        info!("No previous checkpoint found, starting build from the beginning");
                        self.mine.prepare_fresh()?;
                    }
                    ResumptionDecision::ResumeAfter { step, checkpoint } => {
                        self.mine.restore(checkpoint)?;
                        info!(step = %step, "Resuming after source");
                    }
                }
                Ok(BuildState::Running { index: 0 })
            }

            BuildState::Running { index } => {
                let resumption = ctx.resumption.as_mut().ok_or_else(|| {
                    MineBuildError::Internal("running without a resumption decision".to_string())
                })?;
                let Some(step) = resumption.remaining.get(index) else {
                    return Ok(BuildState::PostProcessing);
                };

                info!(
                    step = %step.name,
                    source_type = %step.source_type,
                    position = step.position,
                    "Integrating source"
                );
                ctx.progress.set_message(step.name.clone());
                self.mine.integrate(step)?;
                ctx.integrated.push(step.name.clone());

                if step.dump {
                    let record = self.store.create(
                        self.mine.runner(),
                        self.mine.db(),
                        resumption.next_ordinal,
                        &step.name,
                    )?;
                    resumption.next_ordinal = CheckpointStore::next_ordinal(Some(&record))?;
                    ctx.checkpoints.push(record);
                }

                ctx.progress.inc(1);
                info!(step = %step.name, "Source integrated");
                Ok(BuildState::Running { index: index + 1 })
            }

            BuildState::PostProcessing => {
                info!("Running post-processing");
                self.mine.postprocess()?;
                Ok(BuildState::Done)
            }

            terminal @ (BuildState::Done | BuildState::Failed(_)) => Ok(terminal),
        }
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("##-"));
        }
        pb
    }

    pub fn plan(&self) -> &BuildPlan {
        &self.plan
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn mine(&self) -> &Mine<R> {
        &self.mine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DatabaseProfile, MineSettings, SourceConfig};
    use crate::process::{ProcessRunner, RecordingRunner};
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn plan(steps: &[(&str, bool)]) -> BuildPlan {
        let sources: Vec<_> = steps
            .iter()
            .map(|(name, dump)| SourceConfig {
                name: name.to_string(),
                source_type: name.to_string(),
                dump: *dump,
                params: BTreeMap::new(),
            })
            .collect();
        BuildPlan::new(&sources).unwrap()
    }

    fn engine<R: CommandRunner>(
        dir: &Path,
        steps: &[(&str, bool)],
        runner: R,
    ) -> ResumptionEngine<R> {
        let settings = MineSettings {
            name: "biotestmine".to_string(),
            gradle: PathBuf::from("./gradlew"),
            db_alias: "production".to_string(),
            post_build_hint: String::new(),
        };
        let db = DatabaseProfile {
            host: "localhost".to_string(),
            port: 5432,
            name: "biotestmine".to_string(),
            user: "mine".to_string(),
            password: None,
        };
        ResumptionEngine::new(
            plan(steps),
            CheckpointStore::open(dir).unwrap(),
            Mine::new(runner, db, &settings),
        )
    }

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"PGDMP").unwrap();
    }

    fn files(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    const ABCD: [(&str, bool); 4] = [("A", true), ("B", true), ("C", true), ("D", true)];

    #[test]
    fn test_fresh_build_prepares_once() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(
            temp_dir.path(),
            &[("A", true), ("B", false), ("C", true)],
            RecordingRunner::new(),
        );

        let report = engine.run();
        assert!(report.is_success(), "{:?}", report.state);
        assert_eq!(report.decision, Some(ResumptionDecision::Fresh));
        assert_eq!(report.integrated, ["A", "B", "C"]);

        let runner = engine.mine().runner();
        assert_eq!(runner.count_containing("gradlew buildDB"), 1);
        assert_eq!(runner.count_containing("createdb"), 1);
        assert_eq!(runner.count_containing("pg_restore"), 0);
        assert_eq!(runner.count_containing("postprocess"), 1);

        let ordinals: Vec<_> = report.checkpoints.iter().map(|c| c.ordinal).collect();
        let steps: Vec<_> = report.checkpoints.iter().map(|c| c.step.as_str()).collect();
        assert_eq!(ordinals, [0, 1]);
        assert_eq!(steps, ["A", "C"]);
        assert_eq!(files(temp_dir.path()).len(), 2);
    }

    #[test]
    fn test_resume_skips_completed_steps() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "0000-20240101000000-A.dump");
        touch(temp_dir.path(), "0001-20240101010000-B.dump");
        let engine = engine(temp_dir.path(), &ABCD, RecordingRunner::new());

        let report = engine.run();
        assert!(report.is_success());
        assert_eq!(report.integrated, ["C", "D"]);

        let runner = engine.mine().runner();
        assert_eq!(runner.integrated(), ["C", "D"]);
        assert_eq!(runner.count_containing("buildDB"), 0);
        assert_eq!(runner.count_containing("loadDefaultTemplates"), 0);
        assert_eq!(runner.count_containing("pg_restore -1 -d biotestmine"), 1);
        assert_eq!(runner.count_containing("postprocess"), 1);

        let ordinals: Vec<_> = report.checkpoints.iter().map(|c| c.ordinal).collect();
        assert_eq!(ordinals, [2, 3]);
    }

    #[test]
    fn test_resume_after_last_step_goes_to_postprocess() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "0002-20240101000000-C.dump");
        let engine = engine(
            temp_dir.path(),
            &[("A", true), ("B", true), ("C", true)],
            RecordingRunner::new(),
        );

        let report = engine.run();
        assert!(report.is_success());
        assert!(report.integrated.is_empty());
        assert!(report.checkpoints.is_empty());

        let calls = engine.mine().runner().calls();
        assert!(calls.last().unwrap().contains("postprocess"));
        assert_eq!(engine.mine().runner().integrated(), Vec::<String>::new());
    }

    #[test]
    fn test_unknown_step_fails_without_touching_database() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "0000-20240101000000-Z.dump");
        let engine = engine(temp_dir.path(), &ABCD, RecordingRunner::new());

        let report = engine.run();
        let failure = report.failure().unwrap();
        assert!(matches!(failure.error, MineBuildError::UnknownStep(_)));
        assert!(report.decision.is_none());
        assert!(engine.mine().runner().calls().is_empty());
    }

    #[test]
    fn test_reordered_history_fails_without_touching_database() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "0000-20240101000000-C.dump");
        touch(temp_dir.path(), "0001-20240101010000-A.dump");
        let engine = engine(temp_dir.path(), &ABCD, RecordingRunner::new());

        let report = engine.run();
        let failure = report.failure().unwrap();
        assert!(failure.step.is_none());
        assert!(matches!(failure.error, MineBuildError::InconsistentHistory { .. }));
        assert!(report.decision.is_none());
        assert!(engine.mine().runner().calls().is_empty());
    }

    #[test]
    fn test_malformed_checkpoint_fails_before_any_command() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "latest.dump");
        let engine = engine(temp_dir.path(), &ABCD, RecordingRunner::new());

        let report = engine.run();
        assert!(matches!(
            report.failure().unwrap().error,
            MineBuildError::MalformedCheckpoint { .. }
        ));
        assert!(engine.mine().runner().calls().is_empty());
    }

    #[test]
    fn test_integration_failure_then_identical_resume() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "0000-20240101000000-A.dump");
        touch(temp_dir.path(), "0001-20240101010000-B.dump");
        let before = files(temp_dir.path());

        let failing = engine(
            temp_dir.path(),
            &ABCD,
            RecordingRunner::new().failing_on("-Psource=C"),
        );
        let report = failing.run();
        let failure = report.failure().unwrap();
        assert_eq!(failure.step.as_deref(), Some("C"));
        assert!(matches!(failure.error, MineBuildError::IntegrationFailure { .. }));
        assert!(report.integrated.is_empty());
        assert_eq!(failing.mine().runner().count_containing("-Psource=D"), 0);
        assert_eq!(failing.mine().runner().count_containing("postprocess"), 0);
        assert_eq!(files(temp_dir.path()), before);

        let first = plan_resumption(failing.store(), failing.plan()).unwrap();
        let retry = engine(temp_dir.path(), &ABCD, RecordingRunner::new());
        let second = plan_resumption(retry.store(), retry.plan()).unwrap();
        assert_eq!(first, second);
        assert_eq!(second.decision.to_string(), "resume after B");

        let report = retry.run();
        assert!(report.is_success());
        assert_eq!(report.integrated, ["C", "D"]);
    }

    #[test]
    fn test_checkpoint_write_failure_keeps_integrated_step() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(
            temp_dir.path(),
            &[("A", true), ("B", true)],
            RecordingRunner::new().failing_on("pg_dump"),
        );

        let report = engine.run();
        let failure = report.failure().unwrap();
        assert_eq!(failure.step.as_deref(), Some("A"));
        assert!(matches!(failure.error, MineBuildError::CheckpointWrite { .. }));
        assert_eq!(report.integrated, ["A"]);
        assert_eq!(engine.mine().runner().integrated(), ["A"]);
        assert!(files(temp_dir.path()).is_empty());
    }

    #[test]
    fn test_restore_failure_runs_no_steps() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "0000-20240101000000-A.dump");
        let engine = engine(
            temp_dir.path(),
            &ABCD,
            RecordingRunner::new().failing_on("pg_restore"),
        );

        let report = engine.run();
        assert!(matches!(
            report.failure().unwrap().error,
            MineBuildError::RestoreFailure { .. }
        ));
        assert!(engine.mine().runner().integrated().is_empty());
    }

    #[test]
    fn test_postprocess_failure_is_terminal() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(
            temp_dir.path(),
            &[("A", false)],
            RecordingRunner::new().failing_on("postprocess"),
        );

        let report = engine.run();
        let failure = report.failure().unwrap();
        assert!(failure.step.is_none());
        assert!(matches!(failure.error, MineBuildError::PostProcessFailure(_)));
        assert_eq!(report.integrated, ["A"]);
    }

    #[test]
    fn test_dry_run_matches_real_run() {
        let real_dir = TempDir::new().unwrap();
        let dry_dir = TempDir::new().unwrap();
        for dir in [real_dir.path(), dry_dir.path()] {
            touch(dir, "0000-20240101000000-A.dump");
        }
        let before = files(dry_dir.path());

        let real = engine(real_dir.path(), &ABCD, RecordingRunner::new()).run();
        let dry = engine(dry_dir.path(), &ABCD, ProcessRunner::new(true)).run();

        assert!(dry.is_success());
        let describe = |r: &BuildReport| r.decision.as_ref().map(ToString::to_string);
        assert_eq!(describe(&dry), describe(&real));
        assert_eq!(describe(&dry).as_deref(), Some("resume after A"));
        assert_eq!(dry.integrated, real.integrated);
        let steps = |r: &BuildReport| -> Vec<(u32, String)> {
            r.checkpoints.iter().map(|c| (c.ordinal, c.step.clone())).collect()
        };
        assert_eq!(steps(&dry), steps(&real));
        assert_eq!(files(dry_dir.path()), before);
    }
}
