//! Build orchestration.
//!
//! One run: reset the workspace, build the scene container, discover assets, check the
//! toolchain runtime, then assemble, align, sign and stage every planned task in order, and
//! finally write the archive. Any error aborts the run; the workspace is reset on every exit
//! path.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::archive::ArchiveAssembler;
use crate::assembler::PackageAssembler;
use crate::config::BuildConfig;
use crate::discovery::{discover_assets, DiscoveredAssets};
use crate::error::{BuildError, BuildResult};
use crate::matrix::{self, BuildTask, PlannedTask, TaskState};
use crate::scene::{build_scene_container, ModelAsset, SceneContainer};
use crate::toolchain::Toolchain;
use crate::workspace::Workspace;

/// Immutable facts about a run, established before the first task.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub model: ModelAsset,
    pub scene_container: SceneContainer,
    /// User audio in the working directory, if any.
    pub audio: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
}

/// Shared flag to stop a run at the next tool invocation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> BuildResult<()> {
        if self.is_cancelled() {
            Err(BuildError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// What happened to one planned task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub environment: String,
    pub with_audio: bool,
    pub state: TaskState,
    /// Package file name inside the archive.
    pub artifact: Option<String>,
    /// `sha256:<hex>` of the signed package.
    pub sha256: Option<String>,
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub model: String,
    pub archive: PathBuf,
    pub tasks: Vec<TaskOutcome>,
}

impl BuildReport {
    pub fn built(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.tasks.iter().filter(|t| t.state == TaskState::Archived)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.tasks.iter().filter(|t| t.state == TaskState::Skipped)
    }
}

/// Runs builds for one working directory with a given toolchain.
pub struct Pipeline<T> {
    config: BuildConfig,
    toolchain: T,
    cancel: CancelToken,
}

impl<T: Toolchain> Pipeline<T> {
    pub fn new(config: BuildConfig, toolchain: T) -> Self {
        Self {
            config,
            toolchain,
            cancel: CancelToken::new(),
        }
    }

    /// Use an externally controlled cancellation token.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn toolchain(&self) -> &T {
        &self.toolchain
    }

    /// Execute a full run. The workspace is clean again when this returns, whatever the result.
    pub fn run(&self) -> BuildResult<BuildReport> {
        let workspace = Workspace::new(&self.config);
        let _guard = workspace.acquire()?;

        let ctx = self.prepare_context(&workspace)?;
        let plan = matrix::plan_for(&self.config, ctx.audio.clone());

        let mut outcomes = Vec::with_capacity(plan.len());
        for planned in &plan {
            let outcome = match planned {
                PlannedTask::Skip { environment } => TaskOutcome {
                    environment: environment.clone(),
                    with_audio: true,
                    state: TaskState::Skipped,
                    artifact: None,
                    sha256: None,
                },
                PlannedTask::Build(task) => self.build_task(&ctx, task).map_err(|e| {
                    tracing::error!(task = %task, state = %TaskState::Failed, error = %e, "task failed");
                    e
                })?,
            };
            outcomes.push(outcome);
        }

        let archive = ArchiveAssembler::new(&self.config).finalize(
            &ctx.model.base_name,
            &ctx.scene_container.path,
            ctx.audio.as_deref(),
            ctx.started_at,
        )?;

        Ok(BuildReport {
            model: ctx.model.base_name,
            archive,
            tasks: outcomes,
        })
    }

    fn prepare_context(&self, workspace: &Workspace) -> BuildResult<RunContext> {
        let (model, scene_container) = build_scene_container(&self.config)?;
        let DiscoveredAssets {
            scene_container: found,
            audio,
        } = discover_assets(&self.config)?;
        if found != scene_container.file_name {
            return Err(BuildError::AmbiguousSceneContainer {
                dir: self.config.root.clone(),
                extension: self.config.scene_container_extension.clone(),
                candidates: vec![found, scene_container.file_name],
            });
        }
        let audio = audio.map(|a| self.config.root.join(a));

        self.cancel.check()?;
        self.toolchain.check_runtime()?;

        let scratch_copy = workspace.scratch_dir().join(&scene_container.file_name);
        fs::copy(&scene_container.path, &scratch_copy).map_err(|e| {
            BuildError::io(
                format!(
                    "failed to stage {} into {}",
                    scene_container.file_name,
                    workspace.scratch_dir().display()
                ),
                e,
            )
        })?;

        Ok(RunContext {
            model,
            scene_container,
            audio,
            started_at: Utc::now(),
        })
    }

    fn build_task(&self, ctx: &RunContext, task: &BuildTask) -> BuildResult<TaskOutcome> {
        let mut state = TaskState::Pending;
        let mut advance = |next: TaskState| {
            tracing::debug!(task = %task, from = %state, to = %next, "task state");
            state = next;
        };

        let artifact = PackageAssembler::new(&self.config).assemble(&ctx.model.base_name, task)?;
        let artifact_name = file_name(&artifact);
        tracing::info!(artifact = %artifact_name, "building");
        advance(TaskState::Staged);

        self.cancel.check()?;
        self.toolchain.align(&artifact)?;
        advance(TaskState::Aligned);

        self.cancel.check()?;
        self.toolchain.sign(&artifact)?;
        advance(TaskState::Signed);

        let sha256 = digest_file(&artifact)?;
        ArchiveAssembler::new(&self.config).stage_artifact(&artifact)?;
        advance(TaskState::Archived);

        Ok(TaskOutcome {
            environment: task.environment.clone(),
            with_audio: !task.audio.is_silent(),
            state,
            artifact: Some(artifact_name),
            sha256: Some(sha256),
        })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn digest_file(path: &Path) -> BuildResult<String> {
    let read_err = |e| BuildError::io(format!("failed to read {}", path.display()), e);
    let mut file = fs::File::open(path).map_err(read_err)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(read_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
}
