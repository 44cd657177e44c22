//! Build matrix: environment templates x audio variants.

use std::fmt;
use std::path::PathBuf;

use crate::config::BuildConfig;

/// Audio shipped in a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioVariant {
    /// The silent fallback bundled with the originals.
    Silent,
    /// The user supplied audio file.
    Custom(PathBuf),
}

impl AudioVariant {
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Silent)
    }
}

/// One (environment, audio) unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTask {
    pub environment: String,
    pub audio: AudioVariant,
}

impl BuildTask {
    /// Identity of the task: environment name and whether real audio is used.
    pub fn id(&self) -> (&str, bool) {
        (&self.environment, !self.audio.is_silent())
    }
}

impl fmt::Display for BuildTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.audio {
            AudioVariant::Silent => write!(f, "{} (silent)", self.environment),
            AudioVariant::Custom(_) => write!(f, "{} (audio)", self.environment),
        }
    }
}

/// Lifecycle of a task through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Staged,
    Aligned,
    Signed,
    Archived,
    /// Custom audio requested but none was found.
    Skipped,
    Failed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Staged => "staged",
            Self::Aligned => "aligned",
            Self::Signed => "signed",
            Self::Archived => "archived",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A task as planned: either to be built, or skipped up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedTask {
    Build(BuildTask),
    /// The custom audio variant of an environment when no audio file exists.
    Skip { environment: String },
}

impl PlannedTask {
    pub fn environment(&self) -> &str {
        match self {
            Self::Build(task) => &task.environment,
            Self::Skip { environment } => environment,
        }
    }

    pub fn initial_state(&self) -> TaskState {
        match self {
            Self::Build(_) => TaskState::Pending,
            Self::Skip { .. } => TaskState::Skipped,
        }
    }
}

/// Plan every task of a run, in build order: environments in configured order, the
/// silent variant before the custom one.
pub fn plan(environments: &[String], audio: Option<PathBuf>) -> Vec<PlannedTask> {
    let mut tasks = Vec::with_capacity(environments.len() * 2);
    for environment in environments {
        tasks.push(PlannedTask::Build(BuildTask {
            environment: environment.clone(),
            audio: AudioVariant::Silent,
        }));
        match &audio {
            Some(path) => tasks.push(PlannedTask::Build(BuildTask {
                environment: environment.clone(),
                audio: AudioVariant::Custom(path.clone()),
            })),
            None => {
                tracing::warn!(%environment, "no custom audio file found, skipping audio variant");
                tasks.push(PlannedTask::Skip {
                    environment: environment.clone(),
                });
            }
        }
    }
    tasks
}

/// [`plan`] for the environments of `config`.
pub fn plan_for(config: &BuildConfig, audio: Option<PathBuf>) -> Vec<PlannedTask> {
    plan(&config.environments, audio)
}
