//! Error types for the build pipeline.

use std::fmt;
use std::path::{Path, PathBuf};

/// Result type for build operations.
pub type BuildResult<T> = Result<T, BuildError>;

/// Why the model folder could not yield exactly one model file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelFolderProblem {
    /// The folder does not exist.
    Missing,
    /// The folder holds no file with the model extension.
    Empty,
    /// The folder holds more than one file with the model extension.
    Multiple(usize),
}

impl fmt::Display for ModelFolderProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "folder does not exist"),
            Self::Empty => write!(f, "no model file found"),
            Self::Multiple(n) => write!(f, "{} model files found", n),
        }
    }
}

/// How an external tool invocation went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolFailure {
    /// The process could not be started.
    Spawn(String),
    /// The process ran and exited unsuccessfully (`None` when killed by a signal).
    ExitStatus(Option<i32>),
    /// The process exceeded the configured timeout and was killed.
    TimedOut,
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(e) => write!(f, "failed to start: {}", e),
            Self::ExitStatus(Some(code)) => write!(f, "exited with status {}", code),
            Self::ExitStatus(None) => write!(f, "terminated by signal"),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Build pipeline errors. Any of these aborts the whole run.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The model folder must contain exactly one model file.
    #[error("model folder '{folder}' must contain exactly one '.{extension}' file ({problem})")]
    InvalidModelFolder {
        folder: PathBuf,
        extension: String,
        problem: ModelFolderProblem,
    },

    /// The runtime needed to run the signer is not available.
    #[error("{runtime} must be installed and accessible from the console ({detail})")]
    MissingToolchainRuntime { runtime: String, detail: String },

    /// No scene container was found after the container build step.
    #[error("couldn't find a valid '{extension}' file in {}", dir.display())]
    MissingSceneContainer { dir: PathBuf, extension: String },

    /// More than one scene container is present; the one to inject is ambiguous.
    #[error("expected exactly one '{extension}' file in {}, found: {}", dir.display(), candidates.join(", "))]
    AmbiguousSceneContainer {
        dir: PathBuf,
        extension: String,
        candidates: Vec<String>,
    },

    /// The template package has no embedded scene entry to replace.
    #[error("package {} has no '{entry}' entry", package.display())]
    SceneEntryNotFound { package: PathBuf, entry: String },

    /// Reading or writing a zip container failed.
    #[error("zip update failed for {}: {message}", path.display())]
    ZipWrite { path: PathBuf, message: String },

    /// An external tool failed to start or reported failure.
    #[error("{tool} {reason}{}", format_stderr(stderr))]
    ToolInvocation {
        tool: String,
        reason: ToolFailure,
        stderr: String,
    },

    /// Filesystem error with the operation that caused it.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid or unreadable configuration.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// The run was cancelled before the next tool invocation.
    #[error("build cancelled")]
    Cancelled,
}

fn format_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {}", trimmed)
    }
}

impl BuildError {
    /// Wrap an IO error with a description of the failed operation.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Build a [`BuildError::ZipWrite`] from any displayable zip failure.
    pub fn zip(path: &Path, err: impl fmt::Display) -> Self {
        Self::ZipWrite {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    /// Suggested exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Operator input problems
            Self::InvalidModelFolder { .. } => 2,
            Self::MissingSceneContainer { .. } => 2,
            Self::AmbiguousSceneContainer { .. } => 2,
            Self::Config { .. } => 2,

            // Toolchain
            Self::MissingToolchainRuntime { .. } => 3,
            Self::ToolInvocation { .. } => 3,

            // Templates and archives
            Self::SceneEntryNotFound { .. } => 4,
            Self::ZipWrite { .. } => 4,

            Self::Cancelled => 130,
            Self::Io { .. } => 1,
        }
    }
}

/// `map_err` adapter: zip error on `path` to [`BuildError::ZipWrite`].
pub(crate) fn zip_err(path: &Path) -> impl FnOnce(zip::result::ZipError) -> BuildError + '_ {
    move |e| BuildError::zip(path, e)
}
