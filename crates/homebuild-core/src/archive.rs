//! Final archive: finished packages plus the scene and audio sources, in one timestamped zip.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::BuildConfig;
use crate::error::{BuildError, BuildResult};
use crate::zipdir::{self, Level};

/// Timestamp layout of archive names (`yyyy-MM-dd_HH-mm`, UTC).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M";

/// `{model}_{timestamp}.zip`
pub fn archive_file_name(model: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}.zip", model, at.format(TIMESTAMP_FORMAT))
}

/// Collects finished packages in the staging directory and produces the final archive.
pub struct ArchiveAssembler<'a> {
    config: &'a BuildConfig,
}

impl<'a> ArchiveAssembler<'a> {
    pub fn new(config: &'a BuildConfig) -> Self {
        Self { config }
    }

    /// Move a finished package into the staging directory, replacing any previous copy.
    pub fn stage_artifact(&self, artifact: &Path) -> BuildResult<PathBuf> {
        let staging = self.config.staging_path();
        fs::create_dir_all(&staging)
            .map_err(|e| BuildError::io(format!("failed to create {}", staging.display()), e))?;

        let name = artifact.file_name().ok_or_else(|| {
            BuildError::io(
                format!("{} has no file name", artifact.display()),
                io::Error::from(io::ErrorKind::InvalidInput),
            )
        })?;
        let dest = staging.join(name);
        move_file(artifact, &dest)?;
        Ok(dest)
    }

    /// Add the scene container and audio to staging, compress it and move the result into
    /// the archive directory as `{model}_{timestamp}.zip`. Returns the final path.
    pub fn finalize(
        &self,
        model_name: &str,
        scene_container: &Path,
        audio: Option<&Path>,
        at: DateTime<Utc>,
    ) -> BuildResult<PathBuf> {
        let cfg = self.config;
        let staging = cfg.staging_path();
        fs::create_dir_all(&staging)
            .map_err(|e| BuildError::io(format!("failed to create {}", staging.display()), e))?;

        let scene_copy = staging.join(format!(
            "{}{}.zip",
            model_name, cfg.scene_container_extension
        ));
        copy_file(scene_container, &scene_copy)?;

        if let Some(audio) = audio {
            if let Some(name) = audio.file_name() {
                copy_file(audio, &staging.join(name))?;
            }
        }

        let staging_zip = cfg.staging_zip_path();
        zipdir::zip_dir(&staging, &staging_zip, Level::Default)?;

        let archive_dir = cfg.archive_path();
        fs::create_dir_all(&archive_dir).map_err(|e| {
            BuildError::io(format!("failed to create {}", archive_dir.display()), e)
        })?;
        let final_path = archive_dir.join(archive_file_name(model_name, at));
        move_file(&staging_zip, &final_path)?;

        tracing::info!(archive = %final_path.display(), "archive written");
        Ok(final_path)
    }
}

/// Rename `from` to `to`, overwriting; falls back to copy + remove across filesystems.
fn move_file(from: &Path, to: &Path) -> BuildResult<()> {
    if to.is_file() {
        fs::remove_file(to)
            .map_err(|e| BuildError::io(format!("failed to replace {}", to.display()), e))?;
    }
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    copy_file(from, to)?;
    fs::remove_file(from)
        .map_err(|e| BuildError::io(format!("failed to remove {}", from.display()), e))
}

fn copy_file(from: &Path, to: &Path) -> BuildResult<()> {
    fs::copy(from, to).map(|_| ()).map_err(|e| {
        BuildError::io(
            format!("failed to copy {} to {}", from.display(), to.display()),
            e,
        )
    })
}
