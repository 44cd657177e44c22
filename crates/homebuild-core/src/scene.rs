//! Scene container: the compressed model folder injected into every package.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::BuildConfig;
use crate::error::{BuildError, BuildResult, ModelFolderProblem};
use crate::zipdir::{self, Level};

/// The single source model of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAsset {
    /// File stem of the model; every output name derives from it.
    pub base_name: String,
    pub path: PathBuf,
}

/// The compressed model folder in the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneContainer {
    pub file_name: String,
    pub path: PathBuf,
}

/// Find the one file with extension `extension` directly inside `folder`.
pub fn locate_model(folder: &Path, extension: &str) -> BuildResult<ModelAsset> {
    let invalid = |problem| BuildError::InvalidModelFolder {
        folder: folder.to_path_buf(),
        extension: extension.to_string(),
        problem,
    };

    let entries = match fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(invalid(ModelFolderProblem::Missing))
        }
        Err(e) => {
            return Err(BuildError::io(
                format!("failed to list {}", folder.display()),
                e,
            ))
        }
    };

    let mut models = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|e| BuildError::io(format!("failed to list {}", folder.display()), e))?;
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension));
        if matches && path.is_file() {
            models.push(path);
        }
    }

    match models.len() {
        0 => Err(invalid(ModelFolderProblem::Empty)),
        1 => {
            let path = models.remove(0);
            let base_name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(ModelAsset { base_name, path })
        }
        n => Err(invalid(ModelFolderProblem::Multiple(n))),
    }
}

/// Validate the model folder and compress it into the scene container file.
///
/// A container left over from an earlier run must have been removed by the workspace reset.
pub fn build_scene_container(config: &BuildConfig) -> BuildResult<(ModelAsset, SceneContainer)> {
    let model_dir = config.model_dir();
    let model = locate_model(&model_dir, &config.model_extension)?;

    let file_name = config.scene_container_file_name();
    let path = config.root.join(&file_name);
    let files = zipdir::zip_dir(&model_dir, &path, Level::Default)?;
    tracing::info!(
        model = %model.base_name,
        container = %file_name,
        files,
        "scene container built"
    );

    Ok((model, SceneContainer { file_name, path }))
}
