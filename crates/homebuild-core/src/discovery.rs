//! Source asset discovery in the working directory (non-recursive).

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::BuildConfig;
use crate::error::{BuildError, BuildResult};

/// Files found in the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredAssets {
    /// File name of the scene container.
    pub scene_container: String,
    /// File name of the user supplied audio, if any.
    pub audio: Option<String>,
}

impl DiscoveredAssets {
    pub fn audio_path(&self, root: &Path) -> Option<PathBuf> {
        self.audio.as_ref().map(|a| root.join(a))
    }
}

/// Locate the scene container (exactly one, required) and the audio file (optional).
pub fn discover_assets(config: &BuildConfig) -> BuildResult<DiscoveredAssets> {
    let root = &config.root;

    let mut containers = files_with_suffix(root, &config.scene_container_extension)?;
    let scene_container = match containers.len() {
        0 => {
            return Err(BuildError::MissingSceneContainer {
                dir: root.clone(),
                extension: config.scene_container_extension.clone(),
            })
        }
        1 => containers.remove(0),
        _ => {
            return Err(BuildError::AmbiguousSceneContainer {
                dir: root.clone(),
                extension: config.scene_container_extension.clone(),
                candidates: containers,
            })
        }
    };

    let audio_suffix = format!(".{}", config.audio_extension);
    let audio = files_with_suffix(root, &audio_suffix)?;
    if audio.len() > 1 {
        tracing::warn!(
            candidates = ?audio,
            using = %audio[0],
            "several audio files found, using the first"
        );
    }
    let audio = audio.into_iter().next();

    tracing::debug!(%scene_container, ?audio, "assets discovered");
    Ok(DiscoveredAssets {
        scene_container,
        audio,
    })
}

/// Names of regular files in `dir` ending with `suffix` (ASCII case-insensitive), sorted.
fn files_with_suffix(dir: &Path, suffix: &str) -> BuildResult<Vec<String>> {
    let suffix = suffix.to_ascii_lowercase();
    let entries = fs::read_dir(dir)
        .map_err(|e| BuildError::io(format!("failed to list {}", dir.display()), e))?;

    let mut found = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| BuildError::io(format!("failed to list {}", dir.display()), e))?;
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.len() > suffix.len() && name.to_ascii_lowercase().ends_with(&suffix) {
            found.push(name);
        }
    }
    found.sort();
    Ok(found)
}
