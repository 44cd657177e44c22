//! Build configuration: fixed names, layout of the working directory and toolchain settings.
//!
//! Defaults reproduce the layout the shipped templates expect. A `homebuild.yaml` in the
//! working directory (or an explicit file) may override any field, and a few settings can be
//! overridden from the environment:
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `HOMEBUILD_MODEL_FOLDER` | Model folder name (default: `exported_from_blender`) |
//! | `HOMEBUILD_JAVA` | Runtime used to run the signer (default: `java`) |
//! | `HOMEBUILD_PLATFORM` | Platform directory under `dependencies/` (default: host) |
//! | `HOMEBUILD_TOOL_TIMEOUT` | Per tool invocation timeout in seconds (default: none) |

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BuildError, BuildResult};

/// Config file looked up in the working directory when none is given explicitly.
pub const CONFIG_FILE_NAME: &str = "homebuild.yaml";

/// Everything the pipeline needs to know about names and locations.
///
/// All relative names resolve against [`BuildConfig::root`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Working directory. Not read from config files.
    #[serde(skip)]
    pub root: PathBuf,

    /// Folder holding the exported model and its supporting files.
    pub model_folder: String,
    /// Extension of the single model file inside `model_folder`.
    pub model_extension: String,

    /// File name (without extension) of the compressed model folder.
    pub scene_container_name: String,
    /// Extension of the scene container, including the leading dot.
    pub scene_container_extension: String,

    /// Extension of the optional user audio file.
    pub audio_extension: String,
    /// Name the chosen audio gets inside the scene bundle.
    pub audio_asset_name: String,

    /// Temporary scene bundle created while injecting.
    pub scene_bundle_name: String,
    /// Path of the scene bundle inside every package.
    pub scene_entry: String,

    pub scratch_dir: String,
    pub staging_dir: String,
    pub archive_dir: String,
    pub originals_dir: String,

    /// Silent fallback audio, relative to `originals_dir`.
    pub silent_audio: String,
    /// Environment templates, built in this order.
    pub environments: Vec<String>,
    /// Extension of template and output packages.
    pub package_extension: String,

    pub toolchain: ToolchainConfig,
}

/// Locations and arguments of the alignment and signing tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolchainConfig {
    /// Directory holding the per-platform aligner, the signer and the key material.
    pub dependencies_dir: String,
    /// Platform sub directory of the aligner (`win`, `osx`, `linux`). Host platform if unset.
    pub platform: Option<String>,
    pub aligner: String,
    pub align_args: Vec<String>,
    /// Runtime that executes the signer.
    pub runtime: String,
    pub runtime_args: Vec<String>,
    pub signer_jar: String,
    pub sign_key: String,
    pub sign_cert: String,
    /// Kill a tool that runs longer than this. No limit if unset.
    pub timeout_secs: Option<u64>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            dependencies_dir: "dependencies".to_string(),
            platform: None,
            aligner: "zipalign".to_string(),
            align_args: vec!["-c".to_string(), "4".to_string()],
            runtime: "java".to_string(),
            runtime_args: vec![
                "-Duser.language=en".to_string(),
                "-Dfile.encoding=UTF8".to_string(),
            ],
            signer_jar: "apksigner.jar".to_string(),
            sign_key: "signkey.pk8".to_string(),
            sign_cert: "signkey.x509.pem".to_string(),
            timeout_secs: None,
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            model_folder: "exported_from_blender".to_string(),
            model_extension: "gltf".to_string(),
            scene_container_name: "_WORLD_MODEL".to_string(),
            scene_container_extension: ".gltf.ovrscene".to_string(),
            audio_extension: "ogg".to_string(),
            audio_asset_name: "_BACKGROUND_LOOP.ogg".to_string(),
            scene_bundle_name: "scene.zip".to_string(),
            scene_entry: "assets/scene.zip".to_string(),
            scratch_dir: "TEMP".to_string(),
            staging_dir: "TEMParchive".to_string(),
            archive_dir: "archive".to_string(),
            originals_dir: "originals".to_string(),
            silent_audio: "Silent_Audio.ogg".to_string(),
            environments: vec!["ClassicHome".to_string(), "WinterLodge".to_string()],
            package_extension: "apk".to_string(),
            toolchain: ToolchainConfig::default(),
        }
    }
}

/// Platform directory name for the host the binary was built for.
pub fn host_platform() -> &'static str {
    if cfg!(target_os = "windows") {
        "win"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else {
        "linux"
    }
}

impl BuildConfig {
    /// Load the configuration for a run in `root`.
    ///
    /// Uses `explicit` when given, otherwise `root/homebuild.yaml` when it exists, otherwise
    /// defaults. Environment overrides are applied last.
    pub fn load(root: impl Into<PathBuf>, explicit: Option<&Path>) -> BuildResult<Self> {
        let root = root.into();
        let implicit = root.join(CONFIG_FILE_NAME);
        let config = match explicit {
            Some(path) => Self::from_file(path)?,
            None if implicit.is_file() => Self::from_file(&implicit)?,
            None => Self::default(),
        };
        let config = config
            .with_root(root)
            .with_env_overrides(|k| std::env::var(k).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> BuildResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| BuildError::io(format!("failed to read {}", path.display()), e))?;
        serde_yaml::from_str(&raw).map_err(|e| BuildError::Config {
            message: format!("{}: {}", path.display(), e),
        })
    }

    /// Apply `HOMEBUILD_*` overrides read through `lookup`.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("HOMEBUILD_MODEL_FOLDER") {
            self.model_folder = v;
        }
        if let Some(v) = lookup("HOMEBUILD_JAVA") {
            self.toolchain.runtime = v;
        }
        if let Some(v) = lookup("HOMEBUILD_PLATFORM") {
            self.toolchain.platform = Some(v);
        }
        if let Some(secs) = lookup("HOMEBUILD_TOOL_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.toolchain.timeout_secs = Some(secs);
        }
        self
    }

    /// Set the working directory. A relative path is resolved against the current directory.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = absolutize(&root.into());
        self
    }

    /// Replace the environment list.
    pub fn with_environments<I, S>(mut self, environments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.environments = environments.into_iter().map(Into::into).collect();
        self
    }

    /// Reject configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> BuildResult<()> {
        if self.environments.is_empty() {
            return Err(BuildError::Config {
                message: "at least one environment is required".to_string(),
            });
        }
        let required = [
            ("model_folder", &self.model_folder),
            ("model_extension", &self.model_extension),
            ("scene_container_name", &self.scene_container_name),
            ("scene_container_extension", &self.scene_container_extension),
            ("audio_extension", &self.audio_extension),
            ("audio_asset_name", &self.audio_asset_name),
            ("scene_entry", &self.scene_entry),
            ("scratch_dir", &self.scratch_dir),
            ("staging_dir", &self.staging_dir),
            ("archive_dir", &self.archive_dir),
            ("package_extension", &self.package_extension),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(BuildError::Config {
                    message: format!("{} must not be empty", field),
                });
            }
        }
        if self.environments.iter().any(|e| e.trim().is_empty()) {
            return Err(BuildError::Config {
                message: "environment names must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn model_dir(&self) -> PathBuf {
        self.root.join(&self.model_folder)
    }

    pub fn scratch_path(&self) -> PathBuf {
        self.root.join(&self.scratch_dir)
    }

    pub fn staging_path(&self) -> PathBuf {
        self.root.join(&self.staging_dir)
    }

    /// Compressed staging directory, before it is renamed into the archive dir.
    pub fn staging_zip_path(&self) -> PathBuf {
        self.root.join(format!("{}.zip", self.staging_dir))
    }

    pub fn archive_path(&self) -> PathBuf {
        self.root.join(&self.archive_dir)
    }

    /// `_WORLD_MODEL.gltf.ovrscene` with the defaults.
    pub fn scene_container_file_name(&self) -> String {
        format!(
            "{}{}",
            self.scene_container_name, self.scene_container_extension
        )
    }

    pub fn scene_container_path(&self) -> PathBuf {
        self.root.join(self.scene_container_file_name())
    }

    pub fn scene_bundle_path(&self) -> PathBuf {
        self.root.join(&self.scene_bundle_name)
    }

    pub fn silent_audio_path(&self) -> PathBuf {
        self.root.join(&self.originals_dir).join(&self.silent_audio)
    }

    /// Template package of `environment` under the originals dir.
    pub fn template_path(&self, environment: &str) -> PathBuf {
        self.root
            .join(&self.originals_dir)
            .join(format!("{}.{}", environment, self.package_extension))
    }

    pub fn dependencies_path(&self) -> PathBuf {
        self.root.join(&self.toolchain.dependencies_dir)
    }

    pub fn platform(&self) -> &str {
        self.toolchain.platform.as_deref().unwrap_or(host_platform())
    }
}

/// `path` made absolute against the current directory; an empty path means the current directory.
pub(crate) fn absolutize(path: &Path) -> PathBuf {
    let path = if path.as_os_str().is_empty() {
        Path::new(".")
    } else {
        path
    };
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
