//! Scene packaging pipeline.
//!
//! Takes a glTF model folder and an optional background audio track from the working
//! directory and produces one signed package per (environment template x audio variant),
//! collected into a single timestamped archive:
//!
//! ```text
//! exported_from_blender/house.gltf ─┐
//! loop.ogg (optional) ──────────────┼─> archive/house_2024-03-07_09-05.zip
//! originals/<Environment>.apk ──────┘      house_ClassicHome_NoAudio.apk
//!                                          house_ClassicHome.apk
//!                                          house_WinterLodge_NoAudio.apk
//!                                          house_WinterLodge.apk
//!                                          house.gltf.ovrscene.zip
//!                                          loop.ogg
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use homebuild_core::{BuildConfig, Pipeline, ProcessToolchain};
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = BuildConfig::load(".", None)?;
//! let toolchain = ProcessToolchain::from_config(&config);
//! let report = Pipeline::new(config, toolchain).run()?;
//! println!("The builds were saved to {}", report.archive.display());
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod assembler;
pub mod config;
pub mod discovery;
pub mod error;
pub mod matrix;
pub mod pipeline;
pub mod scene;
pub mod toolchain;
pub mod workspace;
pub mod zipdir;

// Re-export main types
pub use archive::{archive_file_name, ArchiveAssembler, TIMESTAMP_FORMAT};
pub use assembler::{artifact_name, replace_entry, PackageAssembler};
pub use config::{BuildConfig, ToolchainConfig, CONFIG_FILE_NAME};
pub use discovery::{discover_assets, DiscoveredAssets};
pub use error::{BuildError, BuildResult, ModelFolderProblem, ToolFailure};
pub use matrix::{plan, AudioVariant, BuildTask, PlannedTask, TaskState};
pub use pipeline::{BuildReport, CancelToken, Pipeline, RunContext, TaskOutcome};
pub use scene::{build_scene_container, locate_model, ModelAsset, SceneContainer};
pub use toolchain::{ProcessToolchain, ToolOutput, Toolchain};
pub use workspace::{Workspace, WorkspaceGuard};
