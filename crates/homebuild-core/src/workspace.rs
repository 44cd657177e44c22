//! Scratch and staging directories of a run, and their cleanup.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::BuildConfig;
use crate::error::{BuildError, BuildResult};

/// The per-run directories and fixed-name files inside the working directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    scratch: PathBuf,
    staging: PathBuf,
    staging_zip: PathBuf,
    scene_bundle: PathBuf,
    scene_container: PathBuf,
    package_extension: String,
}

impl Workspace {
    pub fn new(config: &BuildConfig) -> Self {
        Self {
            root: config.root.clone(),
            scratch: config.scratch_path(),
            staging: config.staging_path(),
            staging_zip: config.staging_zip_path(),
            scene_bundle: config.scene_bundle_path(),
            scene_container: config.scene_container_path(),
            package_extension: config.package_extension.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging
    }

    /// Remove everything a previous or current run left behind.
    ///
    /// Targets that are already gone are fine, so calling this repeatedly is a no-op.
    pub fn reset(&self) -> BuildResult<()> {
        remove_dir(&self.scratch)?;
        remove_dir(&self.staging)?;
        remove_path(&self.staging_zip)?;
        remove_path(&self.scene_bundle)?;
        remove_path(&self.scene_container)?;

        for package in self.stray_packages()? {
            remove_path(&package)?;
        }
        Ok(())
    }

    /// (Re)create the scratch directory.
    pub fn prepare(&self) -> BuildResult<()> {
        fs::create_dir_all(&self.scratch).map_err(|e| {
            BuildError::io(format!("failed to create {}", self.scratch.display()), e)
        })
    }

    /// Reset and prepare the workspace. The returned guard resets it again when dropped.
    pub fn acquire(&self) -> BuildResult<WorkspaceGuard<'_>> {
        self.reset()?;
        self.prepare()?;
        Ok(WorkspaceGuard { workspace: self })
    }

    fn stray_packages(&self) -> BuildResult<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(BuildError::io(
                    format!("failed to list {}", self.root.display()),
                    e,
                ))
            }
        };

        let mut packages = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                BuildError::io(format!("failed to list {}", self.root.display()), e)
            })?;
            let path = entry.path();
            let is_package = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.package_extension));
            if is_package && entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                packages.push(path);
            }
        }
        Ok(packages)
    }
}

/// Resets the workspace on drop, on success, error and unwind alike.
#[must_use = "dropping the guard immediately resets the workspace"]
pub struct WorkspaceGuard<'a> {
    workspace: &'a Workspace,
}

impl WorkspaceGuard<'_> {
    pub fn workspace(&self) -> &Workspace {
        self.workspace
    }
}

impl Drop for WorkspaceGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.workspace.reset() {
            tracing::warn!(error = %e, "workspace reset failed");
        }
    }
}

fn remove_dir(path: &Path) -> BuildResult<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed directory");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        // A file squatting on a directory name is stale state too.
        Err(_) if path.is_file() => remove_path(path),
        Err(e) => Err(BuildError::io(
            format!("failed to remove {}", path.display()),
            e,
        )),
    }
}

fn remove_path(path: &Path) -> BuildResult<()> {
    if path.is_dir() {
        return remove_dir(path);
    }
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BuildError::io(
            format!("failed to remove {}", path.display()),
            e,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn snapshot(root: &Path) -> BTreeSet<PathBuf> {
        walkdir::WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .map(|e| e.unwrap().path().strip_prefix(root).unwrap().to_path_buf())
            .collect()
    }

    fn dirty_workspace() -> (tempfile::TempDir, Workspace) {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let cfg = BuildConfig::default().with_root(root);
        fs::create_dir_all(root.join("TEMP")).unwrap();
        fs::write(root.join("TEMP/_BACKGROUND_LOOP.ogg"), b"x").unwrap();
        fs::create_dir_all(root.join("TEMParchive")).unwrap();
        fs::write(root.join("TEMParchive.zip"), b"x").unwrap();
        fs::write(root.join("scene.zip"), b"x").unwrap();
        fs::write(root.join("_WORLD_MODEL.gltf.ovrscene"), b"x").unwrap();
        fs::write(root.join("house_ClassicHome.apk"), b"x").unwrap();
        fs::write(root.join("house_WinterLodge_NoAudio.APK"), b"x").unwrap();
        fs::create_dir_all(root.join("archive")).unwrap();
        fs::write(root.join("archive/house_2024-01-01_00-00.zip"), b"x").unwrap();
        fs::create_dir_all(root.join("originals")).unwrap();
        fs::write(root.join("originals/ClassicHome.apk"), b"x").unwrap();
        fs::write(root.join("music.ogg"), b"x").unwrap();
        let ws = Workspace::new(&cfg);
        (tmp, ws)
    }

    #[test]
    fn reset_removes_run_state_and_keeps_inputs() {
        let (tmp, ws) = dirty_workspace();
        ws.reset().unwrap();

        let left = snapshot(tmp.path());
        let expected: BTreeSet<PathBuf> = [
            "archive",
            "archive/house_2024-01-01_00-00.zip",
            "music.ogg",
            "originals",
            "originals/ClassicHome.apk",
        ]
        .into_iter()
        .map(PathBuf::from)
        .collect();
        assert_eq!(left, expected);
    }

    #[test]
    fn reset_is_idempotent() {
        let (tmp, ws) = dirty_workspace();
        ws.reset().unwrap();
        let first = snapshot(tmp.path());
        ws.reset().unwrap();
        assert_eq!(snapshot(tmp.path()), first);
    }

    #[test]
    fn reset_on_clean_workspace_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::new(&BuildConfig::default().with_root(tmp.path()));
        ws.reset().unwrap();
        ws.reset().unwrap();
        assert!(snapshot(tmp.path()).is_empty());
    }

    #[test]
    fn stray_staging_zip_directory_is_removed() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("TEMParchive.zip/inner")).unwrap();
        let ws = Workspace::new(&BuildConfig::default().with_root(tmp.path()));
        ws.reset().unwrap();
        assert!(!tmp.path().join("TEMParchive.zip").exists());
    }

    #[test]
    fn guard_resets_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::new(&BuildConfig::default().with_root(tmp.path()));
        {
            let guard = ws.acquire().unwrap();
            assert!(guard.workspace().scratch_dir().is_dir());
            fs::write(ws.scratch_dir().join("file"), b"x").unwrap();
        }
        assert!(!ws.scratch_dir().exists());
    }
}
