//! Package assembly: stage audio, copy the environment template, inject the scene bundle.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::BuildConfig;
use crate::error::{zip_err, BuildError, BuildResult};
use crate::matrix::{AudioVariant, BuildTask};
use crate::zipdir::{self, Level};

/// Byte alignment of uncompressed entries expected by the alignment check.
pub const ALIGNMENT: u16 = 4;

/// `{model}_{environment}[_NoAudio].{extension}`
pub fn artifact_name(model: &str, environment: &str, audio: &AudioVariant, extension: &str) -> String {
    let suffix = if audio.is_silent() { "_NoAudio" } else { "" };
    format!("{}_{}{}.{}", model, environment, suffix, extension)
}

/// Turns one [`BuildTask`] into an unsigned package in the working directory.
///
/// Uses the shared scratch directory, so tasks must not run concurrently.
pub struct PackageAssembler<'a> {
    config: &'a BuildConfig,
}

impl<'a> PackageAssembler<'a> {
    pub fn new(config: &'a BuildConfig) -> Self {
        Self { config }
    }

    /// Stage audio, copy the template and inject the scene. Returns the artifact path.
    ///
    /// The scene container must already be in the scratch directory.
    pub fn assemble(&self, model_name: &str, task: &BuildTask) -> BuildResult<PathBuf> {
        let cfg = self.config;
        let name = artifact_name(
            model_name,
            &task.environment,
            &task.audio,
            &cfg.package_extension,
        );
        let artifact = cfg.root.join(&name);

        let audio_src = match &task.audio {
            AudioVariant::Silent => cfg.silent_audio_path(),
            AudioVariant::Custom(path) => path.clone(),
        };
        copy_file(&audio_src, &cfg.scratch_path().join(&cfg.audio_asset_name))?;
        copy_file(&cfg.template_path(&task.environment), &artifact)?;

        self.inject_scene(&artifact)?;
        tracing::debug!(artifact = %name, "scene injected");
        Ok(artifact)
    }

    /// Compress the scratch directory and swap it in as the package's scene entry.
    ///
    /// The temporary scene bundle is removed afterwards, whether or not the swap worked.
    pub fn inject_scene(&self, package: &Path) -> BuildResult<()> {
        let bundle = self.config.scene_bundle_path();
        zipdir::zip_dir(&self.config.scratch_path(), &bundle, Level::Fastest)?;

        let result = replace_entry(package, &self.config.scene_entry, &bundle);
        if let Err(e) = fs::remove_file(&bundle) {
            tracing::warn!(path = %bundle.display(), error = %e, "failed to remove scene bundle");
        }
        result
    }
}

/// Rewrite the zip at `package` with entry `entry` replaced by the contents of `replacement`.
///
/// The other entries keep their order. Compressed entries are copied raw; stored entries
/// are rewritten aligned to [`ALIGNMENT`]. The new entry is appended last. The package is
/// only replaced once the new archive is complete.
pub fn replace_entry(package: &Path, entry: &str, replacement: &Path) -> BuildResult<()> {
    let mut src = zipdir::open(package)?;
    if src.index_for_name(entry).is_none() {
        return Err(BuildError::SceneEntryNotFound {
            package: package.to_path_buf(),
            entry: entry.to_string(),
        });
    }

    let dir = match package.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| BuildError::io(format!("failed to create temp file in {}", dir.display()), e))?;

    {
        let mut writer = ZipWriter::new(BufWriter::new(tmp.as_file_mut()));

        for i in 0..src.len() {
            let mut file = src.by_index(i).map_err(zip_err(package))?;
            if file.name() == entry {
                continue;
            }
            if file.compression() == CompressionMethod::Stored && !file.is_dir() {
                let name = file.name().to_string();
                let mut options = SimpleFileOptions::default()
                    .compression_method(CompressionMethod::Stored)
                    .with_alignment(ALIGNMENT);
                if let Some(mode) = file.unix_mode() {
                    options = options.unix_permissions(mode);
                }
                if let Some(modified) = file.last_modified() {
                    options = options.last_modified_time(modified);
                }
                writer.start_file(name, options).map_err(zip_err(package))?;
                io::copy(&mut file, &mut writer)
                    .map_err(|e| BuildError::zip(package, e))?;
            } else {
                writer.raw_copy_file(file).map_err(zip_err(package))?;
            }
        }

        writer
            .start_file(entry, zipdir::file_options(Level::Fastest))
            .map_err(zip_err(package))?;
        let mut input = File::open(replacement).map_err(|e| {
            BuildError::io(format!("failed to open {}", replacement.display()), e)
        })?;
        io::copy(&mut input, &mut writer).map_err(|e| BuildError::zip(package, e))?;

        let mut out = writer.finish().map_err(zip_err(package))?;
        out.flush().map_err(|e| BuildError::zip(package, e))?;
    }

    // Release the source handle before the rename; some platforms refuse to replace open files.
    drop(src);
    tmp.persist(package)
        .map_err(|e| BuildError::zip(package, e.error))?;
    Ok(())
}

fn copy_file(from: &Path, to: &Path) -> BuildResult<()> {
    fs::copy(from, to).map(|_| ()).map_err(|e| {
        BuildError::io(
            format!("failed to copy {} to {}", from.display(), to.display()),
            e,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn template_time() -> zip::DateTime {
        zip::DateTime::from_date_and_time(2021, 6, 15, 12, 30, 10).unwrap()
    }

    /// A template with a stored entry placed so it would be misaligned without padding.
    fn write_template(path: &Path, with_scene: bool) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        let deflated = SimpleFileOptions::default().last_modified_time(template_time());
        let stored = deflated.compression_method(CompressionMethod::Stored);

        zip.start_file("AndroidManifest.xml", deflated).unwrap();
        zip.write_all(b"<manifest/>").unwrap();
        if with_scene {
            zip.start_file("assets/scene.zip", stored).unwrap();
            zip.write_all(b"old scene").unwrap();
        }
        zip.start_file("res/a.png", stored).unwrap();
        zip.write_all(b"odd-length-png").unwrap();
        zip.start_file("resources.arsc", stored).unwrap();
        zip.write_all(b"table").unwrap();
        zip.finish().unwrap();
    }

    fn scratch_with_scene(root: &Path) -> PathBuf {
        let scratch = root.join("TEMP");
        fs::create_dir_all(&scratch).unwrap();
        fs::write(scratch.join("_WORLD_MODEL.gltf.ovrscene"), b"scene bytes").unwrap();
        fs::write(scratch.join("_BACKGROUND_LOOP.ogg"), b"audio bytes").unwrap();
        scratch
    }

    #[test]
    fn artifact_names() {
        assert_eq!(
            artifact_name("house", "ClassicHome", &AudioVariant::Silent, "apk"),
            "house_ClassicHome_NoAudio.apk"
        );
        assert_eq!(
            artifact_name(
                "house",
                "WinterLodge",
                &AudioVariant::Custom(PathBuf::from("loop.ogg")),
                "apk"
            ),
            "house_WinterLodge.apk"
        );
    }

    #[test]
    fn inject_replaces_scene_with_scratch_bundle() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = BuildConfig::default().with_root(tmp.path());
        let scratch = scratch_with_scene(tmp.path());
        let package = tmp.path().join("house_ClassicHome.apk");
        write_template(&package, true);

        PackageAssembler::new(&cfg).inject_scene(&package).unwrap();

        // The bundle is reproducible, so a fresh compression equals what was injected.
        let expected = tmp.path().join("expected.zip");
        zipdir::zip_dir(&scratch, &expected, Level::Fastest).unwrap();
        let injected = zipdir::read_entry(&package, "assets/scene.zip")
            .unwrap()
            .unwrap();
        assert_eq!(injected, fs::read(&expected).unwrap());

        assert_eq!(
            zipdir::entry_names(&package).unwrap(),
            vec![
                "AndroidManifest.xml",
                "res/a.png",
                "resources.arsc",
                "assets/scene.zip"
            ]
        );
        assert_eq!(
            zipdir::read_entry(&package, "resources.arsc").unwrap().as_deref(),
            Some(&b"table"[..])
        );
        assert!(!cfg.scene_bundle_path().exists());
    }

    #[test]
    fn stored_entries_are_aligned() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = BuildConfig::default().with_root(tmp.path());
        scratch_with_scene(tmp.path());
        let package = tmp.path().join("p.apk");
        write_template(&package, true);

        PackageAssembler::new(&cfg).inject_scene(&package).unwrap();

        let mut archive = zipdir::open(&package).unwrap();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).unwrap();
            if file.compression() == CompressionMethod::Stored {
                assert_eq!(
                    file.data_start() % u64::from(ALIGNMENT),
                    0,
                    "{} is not aligned",
                    file.name()
                );
                let mut buf = Vec::new();
                file.read_to_end(&mut buf).unwrap();
                assert!(!buf.is_empty());
            }
        }
    }

    #[test]
    fn rewritten_entries_keep_their_timestamps() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = BuildConfig::default().with_root(tmp.path());
        scratch_with_scene(tmp.path());
        let first = tmp.path().join("first.apk");
        let second = tmp.path().join("second.apk");
        write_template(&first, true);
        write_template(&second, true);

        let assembler = PackageAssembler::new(&cfg);
        assembler.inject_scene(&first).unwrap();
        assembler.inject_scene(&second).unwrap();

        let mut archive = zipdir::open(&first).unwrap();
        for name in ["AndroidManifest.xml", "res/a.png", "resources.arsc"] {
            let file = archive.by_name(name).unwrap();
            assert_eq!(file.last_modified(), Some(template_time()), "{name}");
        }
        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }

    #[test]
    fn missing_scene_entry_leaves_package_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = BuildConfig::default().with_root(tmp.path());
        scratch_with_scene(tmp.path());
        let package = tmp.path().join("p.apk");
        write_template(&package, false);
        let before = fs::read(&package).unwrap();

        let err = PackageAssembler::new(&cfg).inject_scene(&package).unwrap_err();
        assert!(matches!(err, BuildError::SceneEntryNotFound { .. }), "got {err:?}");
        assert_eq!(fs::read(&package).unwrap(), before);
        assert!(!cfg.scene_bundle_path().exists());
    }

    #[test]
    fn corrupt_package_is_a_zip_error() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = BuildConfig::default().with_root(tmp.path());
        scratch_with_scene(tmp.path());
        let package = tmp.path().join("p.apk");
        fs::write(&package, b"PK garbage").unwrap();

        let err = PackageAssembler::new(&cfg).inject_scene(&package).unwrap_err();
        assert!(matches!(err, BuildError::ZipWrite { .. }), "got {err:?}");
    }

    #[test]
    fn assemble_stages_selected_audio() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let cfg = BuildConfig::default().with_root(root);
        let scratch = scratch_with_scene(root);
        fs::create_dir_all(root.join("originals")).unwrap();
        fs::write(root.join("originals/Silent_Audio.ogg"), b"silence").unwrap();
        write_template(&root.join("originals/ClassicHome.apk"), true);
        fs::write(root.join("loop.ogg"), b"music").unwrap();

        let assembler = PackageAssembler::new(&cfg);
        let silent = assembler
            .assemble(
                "house",
                &BuildTask {
                    environment: "ClassicHome".into(),
                    audio: AudioVariant::Silent,
                },
            )
            .unwrap();
        assert_eq!(silent, root.join("house_ClassicHome_NoAudio.apk"));
        assert_eq!(
            fs::read(scratch.join("_BACKGROUND_LOOP.ogg")).unwrap(),
            b"silence"
        );

        let custom = assembler
            .assemble(
                "house",
                &BuildTask {
                    environment: "ClassicHome".into(),
                    audio: AudioVariant::Custom(root.join("loop.ogg")),
                },
            )
            .unwrap();
        assert_eq!(custom, root.join("house_ClassicHome.apk"));
        assert_eq!(fs::read(scratch.join("_BACKGROUND_LOOP.ogg")).unwrap(), b"music");

        // Template is never modified in place.
        assert_eq!(
            zipdir::read_entry(&root.join("originals/ClassicHome.apk"), "assets/scene.zip")
                .unwrap()
                .as_deref(),
            Some(&b"old scene"[..])
        );
    }
}
