//! Deterministic zip containers.
//!
//! Directories are compressed with entries in sorted order, POSIX separators and a fixed
//! modification time, so the same input tree always yields the same bytes.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::error::{zip_err, BuildError, BuildResult};

/// Compression used for every entry we write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Deflate at the fastest level.
    Fastest,
    /// Deflate at the default level.
    Default,
}

pub(crate) fn file_options(level: Level) -> SimpleFileOptions {
    let level = match level {
        Level::Fastest => Some(1),
        Level::Default => None,
    };
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(level)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644)
}

/// Compress the contents of `src_dir` (not the directory itself) into a new zip at `dest`.
///
/// Returns the number of file entries written. `dest` must not live inside `src_dir`.
pub fn zip_dir(src_dir: &Path, dest: &Path, level: Level) -> BuildResult<usize> {
    let out = File::create(dest)
        .map_err(|e| BuildError::io(format!("failed to create {}", dest.display()), e))?;
    let mut zip = ZipWriter::new(BufWriter::new(out));
    let options = file_options(level);
    let mut files = 0;

    for entry in WalkDir::new(src_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            BuildError::io(
                format!("failed to walk {}", src_dir.display()),
                io::Error::other(e),
            )
        })?;
        let rel = entry.path().strip_prefix(src_dir).unwrap_or(entry.path());
        let name = rel.to_string_lossy().replace('\\', "/");

        if entry.file_type().is_dir() {
            zip.add_directory(name, options).map_err(zip_err(dest))?;
            continue;
        }

        zip.start_file(name, options).map_err(zip_err(dest))?;
        let mut input = File::open(entry.path()).map_err(|e| {
            BuildError::io(format!("failed to open {}", entry.path().display()), e)
        })?;
        io::copy(&mut input, &mut zip)
            .map_err(|e| BuildError::io(format!("failed to compress {}", rel.display()), e))?;
        files += 1;
    }

    let mut writer = zip.finish().map_err(zip_err(dest))?;
    writer
        .flush()
        .map_err(|e| BuildError::io(format!("failed to flush {}", dest.display()), e))?;
    Ok(files)
}

/// Entry names of the zip at `path`, in central directory order.
pub fn entry_names(path: &Path) -> BuildResult<Vec<String>> {
    let archive = open(path)?;
    Ok(archive.file_names().map(str::to_string).collect())
}

/// Decompressed contents of entry `name`, or `None` if the zip has no such entry.
pub fn read_entry(path: &Path, name: &str) -> BuildResult<Option<Vec<u8>>> {
    let mut archive = open(path)?;
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(BuildError::zip(path, e)),
    };
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut buf)
        .map_err(|e| BuildError::io(format!("failed to read {} from {}", name, path.display()), e))?;
    Ok(Some(buf))
}

pub(crate) fn open(path: &Path) -> BuildResult<ZipArchive<File>> {
    let file = File::open(path)
        .map_err(|e| BuildError::io(format!("failed to open {}", path.display()), e))?;
    ZipArchive::new(file).map_err(zip_err(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn zip_dir_is_sorted_and_relative() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("model");
        fs::create_dir_all(src.join("textures")).unwrap();
        fs::write(src.join("house.gltf"), b"{}").unwrap();
        fs::write(src.join("house.bin"), [0u8, 1, 2]).unwrap();
        fs::write(src.join("textures/wall.png"), b"png").unwrap();

        let dest = tmp.path().join("out.zip");
        let files = zip_dir(&src, &dest, Level::Default).unwrap();
        assert_eq!(files, 3);

        let names = entry_names(&dest).unwrap();
        assert_eq!(
            names,
            vec!["house.bin", "house.gltf", "textures/", "textures/wall.png"]
        );
        assert_eq!(
            read_entry(&dest, "textures/wall.png").unwrap().as_deref(),
            Some(&b"png"[..])
        );
        assert_eq!(read_entry(&dest, "missing").unwrap(), None);
    }

    #[test]
    fn zip_dir_is_reproducible() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("scratch");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.ogg"), b"audio").unwrap();
        fs::write(src.join("b.ovrscene"), b"scene").unwrap();

        let first = tmp.path().join("1.zip");
        let second = tmp.path().join("2.zip");
        zip_dir(&src, &first, Level::Fastest).unwrap();
        zip_dir(&src, &second, Level::Fastest).unwrap();
        assert_eq!(fs::read(first).unwrap(), fs::read(second).unwrap());
    }

    #[test]
    fn open_rejects_non_zip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.apk");
        fs::write(&path, b"not a zip").unwrap();
        assert!(matches!(open(&path), Err(BuildError::ZipWrite { .. })));
    }
}
