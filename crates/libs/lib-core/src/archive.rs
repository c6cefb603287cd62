//! Zip extraction and artifact packing.
//!
//! Extraction is defensive: entries may not escape the extraction root, the
//! expanded size is bounded by a multiple of the uploaded size (archive-bomb
//! guard), and embedded `platformio.ini` files are stripped so an uploaded
//! sketch cannot reconfigure the build system.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};

/// Maximum expansion factor relative to the uploaded archive size.
const MAX_EXPANSION_FACTOR: u64 = 100;

/// Build-system file stripped from every upload.
const STRIPPED_FILE_NAME: &str = "platformio.ini";

/// Extract `zip_path` into `dest`.
///
/// `declared_len` is the size of the uploaded archive; extraction fails once
/// the expanded output exceeds `declared_len * MAX_EXPANSION_FACTOR`. Pass 0
/// to disable the bound (trusted local archives).
pub fn extract_sketch(zip_path: &Path, dest: &Path, declared_len: u64) -> Result<()> {
    let file = File::open(zip_path)?;
    let mut archive = ZipArchive::new(file)?;

    let mut allowance: u64 = if declared_len > 0 {
        declared_len.saturating_mul(MAX_EXPANSION_FACTOR)
    } else {
        u64::MAX
    };

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(rel) = entry.enclosed_name() else {
            return Err(Error::PathTraversal(entry.name().to_string()));
        };
        let out_path = dest.join(&rel);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if rel.file_name().is_some_and(|n| n == STRIPPED_FILE_NAME) {
            debug!(entry = %rel.display(), "stripping build-system file from upload");
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        let written = io::copy(&mut (&mut entry).take(allowance.saturating_add(1)), &mut out)?;
        if written > allowance {
            return Err(Error::ArchiveBomb);
        }
        allowance -= written;
    }
    Ok(())
}

/// Return the single top-level directory of an extracted upload.
///
/// An empty tree and a tree with multiple top-level entries are both
/// rejected; the compile contract is "one sketch per bundle".
pub fn single_top_level_dir(root: &Path) -> Result<PathBuf> {
    let mut entries: Vec<PathBuf> = fs::read_dir(root)?
        .collect::<io::Result<Vec<_>>>()?
        .into_iter()
        .map(|e| e.path())
        .collect();
    entries.sort();

    match entries.as_slice() {
        [] => Err(Error::NoSourceFound(root.display().to_string())),
        [single] if single.is_dir() => Ok(single.clone()),
        _ => Err(Error::MultipleSourceDirs(
            entries
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect(),
        )),
    }
}

/// Zip every file under `src_dir` into `dest_zip`.
///
/// Entry names are forward-slash paths relative to `src_dir`. Compression is
/// deflate at level 1: the artifacts are mostly wasm and minified js, so a
/// fast setting wins over a tight one.
pub fn pack_directory(src_dir: &Path, dest_zip: &Path) -> Result<()> {
    let file = File::create(dest_zip)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(1));

    let mut paths: Vec<PathBuf> = WalkDir::new(src_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect();
    paths.sort();

    for path in paths {
        let rel = path
            .strip_prefix(src_dir)
            .map_err(|_| Error::InvalidInput(format!("path outside pack root: {}", path.display())))?;
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        zip.start_file(&name, options)?;
        let content = fs::read(&path)?;
        zip.write_all(&content)?;
    }
    zip.finish()?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_zip(entries: &[(&str, &str)]) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let zip_path = dir.path().join("upload.zip");
        let file = File::create(&zip_path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        for (name, content) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
        (dir, zip_path)
    }

    #[test]
    fn test_extract_roundtrip() {
        let (_dir, zip_path) = make_zip(&[
            ("sketch/main.ino", "void loop() {}"),
            ("sketch/data/palette.bin", "xyz"),
        ]);
        let dest = TempDir::new().unwrap();
        extract_sketch(&zip_path, dest.path(), 1024).unwrap();

        assert_eq!(
            fs::read_to_string(dest.path().join("sketch/main.ino")).unwrap(),
            "void loop() {}"
        );
        assert_eq!(
            fs::read_to_string(dest.path().join("sketch/data/palette.bin")).unwrap(),
            "xyz"
        );
    }

    #[test]
    fn test_extract_rejects_traversal() {
        let (_dir, zip_path) = make_zip(&[("../evil.txt", "pwned")]);
        let dest = TempDir::new().unwrap();
        let err = extract_sketch(&zip_path, dest.path(), 1024).unwrap_err();
        assert!(matches!(err, Error::PathTraversal(_)));
    }

    #[test]
    fn test_extract_strips_platformio_ini() {
        let (_dir, zip_path) = make_zip(&[
            ("sketch/main.ino", "void loop() {}"),
            ("sketch/platformio.ini", "[env]"),
        ]);
        let dest = TempDir::new().unwrap();
        extract_sketch(&zip_path, dest.path(), 1024).unwrap();

        assert!(dest.path().join("sketch/main.ino").exists());
        assert!(!dest.path().join("sketch/platformio.ini").exists());
    }

    #[test]
    fn test_extract_bounds_expansion() {
        let big = "A".repeat(64 * 1024);
        let (_dir, zip_path) = make_zip(&[("sketch/big.txt", &big)]);
        let dest = TempDir::new().unwrap();
        // Declared length of 16 bytes allows 1600 bytes expanded; 64k is a bomb.
        let err = extract_sketch(&zip_path, dest.path(), 16).unwrap_err();
        assert!(matches!(err, Error::ArchiveBomb));
    }

    #[test]
    fn test_single_top_level_dir() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("sketch")).unwrap();
        fs::write(root.path().join("sketch/main.ino"), "x").unwrap();

        let top = single_top_level_dir(root.path()).unwrap();
        assert_eq!(top.file_name().unwrap(), "sketch");
    }

    #[test]
    fn test_empty_tree_rejected() {
        let root = TempDir::new().unwrap();
        let err = single_top_level_dir(root.path()).unwrap_err();
        assert!(matches!(err, Error::NoSourceFound(_)));
    }

    #[test]
    fn test_multiple_top_level_dirs_rejected() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("a")).unwrap();
        fs::create_dir(root.path().join("b")).unwrap();
        let err = single_top_level_dir(root.path()).unwrap_err();
        assert!(matches!(err, Error::MultipleSourceDirs(_)));
    }

    #[test]
    fn test_pack_directory_relative_names() {
        let src = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("modules")).unwrap();
        fs::write(src.path().join("fastled.wasm"), "wasm").unwrap();
        fs::write(src.path().join("modules/ui.js"), "js").unwrap();

        let out = TempDir::new().unwrap();
        let zip_path = out.path().join("artifact.zip");
        pack_directory(src.path(), &zip_path).unwrap();

        let mut archive = ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["fastled.wasm", "modules/ui.js"]);
    }
}
