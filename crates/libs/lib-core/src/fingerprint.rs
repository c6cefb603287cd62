//! Deterministic content hashing of an extracted sketch tree.
//!
//! The fingerprint is the cache key for compiled artifacts: two uploads of
//! the same logical sketch must hash identically regardless of filesystem
//! timestamps or directory iteration order.

use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

/// Name of the toolchain output directory, excluded from fingerprints.
pub const ARTIFACT_DIR_NAME: &str = "fastled_js";

/// Hash every regular file under `root` into a stable hex digest.
///
/// Files are enumerated in lexicographic order of their forward-slash
/// relative paths; each path and its full content feed the hash. Returns
/// `None` when the tree is empty or any entry is unreadable — callers treat
/// that as "not cacheable" and skip the cache entirely.
pub fn fingerprint_tree(root: &Path) -> Option<String> {
    let mut files: Vec<(String, std::path::PathBuf)> = Vec::new();

    for entry in WalkDir::new(root).into_iter() {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                debug!(error = %err, "unreadable entry, sketch not cacheable");
                return None;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).ok()?;
        if rel
            .components()
            .any(|c| c.as_os_str() == ARTIFACT_DIR_NAME)
        {
            continue;
        }
        let rel_str = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push((rel_str, entry.path().to_path_buf()));
    }

    if files.is_empty() {
        return None;
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::new();
    for (rel, path) in &files {
        let content = match fs::read(path) {
            Ok(c) => c,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "unreadable file, sketch not cacheable");
                return None;
            }
        };
        hasher.update(rel.as_bytes());
        hasher.update([0u8]);
        hasher.update(&content);
        hasher.update([0u8]);
    }

    Some(hex::encode(hasher.finalize()))
}
