//! Resolution of DWARF source paths for step-through debugging.
//!
//! Debug builds embed container paths of the form
//! `.../drawfsource/git/fastled/src/<file>` (library sources),
//! `.../drawfsource/headers/<file>` (shim headers) or
//! `.../drawfsource/js/src/<file>` (the user's transformed sketch). The
//! resolver maps those back onto the real files the server can serve.

use std::path::{Path, PathBuf};

const MARKER: &str = "drawfsource/";
const LIBRARY_PREFIX: &str = "git/fastled/src/";
const HEADERS_PREFIX: &str = "headers/";
const SKETCH_PREFIX: &str = "js/src/";

/// Maps DWARF paths onto the library and sketch source roots.
pub struct SourceFileResolver {
    fastled_src: PathBuf,
    sketch_src: PathBuf,
}

impl SourceFileResolver {
    pub fn new(fastled_src: &Path, sketch_src: &Path) -> Self {
        Self {
            fastled_src: fastled_src.to_path_buf(),
            sketch_src: sketch_src.to_path_buf(),
        }
    }

    /// Resolve a DWARF path to a local file, or `None` when the path does
    /// not match any known layout. Traversal sequences are always rejected.
    pub fn resolve(&self, path: &str) -> Option<PathBuf> {
        if path.contains("..") {
            return None;
        }
        let idx = path.rfind(MARKER)?;
        let tail = &path[idx + MARKER.len()..];

        if let Some(rest) = tail.strip_prefix(LIBRARY_PREFIX) {
            return Some(self.fastled_src.join(rest));
        }
        if let Some(rest) = tail.strip_prefix(HEADERS_PREFIX) {
            return Some(self.fastled_src.join(rest));
        }
        if let Some(rest) = tail.strip_prefix(SKETCH_PREFIX) {
            return Some(self.sketch_src.join(rest));
        }
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn resolver() -> SourceFileResolver {
        SourceFileResolver::new(Path::new("/fastled/src"), Path::new("/js/src"))
    }

    #[test]
    fn test_library_patterns() {
        for path in [
            "drawfsource/js/drawfsource/headers/FastLED.h",
            "drawfsource/js/src/drawfsource/git/fastled/src/FastLED.h",
        ] {
            assert_eq!(
                resolver().resolve(path).unwrap(),
                PathBuf::from("/fastled/src/FastLED.h"),
                "failed for {path}"
            );
        }
    }

    #[test]
    fn test_sketch_pattern() {
        assert_eq!(
            resolver().resolve("drawfsource/js/src/XYPath.ino.cpp").unwrap(),
            PathBuf::from("/js/src/XYPath.ino.cpp")
        );
    }

    #[test]
    fn test_traversal_rejected() {
        assert!(resolver()
            .resolve("drawfsource/git/fastled/src/../../etc/passwd")
            .is_none());
    }

    #[test]
    fn test_unknown_layout_rejected() {
        assert!(resolver().resolve("/etc/passwd").is_none());
        assert!(resolver().resolve("drawfsource/elsewhere/file.h").is_none());
    }
}
