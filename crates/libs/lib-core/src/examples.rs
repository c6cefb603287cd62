//! Example sketch bundles served by `/project/init`.

use std::path::Path;

use crate::error::{Error, Result};
use crate::fingerprint::ARTIFACT_DIR_NAME;

/// Example sketches advertised in `/info`.
pub const EXAMPLES: &[&str] = &[
    "wasm",
    "Blink",
    "Cylon",
    "DemoReel100",
    "Fire2012",
    "Noise",
    "Pacifica",
    "Pride2015",
    "TwinkleFox",
];

/// The bundle handed out when no example name is given.
pub const DEFAULT_EXAMPLE: &str = "wasm";

/// Download filename for example bundles.
pub const EXAMPLE_BUNDLE_NAME: &str = "fastled_example.zip";

/// Zip `examples_dir/<example>` into `dest_zip`.
///
/// Entry names keep the example-name prefix so the extracted bundle has the
/// single top-level directory the compile pipeline demands. Stale
/// `fastled_js` artifact directories inside an example are skipped.
pub fn pack_example(examples_dir: &Path, example: &str, dest_zip: &Path) -> Result<()> {
    if example.contains("..") || example.contains('/') || example.contains('\\') {
        return Err(Error::InvalidInput("Invalid example name.".to_string()));
    }

    let example_dir = examples_dir.join(example);
    if !example_dir.is_dir() {
        return Err(Error::ExampleNotFound(example.to_string()));
    }

    use std::fs::File;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    let file = File::create(dest_zip)?;
    let mut zip = zip::ZipWriter::new(file);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut paths: Vec<std::path::PathBuf> = walkdir::WalkDir::new(&example_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect();
    paths.sort();

    for path in paths {
        let rel = path
            .strip_prefix(examples_dir)
            .map_err(|_| Error::InvalidInput(format!("path outside examples: {}", path.display())))?;
        if rel.components().any(|c| c.as_os_str() == ARTIFACT_DIR_NAME) {
            continue;
        }
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        zip.start_file(&name, options)?;
        zip.write_all(&std::fs::read(&path)?)?;
    }
    zip.finish()?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_pack_example_keeps_top_level_prefix() {
        let examples = TempDir::new().unwrap();
        fs::create_dir_all(examples.path().join("wasm")).unwrap();
        fs::write(examples.path().join("wasm/wasm.ino"), "void loop() {}").unwrap();
        fs::create_dir_all(examples.path().join("wasm/fastled_js")).unwrap();
        fs::write(examples.path().join("wasm/fastled_js/stale.wasm"), "x").unwrap();

        let out = TempDir::new().unwrap();
        let zip_path = out.path().join("bundle.zip");
        pack_example(examples.path(), "wasm", &zip_path).unwrap();

        let mut archive =
            zip::ZipArchive::new(fs::File::open(&zip_path).unwrap()).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["wasm/wasm.ino"]);
    }

    #[test]
    fn test_traversal_in_name_rejected() {
        let examples = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let err = pack_example(examples.path(), "../etc", &out.path().join("z.zip")).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_unknown_example_not_found() {
        let examples = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let err =
            pack_example(examples.path(), "Missing", &out.path().join("z.zip")).unwrap_err();
        assert!(matches!(err, Error::ExampleNotFound(_)));
    }
}
