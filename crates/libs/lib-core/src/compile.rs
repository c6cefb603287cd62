//! The end-to-end compile pipeline.
//!
//! One [`CompileEngine`] is built at startup and shared by every request
//! handler; it owns the sketch cache, the session registry, the build lock
//! and the toolchain configuration. `compile` runs the whole pipeline for a
//! single uploaded sketch: staging, extraction, fingerprinting, the cache
//! fast-path, the serialized toolchain run, and artifact packaging.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::archive;
use crate::build_mode::BuildMode;
use crate::build_state::BuildState;
use crate::code_sync::CodeSync;
use crate::error::{Error, Result};
use crate::fingerprint::{self, ARTIFACT_DIR_NAME};
use crate::session::SessionManager;
use crate::sketch_cache::SketchCache;
use crate::toolchain::{self, ToolchainInvocation};

/// Download filename of every artifact bundle.
pub const ARTIFACT_BUNDLE_NAME: &str = "fastled_output.zip";

/// Static engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub compiler_root: PathBuf,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub toolchain_bin: PathBuf,
    pub only_quick_builds: bool,
    pub disable_auto_clean: bool,
}

/// Per-request compile options, already coerced by the HTTP layer.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub filename: String,
    pub build: BuildMode,
    pub profile: bool,
    pub strict: bool,
    pub native: bool,
    pub no_platformio: bool,
    pub allow_libcompile: bool,
    pub use_cache: bool,
}

/// Paths removed once the response has been fully transmitted.
///
/// Handlers keep the guard alive for the lifetime of the response body;
/// dropping it deletes the artifact.
#[derive(Debug)]
pub struct CleanupGuard {
    paths: Vec<PathBuf>,
}

impl CleanupGuard {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        for path in &self.paths {
            let result = if path.is_dir() {
                std::fs::remove_dir_all(path)
            } else {
                std::fs::remove_file(path)
            };
            if let Err(err) = result {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %err, "failed to clean up artifact");
                }
            }
        }
    }
}

/// A finished artifact bundle ready to stream back.
#[derive(Debug)]
pub struct CompileArtifact {
    pub zip_path: PathBuf,
    pub filename: &'static str,
    pub cleanup: CleanupGuard,
}

/// The service aggregate handed to every handler.
pub struct CompileEngine {
    config: EngineConfig,
    cache: SketchCache,
    sessions: Arc<SessionManager>,
    build_state: BuildState,
    code_sync: Arc<CodeSync>,
}

impl CompileEngine {
    pub fn new(
        config: EngineConfig,
        cache: SketchCache,
        sessions: Arc<SessionManager>,
        code_sync: CodeSync,
    ) -> Self {
        Self {
            config,
            cache,
            sessions,
            build_state: BuildState::new(),
            code_sync: Arc::new(code_sync),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &SketchCache {
        &self.cache
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn build_state(&self) -> &BuildState {
        &self.build_state
    }

    pub fn code_sync(&self) -> &Arc<CodeSync> {
        &self.code_sync
    }

    /// Compile one uploaded sketch bundle into an artifact bundle.
    ///
    /// The build lock is held for the toolchain run only; extraction,
    /// hashing and packing all run concurrently across requests. Staging
    /// directories are scoped to this call and removed on every exit path.
    pub async fn compile(&self, opts: CompileOptions, payload: Vec<u8>) -> Result<CompileArtifact> {
        if self.config.only_quick_builds && opts.build != BuildMode::Quick {
            return Err(Error::QuickBuildsOnly);
        }
        let Some(file_name) = Path::new(&opts.filename).file_name().map(|n| n.to_owned()) else {
            return Err(Error::InvalidInput("No filename provided.".to_string()));
        };
        if !file_name.to_string_lossy().ends_with(".zip") {
            return Err(Error::InvalidInput(
                "Uploaded file must be a zip archive.".to_string(),
            ));
        }

        tokio::fs::create_dir_all(&self.config.upload_dir).await?;
        tokio::fs::create_dir_all(&self.config.output_dir).await?;

        // Removed on drop, i.e. on every exit path out of this function.
        let zip_staging = tempfile::tempdir_in(&self.config.upload_dir)?;
        let src_staging = tempfile::tempdir_in(&self.config.upload_dir)?;

        let zip_path = zip_staging.path().join(file_name);
        let declared_len = payload.len() as u64;
        tokio::fs::write(&zip_path, &payload).await?;

        let src_root = src_staging.path().to_path_buf();
        let src_top = {
            let zip_path = zip_path.clone();
            let src_root = src_root.clone();
            tokio::task::spawn_blocking(move || -> Result<PathBuf> {
                archive::extract_sketch(&zip_path, &src_root, declared_len)?;
                archive::single_top_level_dir(&src_root)
            })
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))??
        };

        let hash = {
            let src_root = src_root.clone();
            tokio::task::spawn_blocking(move || fingerprint::fingerprint_tree(&src_root))
                .await
                .map_err(|e| Error::Io(std::io::Error::other(e)))?
        };
        if hash.is_none() {
            warn!("fingerprint unavailable, compiling without the sketch cache");
        }

        // Cache fast-path: never touches the build lock.
        if opts.use_cache {
            if let Some(hash) = hash.as_deref() {
                if let Some(bytes) = self.cache.get(hash).await {
                    info!(hash, "sketch cache hit");
                    let artifact_path = self.fresh_artifact_path()?;
                    let cleanup = CleanupGuard::new(vec![artifact_path.clone()]);
                    tokio::fs::write(&artifact_path, &bytes).await?;
                    return Ok(CompileArtifact {
                        cleanup,
                        zip_path: artifact_path,
                        filename: ARTIFACT_BUNDLE_NAME,
                    });
                }
            }
        }

        if opts.allow_libcompile && self.code_sync.is_mapped() {
            match self.code_sync.sync(|msg| info!("{msg}")).await {
                Ok(outcome) if outcome.changed() => {
                    info!(
                        files = outcome.changed_files.len(),
                        "library source changed, clearing sketch cache"
                    );
                    self.cache.clear().await;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "error checking for source file changes");
                }
            }
        }

        self.build_state.record_attempt();
        let lock_requested = Instant::now();
        let guard = self.build_state.acquire().await;
        let lock_wait = lock_requested.elapsed();
        info!(lock_wait_secs = lock_wait.as_secs_f64(), "build lock acquired");

        let invocation = ToolchainInvocation {
            program: self.config.toolchain_bin.clone(),
            compiler_root: self.config.compiler_root.clone(),
            mapped_dir: src_root.clone(),
            mode: opts.build,
            profile: opts.profile,
            strict: opts.strict,
            no_platformio: opts.no_platformio || opts.native,
            // Debug builds keep intermediates so the debugger can step into them.
            keep_intermediates: opts.build == BuildMode::Debug,
            disable_auto_clean: self.config.disable_auto_clean,
        };
        let output = toolchain::run(&invocation, |line| info!("{line}")).await?;

        if !output.success() {
            self.build_state.record_failure();
            drop(guard);
            return Err(Error::ToolchainFailed {
                exit_code: output.exit_code,
                log: output.log,
            });
        }
        self.build_state.record_success();
        drop(guard);

        let artifact_dir = src_top.join(ARTIFACT_DIR_NAME);
        if !artifact_dir.is_dir() {
            return Err(Error::ArtifactsMissing(artifact_dir.display().to_string()));
        }

        tokio::fs::write(artifact_dir.join("out.txt"), &output.log).await?;
        tokio::fs::write(
            artifact_dir.join("perf.txt"),
            format!(
                "Compile lock time: {:.2}s\nCompile time: {:.2}s",
                lock_wait.as_secs_f64(),
                output.duration.as_secs_f64()
            ),
        )
        .await?;
        if let Some(hash) = hash.as_deref() {
            tokio::fs::write(artifact_dir.join("hash.txt"), hash).await?;
        }

        let artifact_path = self.fresh_artifact_path()?;
        let cleanup = CleanupGuard::new(vec![artifact_path.clone()]);
        {
            let artifact_dir = artifact_dir.clone();
            let artifact_path = artifact_path.clone();
            tokio::task::spawn_blocking(move || archive::pack_directory(&artifact_dir, &artifact_path))
                .await
                .map_err(|e| Error::Io(std::io::Error::other(e)))??;
        }

        if opts.use_cache {
            if let Some(hash) = hash.as_deref() {
                let bytes = tokio::fs::read(&artifact_path).await?;
                self.cache.put(hash, &bytes).await?;
            }
        }

        Ok(CompileArtifact {
            cleanup,
            zip_path: artifact_path,
            filename: ARTIFACT_BUNDLE_NAME,
        })
    }

    /// A unique artifact path in the output directory. The caller owns
    /// removal via its [`CleanupGuard`].
    fn fresh_artifact_path(&self) -> Result<PathBuf> {
        let file = tempfile::Builder::new()
            .prefix("fastled-artifact-")
            .suffix(".zip")
            .tempfile_in(&self.config.output_dir)?;
        file.into_temp_path()
            .keep()
            .map_err(|e| Error::Io(e.error))
    }
}
