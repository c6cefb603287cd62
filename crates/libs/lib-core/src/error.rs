//! Error types for the compile engine.
//!
//! Errors are categorized into:
//!
//! - **External errors**: wrapped errors from dependencies (io, zip)
//! - **Input errors**: the caller sent something we refuse to compile
//! - **Pipeline errors**: the upload was fine but the build did not produce
//!   what it should have

use thiserror::Error;

/// The error type for compile-engine operations.
#[derive(Debug, Error)]
pub enum Error {
    // -- External errors from dependencies
    /// Standard I/O error.
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive read/write error.
    #[error("Zip Error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // -- Input errors (client-caused)
    /// Generic validation failure on the request.
    #[error("{0}")]
    InvalidInput(String),

    /// The `build` header named an unknown mode.
    #[error("Invalid build mode. Must be one of 'quick', 'release', or 'debug' or omitted")]
    BadBuildMode,

    /// Server is configured quick-only and the caller asked for more.
    #[error("Only quick builds are allowed in this version.")]
    QuickBuildsOnly,

    /// An archive entry would have escaped the extraction root.
    #[error("Archive entry escapes the extraction root: {0}")]
    PathTraversal(String),

    /// The archive expands far beyond its declared size.
    #[error("Archive expands beyond the permitted size")]
    ArchiveBomb,

    /// The toolchain rejected the sketch.
    #[error("Compilation failed with return code {exit_code}:\n{log}")]
    ToolchainFailed { exit_code: i32, log: String },

    // -- Pipeline errors (server-side)
    /// Extraction produced nothing.
    #[error("No files found in extracted directory: {0}")]
    NoSourceFound(String),

    /// Extraction produced more than one top-level directory.
    #[error("More than one top-level directory found in upload: {0:?}")]
    MultipleSourceDirs(Vec<String>),

    /// The toolchain exited zero but its output directory is missing.
    #[error("Compilation artifacts not found at {0}")]
    ArtifactsMissing(String),

    /// `/project/init` named an example that does not exist.
    #[error("Example {0} not found")]
    ExampleNotFound(String),

    /// Source-mirror synchronization failed.
    #[error("Source sync failed (exit code {exit_code:?}): {stderr}")]
    SyncFailed {
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
