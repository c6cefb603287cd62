//! Server configuration assembled from environment variables.
//!
//! Every knob has a hardcoded default so the server boots in a bare
//! container. Request headers may override the boolean toolchain knobs per
//! request; the values here are the fallbacks when a header is absent.

use std::env;
use std::path::PathBuf;

/// Strict boolean coercion shared by env vars and request headers.
///
/// `"1" | "true" | "yes"` => `Some(true)`, `"0" | "false" | "no"` =>
/// `Some(false)` (case-insensitive), anything else => `None`.
pub fn coerce_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Parse a boolean environment variable, falling back to `default` when the
/// variable is unset or unparseable.
pub fn parse_bool_env(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| coerce_bool(&v))
        .unwrap_or(default)
}

fn path_or_default(env_var: &str, default: &str) -> PathBuf {
    env::var(env_var).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(default))
}

/// Full server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,

    /// RSS limit in MiB; 0 disables the watchdog.
    pub memory_limit_mb: u64,
    pub allow_shutdown: bool,
    pub no_sketch_cache: bool,
    pub only_quick_builds: bool,
    pub live_git_update_interval_secs: u64,

    /// Fallbacks for the per-request `no_platformio` / `native` headers.
    pub no_platformio: bool,
    pub native: bool,

    pub disable_auto_clean: bool,
    pub fastled_version: String,

    // -- Well-known paths, all env-overridable.
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub compiler_root: PathBuf,
    pub volume_mapped_src: PathBuf,
    pub examples_dir: PathBuf,
    pub git_fastled_src: PathBuf,
}

impl ServerConfig {
    /// Load configuration from the environment, with hardcoded defaults for
    /// everything that is unset.
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(80);

        let memory_limit_mb = env::var("MEMORY_LIMIT_MB")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        // Update every 24 hours unless told otherwise.
        let live_git_update_interval_secs = env::var("LIVE_GIT_UPDATE_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60 * 60 * 24);

        Self {
            port,
            memory_limit_mb,
            allow_shutdown: parse_bool_env("ALLOW_SHUTDOWN", false),
            no_sketch_cache: parse_bool_env("NO_SKETCH_CACHE", false),
            only_quick_builds: parse_bool_env("ONLY_QUICK_BUILDS", false),
            live_git_update_interval_secs,
            no_platformio: parse_bool_env("NO_PLATFORMIO", false),
            native: parse_bool_env("NATIVE", false),
            disable_auto_clean: parse_bool_env("DISABLE_AUTO_CLEAN", false),
            fastled_version: env::var("FASTLED_VERSION").unwrap_or_else(|_| "unknown".to_string()),
            upload_dir: path_or_default("UPLOAD_DIR", "/uploads"),
            output_dir: path_or_default("OUTPUT_DIR", "/output"),
            compiler_root: path_or_default("COMPILER_ROOT", "/js"),
            volume_mapped_src: path_or_default("VOLUME_MAPPED_SRC", "/host/fastled/src"),
            examples_dir: path_or_default("EXAMPLES_DIR", "/git/fastled/examples"),
            git_fastled_src: path_or_default("GIT_FASTLED_SRC", "/git/fastled/src"),
        }
    }

    /// Directory holding the on-disk sketch cache.
    pub fn sketch_cache_dir(&self) -> PathBuf {
        self.output_dir.join("sketch_cache")
    }

    /// Root under which per-session workspaces (`session-<id>`) live.
    pub fn session_root(&self) -> PathBuf {
        self.upload_dir.clone()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 80,
            memory_limit_mb: 0,
            allow_shutdown: false,
            no_sketch_cache: false,
            only_quick_builds: false,
            live_git_update_interval_secs: 60 * 60 * 24,
            no_platformio: false,
            native: false,
            disable_auto_clean: false,
            fastled_version: "unknown".to_string(),
            upload_dir: PathBuf::from("/uploads"),
            output_dir: PathBuf::from("/output"),
            compiler_root: PathBuf::from("/js"),
            volume_mapped_src: PathBuf::from("/host/fastled/src"),
            examples_dir: PathBuf::from("/git/fastled/examples"),
            git_fastled_src: PathBuf::from("/git/fastled/src"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_bool_truthy() {
        for v in ["1", "true", "yes", "TRUE", "Yes"] {
            assert_eq!(coerce_bool(v), Some(true), "expected true for {v}");
        }
    }

    #[test]
    fn test_coerce_bool_falsy() {
        for v in ["0", "false", "no", "FALSE", "No"] {
            assert_eq!(coerce_bool(v), Some(false), "expected false for {v}");
        }
    }

    #[test]
    fn test_coerce_bool_garbage() {
        assert_eq!(coerce_bool("frobnicate"), None);
        assert_eq!(coerce_bool(""), None);
    }

    #[test]
    fn test_parse_bool_env_fallback() {
        temp_env::with_var_unset("FASTLED_TEST_UNSET", || {
            assert!(!parse_bool_env("FASTLED_TEST_UNSET", false));
            assert!(parse_bool_env("FASTLED_TEST_UNSET", true));
        });
        temp_env::with_var("FASTLED_TEST_SET", Some("1"), || {
            assert!(parse_bool_env("FASTLED_TEST_SET", false));
        });
    }

    #[test]
    fn test_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 80);
        assert!(!config.allow_shutdown);
        assert_eq!(config.compiler_root, PathBuf::from("/js"));
        assert_eq!(config.sketch_cache_dir(), PathBuf::from("/output/sketch_cache"));
    }
}
