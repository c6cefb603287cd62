//! Shared configuration and constants for the FastLED wasm compile server.

pub mod config;

pub use config::ServerConfig;

/// Hard cap on a single sketch upload, in bytes.
pub const UPLOAD_LIMIT: u64 = 10 * 1024 * 1024;

/// Shared bearer value protecting the compile endpoints.
///
/// This is a bot filter, not an authentication system. Client code greps for
/// this literal to discover the server, so changing it breaks compiler
/// clients in the wild.
pub const AUTH_TOKEN: &str = "oBOT5jbsO4ztgrpNsQwlmFLIKB";

/// Exit code used when the memory watchdog terminates the process.
pub const MEMORY_EXCEEDED_EXIT_CODE: i32 = 137;
