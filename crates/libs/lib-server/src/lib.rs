//! HTTP surface of the FastLED wasm compile server.
//!
//! Routing is thin: every handler delegates to the [`CompileEngine`]
//! aggregate built once at startup. The only process-wide pieces are the
//! memory watchdog and the session GC loop, both spawned from [`run`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod auth;
pub mod error;
pub mod upload_guard;

pub use error::ServerError;
use lib_common::ServerConfig;
use lib_core::code_sync::CodeSync;
use lib_core::compile::{CompileEngine, EngineConfig};
use lib_core::session::{SessionConfig, SessionManager};
use lib_core::sketch_cache::{DEFAULT_CAPACITY, SketchCache};
use lib_core::toolchain::DEFAULT_TOOLCHAIN_BIN;
use lib_core::watchdog::start_memory_watchdog;

// --- Application State
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CompileEngine>,
    pub config: Arc<ServerConfig>,
}

/// Build the engine aggregate from the server configuration.
pub fn build_engine(config: &ServerConfig) -> Result<CompileEngine, ServerError> {
    let cache = SketchCache::open(
        &config.sketch_cache_dir(),
        DEFAULT_CAPACITY,
        config.no_sketch_cache,
    )
    .map_err(ServerError::Engine)?;

    let sessions = Arc::new(SessionManager::new(
        &config.session_root(),
        SessionConfig::default(),
    ));

    let code_sync = CodeSync::new(&config.volume_mapped_src, &config.git_fastled_src);

    Ok(CompileEngine::new(
        EngineConfig {
            compiler_root: config.compiler_root.clone(),
            upload_dir: config.upload_dir.clone(),
            output_dir: config.output_dir.clone(),
            toolchain_bin: PathBuf::from(DEFAULT_TOOLCHAIN_BIN),
            only_quick_builds: config.only_quick_builds,
            disable_auto_clean: config.disable_auto_clean,
        },
        cache,
        sessions,
        code_sync,
    ))
}

/// Assemble the full router for `state`.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = Router::new()
        .route("/compile/wasm", post(api::compile_wasm))
        .route("/compile/libfastled", post(api::compile_libfastled))
        .route_layer(axum::middleware::from_fn(auth::auth_middleware));

    Router::new()
        .route("/healthz", get(api::healthz))
        .route("/settings", get(api::settings))
        .route("/info", get(api::info))
        .route("/compile/wasm/inuse", get(api::compiler_in_use))
        .route(
            "/project/init",
            get(api::project_init).post(api::project_init_example),
        )
        .route("/dwarfsource", post(api::dwarfsource))
        // Gated on ALLOW_SHUTDOWN inside the handler so callers get a 403
        // rather than a 404 when the flag is off.
        .route("/shutdown", get(api::shutdown))
        .merge(protected)
        .layer(axum::middleware::from_fn(upload_guard::upload_size_guard))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Run the server until ctrl-c / SIGTERM.
pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let engine = Arc::new(build_engine(&config)?);
    let config = Arc::new(config);

    if config.memory_limit_mb > 0 {
        tracing::info!(limit_mb = config.memory_limit_mb, "starting memory watchdog");
    }
    start_memory_watchdog(config.memory_limit_mb);
    let _session_gc = Arc::clone(engine.sessions()).spawn_gc();

    let state = AppState {
        engine,
        config: Arc::clone(&config),
    };

    let settings = api::settings_for(&state);
    tracing::info!(settings = ?settings, "starting FastLED wasm compiler server");

    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(lib_core::Error::Io)?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(lib_core::Error::Io)?;

    Ok(())
}

#[allow(clippy::expect_used)] // Signal handler setup is infallible in practice
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
}
