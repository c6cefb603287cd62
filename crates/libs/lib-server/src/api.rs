//! Request handlers for every public endpoint.

use std::convert::Infallible;
use std::path::PathBuf;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::io::ReaderStream;
use tracing::info;

use lib_common::config::coerce_bool;
use lib_core::compile::{CleanupGuard, CompileOptions};
use lib_core::dwarf::SourceFileResolver;
use lib_core::examples::{DEFAULT_EXAMPLE, EXAMPLE_BUNDLE_NAME, EXAMPLES, pack_example};
use lib_core::librebuild::stream_rebuild;
use lib_core::{BuildMode, Error as EngineError};

use crate::AppState;
use crate::auth::require_auth;
use crate::error::{Result, ServerError};

// -- Header coercion helpers

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Presence + truthy value => true, presence + falsy => false, absence or
/// garbage => `default`.
fn header_bool(headers: &HeaderMap, name: &str, default: bool) -> bool {
    header_str(headers, name)
        .and_then(|v| coerce_bool(&v))
        .unwrap_or(default)
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    header_str(headers, name).and_then(|v| v.parse().ok())
}

/// Stream a zip file back, deleting it once the response body is dropped.
async fn zip_file_response(
    path: PathBuf,
    download_name: &str,
    cleanup: CleanupGuard,
) -> Result<Response> {
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| ServerError::Internal(format!("artifact vanished: {e}")))?;
    let stream = ReaderStream::new(file).map(move |chunk| {
        // The guard rides along with the stream; dropping the body deletes
        // the artifact.
        let _keep_alive = &cleanup;
        chunk
    });

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{download_name}\""),
        )
        .body(Body::from_stream(stream))
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    Ok(response)
}

// -- Liveness and introspection

pub async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Settings object, bit-compatible with existing clients.
#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    #[serde(rename = "ALLOW_SHUTDOWN")]
    pub allow_shutdown: bool,
    #[serde(rename = "NO_AUTO_UPDATE")]
    pub no_auto_update: String,
    #[serde(rename = "NO_SKETCH_CACHE")]
    pub no_sketch_cache: bool,
    #[serde(rename = "LIVE_GIT_UPDATES_ENABLED")]
    pub live_git_updates_enabled: bool,
    #[serde(rename = "LIVE_GIT_UPDATES_INTERVAL")]
    pub live_git_updates_interval: u64,
    #[serde(rename = "UPLOAD_LIMIT")]
    pub upload_limit: u64,
    #[serde(rename = "VOLUME_MAPPED_SRC")]
    pub volume_mapped_src: String,
    #[serde(rename = "VOLUME_MAPPED_SRC_EXISTS")]
    pub volume_mapped_src_exists: bool,
    #[serde(rename = "ONLY_QUICK_BUILDS")]
    pub only_quick_builds: bool,
}

pub fn settings_for(state: &AppState) -> SettingsResponse {
    let config = &state.config;
    SettingsResponse {
        allow_shutdown: config.allow_shutdown,
        no_auto_update: std::env::var("NO_AUTO_UPDATE").unwrap_or_else(|_| "0".to_string()),
        no_sketch_cache: config.no_sketch_cache,
        // Live git mirroring stays off; the rebuild endpoint covers updates.
        live_git_updates_enabled: false,
        live_git_updates_interval: config.live_git_update_interval_secs,
        upload_limit: lib_common::UPLOAD_LIMIT,
        volume_mapped_src: config.volume_mapped_src.display().to_string(),
        volume_mapped_src_exists: config.volume_mapped_src.exists(),
        only_quick_builds: config.only_quick_builds,
    }
}

pub async fn settings(State(state): State<AppState>) -> impl IntoResponse {
    Json(settings_for(&state))
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub examples: Vec<&'static str>,
    pub compile_count: u64,
    pub compile_failures: u64,
    pub compile_successes: u64,
    pub uptime: String,
    pub build_timestamp: String,
    pub fastled_version: String,
    pub available_builds: Vec<&'static str>,
}

pub async fn info(State(state): State<AppState>) -> impl IntoResponse {
    let counts = state.engine.build_state().counts();
    let build_timestamp = std::fs::read_to_string("/image_timestamp.txt")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let mut available_builds = vec!["quick"];
    if !state.config.only_quick_builds {
        available_builds.extend(["release", "debug"]);
    }

    Json(InfoResponse {
        examples: EXAMPLES.to_vec(),
        compile_count: counts.attempted,
        compile_failures: counts.failed,
        compile_successes: counts.succeeded,
        uptime: state.engine.build_state().uptime_hhmmss(),
        build_timestamp,
        fastled_version: state.config.fastled_version.clone(),
        available_builds,
    })
}

pub async fn compiler_in_use(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "in_use": state.engine.build_state().is_locked() }))
}

// -- Example bundles

async fn example_response(state: &AppState, example: &str) -> Result<Response> {
    let dest = tempfile::Builder::new()
        .prefix(&format!("{example}-"))
        .suffix(".zip")
        .tempfile_in(std::env::temp_dir())
        .map_err(|e| ServerError::Internal(e.to_string()))?
        .into_temp_path()
        .keep()
        .map_err(|e| ServerError::Internal(e.to_string()))?;

    let cleanup = CleanupGuard::new(vec![dest.clone()]);

    let examples_dir = state.config.examples_dir.clone();
    let example = example.to_string();
    let dest_clone = dest.clone();
    tokio::task::spawn_blocking(move || pack_example(&examples_dir, &example, &dest_clone))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))??;

    zip_file_response(dest, EXAMPLE_BUNDLE_NAME, cleanup).await
}

pub async fn project_init(State(state): State<AppState>) -> Result<Response> {
    info!("endpoint accessed: /project/init");
    example_response(&state, DEFAULT_EXAMPLE).await
}

pub async fn project_init_example(
    State(state): State<AppState>,
    body: String,
) -> Result<Response> {
    // The body is either a bare name or a JSON-encoded string.
    let example = serde_json::from_str::<String>(&body).unwrap_or_else(|_| body.trim().to_string());
    info!(example = %example, "endpoint accessed: /project/init (named)");
    if example.is_empty() {
        return Err(ServerError::BadRequest("No example name provided.".to_string()));
    }
    example_response(&state, &example).await
}

// -- Debug source lookup

#[derive(Debug, Deserialize)]
pub struct DwarfSourceRequest {
    pub path: String,
}

pub async fn dwarfsource(
    State(state): State<AppState>,
    Json(request): Json<DwarfSourceRequest>,
) -> Response {
    let resolver = SourceFileResolver::new(
        &state.config.git_fastled_src,
        &state.config.compiler_root.join("src"),
    );
    let Some(resolved) = resolver.resolve(&request.path) else {
        return (
            StatusCode::BAD_REQUEST,
            format!("Could not resolve {}", request.path),
        )
            .into_response();
    };
    if !resolved.is_file() {
        return (StatusCode::NOT_FOUND, "File not found.".to_string()).into_response();
    }
    match tokio::fs::read(&resolved).await {
        Ok(content) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/plain"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            content,
        )
            .into_response(),
        Err(err) => (StatusCode::NOT_FOUND, format!("File not found: {err}")).into_response(),
    }
}

// -- Compile

pub async fn compile_wasm(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response> {
    let build = BuildMode::from_header(header_str(&headers, "build").as_deref())?;
    let profile = header_bool(&headers, "profile", false);
    let strict = header_bool(&headers, "strict", false);
    let allow_libcompile = header_bool(&headers, "allow_libcompile", false);
    // Header overrides fall back to the environment-derived defaults.
    let no_platformio = header_bool(&headers, "no_platformio", state.config.no_platformio);
    let native = header_bool(&headers, "native", state.config.native);
    let session_hint = header_u64(&headers, "session_id");

    let sessions = state.engine.sessions();
    let session_info = sessions.info(session_hint);
    let (session_id, _reused) = sessions.get_or_create(session_hint);

    let mut upload: Option<(String, Bytes)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(e.to_string()))?
    {
        if field.name() == Some("file") {
            let filename = field
                .file_name()
                .map(|f| f.to_string())
                .ok_or_else(|| ServerError::BadRequest("No filename provided.".to_string()))?;
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ServerError::BadRequest(e.to_string()))?;
            upload = Some((filename, bytes));
            break;
        }
    }
    let Some((filename, bytes)) = upload else {
        return Err(ServerError::BadRequest("No file uploaded.".to_string()));
    };

    info!(
        filename = %filename,
        build = build.as_str(),
        profile,
        no_platformio,
        native,
        session = %session_info.message,
        "endpoint accessed: /compile/wasm"
    );

    let opts = CompileOptions {
        filename,
        build,
        profile,
        strict,
        native,
        no_platformio,
        allow_libcompile,
        use_cache: !state.config.no_sketch_cache,
    };
    let artifact = state.engine.compile(opts, bytes.to_vec()).await?;

    let mut response =
        zip_file_response(artifact.zip_path.clone(), artifact.filename, artifact.cleanup).await?;
    let headers = response.headers_mut();
    headers.insert(
        "X-Session-Id",
        session_id
            .to_string()
            .parse()
            .map_err(|_| ServerError::Internal("invalid session header".to_string()))?,
    );
    headers.insert(
        "X-Session-Info",
        session_info
            .message
            .parse()
            .map_err(|_| ServerError::Internal("invalid session header".to_string()))?,
    );
    Ok(response)
}

// -- Library rebuild stream

pub async fn compile_libfastled(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response> {
    let build = header_str(&headers, "build");
    let mode: BuildMode = match build.as_deref() {
        None => BuildMode::Quick,
        Some(value) => value.parse().map_err(|_: EngineError| {
            ServerError::BadRequest(format!(
                "Invalid build mode: {value}. Must be one of quick, debug, release"
            ))
        })?,
    };
    let dry_run = header_bool(&headers, "dry_run", false);

    if !dry_run && !state.engine.code_sync().is_mapped() {
        return Err(ServerError::BadRequest(format!(
            "Volume mapped source directory {} does not exist",
            state.config.volume_mapped_src.display()
        )));
    }

    info!(
        build = mode.as_str(),
        dry_run, "endpoint accessed: /compile/libfastled"
    );

    let events = stream_rebuild(state.engine.code_sync().clone(), mode, dry_run);
    let stream = UnboundedReceiverStream::new(events)
        .map(|event| Ok::<_, Infallible>(Bytes::from(format!("data: {event}\n"))));

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(stream))
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    Ok(response)
}

// -- Shutdown

pub async fn shutdown(State(state): State<AppState>, headers: HeaderMap) -> Result<Response> {
    if !state.config.allow_shutdown {
        return Err(ServerError::ShutdownNotAllowed);
    }
    require_auth(&headers)?;

    info!("endpoint accessed: /shutdown, exiting");
    state.engine.cache().close().await;
    let _exit = tokio::spawn(async {
        // Give the response a moment to flush.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        std::process::exit(0);
    });
    Ok(Json(serde_json::json!({ "status": "ok" })).into_response())
}
