//! Server binary: parse flags, initialize tracing, run the service.

use clap::Parser;
use lib_common::ServerConfig;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Compile FastLED sketches to WASM over HTTP.
#[derive(Debug, Parser)]
#[command(name = "fastled-wasm-server", version)]
struct Args {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 80)]
    port: u16,

    /// Enable the /shutdown endpoint.
    #[arg(long)]
    allow_shutdown: bool,

    /// Disable the sketch cache.
    #[arg(long)]
    no_sketch_cache: bool,

    /// Reject release/debug builds.
    #[arg(long)]
    only_quick_builds: bool,

    /// Skip the toolchain's auto-clean between builds.
    #[arg(long)]
    disable_auto_clean: bool,
}

fn setup_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let json_logs = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    setup_tracing();

    let mut config = ServerConfig::from_env();
    config.port = args.port;
    // Flags only ever turn features on; absence defers to the environment.
    config.allow_shutdown |= args.allow_shutdown;
    config.no_sketch_cache |= args.no_sketch_cache;
    config.only_quick_builds |= args.only_quick_builds;
    config.disable_auto_clean |= args.disable_auto_clean;

    if config.no_sketch_cache {
        tracing::info!("sketch caching disabled");
    }

    lib_server::run(config).await?;
    Ok(())
}
