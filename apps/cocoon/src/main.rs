use std::path::PathBuf;

use {
    anyhow::Result,
    clap::Parser,
    cocoon_gateway::{AppState, config, server},
    tracing::info,
};

/// Containment proxy that keeps browsed pages inside itself.
///
/// Fetches a target page on the browser's behalf, rewrites every reference
/// in it to route back through the proxy, and strips the headers that would
/// let the page escape or lock itself down.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Address to bind the HTTP server to. Overrides the config file.
    #[arg(long, env = "COCOON_BIND")]
    bind: Option<String>,

    /// Port to listen on. Overrides the config file.
    #[arg(long, env = "COCOON_PORT")]
    port: Option<u16>,

    /// Path to a cocoon.toml config file. Defaults to the working directory.
    #[arg(long, env = "COCOON_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => config::load_from(path),
        None => config::discover_and_load(),
    };
    if let Some(bind) = args.bind {
        cfg.server.bind = bind;
    }
    if let Some(port) = args.port {
        cfg.server.port = port;
    }

    info!(
        bind = %cfg.server.bind,
        port = cfg.server.port,
        spoof_user_agent = cfg.upstream.spoof_user_agent,
        "starting cocoon"
    );

    let bind = cfg.server.bind.clone();
    let port = cfg.server.port;
    let state = AppState::new(cfg)?;
    server::serve(state, &bind, port).await
}
