#[path = "lentra/args.rs"]
mod args;
#[path = "lentra/build.rs"]
mod build;

use anyhow::Context;
use clap::Parser;

use lentra::api::{router, serve};
use lentra::config::load_config;
use lentra::logging::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = args::CliArgs::parse();
    let loaded = load_config(args.config.clone()).context("loading config")?;
    let mut config = loaded.config;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    init_logging(&config.logging)?;
    if loaded.exists {
        log::info!("config loaded path={}", loaded.path.display());
    } else {
        log::warn!(
            "config file not found, using defaults path={}",
            loaded.path.display()
        );
    }

    let state = build::build_state(&config)?;
    let addr = args.addr.unwrap_or_else(|| config.server.addr());
    let app = router(state, &config.server.cors_origins);
    serve(app, &addr)
        .await
        .with_context(|| format!("serving on {addr}"))
}
