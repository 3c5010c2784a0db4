use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info};
use tracing::level_filters::LevelFilter;

use webserv::config::Config;
use webserv::server::ServerError;
use webserv::server::manager::ConnectionManager;

#[derive(Debug, Parser)]
#[command(name = "webserv", version, about = "HTTP/1.1 server for static files, uploads and CGI")]
struct Args {
    /// Configuration file
    config: PathBuf,

    /// Validate the configuration, print it as YAML and exit
    #[arg(long)]
    check: bool,

    /// trace, debug, info, warn or error
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

async fn serve(path: &Path) -> Result<(), ServerError> {
    let config = Config::load(path)?;
    if let Ok(yaml) = config.to_yaml() {
        debug!("Loaded configuration:\n{yaml}");
    }
    ConnectionManager::bind(&config)?.run().await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(args.log_level)
        .init();

    if args.check {
        let config = Config::load(&args.config)
            .with_context(|| format!("invalid configuration {}", args.config.display()))?;
        print!("{}", config.to_yaml().context("failed to render configuration")?);
        return Ok(());
    }

    loop {
        let result = tokio::select! {
            res = serve(&args.config) => res,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                return Ok(());
            }
        };

        match result {
            Ok(()) => return Ok(()),
            Err(e) if e.is_fatal() => {
                return Err(e).with_context(|| format!("cannot serve {}", args.config.display()));
            }
            Err(e) => {
                error!(error = %e, "Server loop failed, restarting");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
