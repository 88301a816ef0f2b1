//! fluxcheck server launcher.
//!
//! ```bash
//! fluxcheck --port 5000 --prefix /validator
//! fluxcheck --config fluxcheck.toml --workers 4 --debug
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use fluxcheck::core::Config;
use std::path::PathBuf;

/// Command line arguments. Flags override values from the config file.
#[derive(Parser, Debug)]
#[command(name = "fluxcheck", version)]
#[command(about = "Validation service for SBML and JSON metabolic models", long_about = None)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Interface to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Path prefix for the upload route
    #[arg(long)]
    prefix: Option<String>,

    /// Number of worker threads
    #[arg(short, long)]
    workers: Option<usize>,

    /// Log at debug level
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => Config::default(),
        };
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(prefix) = &self.prefix {
            config.server.prefix = prefix.clone();
        }
        if let Some(workers) = self.workers {
            config.pool.workers = workers;
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = args.load_config()?;
    log::info!("{} v{} starting", fluxcheck::NAME, fluxcheck::VERSION);
    fluxcheck::server::serve(config).await?;
    Ok(())
}
