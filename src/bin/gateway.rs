//! devlink HTTP gateway
//!
//! Relays every HTTP request to the controller as one JSON record and
//! returns the controller's reply.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use devlink::config::{load_config, load_config_from_path, validate_config, Config};
use devlink::{gateway, logging, VERSION};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(
    name = "devlink-gateway",
    version = VERSION,
    about = "HTTP to line-delimited JSON gateway",
    long_about = None
)]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(long, short, env = "DEVLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind the HTTP listener to
    #[arg(long)]
    bind: Option<String>,

    /// HTTP port
    #[arg(long, short)]
    port: Option<u16>,

    /// Controller host
    #[arg(long)]
    target_host: Option<String>,

    /// Controller port
    #[arg(long)]
    target_port: Option<u16>,

    /// Connect and read timeout, e.g. `10s` or `500ms`
    #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
    timeout: Option<Duration>,
}

fn load(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => load_config_from_path(path)?,
        None => load_config()?,
    };

    let gateway = &mut config.gateway;
    if let Some(bind) = &args.bind {
        gateway.bind = bind.clone();
    }
    if let Some(port) = args.port {
        gateway.port = port;
    }
    if let Some(host) = &args.target_host {
        gateway.target_host = host.clone();
    }
    if let Some(port) = args.target_port {
        gateway.target_port = port;
    }
    if let Some(timeout) = args.timeout {
        gateway.connect_timeout = timeout;
        gateway.read_timeout = timeout;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load(&args)?;
    logging::init(&config.log);

    let validation = validate_config(&config);
    for issue in &validation.warnings {
        warn!("{}", issue);
    }
    if !validation.valid {
        for issue in &validation.errors {
            error!("{}", issue);
        }
        anyhow::bail!("invalid configuration ({} errors)", validation.errors.len());
    }

    info!("Starting devlink gateway {}", VERSION);
    gateway::serve(&config.gateway).await?;
    Ok(())
}
