//! devlink sample device
//!
//! Registers a dimmable light with one push button. Every line typed on
//! stdin clicks the button; `q` says goodbye and exits.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use devlink::config::{load_config, load_config_from_path, validate_config, Config};
use devlink::device::{
    dispatch, ButtonSpec, DeviceIdentity, DeviceSession, MessageHandler, OutputKind,
};
use devlink::protocol::{ChannelValue, MoveCommand, StatusReport};
use devlink::{logging, VERSION};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

/// Click duration reported for a stdin line
const CLICK_MS: u32 = 200;

#[derive(Parser)]
#[command(
    name = "devlink-device",
    version = VERSION,
    about = "Sample device: a dimmable light with a push button",
    long_about = None
)]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(long, short, env = "DEVLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Controller host
    #[arg(long)]
    host: Option<String>,

    /// Controller port
    #[arg(long, short)]
    port: Option<u16>,

    /// Unique id announced in `init`
    #[arg(long)]
    unique_id: Option<String>,

    /// Output kind announced in `init`
    #[arg(long)]
    output: Option<String>,

    /// Wait for the controller to acknowledge `init`
    #[arg(long)]
    await_ack: bool,
}

/// Tracks the light's level and answers controller requests
struct SampleLight {
    session: Arc<DeviceSession>,
    level: f64,
}

#[async_trait]
impl MessageHandler for SampleLight {
    async fn on_channel(&mut self, update: ChannelValue) {
        self.level = update.value;
        info!("Light level set to {} (channel {})", update.value, update.index);
    }

    async fn on_move(&mut self, command: MoveCommand) {
        info!("Move request on {}: direction {}", command.index, command.direction);
    }

    async fn on_sync(&mut self) {
        if let Err(e) = self.session.send_channel(0, self.level).await {
            warn!("Failed to report channel value: {}", e);
            return;
        }
        if let Err(e) = self.session.send_synced().await {
            warn!("Failed to confirm sync: {}", e);
        }
    }

    async fn on_status(&mut self, report: StatusReport) {
        if report.is_ok() {
            info!("Controller status ok");
        } else {
            warn!(
                "Controller error {}: {}",
                report.errorcode.unwrap_or_default(),
                report.errormessage.as_deref().unwrap_or("")
            );
        }
    }
}

fn load(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => load_config_from_path(path)?,
        None => load_config()?,
    };

    if let Some(host) = &args.host {
        config.device.controller_host = host.clone();
    }
    if let Some(port) = args.port {
        config.device.controller_port = port;
    }
    if let Some(id) = &args.unique_id {
        config.device.unique_id = id.clone();
    }
    if let Some(output) = &args.output {
        config.device.output = output.clone();
    }
    if args.await_ack {
        config.device.await_init_ack = true;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load(&args)?;
    logging::init(&config.log);

    let validation = validate_config(&config);
    for issue in validation.warnings.iter() {
        warn!("{}", issue);
    }
    if let Some(issue) = validation.errors.first() {
        anyhow::bail!("invalid configuration: {}", issue);
    }

    let addr = config.device.controller_addr();
    let session = Arc::new(
        DeviceSession::connect(&config.device)
            .await
            .with_context(|| format!("connecting to {}", addr))?,
    );

    let output: OutputKind = config.device.output.parse()?;
    let identity = DeviceIdentity::new(config.device.unique_id.clone(), Some(output))
        .with_name("devlink sample light")
        .with_button(ButtonSpec::push("push"))
        .with_dimmable(true)
        .with_sync(true);
    session.register(identity).await.context("registering device")?;
    info!("Registered as {} with {}", config.device.unique_id, addr);

    let messages = session.messages()?;
    let mut light = SampleLight {
        session: Arc::clone(&session),
        level: 0.0,
    };
    let handler = tokio::spawn(async move { dispatch(messages, &mut light).await });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim() == "q" => break,
                Ok(Some(_)) => {
                    if let Err(e) = session.send_button_event(0, CLICK_MS).await {
                        error!("Button event failed: {}", e);
                        break;
                    }
                }
                Ok(None) => {
                    // stdin closed; keep serving the controller
                    tokio::select! {
                        _ = session.closed() => {}
                        _ = tokio::signal::ctrl_c() => {}
                    }
                    break;
                }
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break;
                }
            },
            _ = session.closed() => {
                warn!("Controller closed the connection");
                break;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if let Err(e) = session.bye().await {
        info!("Session already closed: {}", e);
    }
    let seen = handler.await.unwrap_or_default();
    info!("Handled {} controller messages", seen);
    Ok(())
}
