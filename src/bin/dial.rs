//! Console display for Virtual Detents
//!
//! Connects to the knob controller and redraws the dial whenever it changes.
//! Reads commands from stdin:
//!
//! ```text
//! preset <n>    pick a preset detent count (4, 8, 16, 32)
//! detents <n>   set any detent count
//! slider <e>    move the slider, 0..=detents
//! pos <p>       set the position directly
//! quit
//! ```

use virtual_detents::bus::{self, BusEvent};
use virtual_detents::client::{DialCommand, SyncClient};
use virtual_detents::config;
use virtual_detents::dial::{DialView, DisplayState, PartialDisplayState, PRESET_DETENTS};

use anyhow::{anyhow, bail, Result};
use std::num::NonZeroU32;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Pending UI commands before stdin backs off
const COMMAND_QUEUE: usize = 16;

enum Input {
    Command(DialCommand),
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "virtual_detents=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = config::load_config()?;
    let bus = bus::create_bus();

    let mut events = bus.subscribe();
    let renderer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(BusEvent::DialRendered { view }) => println!("{}", draw(&view)),
                Ok(BusEvent::PeerConnected { url }) => println!("connected to {}", url),
                Ok(BusEvent::PeerClosed { url }) => println!("lost {}", url),
                Ok(BusEvent::ShuttingDown) | Err(RecvError::Closed) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("renderer skipped {} frames", skipped);
                }
            }
        }
    });

    let mut client = SyncClient::new(
        config.peer_url.clone(),
        DisplayState::new(config.dial.detents, 0.0),
        bus.clone(),
    );
    client.render();
    if let Err(e) = client.connect().await {
        tracing::info!("Running without peer: {}", e);
    }

    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE);
    let stdin = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("stdin: {}", e);
                    break;
                }
            };
            match parse_input(&line) {
                Ok(Some(Input::Command(command))) => {
                    if commands_tx.send(command).await.is_err() {
                        break;
                    }
                }
                Ok(Some(Input::Quit)) => break,
                Ok(None) => {}
                Err(e) => eprintln!("{}", e),
            }
        }
    });

    client.run(commands_rx).await;
    client.shutdown().await;

    bus.publish(BusEvent::ShuttingDown);
    stdin.abort();
    if let Err(e) = renderer.await {
        tracing::debug!("renderer: {}", e);
    }
    Ok(())
}

fn parse_input(line: &str) -> Result<Option<Input>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();

    let command = match verb {
        "quit" | "exit" => return Ok(Some(Input::Quit)),
        "preset" => {
            let n = parse_detents(arg)?;
            if !PRESET_DETENTS.contains(&n.get()) {
                bail!("presets are {:?}", PRESET_DETENTS);
            }
            DialCommand::Preset(n)
        }
        "detents" => DialCommand::Update {
            update: PartialDisplayState::detents(parse_detents(arg)?),
            transmit: true,
        },
        "slider" => DialCommand::Slide(parse_number(arg)?),
        "pos" => DialCommand::Update {
            update: PartialDisplayState::pos(parse_number(arg)?),
            transmit: true,
        },
        other => bail!("unknown command {:?}", other),
    };
    Ok(Some(Input::Command(command)))
}

fn parse_number(arg: Option<&str>) -> Result<f64> {
    let arg = arg.ok_or_else(|| anyhow!("missing value"))?;
    let value: f64 = arg.parse()?;
    if !value.is_finite() {
        bail!("{} is not a finite number", arg);
    }
    Ok(value)
}

fn parse_detents(arg: Option<&str>) -> Result<NonZeroU32> {
    let arg = arg.ok_or_else(|| anyhow!("missing detent count"))?;
    NonZeroU32::new(arg.parse()?).ok_or_else(|| anyhow!("detent count must be positive"))
}

fn draw(view: &DialView) -> String {
    let presets: Vec<String> = PRESET_DETENTS
        .iter()
        .map(|n| {
            if view.active_preset == Some(*n) {
                format!("[{}]", n)
            } else {
                format!(" {} ", n)
            }
        })
        .collect();
    format!(
        "{:>9}  rot {:>7.2}°  {}",
        view.label,
        view.rotation_deg,
        presets.join("")
    )
}
