// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `ttn-bridge` - watch and control one The Things Network device from the
//! terminal.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, ValueEnum};
use crossterm::event::{Event, EventStream};
use futures::StreamExt;
use ratatui::DefaultTerminal;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::EnvFilter;

use ttn_bridge::command::DEFAULT_APP_TAG;
use ttn_bridge::config::{
    API_KEY_ENV, ApiKey, BridgeConfig, DEFAULT_CLIENT_ID, DEFAULT_DEVICE_ID, DEFAULT_NAMESPACE,
    DEFAULT_SERVER,
};
use ttn_bridge::protocol::MqttTransport;
use ttn_bridge::ui::{self, Dashboard, UiAction};
use ttn_bridge::{
    BridgeEvent, ControlSurface, DeviceState, MessageBridge, ProtocolError, StartupError,
    ValueError,
};

/// Telemetry bridge for a The Things Network device.
///
/// The API key is read from the `TTN_API_KEY` environment variable.
#[derive(Parser, Debug)]
#[command(name = "ttn-bridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Broker URL
    #[arg(long, default_value = DEFAULT_SERVER)]
    server: String,

    /// MQTT client id (keep it stable to resume the persistent session)
    #[arg(long, default_value = DEFAULT_CLIENT_ID)]
    client_id: String,

    /// Account namespace, also the MQTT username
    #[arg(long, default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Device id
    #[arg(long, default_value = DEFAULT_DEVICE_ID)]
    device: String,

    /// Extra topic filter whose messages are echoed raw (repeatable)
    #[arg(long = "subscribe", value_name = "FILTER")]
    subscribe: Vec<String>,

    /// First reconnect delay in seconds
    #[arg(long, default_value_t = 2)]
    reconnect_initial: u64,

    /// Maximum reconnect delay in seconds
    #[arg(long, default_value_t = 30)]
    reconnect_max: u64,

    /// LoRaWAN port for downlinks
    #[arg(long, default_value_t = 1)]
    downlink_port: u8,

    /// Application tag carried in downlinks
    #[arg(long, default_value = DEFAULT_APP_TAG)]
    app: String,

    /// Run mode
    #[arg(long, value_enum, default_value_t = Mode::Tui)]
    mode: Mode,

    /// Log file used in tui mode
    #[arg(long, default_value = "ttn-bridge.log")]
    log_file: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Terminal dashboard
    Tui,
    /// No UI; log state changes until Ctrl-C
    Log,
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),

    #[error(transparent)]
    Bridge(#[from] ttn_bridge::Error),

    #[error("shutdown failed: {0}")]
    Shutdown(#[from] ProtocolError),

    #[error("terminal error: {0}")]
    Terminal(#[from] std::io::Error),
}

type Bridge = MessageBridge<MqttTransport>;
type Control = ControlSurface<MqttTransport>;

fn init_logging(args: &Args) -> std::io::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    match args.mode {
        Mode::Log => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        Mode::Tui => {
            // The dashboard owns the terminal, so logs go to a file.
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&args.log_file)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
    }
    Ok(())
}

fn build_config(args: &Args) -> Result<BridgeConfig, ValueError> {
    let mut builder = BridgeConfig::builder()
        .server(&args.server)
        .client_id(&args.client_id)
        .namespace(&args.namespace)
        .device_id(&args.device)
        .reconnect(
            Duration::from_secs(args.reconnect_initial),
            Duration::from_secs(args.reconnect_max),
        )
        .downlink_port(args.downlink_port)
        .app_tag(&args.app);
    for filter in &args.subscribe {
        builder = builder.extra_filter(filter);
    }
    builder.build()
}

async fn run(args: Args) -> Result<(), AppError> {
    let api_key = ApiKey::from_env(API_KEY_ENV)?;
    tracing::info!(api_key = %api_key.redacted(), "Loaded API key");

    let config = build_config(&args).map_err(StartupError::from)?;
    let transport = Arc::new(config.transport(&api_key)?);
    let state = Arc::new(DeviceState::new());

    let bridge = MessageBridge::new(
        Arc::clone(&transport),
        Arc::clone(&state),
        config.topics(),
        config.bridge_options(),
    );
    let control = ControlSurface::new(transport, state, config.encoder(), bridge.events().clone());
    let events = bridge.subscribe();

    bridge.start().await?;

    let outcome = match args.mode {
        Mode::Tui => run_tui(&bridge, &control, events, config.topics().device_id())
            .await
            .map_err(AppError::from),
        Mode::Log => {
            run_log(&bridge, events).await;
            Ok(())
        }
    };

    let shutdown = bridge.shutdown().await;
    outcome?;
    shutdown?;
    Ok(())
}

async fn run_log(bridge: &Bridge, mut events: broadcast::Receiver<BridgeEvent>) {
    tracing::info!("Running without UI, press Ctrl-C to stop");

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Could not listen for Ctrl-C");
                }
                break;
            }
            event = events.recv() => match event {
                Ok(BridgeEvent::StateChanged(view)) => tracing::info!(
                    temperature = ?view.last_temperature,
                    led_on = view.led_on,
                    "Device state"
                ),
                Ok(BridgeEvent::Raw { topic, payload }) => {
                    tracing::info!(topic = %topic, payload = %payload, "Raw message");
                }
                Ok(BridgeEvent::Closed) | Err(RecvError::Closed) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Event observer lagged");
                }
            }
        }
    }

    tracing::info!(stats = ?bridge.stats(), "Stopping");
}

async fn run_tui(
    bridge: &Bridge,
    control: &Control,
    mut events: broadcast::Receiver<BridgeEvent>,
    device_id: &str,
) -> std::io::Result<()> {
    let mut terminal = ratatui::try_init()?;
    let result = tui_loop(&mut terminal, bridge, control, &mut events, device_id).await;
    ratatui::restore();
    result
}

fn dispatch(control: &Control, action: UiAction) {
    // Publishes run detached; failures are logged by the control surface.
    let handle = match action {
        UiAction::ToggleLed => control.toggle_led(),
        UiAction::SetLed(on) => control.set_led(on),
        UiAction::Quit => return,
    };
    drop(handle);
}

async fn tui_loop(
    terminal: &mut DefaultTerminal,
    bridge: &Bridge,
    control: &Control,
    events: &mut broadcast::Receiver<BridgeEvent>,
    device_id: &str,
) -> std::io::Result<()> {
    let mut dashboard = Dashboard::new(device_id);
    dashboard.apply(&BridgeEvent::StateChanged(control.view()));
    let mut keys = EventStream::new();
    // Redraw once a second so the reading age stays current.
    let mut tick = tokio::time::interval(Duration::from_secs(1));

    loop {
        dashboard.set_status(bridge.phase(), bridge.stats());
        terminal.draw(|frame| ui::draw(frame, &dashboard, Utc::now()))?;

        tokio::select! {
            key = keys.next() => match key {
                Some(Ok(Event::Key(key))) => match ui::map_key(key) {
                    Some(UiAction::Quit) => break,
                    Some(action) => dispatch(control, action),
                    None => {}
                },
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
                None => break,
            },
            event = events.recv() => match event {
                Ok(event) => dashboard.apply(&event),
                Err(RecvError::Lagged(_)) => {
                    dashboard.apply(&BridgeEvent::StateChanged(control.view()));
                }
                Err(RecvError::Closed) => break,
            },
            _ = tick.tick() => {}
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args) {
        eprintln!("ttn-bridge: cannot open log file {}: {e}", args.log_file.display());
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            eprintln!("ttn-bridge: {e}");
            ExitCode::FAILURE
        }
    }
}
