mod app;
mod cli;
mod domain;
mod infrastructure;

use crate::app::BridgeApp;
use crate::cli::{Cli, Commands};
use crate::domain::protocol_log::ProtocolLog;
use crate::domain::router::BridgeContext;
use crate::domain::settings::SettingsService;
use crate::infrastructure::bluetooth::protocol::{parse_uuid, SERVICE_UUID};
use crate::infrastructure::bluetooth::scanner::{
    platform_radio, SessionPowerState, FRAME_CHANNEL_CAPACITY,
};
use crate::infrastructure::bluetooth::{AdvertisementPipeline, ScanLifecycleController};
use crate::infrastructure::control::run_control_listener;
use crate::infrastructure::control_client;
use crate::infrastructure::http_server::{CommandIngestionServer, ServerState};
use crate::infrastructure::input_simulator::{platform_executor, run_tap_worker};
use crate::infrastructure::logging::init_logger;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

const CONTROL_QUEUE_CAPACITY: usize = 16;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Some(Commands::Ctl { token, command }) = cli.command {
        return control_client::run(command.into(), token);
    }

    let settings = SettingsService::new()?;
    let _log_guard = init_logger(&settings.get().log_settings)?;
    info!("Starting MBBridge controller");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_bridge(settings))
}

async fn run_bridge(settings: SettingsService) -> anyhow::Result<()> {
    let config = settings.get().clone();

    let service = match parse_uuid(&config.ble_service_uuid) {
        Ok(uuid) => uuid,
        Err(e) => {
            warn!(
                "Invalid service UUID {:?} ({}), using default",
                config.ble_service_uuid, e
            );
            parse_uuid(SERVICE_UUID)?
        }
    };

    let (tap_tx, tap_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_tap_worker(tap_rx, platform_executor()));

    let protocol_log = ProtocolLog::new(
        config.protocol_log_enabled,
        config.scan_all_devices,
        &config.scan_address_filter,
    );
    let context = Arc::new(BridgeContext::new(tap_tx, protocol_log));

    // The bridge is launched from an active session.
    let power = Arc::new(SessionPowerState::new(true));
    let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
    let (radio_tx, radio_rx) = mpsc::unbounded_channel();
    let scanner =
        ScanLifecycleController::new(platform_radio(frame_tx, radio_tx), power.clone());
    let pipeline = AdvertisementPipeline::new(service, context.clone(), scanner.gate());
    tokio::spawn(pipeline.run(frame_rx));

    let state = ServerState::new(context.clone(), config.token().map(str::to_string));
    let server = CommandIngestionServer::new(config.server_port, state)?;

    let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE_CAPACITY);
    std::thread::spawn(move || {
        if let Err(e) = run_control_listener(control_tx) {
            error!("Control socket unavailable: {}", e);
        }
    });

    let mut app = BridgeApp::new(settings, context, server, scanner, power);
    app.startup().await;
    app.run(control_rx, radio_rx).await;

    info!("MBBridge controller stopped");
    Ok(())
}
