use crate::domain::auth;
use crate::domain::models::{now_epoch_ms, BridgeStatus, Command, CommandKind, LifecycleEvent};
use crate::domain::router::BridgeContext;
use crate::domain::settings::SettingsService;
use crate::infrastructure::bluetooth::scanner::{PowerMonitor, SessionPowerState};
use crate::infrastructure::bluetooth::ScanLifecycleController;
use crate::infrastructure::control::{ControlCommand, ControlRequest, ControlResponse};
use crate::infrastructure::http_server::CommandIngestionServer;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Source tag for commands injected from the control socket.
pub const SIMULATE_SOURCE: &str = "simulate";

/// Owns everything that must change one step at a time: the scan
/// lifecycle, the listener and the persisted settings.
pub struct BridgeApp {
    settings: SettingsService,
    context: Arc<BridgeContext>,
    server: CommandIngestionServer,
    scanner: ScanLifecycleController,
    power: Arc<SessionPowerState>,
    shutdown_requested: bool,
}

impl BridgeApp {
    pub fn new(
        settings: SettingsService,
        context: Arc<BridgeContext>,
        server: CommandIngestionServer,
        scanner: ScanLifecycleController,
        power: Arc<SessionPowerState>,
    ) -> Self {
        Self {
            settings,
            context,
            server,
            scanner,
            power,
            shutdown_requested: false,
        }
    }

    /// Starts the listener and evaluates the current power state. A failed
    /// bind leaves the bridge running without a listener.
    pub async fn startup(&mut self) {
        if let Err(e) = self.server.start().await {
            error!("HTTP server not started: {}", e);
        }

        if self.power.is_interactive() {
            self.scanner.handle(LifecycleEvent::ScreenOn);
        } else {
            info!("Session not interactive, scan deferred");
        }
    }

    /// Serves control requests and radio notifications until `Shutdown`
    /// or ctrl-c.
    pub async fn run(
        mut self,
        mut requests: mpsc::Receiver<ControlRequest>,
        mut radio_events: mpsc::UnboundedReceiver<LifecycleEvent>,
    ) {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let mut queue_open = true;
        let mut radio_open = true;
        loop {
            tokio::select! {
                request = requests.recv(), if queue_open => {
                    let Some(ControlRequest { command, token, reply }) = request else {
                        warn!("Control queue closed, waiting for Ctrl-C");
                        queue_open = false;
                        continue;
                    };
                    let response = self.handle_request(command, token.as_deref()).await;
                    let _ = reply.send(response);
                    if self.shutdown_requested {
                        break;
                    }
                }
                event = radio_events.recv(), if radio_open => {
                    match event {
                        Some(event) => {
                            self.scanner.handle(event);
                        }
                        None => radio_open = false,
                    }
                }
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received");
                    break;
                }
            }
        }

        self.shutdown().await;
    }

    /// Checks the control token, then runs the command.
    pub async fn handle_request(
        &mut self,
        command: ControlCommand,
        token: Option<&str>,
    ) -> ControlResponse {
        if command.requires_auth() && !auth::verify(self.settings.get().token(), token) {
            warn!(
                "Control command rejected, token validation failed, provided={}",
                auth::redact(token)
            );
            return ControlResponse::Error("Unauthorized: Invalid or missing token".to_string());
        }
        self.handle(command).await
    }

    pub async fn handle(&mut self, command: ControlCommand) -> ControlResponse {
        match command {
            ControlCommand::Ping => ControlResponse::Pong,
            ControlCommand::ScreenOn => {
                self.power.set_interactive(true);
                self.lifecycle(LifecycleEvent::ScreenOn)
            }
            ControlCommand::ScreenOff => {
                self.power.set_interactive(false);
                self.lifecycle(LifecycleEvent::ScreenOff)
            }
            ControlCommand::RestartScan => self.lifecycle(LifecycleEvent::RestartScan),
            ControlCommand::StartServer => match self.server.start().await {
                Ok(addr) => ControlResponse::Success(format!("Listening on {addr}")),
                Err(e) => ControlResponse::Error(format!("Listener failed: {e}")),
            },
            ControlCommand::StopServer => {
                self.server.stop().await;
                ControlResponse::Success("Listener stopped".to_string())
            }
            ControlCommand::SetPort(port) => self.set_port(port).await,
            ControlCommand::SetToken(token) => self.set_token(token.as_deref()),
            ControlCommand::GetStatus => ControlResponse::Status(self.status()),
            ControlCommand::GetStats => ControlResponse::Stats(self.context.router.stats()),
            ControlCommand::ResetStats => {
                self.context.router.reset_stats();
                ControlResponse::Success("Stats reset".to_string())
            }
            ControlCommand::Simulate(value) => {
                let kind = CommandKind::from_value(value);
                self.context
                    .router
                    .route_network(Command::new(kind, now_epoch_ms(), SIMULATE_SOURCE));
                ControlResponse::Success(format!("Simulated {kind}"))
            }
            ControlCommand::SetProtocolLog {
                enabled,
                scan_all,
                address_filter,
            } => self.set_protocol_log(enabled, scan_all, address_filter),
            ControlCommand::GetProtocolLog => {
                ControlResponse::Logs(self.context.protocol_log.snapshot())
            }
            ControlCommand::ClearProtocolLog => {
                self.context.protocol_log.clear();
                ControlResponse::Success("Protocol log cleared".to_string())
            }
            ControlCommand::Shutdown => {
                self.shutdown_requested = true;
                ControlResponse::Success("Shutting down".to_string())
            }
        }
    }

    pub fn status(&self) -> BridgeStatus {
        BridgeStatus {
            server_running: self.server.is_running(),
            port: self.server.port(),
            token_configured: self.server.token_configured(),
            scan_state: self.scanner.state(),
            stats: self.context.router.stats(),
            last_command: self.context.router.last_command().map(|c| c.to_wire()),
        }
    }

    async fn shutdown(&mut self) {
        info!("Shutting down bridge...");
        self.scanner.handle(LifecycleEvent::ScreenOff);
        self.server.stop().await;
    }

    fn lifecycle(&mut self, event: LifecycleEvent) -> ControlResponse {
        let state = self.scanner.handle(event);
        ControlResponse::Success(format!("Scan state: {state:?}"))
    }

    async fn set_port(&mut self, port: u16) -> ControlResponse {
        let port = match self.settings.set_port(u32::from(port)) {
            Ok(port) => port,
            Err(e) => {
                warn!("Port change rejected: {}", e);
                return ControlResponse::Error(e.to_string());
            }
        };
        match self.server.set_port(port).await {
            Ok(()) if self.server.is_running() => {
                ControlResponse::Success(format!("Listening port set to {port}"))
            }
            Ok(()) => ControlResponse::Success(format!(
                "Port {port} saved, listener not running (use start-server)"
            )),
            Err(e) => ControlResponse::Error(format!("Port saved, listener failed: {e}")),
        }
    }

    fn set_token(&mut self, token: Option<&str>) -> ControlResponse {
        if let Err(e) = self.settings.set_token(token) {
            error!("Failed to persist token: {}", e);
            return ControlResponse::Error(e.to_string());
        }
        let token = self.settings.get().token().map(str::to_string);
        let enabled = token.is_some();
        self.server.set_token(token);
        if enabled {
            ControlResponse::Success("Token updated".to_string())
        } else {
            ControlResponse::Success("Token disabled".to_string())
        }
    }

    fn set_protocol_log(
        &mut self,
        enabled: bool,
        scan_all: bool,
        address_filter: String,
    ) -> ControlResponse {
        self.context
            .protocol_log
            .configure(enabled, scan_all, &address_filter);

        let settings = self.settings.get_mut();
        settings.protocol_log_enabled = enabled;
        settings.scan_all_devices = scan_all;
        settings.scan_address_filter = address_filter;
        if let Err(e) = self.settings.save() {
            warn!("Protocol log settings not persisted: {}", e);
        }

        ControlResponse::Success(format!(
            "Protocol log {} (scan_all={})",
            if enabled { "enabled" } else { "disabled" },
            scan_all
        ))
    }
}
