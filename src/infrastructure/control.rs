//! Local control socket.
//!
//! One JSON document per line in each direction. Every message is handed
//! to the coordinator queue and answered with whatever it replies.
//! Commands that change behavior carry the same token as `/cmd`.

use crate::domain::auth;
use crate::domain::models::{BridgeStatus, CommandStats};
use anyhow::Result;
use interprocess::local_socket::{
    traits::ListenerExt, GenericFilePath, GenericNamespaced, ListenerOptions, Name, NameType,
    Stream as LocalStream, ToFsName, ToNsName,
};
use interprocess::TryClone;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

pub const CONTROL_SOCKET_NAME: &str = "mbbridge_control";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Ping,
    ScreenOn,
    ScreenOff,
    RestartScan,
    StartServer,
    StopServer,
    SetPort(u16),
    SetToken(Option<String>),
    GetStatus,
    GetStats,
    ResetStats,
    Simulate(i32),
    SetProtocolLog {
        enabled: bool,
        scan_all: bool,
        address_filter: String,
    },
    GetProtocolLog,
    ClearProtocolLog,
    Shutdown,
}

impl ControlCommand {
    /// Everything except the read-only queries needs the token.
    pub fn requires_auth(&self) -> bool {
        !matches!(
            self,
            ControlCommand::Ping
                | ControlCommand::GetStatus
                | ControlCommand::GetStats
                | ControlCommand::GetProtocolLog
        )
    }
}

/// One line on the control socket.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub command: ControlCommand,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum ControlResponse {
    Pong,
    Success(String),
    Status(BridgeStatus),
    Stats(CommandStats),
    Logs(Vec<String>),
    Error(String),
}

/// A command waiting for the coordinator, with the slot for its answer.
#[derive(Debug)]
pub struct ControlRequest {
    pub command: ControlCommand,
    pub token: Option<String>,
    pub reply: oneshot::Sender<ControlResponse>,
}

/// Abstract namespace where the platform has one, a socket file in the
/// temp dir otherwise.
pub fn control_socket_name() -> Result<Name<'static>> {
    if GenericNamespaced::is_supported() {
        Ok(CONTROL_SOCKET_NAME.to_ns_name::<GenericNamespaced>()?)
    } else {
        let path = std::env::temp_dir().join(format!("{CONTROL_SOCKET_NAME}.sock"));
        Ok(path.to_fs_name::<GenericFilePath>()?)
    }
}

/// Blocking accept loop; run it on a dedicated thread. Returns when the
/// listener cannot be created.
pub fn run_control_listener(requests: mpsc::Sender<ControlRequest>) -> Result<()> {
    let listener = ListenerOptions::new()
        .name(control_socket_name()?)
        .try_overwrite(true)
        .create_sync()?;

    info!("Control socket listening ({})", CONTROL_SOCKET_NAME);

    for conn in listener.incoming().filter_map(|x| x.ok()) {
        debug!("Control client connected");
        let requests = requests.clone();
        std::thread::spawn(move || {
            if let Err(e) = handle_connection(conn, &requests) {
                error!("Control connection error: {}", e);
            }
        });
    }

    Ok(())
}

fn handle_connection(mut stream: LocalStream, requests: &mpsc::Sender<ControlRequest>) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut buffer = String::new();

    loop {
        buffer.clear();
        if reader.read_line(&mut buffer)? == 0 {
            break;
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<ControlMessage>(&buffer) {
            Ok(message) => {
                info!("Control command: {:?}", redacted(&message.command));
                dispatch(message, requests)
            }
            Err(e) => {
                warn!("Malformed control command: {}", e);
                ControlResponse::Error(format!("Malformed command: {e}"))
            }
        };

        let json = serde_json::to_string(&response)? + "\n";
        stream.write_all(json.as_bytes())?;
        stream.flush()?;
    }
    Ok(())
}

/// Forwards `message` to the coordinator and waits for its answer.
/// Must not be called from inside the async runtime.
pub fn dispatch(message: ControlMessage, requests: &mpsc::Sender<ControlRequest>) -> ControlResponse {
    let (reply, answer) = oneshot::channel();
    let request = ControlRequest {
        command: message.command,
        token: message.token,
        reply,
    };
    if requests.blocking_send(request).is_err() {
        return ControlResponse::Error("Bridge is shutting down".to_string());
    }
    answer
        .blocking_recv()
        .unwrap_or_else(|_| ControlResponse::Error("No response from bridge".to_string()))
}

fn redacted(command: &ControlCommand) -> ControlCommand {
    match command {
        ControlCommand::SetToken(token) => {
            ControlCommand::SetToken(Some(auth::redact(token.as_deref()).to_string()))
        }
        other => other.clone(),
    }
}
