//! Command-line interface.
//!
//! Without a subcommand the bridge itself runs. `ctl` talks to a running
//! bridge over the control socket.

use crate::infrastructure::control::ControlCommand;
use clap::{Parser, Subcommand, ValueEnum};

/// MBBridge controller - turns page-turn commands into screen taps
#[derive(Parser, Debug)]
#[command(name = "mbbridge_controller")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one command to the running bridge
    Ctl {
        /// Shared token, required for anything but read-only queries
        #[arg(long, env = "MBBRIDGE_TOKEN", hide_env_values = true)]
        token: Option<String>,

        #[command(subcommand)]
        command: CtlCommand,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CtlCommand {
    /// Check that the bridge answers
    Ping,
    /// Report an interactive session and start scanning
    ScreenOn,
    /// Report a non-interactive session and stop scanning
    ScreenOff,
    /// Stop and start the scan
    RestartScan,
    /// Start the HTTP listener on the configured port
    StartServer,
    /// Stop the HTTP listener
    StopServer,
    /// Move the HTTP listener to another port
    SetPort {
        #[arg(value_parser = clap::value_parser!(u16).range(1024..))]
        port: u16,
    },
    /// Set the shared token; omit it to disable authentication
    SetToken { token: Option<String> },
    /// Listener, scan and counter summary
    Status,
    /// Command counters
    Stats,
    /// Zero the command counters
    ResetStats,
    /// Inject a command as if it came over HTTP (1 = PREV, 2 = NEXT)
    Simulate {
        #[arg(allow_hyphen_values = true)]
        value: i32,
    },
    /// Configure the protocol log
    ProtocolLog {
        state: Toggle,

        /// Log every advertisement, not only decoded ones
        #[arg(long)]
        scan_all: bool,

        /// Only log frames from this address
        #[arg(long, default_value = "")]
        filter: String,
    },
    /// Print the protocol log
    Logs,
    /// Empty the protocol log
    ClearLogs,
    /// Stop the bridge
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl From<CtlCommand> for ControlCommand {
    fn from(command: CtlCommand) -> Self {
        match command {
            CtlCommand::Ping => ControlCommand::Ping,
            CtlCommand::ScreenOn => ControlCommand::ScreenOn,
            CtlCommand::ScreenOff => ControlCommand::ScreenOff,
            CtlCommand::RestartScan => ControlCommand::RestartScan,
            CtlCommand::StartServer => ControlCommand::StartServer,
            CtlCommand::StopServer => ControlCommand::StopServer,
            CtlCommand::SetPort { port } => ControlCommand::SetPort(port),
            CtlCommand::SetToken { token } => ControlCommand::SetToken(token),
            CtlCommand::Status => ControlCommand::GetStatus,
            CtlCommand::Stats => ControlCommand::GetStats,
            CtlCommand::ResetStats => ControlCommand::ResetStats,
            CtlCommand::Simulate { value } => ControlCommand::Simulate(value),
            CtlCommand::ProtocolLog {
                state,
                scan_all,
                filter,
            } => ControlCommand::SetProtocolLog {
                enabled: state == Toggle::On,
                scan_all,
                address_filter: filter,
            },
            CtlCommand::Logs => ControlCommand::GetProtocolLog,
            CtlCommand::ClearLogs => ControlCommand::ClearProtocolLog,
            CtlCommand::Shutdown => ControlCommand::Shutdown,
        }
    }
}
