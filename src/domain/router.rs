//! Command Router
//!
//! Single entry point for commands from both producers. Debounce state,
//! counters and the last command live behind one lock so the radio
//! callback and HTTP handlers never interleave partial updates.

use crate::domain::debounce::CommandDebouncer;
use crate::domain::models::{
    now_epoch_ms, Command, CommandKind, CommandStats, ParsedPayload, TapSide,
};
use crate::domain::protocol_log::ProtocolLog;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Request handed to the gesture worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapRequest {
    pub side: TapSide,
    pub command: Command,
}

/// What happened to a decoded radio frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WirelessDecision {
    pub command: Option<CommandKind>,
    pub debounced: bool,
    pub dispatched: bool,
}

#[derive(Default)]
struct CoreState {
    debouncer: CommandDebouncer,
    stats: CommandStats,
    last_command: Option<Command>,
}

pub struct CommandRouter {
    state: Mutex<CoreState>,
    taps: mpsc::UnboundedSender<TapRequest>,
}

impl CommandRouter {
    pub fn new(taps: mpsc::UnboundedSender<TapRequest>) -> Self {
        Self {
            state: Mutex::new(CoreState::default()),
            taps,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CoreState> {
        // Counters stay consistent even if a holder panicked mid-update.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Routes an authenticated network command. No debounce applies.
    pub fn route_network(&self, command: Command) {
        let mut state = self.lock();
        self.publish(&mut state, command);
    }

    /// Runs a decoded frame through the debouncer and, if accepted,
    /// routes it as a command attributed to the payload source.
    pub fn route_wireless(&self, parsed: &ParsedPayload, now: Instant) -> WirelessDecision {
        let kind = parsed.command();
        let mut state = self.lock();

        if !state.debouncer.accept(now, kind.is_some()) {
            return WirelessDecision {
                command: kind,
                debounced: kind.is_some(),
                dispatched: false,
            };
        }

        // accept() only passes frames that carry a mapped opcode
        let Some(kind) = kind else {
            return WirelessDecision {
                command: None,
                debounced: false,
                dispatched: false,
            };
        };

        let command = Command::new(kind, now_epoch_ms(), format!("ble:{}", parsed.source));
        let dispatched = self.publish(&mut state, command);
        WirelessDecision {
            command: Some(kind),
            debounced: false,
            dispatched,
        }
    }

    fn publish(&self, state: &mut CoreState, command: Command) -> bool {
        let kind = command.kind();
        state.stats.increment(kind);
        info!(
            "Command routed: {} v={} ts={} source={}",
            kind,
            kind.value(),
            command.timestamp(),
            command.source()
        );

        let dispatched = match kind.tap_side() {
            Some(side) => {
                let request = TapRequest {
                    side,
                    command: command.clone(),
                };
                match self.taps.send(request) {
                    Ok(()) => {
                        debug!("Tap request queued: {}", side);
                        true
                    }
                    Err(_) => {
                        warn!("Gesture worker is gone, dropping tap {}", side);
                        false
                    }
                }
            }
            None => false,
        };

        state.last_command = Some(command);
        dispatched
    }

    pub fn stats(&self) -> CommandStats {
        self.lock().stats
    }

    pub fn reset_stats(&self) {
        self.lock().stats.reset();
        info!("Command stats reset");
    }

    pub fn last_command(&self) -> Option<Command> {
        self.lock().last_command.clone()
    }
}

/// Shared state handed to every component.
pub struct BridgeContext {
    pub router: CommandRouter,
    pub protocol_log: ProtocolLog,
}

impl BridgeContext {
    pub fn new(taps: mpsc::UnboundedSender<TapRequest>, protocol_log: ProtocolLog) -> Self {
        Self {
            router: CommandRouter::new(taps),
            protocol_log,
        }
    }
}
