use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wire value for a "previous page" command.
pub const CMD_PREV: i32 = 1;
/// Wire value for a "next page" command.
pub const CMD_NEXT: i32 = 2;

/// Advertisement opcodes (payload byte 0).
pub const OPCODE_PREV: u8 = 0x01;
pub const OPCODE_NEXT: u8 = 0x02;

/// Logical page-turn command carried by both the radio and HTTP paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Prev,
    Next,
    Unknown(i32),
}

impl CommandKind {
    pub fn from_value(v: i32) -> Self {
        match v {
            CMD_PREV => Self::Prev,
            CMD_NEXT => Self::Next,
            other => Self::Unknown(other),
        }
    }

    pub fn value(self) -> i32 {
        match self {
            Self::Prev => CMD_PREV,
            Self::Next => CMD_NEXT,
            Self::Unknown(v) => v,
        }
    }

    /// Screen side that performs this command, if any.
    pub fn tap_side(self) -> Option<TapSide> {
        match self {
            Self::Prev => Some(TapSide::Left),
            Self::Next => Some(TapSide::Right),
            Self::Unknown(_) => None,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prev => write!(f, "PREV"),
            Self::Next => write!(f, "NEXT"),
            Self::Unknown(v) => write!(f, "UNKNOWN({v})"),
        }
    }
}

/// A decoded command. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    kind: CommandKind,
    timestamp: i64,
    source: String,
}

impl Command {
    pub fn new(kind: CommandKind, timestamp: i64, source: impl Into<String>) -> Self {
        Self {
            kind,
            timestamp,
            source: source.into(),
        }
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn to_wire(&self) -> WireCommand {
        WireCommand {
            v: self.kind.value(),
            ts: self.timestamp,
            source: self.source.clone(),
        }
    }
}

impl From<WireCommand> for Command {
    fn from(wire: WireCommand) -> Self {
        Self::new(CommandKind::from_value(wire.v), wire.ts, wire.source)
    }
}

/// `POST /cmd` request body: `{ "v": 1, "ts": 1730000000000, "source": "mbbridge" }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireCommand {
    pub v: i32,
    pub ts: i64,
    pub source: String,
}

impl WireCommand {
    pub fn from_json(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }
}

/// Response body shared by every HTTP endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub ok: u8,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub err: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub app: Option<String>,
}

impl ApiResponse {
    pub fn success() -> Self {
        Self {
            ok: 1,
            err: None,
            app: None,
        }
    }

    pub fn with_app(app: impl Into<String>) -> Self {
        Self {
            app: Some(app.into()),
            ..Self::success()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: 0,
            err: Some(message.into()),
            app: None,
        }
    }
}

/// Running command counters. Only `reset` ever lowers them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandStats {
    pub prev_count: u64,
    pub next_count: u64,
    pub total_count: u64,
}

impl CommandStats {
    pub fn increment(&mut self, kind: CommandKind) {
        match kind {
            CommandKind::Prev => self.prev_count += 1,
            CommandKind::Next => self.next_count += 1,
            CommandKind::Unknown(_) => {}
        }
        self.total_count += 1;
    }

    /// Commands counted in the total but not in a typed counter.
    pub fn unknown_count(&self) -> u64 {
        self.total_count - self.prev_count - self.next_count
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TapSide {
    Left,
    Right,
}

impl fmt::Display for TapSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}

/// Advisory report from the gesture executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapOutcome {
    pub side: TapSide,
    pub x: i32,
    pub y: i32,
    pub dispatched: bool,
}

/// Which advertisement segment carried the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSource {
    ServiceData,
    ManufacturerData,
}

impl PayloadSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ServiceData => "serviceData",
            Self::ManufacturerData => "manufacturerData",
        }
    }
}

impl fmt::Display for PayloadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of decoding one advertisement frame. Discarded after routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPayload {
    pub source: PayloadSource,
    pub raw_bytes: Vec<u8>,
    pub opcode: Option<u8>,
}

impl ParsedPayload {
    /// Mapped command for the opcode; unmapped opcodes yield `None`.
    pub fn command(&self) -> Option<CommandKind> {
        match self.opcode {
            Some(OPCODE_PREV) => Some(CommandKind::Prev),
            Some(OPCODE_NEXT) => Some(CommandKind::Next),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanState {
    Idle,
    Scanning,
}

/// Power and reconfiguration events that drive the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    ScreenOn,
    ScreenOff,
    RestartScan,
    /// The platform stopped the receiver on its own (radio off, access revoked).
    #[cfg_attr(not(windows), allow(dead_code))]
    RadioStopped,
}

/// Snapshot reported over the control socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeStatus {
    pub server_running: bool,
    pub port: u16,
    pub token_configured: bool,
    pub scan_state: ScanState,
    pub stats: CommandStats,
    pub last_command: Option<WireCommand>,
}

pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_kind_from_value() {
        assert_eq!(CommandKind::from_value(1), CommandKind::Prev);
        assert_eq!(CommandKind::from_value(2), CommandKind::Next);
        assert_eq!(CommandKind::from_value(7), CommandKind::Unknown(7));
        assert_eq!(CommandKind::Unknown(7).to_string(), "UNKNOWN(7)");
    }

    #[test]
    fn test_wire_parse_rejects_missing_fields() {
        assert!(WireCommand::from_json(r#"{"v":1,"ts":5}"#).is_err());
        assert!(WireCommand::from_json(r#"{"v":"1","ts":5,"source":"x"}"#).is_err());
        assert!(WireCommand::from_json("not json").is_err());

        let wire =
            WireCommand::from_json(r#"{"v":1,"ts":1730000000000,"source":"mbbridge","x":0}"#)
                .unwrap();
        let cmd = Command::from(wire);
        assert_eq!(cmd.kind(), CommandKind::Prev);
        assert_eq!(cmd.timestamp(), 1_730_000_000_000);
        assert_eq!(cmd.source(), "mbbridge");
    }

    #[test]
    fn test_api_response_omits_absent_fields() {
        assert_eq!(
            serde_json::to_string(&ApiResponse::success()).unwrap(),
            r#"{"ok":1}"#
        );
        assert_eq!(
            serde_json::to_string(&ApiResponse::with_app("MBBridgeCtrl")).unwrap(),
            r#"{"ok":1,"app":"MBBridgeCtrl"}"#
        );
        assert_eq!(
            serde_json::to_string(&ApiResponse::error("nope")).unwrap(),
            r#"{"ok":0,"err":"nope"}"#
        );
    }

    #[test]
    fn test_payload_command_mapping() {
        let payload = |opcode| ParsedPayload {
            source: PayloadSource::ServiceData,
            raw_bytes: vec![],
            opcode,
        };
        assert_eq!(payload(Some(0x01)).command(), Some(CommandKind::Prev));
        assert_eq!(payload(Some(0x02)).command(), Some(CommandKind::Next));
        assert_eq!(payload(Some(0x09)).command(), None);
        assert_eq!(payload(None).command(), None);
    }

    fn any_kind() -> impl Strategy<Value = CommandKind> {
        any::<i32>().prop_map(CommandKind::from_value)
    }

    proptest! {
        #[test]
        fn stats_total_is_sum_of_parts(kinds in proptest::collection::vec(any_kind(), 0..64)) {
            let mut stats = CommandStats::default();
            let mut unknown = 0u64;
            for kind in &kinds {
                if matches!(kind, CommandKind::Unknown(_)) {
                    unknown += 1;
                }
                stats.increment(*kind);
            }
            prop_assert_eq!(stats.total_count, stats.prev_count + stats.next_count + unknown);
            prop_assert_eq!(stats.unknown_count(), unknown);
            prop_assert_eq!(stats.total_count, kinds.len() as u64);
        }

        #[test]
        fn wire_round_trip_preserves_triple(v in any::<i32>(), ts in any::<i64>(), source in ".{0,24}") {
            let cmd = Command::new(CommandKind::from_value(v), ts, source.clone());
            let json = serde_json::to_string(&cmd.to_wire()).unwrap();
            let decoded = Command::from(WireCommand::from_json(&json).unwrap());
            prop_assert_eq!(decoded.to_wire(), WireCommand { v, ts, source });
            prop_assert_eq!(decoded, cmd);
        }
    }
}
