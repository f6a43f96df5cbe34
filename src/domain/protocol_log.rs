use crate::domain::models::now_epoch_ms;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use tracing::Level;

const MAX_LINES: usize = 200;

/// Bounded buffer of radio diagnostics, readable over the control socket.
pub struct ProtocolLog {
    enabled: AtomicBool,
    scan_all: AtomicBool,
    address_filter: RwLock<String>,
    lines: Mutex<VecDeque<String>>,
}

impl ProtocolLog {
    pub fn new(enabled: bool, scan_all: bool, address_filter: &str) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            scan_all: AtomicBool::new(scan_all),
            address_filter: RwLock::new(address_filter.trim().to_string()),
            lines: Mutex::new(VecDeque::with_capacity(MAX_LINES)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn scan_all(&self) -> bool {
        self.scan_all.load(Ordering::Relaxed)
    }

    pub fn configure(&self, enabled: bool, scan_all: bool, address_filter: &str) {
        self.enabled.store(enabled, Ordering::Relaxed);
        self.scan_all.store(scan_all, Ordering::Relaxed);
        if let Ok(mut filter) = self.address_filter.write() {
            *filter = address_filter.trim().to_string();
        }
    }

    /// Blank filter matches every address.
    pub fn matches_address(&self, address: Option<&str>) -> bool {
        let Ok(filter) = self.address_filter.read() else {
            return true;
        };
        if filter.is_empty() {
            return true;
        }
        address.is_some_and(|addr| addr.eq_ignore_ascii_case(&filter))
    }

    /// Emits through tracing and keeps a copy while enabled.
    pub fn record(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!(target: "protocol", "{message}"),
            Level::WARN => tracing::warn!(target: "protocol", "{message}"),
            _ => tracing::info!(target: "protocol", "{message}"),
        }

        if !self.is_enabled() {
            return;
        }
        let line = format!("ts={} {}: {}", now_epoch_ms(), level, message);
        if let Ok(mut lines) = self.lines.lock() {
            while lines.len() >= MAX_LINES {
                lines.pop_front();
            }
            lines.push_back(line);
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.clear();
        }
    }
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_log_keeps_nothing() {
        let log = ProtocolLog::new(false, false, "");
        log.record(Level::INFO, "hello");
        assert!(log.snapshot().is_empty());
    }

    #[test]
    fn test_ring_is_bounded() {
        let log = ProtocolLog::new(true, false, "");
        for i in 0..(MAX_LINES + 25) {
            log.record(Level::INFO, &format!("line {i}"));
        }
        let lines = log.snapshot();
        assert_eq!(lines.len(), MAX_LINES);
        assert!(lines[0].ends_with("INFO: line 25"));
        assert!(lines.last().unwrap().ends_with(&format!("line {}", MAX_LINES + 24)));

        log.clear();
        assert!(log.snapshot().is_empty());
    }

    #[test]
    fn test_address_filter() {
        let log = ProtocolLog::new(true, true, "");
        assert!(log.matches_address(None));

        log.configure(true, true, " aa:bb:cc:dd:ee:ff ");
        assert!(log.matches_address(Some("AA:BB:CC:DD:EE:FF")));
        assert!(!log.matches_address(Some("11:22:33:44:55:66")));
        assert!(!log.matches_address(None));
    }

    #[test]
    fn test_to_hex() {
        assert_eq!(to_hex(&[0x01, 0xAB, 0x00]), "01AB00");
        assert_eq!(to_hex(&[]), "");
    }
}
