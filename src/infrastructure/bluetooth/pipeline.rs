//! Frame pipeline: parser, debouncer and router, plus the raw
//! diagnostic path used while hunting for a device.

use crate::domain::models::CommandKind;
use crate::domain::protocol_log::to_hex;
use crate::domain::router::{BridgeContext, WirelessDecision};
use crate::infrastructure::bluetooth::protocol::{parse_payload, AdvertisementFrame};
use crate::infrastructure::bluetooth::service::ScanGate;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, trace, Level};

pub struct AdvertisementPipeline {
    service: u128,
    context: Arc<BridgeContext>,
    gate: ScanGate,
}

impl AdvertisementPipeline {
    pub fn new(service: u128, context: Arc<BridgeContext>, gate: ScanGate) -> Self {
        Self {
            service,
            context,
            gate,
        }
    }

    /// Drains the frame channel until every sender is gone. Frames still
    /// queued after the scan stopped are discarded.
    pub async fn run(self, mut frames: mpsc::Receiver<AdvertisementFrame>) {
        while let Some(frame) = frames.recv().await {
            if !self.gate.is_open() {
                trace!("Scan stopped, dropping queued frame");
                continue;
            }
            if let Some(decision) = self.on_frame(&frame, frame.received_at) {
                debug!(
                    "Advertisement {:?}: dispatched={} debounced={}",
                    decision.command, decision.dispatched, decision.debounced
                );
            }
        }
        debug!("Frame channel closed, pipeline exiting");
    }

    pub fn on_frame(&self, frame: &AdvertisementFrame, now: Instant) -> Option<WirelessDecision> {
        let log = &self.context.protocol_log;
        let scan_all = log.scan_all();
        let address_ok = log.matches_address(frame.address.as_deref());

        // Diagnostic path: never feeds the dispatch pipeline.
        if scan_all && address_ok {
            let raw = frame.raw.as_deref().map(to_hex).unwrap_or_else(|| "-".to_string());
            log.record(
                Level::INFO,
                &format!(
                    "adv addr={} rssi={} raw={}",
                    frame.address.as_deref().unwrap_or("-"),
                    frame.rssi,
                    raw
                ),
            );
        }

        let parsed = parse_payload(frame, self.service)?;
        let decision = self.context.router.route_wireless(&parsed, now);

        if !scan_all || address_ok {
            let label = match decision.command {
                Some(CommandKind::Prev) => "PREV(0x01)",
                Some(CommandKind::Next) => "NEXT(0x02)",
                _ => "UNKNOWN",
            };
            log.record(
                Level::INFO,
                &format!(
                    "protocol rssi={} src={} len={} data={} cmd={} debounced={}",
                    frame.rssi,
                    parsed.source,
                    parsed.raw_bytes.len(),
                    to_hex(&parsed.raw_bytes),
                    label,
                    decision.debounced
                ),
            );
        }

        Some(decision)
    }
}
