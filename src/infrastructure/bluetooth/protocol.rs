//! Page-turner advertisement protocol
//!
//! A peripheral broadcasts a frame that declares [`SERVICE_UUID`] and
//! carries at least one payload byte. Byte 0 is the opcode:
//!
//! ```text
//! [0]   : opcode   0x01 = PREV, 0x02 = NEXT, anything else ignored
//! [1..] : reserved
//! ```
//!
//! The payload normally travels as service data keyed by the UUID. Some
//! firmwares put it in manufacturer data instead, so that is accepted as a
//! fallback when the frame still advertises the UUID.

use crate::domain::models::{PayloadSource, ParsedPayload};
use anyhow::Result;
use std::time::Instant;

/// Default 128-bit service identifier shared with the wearable firmware.
/// Not a secret: it only keeps unrelated advertisements out.
pub const SERVICE_UUID: &str = "c76393eb-1994-4b4d-b1e2-1d7bde0571fa";

/// Platform-neutral view of one received advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementFrame {
    /// When the radio callback saw the frame; debounce runs on this.
    pub received_at: Instant,
    pub address: Option<String>,
    pub rssi: i16,
    /// 128-bit identifiers listed in the frame.
    pub service_uuids: Vec<u128>,
    /// `(service uuid, payload)` pairs.
    pub service_data: Vec<(u128, Vec<u8>)>,
    /// `(company id, payload)` pairs, in frame order.
    pub manufacturer_data: Vec<(u16, Vec<u8>)>,
    /// Raw advertisement bytes, when the platform exposes them.
    pub raw: Option<Vec<u8>>,
}

impl Default for AdvertisementFrame {
    fn default() -> Self {
        Self {
            received_at: Instant::now(),
            address: None,
            rssi: 0,
            service_uuids: Vec::new(),
            service_data: Vec::new(),
            manufacturer_data: Vec::new(),
            raw: None,
        }
    }
}

impl AdvertisementFrame {
    fn service_data_for(&self, service: u128) -> Option<&[u8]> {
        self.service_data
            .iter()
            .find(|(uuid, _)| *uuid == service)
            .map(|(_, data)| data.as_slice())
    }

    fn advertises(&self, service: u128) -> bool {
        self.service_uuids.contains(&service)
    }
}

/// Extracts the opcode payload from a frame.
///
/// Returns `None` for frames that do not belong to `service`. Unmapped
/// opcodes still produce a payload so they can be logged.
pub fn parse_payload(frame: &AdvertisementFrame, service: u128) -> Option<ParsedPayload> {
    let (source, payload) = match frame.service_data_for(service) {
        Some(data) if !data.is_empty() => (PayloadSource::ServiceData, data),
        _ if frame.advertises(service) => {
            let (_, data) = frame.manufacturer_data.first()?;
            (PayloadSource::ManufacturerData, data.as_slice())
        }
        _ => return None,
    };

    Some(ParsedPayload {
        source,
        raw_bytes: payload.to_vec(),
        opcode: payload.first().copied(),
    })
}

/// Parses a textual UUID (`8-4-4-4-12`) into its 128-bit value.
pub fn parse_uuid(uuid_str: &str) -> Result<u128> {
    let uuid_str = uuid_str.trim().replace('-', "");

    if uuid_str.len() != 32 || !uuid_str.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(anyhow::anyhow!("Invalid UUID format"));
    }

    Ok(u128::from_str_radix(&uuid_str, 16)?)
}
