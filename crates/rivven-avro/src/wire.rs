//! Confluent wire format framing
//!
//! Every framed payload starts with a 5-byte header:
//!
//! ```text
//! [0x00][schema_version: 4 bytes big-endian][avro_binary_data]
//! ```
//!
//! There are no other framing fields.

use crate::error::{Result, TranscodeError};
use crate::types::SchemaVersion;
use bytes::{BufMut, BytesMut};

/// First byte of every framed payload
pub const MAGIC_BYTE: u8 = 0x00;

/// Size of the header in bytes
pub const HEADER_LEN: usize = 5;

/// Parsed frame prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireHeader {
    pub magic: u8,
    pub version: SchemaVersion,
}

impl WireHeader {
    pub fn new(version: SchemaVersion) -> Self {
        Self {
            magic: MAGIC_BYTE,
            version,
        }
    }

    /// Header bytes for this version
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        build_header(self.version)
    }

    /// Append the header to a buffer
    pub fn encode_to(&self, buf: &mut BytesMut) {
        buf.reserve(HEADER_LEN);
        buf.put_u8(self.magic);
        buf.put_u32(self.version.0);
    }
}

/// Split a payload into its header and the schema-encoded body
pub fn parse_header(payload: &[u8]) -> Result<(WireHeader, &[u8])> {
    if payload.len() < HEADER_LEN {
        return Err(TranscodeError::MalformedFrame(format!(
            "payload has {} bytes, header needs {}",
            payload.len(),
            HEADER_LEN
        )));
    }

    if payload[0] != MAGIC_BYTE {
        return Err(TranscodeError::MalformedFrame(format!(
            "unknown magic byte: expected {}, got {}",
            MAGIC_BYTE, payload[0]
        )));
    }

    let version = u32::from_be_bytes([payload[1], payload[2], payload[3], payload[4]]);
    Ok((
        WireHeader::new(SchemaVersion::new(version)),
        &payload[HEADER_LEN..],
    ))
}

/// Header bytes announcing `version`
pub fn build_header(version: SchemaVersion) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[0] = MAGIC_BYTE;
    header[1..HEADER_LEN].copy_from_slice(&version.0.to_be_bytes());
    header
}
