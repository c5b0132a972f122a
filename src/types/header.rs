//! Capture-file header layouts carried on a PCAP-over-IP stream
//!
//! ## Record header (16 bytes)
//!
//! ```text
//! offset 0   ts_sec        u32   capture time, seconds since the epoch
//! offset 4   ts_frac       u32   sub-second part (micro- or nanoseconds)
//! offset 8   captured_len  u32   payload bytes that follow the header
//! offset 12  original_len  u32   length of the frame on the wire
//! ```
//!
//! ## Global header (24 bytes, optional stream preamble)
//!
//! ```text
//! offset 0   magic         u32   a1b2c3d4 (micro) or a1b23c4d (nano)
//! offset 4   version_major u16
//! offset 6   version_minor u16
//! offset 8   thiszone      i32
//! offset 12  sigfigs       u32
//! offset 16  snaplen       u32
//! offset 20  network       u32   link type
//! ```
//!
//! All fields are written in the producer's byte order. [`ByteOrder`] is
//! relative to the host: `Native` means the fields decode with
//! `from_ne_bytes`, `Swapped` means every field must be byte-reversed.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::LinkType;

/// Size of a per-record header in bytes
pub const RECORD_HEADER_SIZE: usize = 16;

/// Size of the capture-file global header in bytes
pub const GLOBAL_HEADER_SIZE: usize = 24;

/// Global header magic for microsecond timestamps
pub const MAGIC_MICROS: u32 = 0xa1b2_c3d4;

/// Global header magic for nanosecond timestamps
pub const MAGIC_NANOS: u32 = 0xa1b2_3c4d;

/// Byte order of header fields relative to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Fields are in host order
    #[default]
    Native,
    /// Fields are byte-reversed relative to the host
    Swapped,
}

impl ByteOrder {
    /// Decode a 32-bit field written in this order
    pub fn read_u32(self, bytes: [u8; 4]) -> u32 {
        let value = u32::from_ne_bytes(bytes);
        match self {
            ByteOrder::Native => value,
            ByteOrder::Swapped => value.swap_bytes(),
        }
    }

    /// Decode a 16-bit field written in this order
    pub fn read_u16(self, bytes: [u8; 2]) -> u16 {
        let value = u16::from_ne_bytes(bytes);
        match self {
            ByteOrder::Native => value,
            ByteOrder::Swapped => value.swap_bytes(),
        }
    }

    /// Encode a 32-bit field in this order
    pub fn write_u32(self, value: u32) -> [u8; 4] {
        match self {
            ByteOrder::Native => value.to_ne_bytes(),
            ByteOrder::Swapped => value.swap_bytes().to_ne_bytes(),
        }
    }

    /// Encode a 16-bit field in this order
    pub fn write_u16(self, value: u16) -> [u8; 2] {
        match self {
            ByteOrder::Native => value.to_ne_bytes(),
            ByteOrder::Swapped => value.swap_bytes().to_ne_bytes(),
        }
    }
}

/// Unit of the sub-second timestamp field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampResolution {
    #[default]
    Micros,
    Nanos,
}

impl TimestampResolution {
    fn frac_to_nanos(self, frac: u32) -> u64 {
        match self {
            TimestampResolution::Micros => frac as u64 * 1_000,
            TimestampResolution::Nanos => frac as u64,
        }
    }
}

/// Per-record header, normalized to host order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordHeader {
    pub ts_sec: u32,
    pub ts_frac: u32,
    pub captured_len: u32,
    pub original_len: u32,
}

impl RecordHeader {
    /// Size of the record header in bytes
    pub const SIZE: usize = RECORD_HEADER_SIZE;

    /// Parse a header whose fields were written in `order`
    pub fn parse(bytes: &[u8; RECORD_HEADER_SIZE], order: ByteOrder) -> Self {
        Self {
            ts_sec: order.read_u32(field(bytes, 0)),
            ts_frac: order.read_u32(field(bytes, 4)),
            captured_len: order.read_u32(field(bytes, 8)),
            original_len: order.read_u32(field(bytes, 12)),
        }
    }

    /// Read only the captured-length field, as used by byte-order detection
    pub fn peek_captured_len(bytes: &[u8; RECORD_HEADER_SIZE], order: ByteOrder) -> u32 {
        order.read_u32(field(bytes, 8))
    }

    /// Encode the header in `order`
    pub fn encode(&self, order: ByteOrder) -> [u8; RECORD_HEADER_SIZE] {
        let mut out = [0u8; RECORD_HEADER_SIZE];
        out[0..4].copy_from_slice(&order.write_u32(self.ts_sec));
        out[4..8].copy_from_slice(&order.write_u32(self.ts_frac));
        out[8..12].copy_from_slice(&order.write_u32(self.captured_len));
        out[12..16].copy_from_slice(&order.write_u32(self.original_len));
        out
    }

    /// A header of all zero bytes never describes a real capture
    pub fn is_zeroed(&self) -> bool {
        self.ts_sec == 0 && self.ts_frac == 0 && self.captured_len == 0 && self.original_len == 0
    }

    /// Capture time as an offset from the Unix epoch
    pub fn timestamp(&self, resolution: TimestampResolution) -> Duration {
        let nanos = resolution.frac_to_nanos(self.ts_frac);
        Duration::from_secs(self.ts_sec as u64) + Duration::from_nanos(nanos)
    }
}

/// Capture-file preamble sent by producers such as `tcpdump -w -`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalHeader {
    pub byte_order: ByteOrder,
    pub resolution: TimestampResolution,
    pub version_major: u16,
    pub version_minor: u16,
    pub thiszone: i32,
    pub sigfigs: u32,
    pub snaplen: u32,
    pub link_type: LinkType,
}

impl GlobalHeader {
    /// Size of the global header in bytes
    pub const SIZE: usize = GLOBAL_HEADER_SIZE;

    /// Recognize a capture-file magic number
    ///
    /// Returns the byte order and timestamp resolution the magic implies, or
    /// `None` when the bytes are not a magic in either order.
    pub fn sniff_magic(bytes: &[u8; 4]) -> Option<(ByteOrder, TimestampResolution)> {
        let native = u32::from_ne_bytes(*bytes);
        let swapped = native.swap_bytes();
        match (native, swapped) {
            (MAGIC_MICROS, _) => Some((ByteOrder::Native, TimestampResolution::Micros)),
            (MAGIC_NANOS, _) => Some((ByteOrder::Native, TimestampResolution::Nanos)),
            (_, MAGIC_MICROS) => Some((ByteOrder::Swapped, TimestampResolution::Micros)),
            (_, MAGIC_NANOS) => Some((ByteOrder::Swapped, TimestampResolution::Nanos)),
            _ => None,
        }
    }

    /// Parse a global header, returning `None` when the magic is unknown
    pub fn parse(bytes: &[u8; GLOBAL_HEADER_SIZE]) -> Option<Self> {
        let (order, resolution) = Self::sniff_magic(&field(bytes, 0))?;
        Some(Self {
            byte_order: order,
            resolution,
            version_major: order.read_u16([bytes[4], bytes[5]]),
            version_minor: order.read_u16([bytes[6], bytes[7]]),
            thiszone: order.read_u32(field(bytes, 8)) as i32,
            sigfigs: order.read_u32(field(bytes, 12)),
            snaplen: order.read_u32(field(bytes, 16)),
            link_type: LinkType(order.read_u32(field(bytes, 20))),
        })
    }

    /// Encode the header in its own byte order
    pub fn encode(&self) -> [u8; GLOBAL_HEADER_SIZE] {
        let order = self.byte_order;
        let magic = match self.resolution {
            TimestampResolution::Micros => MAGIC_MICROS,
            TimestampResolution::Nanos => MAGIC_NANOS,
        };
        let mut out = [0u8; GLOBAL_HEADER_SIZE];
        out[0..4].copy_from_slice(&order.write_u32(magic));
        out[4..6].copy_from_slice(&order.write_u16(self.version_major));
        out[6..8].copy_from_slice(&order.write_u16(self.version_minor));
        out[8..12].copy_from_slice(&order.write_u32(self.thiszone as u32));
        out[12..16].copy_from_slice(&order.write_u32(self.sigfigs));
        out[16..20].copy_from_slice(&order.write_u32(self.snaplen));
        out[20..24].copy_from_slice(&order.write_u32(self.link_type.0));
        out
    }
}

fn field<const N: usize>(bytes: &[u8; N], offset: usize) -> [u8; 4] {
    [bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]]
}
