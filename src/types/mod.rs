//! Core types for PCAP-over-IP acquisition.
//!
//! ## Architecture
//!
//! - [`RecordHeader`] and [`GlobalHeader`] describe the capture-file layouts on the wire
//! - [`ByteOrder`] normalizes header fields written by big- or little-endian producers
//! - [`PacketRecord`] is one framed record, owned until copied into a [`Packet`]
//! - [`Packet`] is the buffer type exchanged with the downstream pipeline
//! - [`Counters`] and [`ConnectionState`] are published by each worker
//!
//! ## Usage Example
//!
//! ```rust
//! use pcap_over_ip::types::{ByteOrder, RecordHeader, TimestampResolution};
//! use std::time::Duration;
//!
//! let header = RecordHeader { ts_sec: 1, ts_frac: 500_000, captured_len: 60, original_len: 60 };
//! let wire = header.encode(ByteOrder::Swapped);
//!
//! let parsed = RecordHeader::parse(&wire, ByteOrder::Swapped);
//! assert_eq!(parsed.captured_len, 60);
//! assert_eq!(parsed.timestamp(TimestampResolution::Micros), Duration::from_millis(1500));
//! ```

mod counters;
mod header;
mod link_type;
mod packet;

pub use counters::*;
pub use header::*;
pub use link_type::*;
pub use packet::*;
