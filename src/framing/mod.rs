//! Record framing over a byte stream.
//!
//! A PCAP-over-IP stream is an optional 24-byte capture-file preamble
//! followed by records, each a 16-byte header and `captured_len` payload
//! bytes. Nothing aligns records with reads, so [`RecordFramer`] works from
//! whatever the ingest buffer holds and reports [`FrameStatus::NeedMore`]
//! until a full record is present.

mod detect;
mod framer;

pub use detect::detect_byte_order;
pub use framer::{FrameStatus, RecordFramer};
