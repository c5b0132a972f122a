//! Framed records and the pipeline packet buffers they are copied into

use std::time::Duration;

use super::{LinkType, RecordHeader};
use crate::config::ChecksumMode;

/// One framed record: normalized header plus its captured payload
///
/// Produced by the framer and handed to the driving loop, which copies the
/// payload into a pipeline [`Packet`] and drops the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketRecord {
    /// Header with fields in host order
    pub header: RecordHeader,

    /// Capture time as an offset from the Unix epoch
    pub timestamp: Duration,

    /// Link type in effect for the stream that carried this record
    pub link_type: LinkType,

    /// Exactly `header.captured_len` bytes
    pub payload: Vec<u8>,
}

impl PacketRecord {
    /// Number of payload bytes
    pub fn captured_len(&self) -> usize {
        self.payload.len()
    }
}

/// Packet buffer owned by the downstream pipeline
///
/// Buffers are handed out empty by the packet pool, filled by the
/// acquisition worker, and then either submitted or released back to the
/// pool. `data` keeps its allocation across reuse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    pub timestamp: Duration,
    pub link_type: LinkType,
    pub data: Vec<u8>,
    pub original_len: u32,
    pub checksum_mode: ChecksumMode,
}

impl Packet {
    /// Create an empty buffer with room for `capacity` payload bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self { data: Vec::with_capacity(capacity), ..Default::default() }
    }

    /// Number of captured bytes held
    pub fn captured_len(&self) -> usize {
        self.data.len()
    }

    /// Copy a framed record into this buffer, replacing previous contents
    pub fn fill_from(&mut self, record: &PacketRecord, checksum_mode: ChecksumMode) {
        self.timestamp = record.timestamp;
        self.link_type = record.link_type;
        self.original_len = record.header.original_len;
        self.checksum_mode = checksum_mode;
        self.data.clear();
        self.data.extend_from_slice(&record.payload);
    }

    /// Reset to the empty state while keeping the allocation
    pub fn clear(&mut self) {
        self.timestamp = Duration::ZERO;
        self.link_type = LinkType::default();
        self.original_len = 0;
        self.checksum_mode = ChecksumMode::default();
        self.data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(payload: &[u8]) -> PacketRecord {
        PacketRecord {
            header: RecordHeader {
                ts_sec: 5,
                ts_frac: 0,
                captured_len: payload.len() as u32,
                original_len: 1500,
            },
            timestamp: Duration::from_secs(5),
            link_type: LinkType::RAW,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn fill_replaces_previous_contents() {
        let mut packet = Packet::with_capacity(16);
        packet.fill_from(&record(&[1, 2, 3, 4, 5]), ChecksumMode::Auto);
        packet.fill_from(&record(&[9, 9]), ChecksumMode::Disabled);

        assert_eq!(packet.data, vec![9, 9]);
        assert_eq!(packet.captured_len(), 2);
        assert_eq!(packet.original_len, 1500);
        assert_eq!(packet.link_type, LinkType::RAW);
        assert_eq!(packet.checksum_mode, ChecksumMode::Disabled);
    }

    #[test]
    fn clear_keeps_allocation() {
        let mut packet = Packet::with_capacity(2048);
        packet.fill_from(&record(&[0u8; 1024]), ChecksumMode::Enabled);
        packet.clear();

        assert!(packet.data.is_empty());
        assert!(packet.data.capacity() >= 2048);
        assert_eq!(packet, Packet { data: packet.data.clone(), ..Default::default() });
    }
}
