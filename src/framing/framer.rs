//! Record framer state machine

use tracing::{debug, info, trace, warn};

use super::detect::detect_byte_order;
use crate::config::{ByteOrderMode, SourceConfig};
use crate::ingest::IngestBuffer;
use crate::types::{
    ByteOrder, GLOBAL_HEADER_SIZE, GlobalHeader, LinkType, PacketRecord, RECORD_HEADER_SIZE, RecordHeader,
    TimestampResolution,
};
use crate::{AcquisitionError, Result};

/// Outcome of one framing attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameStatus {
    /// A complete record was framed and its bytes consumed
    Record(PacketRecord),
    /// At least `needed` more bytes must be buffered before progress is possible
    NeedMore { needed: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Start of a stream; a capture-file preamble may follow
    StreamStart,
    AwaitingHeader,
    AwaitingPayload { header: RecordHeader },
}

/// Turns buffered stream bytes into [`PacketRecord`]s, one at a time
///
/// The framer never assumes a read lines up with a record: it inspects the
/// unconsumed bytes of an [`IngestBuffer`], asks for more when a header or
/// payload is incomplete, and consumes a record's bytes only once the whole
/// record is present.
///
/// Header byte order is decided once per stream, from a capture-file preamble
/// if the stream starts with one, otherwise from the first record header
/// unless configuration fixes it. [`reset`](Self::reset) starts a new stream.
#[derive(Debug, Clone)]
pub struct RecordFramer {
    state: State,
    mode: ByteOrderMode,
    order: Option<ByteOrder>,
    resolution: TimestampResolution,
    configured_link_type: LinkType,
    link_type: LinkType,
    max_frame_size: u32,
    records: u64,
}

impl RecordFramer {
    pub fn new(max_frame_size: u32, mode: ByteOrderMode, link_type: LinkType) -> Self {
        Self {
            state: State::StreamStart,
            mode,
            order: mode.fixed(),
            resolution: TimestampResolution::default(),
            configured_link_type: link_type,
            link_type,
            max_frame_size,
            records: 0,
        }
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(config.max_frame_size, config.byte_order, config.link_type)
    }

    /// Byte order in effect for the current stream, once decided
    pub fn byte_order(&self) -> Option<ByteOrder> {
        self.order
    }

    /// Link type attached to records of the current stream
    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    pub fn resolution(&self) -> TimestampResolution {
        self.resolution
    }

    /// Whether at least one record has been framed on the current stream
    pub fn is_synced(&self) -> bool {
        self.records > 0
    }

    /// Records framed on the current stream
    pub fn records_framed(&self) -> u64 {
        self.records
    }

    /// Forget all per-stream state
    ///
    /// Called whenever the underlying connection is replaced; the caller is
    /// responsible for discarding the bytes of the old connection.
    pub fn reset(&mut self) {
        self.state = State::StreamStart;
        self.order = self.mode.fixed();
        self.resolution = TimestampResolution::default();
        self.link_type = self.configured_link_type;
        self.records = 0;
    }

    /// Frame the next record from `buffer`
    ///
    /// Returns [`FrameStatus::NeedMore`] without consuming anything when the
    /// buffer holds only part of a record. Fails with
    /// [`AcquisitionError::MalformedStream`] when a header cannot belong to a
    /// well-formed stream; the stream must then be discarded.
    pub fn poll_record(&mut self, buffer: &mut IngestBuffer) -> Result<FrameStatus> {
        loop {
            match self.state {
                State::StreamStart => {
                    let available = buffer.as_slice();
                    let Some(magic) = head::<4>(available) else {
                        return Ok(FrameStatus::NeedMore { needed: 4 - available.len() });
                    };
                    if GlobalHeader::sniff_magic(&magic).is_none() {
                        self.state = State::AwaitingHeader;
                        continue;
                    }
                    let Some(bytes) = head::<GLOBAL_HEADER_SIZE>(available) else {
                        return Ok(FrameStatus::NeedMore { needed: GLOBAL_HEADER_SIZE - available.len() });
                    };
                    let preamble = GlobalHeader::parse(&bytes)
                        .ok_or_else(|| AcquisitionError::malformed("unrecognized capture-file preamble"))?;
                    self.apply_preamble(&preamble);
                    buffer.consume(GLOBAL_HEADER_SIZE);
                    self.state = State::AwaitingHeader;
                }
                State::AwaitingHeader => {
                    let available = buffer.as_slice();
                    let Some(bytes) = head::<RECORD_HEADER_SIZE>(available) else {
                        return Ok(FrameStatus::NeedMore { needed: RECORD_HEADER_SIZE - available.len() });
                    };
                    let order = self.resolve_order(&bytes)?;
                    let header = RecordHeader::parse(&bytes, order);
                    self.validate(&header)?;
                    self.state = State::AwaitingPayload { header };
                }
                State::AwaitingPayload { header } => {
                    let total = RECORD_HEADER_SIZE + header.captured_len as usize;
                    let available = buffer.as_slice();
                    if available.len() < total {
                        return Ok(FrameStatus::NeedMore { needed: total - available.len() });
                    }

                    let payload = available[RECORD_HEADER_SIZE..total].to_vec();
                    buffer.consume(total);
                    self.state = State::AwaitingHeader;
                    self.records += 1;

                    trace!("Framed record {}: {} of {} bytes", self.records, header.captured_len, header.original_len);

                    return Ok(FrameStatus::Record(PacketRecord {
                        header,
                        timestamp: header.timestamp(self.resolution),
                        link_type: self.link_type,
                        payload,
                    }));
                }
            }
        }
    }

    fn resolve_order(&mut self, bytes: &[u8; RECORD_HEADER_SIZE]) -> Result<ByteOrder> {
        if let Some(order) = self.order {
            return Ok(order);
        }

        let order = detect_byte_order(bytes, self.max_frame_size).ok_or_else(|| {
            AcquisitionError::malformed(format!(
                "first header has captured length {} ({} byte-swapped), both above maximum frame size {}",
                RecordHeader::peek_captured_len(bytes, ByteOrder::Native),
                RecordHeader::peek_captured_len(bytes, ByteOrder::Swapped),
                self.max_frame_size
            ))
        })?;

        debug!("Header byte order detected as {:?}", order);
        self.order = Some(order);
        Ok(order)
    }

    fn validate(&self, header: &RecordHeader) -> Result<()> {
        if header.captured_len > self.max_frame_size {
            return Err(AcquisitionError::malformed(format!(
                "captured length {} exceeds maximum frame size {}",
                header.captured_len, self.max_frame_size
            )));
        }
        if self.is_synced() && header.is_zeroed() {
            return Err(AcquisitionError::malformed(format!(
                "zeroed record header after {} records",
                self.records
            )));
        }
        Ok(())
    }

    fn apply_preamble(&mut self, preamble: &GlobalHeader) {
        if let Some(fixed) = self.mode.fixed() {
            if fixed != preamble.byte_order {
                warn!(
                    "Configured byte order {:?} contradicts stream preamble ({:?}); following the preamble",
                    fixed, preamble.byte_order
                );
            }
        }
        if preamble.snaplen > self.max_frame_size {
            debug!(
                "Stream snaplen {} exceeds max frame size {}; larger records will be rejected",
                preamble.snaplen, self.max_frame_size
            );
        }

        info!(
            "Stream preamble: pcap {}.{}, {:?} order, {:?} timestamps, link type {}",
            preamble.version_major,
            preamble.version_minor,
            preamble.byte_order,
            preamble.resolution,
            preamble.link_type
        );

        self.order = Some(preamble.byte_order);
        self.resolution = preamble.resolution;
        self.link_type = preamble.link_type;
    }
}

fn head<const N: usize>(bytes: &[u8]) -> Option<[u8; N]> {
    bytes.get(..N)?.try_into().ok()
}
