//! Test utilities: scripted connections, stream builders and a recording pipeline
//!
//! Shared by unit tests, integration tests and benchmarks.

#![cfg(any(test, feature = "benchmark"))]

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{DuplexStream, duplex};

use crate::config::Endpoint;
use crate::ingest::Connector;
use crate::pipeline::{ExhaustionPolicy, PacketPipeline, Rejected};
use crate::types::{ByteOrder, GlobalHeader, LinkType, Packet, RecordHeader, TimestampResolution};

/// In-memory pipe size for scripted connections
const PIPE_CAPACITY: usize = 1024 * 1024;

/// First timestamp written by [`stream_bytes`]
pub const STREAM_EPOCH: u32 = 1_700_000_000;

/// Deterministic payload of `len` bytes
pub fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
}

/// One record (header and payload) with `original_len == payload.len()`
pub fn record_bytes(order: ByteOrder, ts_sec: u32, payload: &[u8]) -> Vec<u8> {
    let header = RecordHeader {
        ts_sec,
        ts_frac: 0,
        captured_len: payload.len() as u32,
        original_len: payload.len() as u32,
    };
    let mut out = header.encode(order).to_vec();
    out.extend_from_slice(payload);
    out
}

/// Records of the given payload lengths, without a preamble
///
/// Record `i` is stamped `STREAM_EPOCH + i` seconds and `i * 1000` sub-second
/// units, and carries `payload(len, i)`.
pub fn stream_bytes(order: ByteOrder, lens: &[usize]) -> Vec<u8> {
    let mut out = Vec::with_capacity(lens.iter().map(|len| len + RecordHeader::SIZE).sum());
    for (i, len) in lens.iter().enumerate() {
        let header = RecordHeader {
            ts_sec: STREAM_EPOCH + i as u32,
            ts_frac: i as u32 * 1_000,
            captured_len: *len as u32,
            original_len: *len as u32,
        };
        out.extend_from_slice(&header.encode(order));
        out.extend(payload(*len, i as u8));
    }
    out
}

/// Capture-file preamble as written by `tcpdump -w -`
pub fn preamble(order: ByteOrder, resolution: TimestampResolution, link_type: LinkType) -> Vec<u8> {
    GlobalHeader {
        byte_order: order,
        resolution,
        version_major: 2,
        version_minor: 4,
        thiszone: 0,
        sigfigs: 0,
        snaplen: 262_144,
        link_type,
    }
    .encode()
    .to_vec()
}

enum Scripted {
    Accept(DuplexStream),
    Refuse,
}

/// Counts connection attempts made through a [`ScriptedConnector`]
#[derive(Debug, Clone, Default)]
pub struct Attempts(Arc<AtomicU32>);

impl Attempts {
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Connector that replays a script of accepted and refused connections
///
/// Accepted connections are in-memory pipes whose server end is handed to
/// the test. Once the script runs out every attempt is refused.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    attempts: Attempts,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script an accepted connection and return its server end
    pub fn push_connection(&self) -> DuplexStream {
        let (client, server) = duplex(PIPE_CAPACITY);
        self.lock().push_back(Scripted::Accept(client));
        server
    }

    /// Script a refused connection
    pub fn push_refusal(&self) {
        self.lock().push_back(Scripted::Refuse);
    }

    pub fn attempts(&self) -> Attempts {
        self.attempts.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Scripted>> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl Connector for ScriptedConnector {
    type Stream = DuplexStream;

    async fn connect(&self, endpoint: &Endpoint) -> io::Result<DuplexStream> {
        self.attempts.0.fetch_add(1, Ordering::SeqCst);
        match self.lock().pop_front() {
            Some(Scripted::Accept(stream)) => Ok(stream),
            Some(Scripted::Refuse) | None => Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("scripted refusal for {endpoint}"),
            )),
        }
    }
}

#[derive(Default)]
struct Recorded {
    submitted: Vec<Packet>,
    acquired: usize,
    released: usize,
    accept_limit: Option<usize>,
}

/// Pipeline with an unbounded pool that records every submission
#[derive(Clone, Default)]
pub struct CollectingPipeline {
    recorded: Arc<Mutex<Recorded>>,
}

impl CollectingPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every submission after the first `accepted`
    pub fn reject_after(&self, accepted: usize) {
        self.lock().accept_limit = Some(accepted);
    }

    pub fn submitted(&self) -> Vec<Packet> {
        self.lock().submitted.clone()
    }

    /// Captured lengths of submitted packets, in submission order
    pub fn lengths(&self) -> Vec<usize> {
        self.lock().submitted.iter().map(Packet::captured_len).collect()
    }

    pub fn released(&self) -> usize {
        self.lock().released
    }

    /// Buffers acquired but neither submitted nor released
    pub fn outstanding(&self) -> usize {
        let recorded = self.lock();
        recorded.acquired - recorded.submitted.len() - recorded.released
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PacketPipeline for CollectingPipeline {
    fn acquire(&self) -> Option<Packet> {
        self.lock().acquired += 1;
        Some(Packet::default())
    }

    fn submit(&self, packet: Packet) -> Result<(), Rejected> {
        let mut recorded = self.lock();
        if recorded.accept_limit.is_some_and(|limit| recorded.submitted.len() >= limit) {
            return Err(Rejected { packet, reason: "collecting pipeline closed".into() });
        }
        recorded.submitted.push(packet);
        Ok(())
    }

    fn release(&self, _packet: Packet) {
        self.lock().released += 1;
    }

    fn exhaustion_policy(&self) -> ExhaustionPolicy {
        ExhaustionPolicy::Wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_bytes_layout() {
        let bytes = stream_bytes(ByteOrder::Native, &[4, 0]);
        assert_eq!(bytes.len(), 16 + 4 + 16);

        let first: [u8; 16] = bytes[..16].try_into().unwrap();
        let header = RecordHeader::parse(&first, ByteOrder::Native);
        assert_eq!(header.captured_len, 4);
        assert_eq!(&bytes[16..20], &payload(4, 0)[..]);
    }

    #[tokio::test]
    async fn scripted_connector_follows_script() {
        let connector = ScriptedConnector::new();
        connector.push_refusal();
        let _server = connector.push_connection();
        let endpoint = Endpoint::tcp("scripted", 1).unwrap();

        assert!(connector.connect(&endpoint).await.is_err());
        assert!(connector.connect(&endpoint).await.is_ok());
        assert!(connector.connect(&endpoint).await.is_err());
        assert_eq!(connector.attempts().get(), 3);
    }
}
