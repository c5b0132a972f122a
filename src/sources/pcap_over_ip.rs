//! PCAP-over-IP record source

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::{Endpoint, ReconnectPolicy, SourceConfig};
use crate::framing::{FrameStatus, RecordFramer};
use crate::ingest::{Connector, StreamIngestor, TcpConnector};
use crate::source::RecordSource;
use crate::types::{ConnectionState, LinkType, PacketRecord};
use crate::Result;

/// Record source reading a PCAP-over-IP stream
///
/// Pairs a [`StreamIngestor`] with a [`RecordFramer`]: the framer drains the
/// ingestor's buffer and the ingestor reads only when the framer asks for
/// more bytes. Every reconnect resets the framer, so the byte order of the
/// new stream is decided afresh.
pub struct PcapOverIpSource<C: Connector = TcpConnector> {
    ingestor: StreamIngestor<C>,
    framer: RecordFramer,
    read_chunk_size: usize,
}

impl PcapOverIpSource<TcpConnector> {
    pub fn new(config: &SourceConfig) -> Self {
        Self::with_connector(config, TcpConnector)
    }
}

impl<C: Connector> PcapOverIpSource<C> {
    /// Create a disconnected source that opens connections through `connector`
    pub fn with_connector(config: &SourceConfig, connector: C) -> Self {
        let ingestor = StreamIngestor::new(
            config.endpoint.clone(),
            connector,
            config.ingest_capacity(),
            config.read_timeout(),
        );
        Self { ingestor, framer: RecordFramer::from_config(config), read_chunk_size: config.read_chunk_size }
    }

    pub fn framer(&self) -> &RecordFramer {
        &self.framer
    }

    pub fn ingestor(&self) -> &StreamIngestor<C> {
        &self.ingestor
    }

    /// Unconsumed bytes of the current connection
    pub fn buffered(&self) -> usize {
        self.ingestor.buffer().len()
    }
}

#[async_trait::async_trait]
impl<C: Connector> RecordSource for PcapOverIpSource<C> {
    fn endpoint(&self) -> &Endpoint {
        self.ingestor.endpoint()
    }

    fn link_type(&self) -> LinkType {
        self.framer.link_type()
    }

    fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.ingestor.subscribe_state()
    }

    async fn reconnect(&mut self, policy: &ReconnectPolicy, cancel: &CancellationToken) -> Result<u32> {
        if self.framer.records_framed() > 0 || self.buffered() > 0 {
            debug!(
                "Discarding stream state of {} ({} records framed, {} bytes buffered)",
                self.endpoint(),
                self.framer.records_framed(),
                self.buffered()
            );
        }
        self.framer.reset();
        self.ingestor.reconnect(policy.max_attempts, policy.delay(), cancel).await
    }

    async fn next_record(&mut self) -> Result<PacketRecord> {
        loop {
            match self.framer.poll_record(self.ingestor.buffer_mut())? {
                FrameStatus::Record(record) => return Ok(record),
                FrameStatus::NeedMore { needed } => {
                    trace!("Framer needs {} more bytes", needed);
                    self.ingestor.read_more(self.read_chunk_size).await?;
                }
            }
        }
    }

    fn drain(&mut self) {
        self.ingestor.drain();
        self.framer.reset();
    }
}
