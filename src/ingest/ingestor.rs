//! Stream ingestor: owns one connection and its ingest buffer

use std::io;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::buffer::IngestBuffer;
use super::connector::{Connector, TcpConnector};
use crate::config::Endpoint;
use crate::types::ConnectionState;
use crate::{AcquisitionError, Result};

/// Owns exactly one connection to a configured endpoint
///
/// Bytes read from the connection land in an [`IngestBuffer`] that the
/// framer drains. Closing the connection, for any reason, discards whatever
/// the buffer still holds so a partial record never straddles two
/// connections.
pub struct StreamIngestor<C: Connector = TcpConnector> {
    endpoint: Endpoint,
    connector: C,
    stream: Option<C::Stream>,
    buffer: IngestBuffer,
    read_timeout: Duration,
    state: watch::Sender<ConnectionState>,
}

impl<C: Connector> StreamIngestor<C> {
    /// Create a disconnected ingestor
    ///
    /// `buffer_capacity` bounds the unconsumed bytes held at any time.
    pub fn new(endpoint: Endpoint, connector: C, buffer_capacity: usize, read_timeout: Duration) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            endpoint,
            connector,
            stream: None,
            buffer: IngestBuffer::with_capacity(buffer_capacity),
            read_timeout,
            state,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn buffer(&self) -> &IngestBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut IngestBuffer {
        &mut self.buffer
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            trace!("{}: {} -> {}", self.endpoint, previous, state);
        }
    }

    /// Open a connection, replacing any existing one
    ///
    /// Failures carry the transport error (refused, unreachable, name
    /// resolution) and are not retried here.
    pub async fn connect(&mut self) -> Result<()> {
        self.close();
        self.set_state(ConnectionState::Connecting);

        match self.connector.connect(&self.endpoint).await {
            Ok(stream) => {
                self.stream = Some(stream);
                self.set_state(ConnectionState::Connected);
                info!("Connected to PCAP-over-IP server at {}", self.endpoint);
                Ok(())
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                Err(AcquisitionError::connection_failed(&self.endpoint, e))
            }
        }
    }

    /// Read at most `max_bytes` more bytes into the ingest buffer
    ///
    /// Returns the number of bytes read, always positive. A clean close by
    /// the peer is [`AcquisitionError::StreamClosed`]; transport failures are
    /// [`AcquisitionError::Io`]; a read that outlives the read deadline is
    /// [`AcquisitionError::ReadTimeout`] and leaves the buffer unchanged.
    pub async fn read_more(&mut self, max_bytes: usize) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or_else(|| {
            AcquisitionError::io("read", io::Error::new(io::ErrorKind::NotConnected, "not connected"))
        })?;

        if self.buffer.remaining_capacity() == 0 {
            return Err(AcquisitionError::malformed(format!(
                "{} buffered bytes without a complete record",
                self.buffer.len()
            )));
        }

        let deadline = self.read_timeout;
        match tokio::time::timeout(deadline, self.buffer.fill_from(stream, max_bytes)).await {
            Err(_) => Err(AcquisitionError::ReadTimeout { duration: deadline }),
            Ok(Ok(0)) => Err(AcquisitionError::stream_closed()),
            Ok(Ok(n)) => {
                trace!("Read {} bytes ({} buffered)", n, self.buffer.len());
                Ok(n)
            }
            Ok(Err(e)) => Err(AcquisitionError::io("read", e)),
        }
    }

    /// Release the connection and discard buffered bytes
    ///
    /// Idempotent.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!("Closed connection to {} ({} unconsumed bytes discarded)", self.endpoint, self.buffer.len());
        }
        self.buffer.clear();
        self.set_state(ConnectionState::Disconnected);
    }

    /// Mark the connection as draining for shutdown, then close it
    pub fn drain(&mut self) {
        self.set_state(ConnectionState::Draining);
        self.close();
    }

    /// Close, then try to connect up to `max_attempts` times
    ///
    /// Waits `delay` between attempts. Returns the number of attempts used on
    /// success, [`AcquisitionError::ReconnectExhausted`] carrying the last
    /// failure once the attempts run out, or [`AcquisitionError::Shutdown`]
    /// as soon as `cancel` fires.
    pub async fn reconnect(&mut self, max_attempts: u32, delay: Duration, cancel: &CancellationToken) -> Result<u32> {
        self.close();
        let mut last = None;

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(AcquisitionError::Shutdown);
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(AcquisitionError::Shutdown),
                outcome = self.connect() => outcome,
            };

            match outcome {
                Ok(()) => return Ok(attempt),
                Err(e) => {
                    warn!("Connection attempt {}/{} failed: {}", attempt, max_attempts, e);
                    last = Some(e);
                }
            }

            if attempt < max_attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(AcquisitionError::Shutdown),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        self.set_state(ConnectionState::Disconnected);
        Err(AcquisitionError::reconnect_exhausted(&self.endpoint, max_attempts, last))
    }
}

impl<C: Connector> Drop for StreamIngestor<C> {
    fn drop(&mut self) {
        self.close();
    }
}
