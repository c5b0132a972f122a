//! Record source trait for acquisition backends

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::config::{Endpoint, ReconnectPolicy};
use crate::types::{ConnectionState, LinkType, PacketRecord};

/// Capability interface of an acquisition backend
///
/// A source owns its connection and framing state and hands out complete
/// records one at a time. The driving loop owns everything else: packet
/// buffers, submission, counters and the decision to reconnect.
#[async_trait::async_trait]
pub trait RecordSource: Send + 'static {
    /// Endpoint this source reads from
    fn endpoint(&self) -> &Endpoint;

    /// Link type attached to records of the current stream
    fn link_type(&self) -> LinkType;

    /// Watch connection state transitions
    fn subscribe_state(&self) -> watch::Receiver<ConnectionState>;

    /// (Re)connect with bounded retries
    ///
    /// Discards the current connection and any partially buffered record
    /// first. Returns the attempts used on success.
    async fn reconnect(&mut self, policy: &ReconnectPolicy, cancel: &CancellationToken) -> Result<u32>;

    /// Get the next complete record
    ///
    /// Reads as often as needed. Errors:
    /// - `ReadTimeout`: no data before the read deadline; the stream is intact
    /// - `StreamClosed` / `Io` / `MalformedStream`: the connection is unusable
    ///
    /// Cancel safe: dropping the future between reads loses no bytes.
    async fn next_record(&mut self) -> Result<PacketRecord>;

    /// Release the connection for shutdown
    fn drain(&mut self);
}
