//! Transport connectors

use std::io;
use tokio::io::AsyncRead;
use tokio::net::TcpStream;

use crate::config::{Endpoint, Transport};

/// Opens byte streams to an [`Endpoint`]
///
/// The production connector is [`TcpConnector`]; tests substitute in-memory
/// streams.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Byte stream produced by a successful connect
    type Stream: AsyncRead + Unpin + Send + 'static;

    /// Open one connection without retrying
    async fn connect(&self, endpoint: &Endpoint) -> io::Result<Self::Stream>;
}

/// TCP connector with name resolution
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait::async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, endpoint: &Endpoint) -> io::Result<TcpStream> {
        match endpoint.transport() {
            Transport::Tcp => {
                let stream = TcpStream::connect((endpoint.host(), endpoint.port())).await?;
                stream.set_nodelay(true)?;
                Ok(stream)
            }
        }
    }
}
