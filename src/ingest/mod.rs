//! Stream ingestion: connection management and the ingest buffer.
//!
//! - [`StreamIngestor`] owns one connection, reads into its buffer on demand,
//!   and reconnects with a bounded, fixed-delay retry loop
//! - [`IngestBuffer`] is the bounded FIFO the framer drains
//! - [`Connector`] abstracts how connections are opened; [`TcpConnector`] is
//!   the production implementation

mod buffer;
mod connector;
mod ingestor;

pub use buffer::IngestBuffer;
pub use connector::{Connector, TcpConnector};
pub use ingestor::StreamIngestor;
