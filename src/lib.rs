//! PCAP-over-IP packet acquisition.
//!
//! Connects to PCAP-over-IP servers (`tcpdump -w - | nc -l`, capture
//! appliances, sensors), reconstructs packet records from the TCP byte
//! stream, and hands each one to a downstream packet pipeline for decoding.
//!
//! # Features
//!
//! - **Robust framing**: records are reassembled across arbitrary read
//!   boundaries; byte-swapped producers are detected on the first header
//! - **Reconnection**: bounded, fixed-delay retries that observe shutdown
//! - **Backpressure**: the packet pool decides whether a worker waits or drops
//! - **One task per endpoint**: workers share nothing but the pipeline
//!
//! # Architecture
//!
//! - [`ingest`]: the connection and its bounded ingest buffer
//! - [`framing`]: the record framer state machine
//! - [`sources`]: record sources behind the [`RecordSource`] trait
//! - [`driver`]: the acquisition loop of one worker
//! - [`pipeline`]: the packet pool and submission seam, plus an in-process pipeline
//! - [`decode`]: per-link-type dispatch for framed packets
//!
//! ## Example
//!
//! ```rust,no_run
//! use pcap_over_ip::pipeline::{ChannelPipeline, ExhaustionPolicy};
//! use pcap_over_ip::{Acquisition, DecodeStage, SourceConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> pcap_over_ip::Result<()> {
//!     let configs = SourceConfig::list_from_yaml_str(
//!         r#"
//! - endpoint: tcp@10.0.0.5:57012
//! - endpoint: tcp@10.0.0.6:57012
//!   byte_order: swapped
//! "#,
//!     )?;
//!
//!     let (pipeline, receiver) = ChannelPipeline::new(4096, 65_536, ExhaustionPolicy::Wait);
//!     let decoding = tokio::spawn(DecodeStage::new().run(receiver));
//!
//!     let shutdown = CancellationToken::new();
//!     let handles = Acquisition::spawn_all(configs, pipeline, shutdown.clone())?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(30)).await;
//!     shutdown.cancel();
//!
//!     for handle in handles {
//!         let summary = handle.join().await;
//!         println!("{}: {} packets", summary.endpoint, summary.counters.packets);
//!     }
//!     let decoded = decoding.await.expect("decode stage panicked");
//!     println!("decoded {} bytes", decoded.bytes);
//!     Ok(())
//! }
//! ```

mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;

pub mod acquisition;
pub mod config;
pub mod decode;
pub mod driver;
pub mod framing;
pub mod ingest;
pub mod pipeline;
pub mod source;
pub mod sources;
pub mod stream;
pub mod types;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use acquisition::{Acquisition, AcquisitionHandle, ExitReason, WorkerSummary};
pub use config::{ByteOrderMode, ChecksumMode, Endpoint, ReconnectPolicy, SourceConfig, Transport};
pub use decode::{DecodeCounters, DecodeOutcome, DecodeStage, LinkLayerDecoder};
pub use framing::{FrameStatus, RecordFramer};
pub use pipeline::{ChannelPipeline, ExhaustionPolicy, PacketPipeline, PacketReceiver};
pub use source::RecordSource;
pub use sources::PcapOverIpSource;
