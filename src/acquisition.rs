//! Acquisition workers and their handles

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{Endpoint, SourceConfig};
use crate::driver::Driver;
use crate::pipeline::PacketPipeline;
use crate::source::RecordSource;
use crate::sources::PcapOverIpSource;
use crate::stream::{Sample, SampleExt};
use crate::types::{ConnectionState, Counters};
use crate::{AcquisitionError, Result};

/// Why a worker stopped
#[derive(Debug)]
pub enum ExitReason {
    /// The shutdown token fired
    Shutdown,
    /// A worker-fatal error: reconnect exhaustion or a rejected submission
    Failed(AcquisitionError),
}

impl ExitReason {
    pub fn is_clean(&self) -> bool {
        matches!(self, ExitReason::Shutdown)
    }
}

/// Final state of a stopped worker
#[derive(Debug)]
pub struct WorkerSummary {
    pub endpoint: Endpoint,
    pub counters: Counters,
    pub exit: ExitReason,
}

impl WorkerSummary {
    /// Final counters, or the error that stopped the worker
    pub fn into_result(self) -> Result<Counters> {
        match self.exit {
            ExitReason::Shutdown => Ok(self.counters),
            ExitReason::Failed(e) => Err(e),
        }
    }
}

/// Entry point for spawning acquisition workers
///
/// # Example
///
/// ```rust,no_run
/// use pcap_over_ip::pipeline::{ChannelPipeline, ExhaustionPolicy};
/// use pcap_over_ip::{Acquisition, DecodeStage, SourceConfig};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> pcap_over_ip::Result<()> {
///     let config = SourceConfig::for_endpoint("tcp@127.0.0.1:57012")?;
///     let (pipeline, receiver) = ChannelPipeline::new(1024, 2048, ExhaustionPolicy::Wait);
///     tokio::spawn(DecodeStage::new().run(receiver));
///
///     let shutdown = CancellationToken::new();
///     let handle = Acquisition::spawn(config, pipeline, shutdown.clone())?;
///
///     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
///     shutdown.cancel();
///
///     let counters = handle.join().await.into_result()?;
///     println!("{} packets, {} bytes", counters.packets, counters.bytes);
///     Ok(())
/// }
/// ```
pub struct Acquisition;

impl Acquisition {
    /// Validate `config` and spawn a PCAP-over-IP worker for it
    ///
    /// The worker stops when `shutdown` (or the handle's own token) fires.
    pub fn spawn<P: PacketPipeline>(
        config: SourceConfig,
        pipeline: P,
        shutdown: CancellationToken,
    ) -> Result<AcquisitionHandle> {
        config.validate()?;
        let source = PcapOverIpSource::new(&config);
        Ok(Self::spawn_source(&config, source, pipeline, shutdown))
    }

    /// Spawn a worker for each configuration, sharing one pipeline
    ///
    /// Nothing is spawned unless every configuration is valid.
    pub fn spawn_all<P: PacketPipeline + Clone>(
        configs: Vec<SourceConfig>,
        pipeline: P,
        shutdown: CancellationToken,
    ) -> Result<Vec<AcquisitionHandle>> {
        for config in &configs {
            config.validate()?;
        }
        let handles = configs
            .into_iter()
            .map(|config| {
                let source = PcapOverIpSource::new(&config);
                Self::spawn_source(&config, source, pipeline.clone(), shutdown.clone())
            })
            .collect();
        Ok(handles)
    }

    /// Spawn a worker around an already-built record source
    pub fn spawn_source<S, P>(
        config: &SourceConfig,
        source: S,
        pipeline: P,
        shutdown: CancellationToken,
    ) -> AcquisitionHandle
    where
        S: RecordSource,
        P: PacketPipeline,
    {
        let endpoint = source.endpoint().clone();
        let state = source.subscribe_state();
        let (counters_tx, counters) = watch::channel(Counters::default());
        let cancel = shutdown.child_token();

        let driver = Driver::new(config);
        let worker_cancel = cancel.clone();
        let task = tokio::spawn(async move { driver.run(source, pipeline, worker_cancel, counters_tx).await });

        info!("Spawned acquisition worker for {}", endpoint);
        AcquisitionHandle { endpoint, counters, state, cancel, task }
    }
}

/// Handle to a running worker
///
/// Dropping the handle does not stop the worker; call
/// [`shutdown`](Self::shutdown) or cancel the token it was spawned with.
pub struct AcquisitionHandle {
    endpoint: Endpoint,
    counters: watch::Receiver<Counters>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task: JoinHandle<WorkerSummary>,
}

impl AcquisitionHandle {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Latest counter snapshot
    pub fn counters(&self) -> Counters {
        *self.counters.borrow()
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Counter snapshots as a stream, starting with the current one
    ///
    /// Ends when the worker stops.
    pub fn counter_updates(&self) -> WatchStream<Counters> {
        WatchStream::new(self.counters.clone())
    }

    /// Connection state transitions as a stream, starting with the current state
    pub fn state_updates(&self) -> WatchStream<ConnectionState> {
        WatchStream::new(self.state.clone())
    }

    /// Counter snapshots at most once per `period`, latest wins
    pub fn sampled_counters(&self, period: Duration) -> Sample<WatchStream<Counters>> {
        self.counter_updates().sample(period)
    }

    pub fn subscribe_counters(&self) -> watch::Receiver<Counters> {
        self.counters.clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Ask this worker to stop
    pub fn shutdown(&self) {
        debug!("Shutdown requested for {}", self.endpoint);
        self.cancel.cancel();
    }

    /// Wait for the worker to stop
    ///
    /// A panic inside the worker is resumed on the caller.
    pub async fn join(self) -> WorkerSummary {
        match self.task.await {
            Ok(summary) => summary,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => WorkerSummary {
                endpoint: self.endpoint,
                counters: *self.counters.borrow(),
                exit: ExitReason::Shutdown,
            },
        }
    }

    /// Stop the worker and wait for it
    pub async fn stop(self) -> WorkerSummary {
        self.shutdown();
        self.join().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{CollectingPipeline, ScriptedConnector, stream_bytes};
    use crate::types::ByteOrder;
    use futures::StreamExt;
    use tokio::io::AsyncWriteExt;

    fn config() -> SourceConfig {
        SourceConfig::for_endpoint("tcp@scripted:4000")
            .unwrap()
            .with_read_timeout(Duration::from_millis(20))
            .with_reconnect(2, Duration::from_millis(1))
    }

    fn scripted_handle(connector: ScriptedConnector, shutdown: CancellationToken) -> AcquisitionHandle {
        let config = config();
        let source = PcapOverIpSource::with_connector(&config, connector);
        Acquisition::spawn_source(&config, source, CollectingPipeline::new(), shutdown)
    }

    #[tokio::test]
    async fn spawn_rejects_invalid_configuration() {
        let (pipeline, _rx) = crate::pipeline::ChannelPipeline::new(1, 64, Default::default());
        let config = config().with_max_frame_size(0);
        let err = Acquisition::spawn(config, pipeline, CancellationToken::new()).err().unwrap();
        assert!(matches!(err, AcquisitionError::Configuration { .. }));
    }

    #[tokio::test]
    async fn handle_streams_counters_and_stops() {
        let connector = ScriptedConnector::new();
        let mut peer = connector.push_connection();
        let handle = scripted_handle(connector, CancellationToken::new());

        let mut states = handle.state_updates();
        let mut updates = handle.counter_updates().filter(|c| std::future::ready(c.packets == 2));

        peer.write_all(&stream_bytes(ByteOrder::Native, &[30, 40])).await.unwrap();
        let counters = updates.next().await.unwrap();
        assert_eq!(counters.bytes, 70);
        assert_eq!(handle.counters(), counters);
        assert_eq!(handle.state(), ConnectionState::Connected);
        assert!(states.next().await.is_some());

        let summary = handle.stop().await;
        assert!(summary.exit.is_clean());
        assert_eq!(summary.into_result().unwrap().packets, 2);
    }

    #[tokio::test]
    async fn sampled_counters_end_with_final_snapshot() {
        let connector = ScriptedConnector::new();
        let mut peer = connector.push_connection();
        let handle = scripted_handle(connector, CancellationToken::new());
        let sampled = handle.sampled_counters(Duration::from_millis(5));

        peer.write_all(&stream_bytes(ByteOrder::Native, &[10; 50])).await.unwrap();
        let mut counters = handle.subscribe_counters();
        counters.wait_for(|c| c.packets == 50).await.unwrap();
        handle.stop().await;

        let snapshots: Vec<Counters> = sampled.collect().await;
        assert!(snapshots.len() <= 51);
        assert_eq!(snapshots.last().map(|c| c.packets), Some(50));
    }

    #[tokio::test]
    async fn shared_shutdown_stops_every_worker() {
        let shutdown = CancellationToken::new();
        let first = ScriptedConnector::new();
        let _peer_a = first.push_connection();
        let second = ScriptedConnector::new();
        let _peer_b = second.push_connection();

        let handles = [scripted_handle(first, shutdown.clone()), scripted_handle(second, shutdown.clone())];
        shutdown.cancel();

        for handle in handles {
            let summary = tokio::time::timeout(Duration::from_secs(5), handle.join()).await.unwrap();
            assert!(summary.exit.is_clean());
        }
    }

    #[tokio::test]
    async fn handle_shutdown_leaves_siblings_running() {
        let shutdown = CancellationToken::new();
        let first = ScriptedConnector::new();
        let _peer_a = first.push_connection();
        let second = ScriptedConnector::new();
        let _peer_b = second.push_connection();

        let stopped = scripted_handle(first, shutdown.clone());
        let running = scripted_handle(second, shutdown.clone());

        stopped.stop().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!running.is_finished());

        shutdown.cancel();
        running.join().await;
    }

    #[tokio::test]
    async fn failed_worker_reports_error() {
        let handle = scripted_handle(ScriptedConnector::new(), CancellationToken::new());
        let summary = handle.join().await;
        assert!(!summary.exit.is_clean());
        assert!(matches!(summary.into_result(), Err(AcquisitionError::ReconnectExhausted { .. })));
    }
}
