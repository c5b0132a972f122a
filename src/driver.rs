//! Driver runs the acquisition loop of one worker

use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::acquisition::{ExitReason, WorkerSummary};
use crate::config::{ChecksumMode, ReconnectPolicy, SourceConfig};
use crate::pipeline::{ExhaustionPolicy, PacketPipeline, Rejected};
use crate::source::RecordSource;
use crate::types::{Counters, Packet, PacketRecord};
use crate::{AcquisitionError, Result};

/// Connection attempts left to a worker
///
/// Failed connects spend attempts, and so do connections that die before
/// yielding a single record. The first record framed on a connection
/// restores the full budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    max_attempts: u32,
    remaining: u32,
}

impl RetryBudget {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts, remaining: max_attempts }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    pub fn consume(&mut self, attempts: u32) {
        self.remaining = self.remaining.saturating_sub(attempts);
    }

    pub fn refill(&mut self) {
        self.remaining = self.max_attempts;
    }
}

enum Delivery {
    Submitted(usize),
    Dropped,
}

/// Drives one record source into a packet pipeline
///
/// Per iteration: check for shutdown, (re)connect if needed, frame one
/// record, then copy it into a pipeline buffer and submit it. Recoverable
/// stream failures discard the connection and reconnect; configuration
/// errors, rejected submissions and reconnect exhaustion end the worker.
#[derive(Debug, Clone)]
pub struct Driver {
    reconnect: ReconnectPolicy,
    checksum_mode: ChecksumMode,
    backpressure_poll: Duration,
}

impl Driver {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            reconnect: config.reconnect,
            checksum_mode: config.checksum_mode,
            backpressure_poll: config.backpressure_poll(),
        }
    }

    /// Run until shutdown or a worker-fatal error
    ///
    /// Counter snapshots are published on `counters` after every change. The
    /// source is drained on every exit path.
    pub async fn run<S, P>(
        &self,
        mut source: S,
        pipeline: P,
        cancel: CancellationToken,
        counters_tx: watch::Sender<Counters>,
    ) -> WorkerSummary
    where
        S: RecordSource,
        P: PacketPipeline,
    {
        let endpoint = source.endpoint().clone();
        info!("Acquisition worker for {} started", endpoint);

        let mut counters = Counters::default();
        let mut budget = RetryBudget::new(self.reconnect.max_attempts);
        let mut connected = false;
        let mut ever_connected = false;
        let mut session_records = 0u64;
        let mut last_failure: Option<AcquisitionError> = None;

        let exit = loop {
            if cancel.is_cancelled() {
                info!("Acquisition worker for {} cancelled", endpoint);
                break ExitReason::Shutdown;
            }

            if !connected {
                match self.connect(&mut source, &mut budget, &cancel, last_failure.take()).await {
                    Ok(()) => {
                        if ever_connected {
                            counters.reconnects += 1;
                            counters_tx.send_replace(counters);
                        }
                        connected = true;
                        ever_connected = true;
                        session_records = 0;
                    }
                    Err(AcquisitionError::Shutdown) => break ExitReason::Shutdown,
                    Err(e) => {
                        error!("Acquisition worker for {} giving up: {}", endpoint, e);
                        break ExitReason::Failed(e);
                    }
                }
            }

            let next = tokio::select! {
                _ = cancel.cancelled() => None,
                result = source.next_record() => Some(result),
            };
            let Some(result) = next else {
                info!("Acquisition worker for {} cancelled during read", endpoint);
                break ExitReason::Shutdown;
            };

            match result {
                Ok(record) => {
                    if session_records == 0 {
                        budget.refill();
                    }
                    session_records += 1;

                    match self.deliver(&pipeline, &record, &mut counters, &cancel).await {
                        Ok(Delivery::Submitted(len)) => {
                            counters.record_submitted(len);
                            trace!("Packet {}: {} bytes", counters.packets, len);
                        }
                        Ok(Delivery::Dropped) => {}
                        Err(AcquisitionError::Shutdown) => break ExitReason::Shutdown,
                        Err(e) => {
                            error!("Acquisition worker for {} stopping: {}", endpoint, e);
                            break ExitReason::Failed(e);
                        }
                    }
                    counters_tx.send_replace(counters);
                }
                Err(AcquisitionError::ReadTimeout { duration }) => {
                    trace!("No data from {} within {:?}", endpoint, duration);
                }
                Err(e) if e.triggers_reconnect() => {
                    match &e {
                        AcquisitionError::MalformedStream { .. } => {
                            counters.malformed += 1;
                            counters_tx.send_replace(counters);
                            warn!("Discarding corrupt stream from {}: {}", endpoint, e);
                        }
                        AcquisitionError::StreamClosed => {
                            warn!("{} closed the connection after {} records", endpoint, session_records)
                        }
                        _ => warn!("Connection to {} failed: {}", endpoint, e),
                    }
                    connected = false;
                    last_failure = Some(e);
                }
                Err(e) => {
                    error!("Acquisition worker for {} stopping: {}", endpoint, e);
                    break ExitReason::Failed(e);
                }
            }
        };

        source.drain();
        counters_tx.send_replace(counters);

        info!(
            "Acquisition worker for {} stopped: {} packets, {} bytes ({} dropped, {} reconnects)",
            endpoint, counters.packets, counters.bytes, counters.dropped, counters.reconnects
        );

        WorkerSummary { endpoint, counters, exit }
    }

    /// Connect within the remaining retry budget
    async fn connect<S: RecordSource>(
        &self,
        source: &mut S,
        budget: &mut RetryBudget,
        cancel: &CancellationToken,
        last_failure: Option<AcquisitionError>,
    ) -> Result<()> {
        if budget.is_exhausted() {
            return Err(AcquisitionError::reconnect_exhausted(
                source.endpoint(),
                budget.max_attempts(),
                last_failure,
            ));
        }

        let policy = ReconnectPolicy { max_attempts: budget.remaining(), ..self.reconnect };
        match source.reconnect(&policy, cancel).await {
            Ok(used) => {
                budget.consume(used);
                debug!("Connected to {} ({} attempts left)", source.endpoint(), budget.remaining());
                Ok(())
            }
            Err(AcquisitionError::ReconnectExhausted { source: last, .. }) => {
                budget.consume(policy.max_attempts);
                // Report every attempt since the last framed record, not just this round.
                Err(AcquisitionError::ReconnectExhausted {
                    endpoint: source.endpoint().to_string(),
                    attempts: budget.max_attempts(),
                    source: last,
                })
            }
            Err(e) => {
                budget.consume(policy.max_attempts);
                Err(e)
            }
        }
    }

    /// Copy one record into a pipeline buffer and submit it
    async fn deliver<P: PacketPipeline>(
        &self,
        pipeline: &P,
        record: &PacketRecord,
        counters: &mut Counters,
        cancel: &CancellationToken,
    ) -> Result<Delivery> {
        let mut packet = match self.acquire(pipeline, cancel).await {
            Ok(packet) => packet,
            Err(e @ AcquisitionError::AllocationExhausted) => {
                counters.dropped += 1;
                if counters.dropped == 1 || counters.dropped % 1_000 == 0 {
                    warn!("{}; {} records dropped so far", e, counters.dropped);
                }
                return Ok(Delivery::Dropped);
            }
            Err(e) => return Err(e),
        };

        packet.fill_from(record, self.checksum_mode);
        let len = packet.captured_len();

        match pipeline.submit(packet) {
            Ok(()) => Ok(Delivery::Submitted(len)),
            Err(Rejected { packet, reason }) => {
                pipeline.release(packet);
                Err(AcquisitionError::submission_failed(reason, None))
            }
        }
    }

    /// Take a packet buffer, honoring the pipeline's exhaustion policy
    ///
    /// Under [`ExhaustionPolicy::Drop`] an empty pool is
    /// [`AcquisitionError::AllocationExhausted`]. Under
    /// [`ExhaustionPolicy::Wait`] the worker sleeps until the pipeline
    /// signals a released buffer or the poll interval elapses.
    async fn acquire<P: PacketPipeline>(&self, pipeline: &P, cancel: &CancellationToken) -> Result<Packet> {
        let mut waited = false;
        loop {
            if let Some(packet) = pipeline.acquire() {
                if waited {
                    debug!("Packet pool available again");
                }
                return Ok(packet);
            }

            match pipeline.exhaustion_policy() {
                ExhaustionPolicy::Drop => return Err(AcquisitionError::AllocationExhausted),
                ExhaustionPolicy::Wait => {
                    if !waited {
                        debug!("Packet pool exhausted; waiting for a free buffer");
                        waited = true;
                    }
                    let released = async {
                        match pipeline.buffer_released() {
                            Some(notify) => notify.notified().await,
                            None => std::future::pending().await,
                        }
                    };
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(AcquisitionError::Shutdown),
                        _ = released => {}
                        _ = tokio::time::sleep(self.backpressure_poll) => {}
                    }
                }
            }
        }
    }
}
