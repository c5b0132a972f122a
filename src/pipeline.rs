//! Downstream packet pipeline seam
//!
//! The acquisition worker never allocates packet buffers itself. It takes an
//! empty [`Packet`] from a [`PacketPipeline`], fills it from one framed
//! record and submits it. A buffer the worker cannot submit goes back through
//! [`PacketPipeline::release`], so every acquired buffer is either submitted
//! or released exactly once.
//!
//! [`ChannelPipeline`] is an in-process pipeline: a fixed pool of reusable
//! buffers and a tokio mpsc queue whose receiving half is a [`PacketReceiver`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::{Notify, mpsc};
use tracing::trace;

use crate::types::Packet;

/// What the worker does when the pool has no free buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExhaustionPolicy {
    /// Wait until a buffer frees up (backpressure)
    #[default]
    Wait,
    /// Drop the record and count it
    Drop,
}

/// A submission the pipeline refused, handing the buffer back
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct Rejected {
    pub packet: Packet,
    pub reason: String,
}

/// Packet pool and submission queue shared by acquisition workers
///
/// Implementations must be safe to call from many workers at once.
pub trait PacketPipeline: Send + Sync + 'static {
    /// Take an empty buffer from the pool, `None` when it is exhausted
    fn acquire(&self) -> Option<Packet>;

    /// Queue a filled buffer for decoding
    fn submit(&self, packet: Packet) -> std::result::Result<(), Rejected>;

    /// Return an unsubmitted buffer to the pool
    fn release(&self, packet: Packet);

    /// Policy the worker applies when [`acquire`](Self::acquire) fails
    fn exhaustion_policy(&self) -> ExhaustionPolicy {
        ExhaustionPolicy::Wait
    }

    /// Signalled whenever a buffer returns to the pool
    ///
    /// Waiting workers wake on it instead of the poll interval alone. `None`
    /// leaves them polling.
    fn buffer_released(&self) -> Option<&Notify> {
        None
    }
}

impl<P: PacketPipeline + ?Sized> PacketPipeline for Arc<P> {
    fn acquire(&self) -> Option<Packet> {
        (**self).acquire()
    }

    fn submit(&self, packet: Packet) -> std::result::Result<(), Rejected> {
        (**self).submit(packet)
    }

    fn release(&self, packet: Packet) {
        (**self).release(packet)
    }

    fn exhaustion_policy(&self) -> ExhaustionPolicy {
        (**self).exhaustion_policy()
    }

    fn buffer_released(&self) -> Option<&Notify> {
        (**self).buffer_released()
    }
}

#[derive(Debug)]
struct PacketPool {
    free: Mutex<Vec<Packet>>,
    size: usize,
    acquired: AtomicU64,
    exhausted: AtomicU64,
    released: Notify,
}

impl PacketPool {
    fn new(size: usize, frame_capacity: usize) -> Self {
        let free = (0..size).map(|_| Packet::with_capacity(frame_capacity)).collect();
        Self {
            free: Mutex::new(free),
            size,
            acquired: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
            released: Notify::new(),
        }
    }

    fn take(&self) -> Option<Packet> {
        let packet = self.free.lock().unwrap_or_else(PoisonError::into_inner).pop();
        let counter = if packet.is_some() { &self.acquired } else { &self.exhausted };
        counter.fetch_add(1, Ordering::Relaxed);
        packet
    }

    fn put(&self, mut packet: Packet) {
        packet.clear();
        {
            let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
            if free.len() >= self.size {
                return;
            }
            free.push(packet);
        }
        // One stored permit covers a worker that has not started waiting yet.
        self.released.notify_one();
    }

    fn available(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Pool usage snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub size: usize,
    pub available: usize,
    /// Successful acquisitions
    pub acquired: u64,
    /// Acquisitions that found the pool empty
    pub exhausted: u64,
}

/// In-process pipeline backed by a fixed buffer pool and an mpsc queue
///
/// Cloning yields another handle to the same pool and queue, one per worker.
#[derive(Debug, Clone)]
pub struct ChannelPipeline {
    pool: Arc<PacketPool>,
    queue: mpsc::Sender<Packet>,
    policy: ExhaustionPolicy,
}

impl ChannelPipeline {
    /// Create a pipeline of `pool_size` buffers, each preallocated for
    /// `frame_capacity` bytes
    ///
    /// The queue holds as many packets as the pool, so submission only fails
    /// once the receiver is gone.
    pub fn new(pool_size: usize, frame_capacity: usize, policy: ExhaustionPolicy) -> (Self, PacketReceiver) {
        let pool = Arc::new(PacketPool::new(pool_size, frame_capacity));
        let (queue, rx) = mpsc::channel(pool_size.max(1));
        (Self { pool: pool.clone(), queue, policy }, PacketReceiver { rx, pool })
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size,
            available: self.pool.available(),
            acquired: self.pool.acquired.load(Ordering::Relaxed),
            exhausted: self.pool.exhausted.load(Ordering::Relaxed),
        }
    }
}

impl PacketPipeline for ChannelPipeline {
    fn acquire(&self) -> Option<Packet> {
        self.pool.take()
    }

    fn submit(&self, packet: Packet) -> std::result::Result<(), Rejected> {
        self.queue.try_send(packet).map_err(|e| match e {
            mpsc::error::TrySendError::Full(packet) => Rejected { packet, reason: "submission queue full".into() },
            mpsc::error::TrySendError::Closed(packet) => {
                Rejected { packet, reason: "packet receiver dropped".into() }
            }
        })
    }

    fn release(&self, packet: Packet) {
        trace!("Released unsubmitted packet buffer");
        self.pool.put(packet);
    }

    fn exhaustion_policy(&self) -> ExhaustionPolicy {
        self.policy
    }

    fn buffer_released(&self) -> Option<&Notify> {
        Some(&self.pool.released)
    }
}

/// Receiving half of a [`ChannelPipeline`]
///
/// Packets must be handed back with [`recycle`](Self::recycle) once
/// processed, otherwise the pool drains.
#[derive(Debug)]
pub struct PacketReceiver {
    rx: mpsc::Receiver<Packet>,
    pool: Arc<PacketPool>,
}

impl PacketReceiver {
    /// Next submitted packet; `None` once every pipeline handle is dropped
    /// and the queue is empty
    pub async fn recv(&mut self) -> Option<Packet> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Packet> {
        self.rx.try_recv().ok()
    }

    /// Return a processed packet to the pool
    pub fn recycle(&self, packet: Packet) {
        self.pool.put(packet);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LinkType;

    #[test]
    fn pool_hands_out_fixed_number_of_buffers() {
        let (pipeline, _rx) = ChannelPipeline::new(2, 64, ExhaustionPolicy::Drop);

        let a = pipeline.acquire().unwrap();
        let _b = pipeline.acquire().unwrap();
        assert!(pipeline.acquire().is_none());

        pipeline.release(a);
        assert!(pipeline.acquire().is_some());

        let stats = pipeline.stats();
        assert_eq!(stats.acquired, 3);
        assert_eq!(stats.exhausted, 1);
        assert_eq!(pipeline.exhaustion_policy(), ExhaustionPolicy::Drop);
    }

    #[tokio::test]
    async fn submitted_packets_arrive_in_order_and_recycle() {
        let (pipeline, mut rx) = ChannelPipeline::new(4, 64, ExhaustionPolicy::Wait);

        for n in 0..3u8 {
            let mut packet = pipeline.acquire().unwrap();
            packet.data.push(n);
            pipeline.submit(packet).unwrap();
        }
        assert_eq!(pipeline.stats().available, 1);

        for n in 0..3u8 {
            let packet = rx.recv().await.unwrap();
            assert_eq!(packet.data, vec![n]);
            rx.recycle(packet);
        }
        assert_eq!(pipeline.stats().available, 4);
    }

    #[test]
    fn recycled_buffers_come_back_empty() {
        let (pipeline, rx) = ChannelPipeline::new(1, 64, ExhaustionPolicy::Wait);
        let mut packet = pipeline.acquire().unwrap();
        packet.data.extend_from_slice(&[1, 2, 3]);
        packet.link_type = LinkType::RAW;
        rx.recycle(packet);

        let packet = pipeline.acquire().unwrap();
        assert!(packet.data.is_empty());
        assert_eq!(packet.link_type, LinkType::default());
    }

    #[test]
    fn submission_after_receiver_drop_returns_buffer() {
        let (pipeline, rx) = ChannelPipeline::new(1, 64, ExhaustionPolicy::Wait);
        drop(rx);

        let mut packet = pipeline.acquire().unwrap();
        packet.data.push(42);
        let rejected = pipeline.submit(packet).unwrap_err();

        assert_eq!(rejected.packet.data, vec![42]);
        assert_eq!(rejected.to_string(), "packet receiver dropped");
        pipeline.release(rejected.packet);
        assert_eq!(pipeline.stats().available, 1);
    }

    #[tokio::test]
    async fn recycling_wakes_a_waiting_worker() {
        let (pipeline, rx) = ChannelPipeline::new(1, 64, ExhaustionPolicy::Wait);
        let packet = pipeline.acquire().unwrap();
        assert!(pipeline.acquire().is_none());

        let waiter = pipeline.clone();
        let woken = tokio::spawn(async move {
            if let Some(released) = waiter.buffer_released() {
                released.notified().await;
            }
            waiter.acquire()
        });

        rx.recycle(packet);
        let reacquired = tokio::time::timeout(std::time::Duration::from_secs(1), woken).await.unwrap().unwrap();
        assert!(reacquired.is_some());
    }

    #[tokio::test]
    async fn release_before_waiting_is_not_lost() {
        let (pipeline, _rx) = ChannelPipeline::new(1, 64, ExhaustionPolicy::Wait);
        let packet = pipeline.acquire().unwrap();
        pipeline.release(packet);

        let released = pipeline.buffer_released().unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), released.notified()).await.unwrap();
    }

    #[test]
    fn shared_through_arc() {
        let (pipeline, _rx) = ChannelPipeline::new(1, 8, ExhaustionPolicy::Wait);
        let shared: Arc<dyn PacketPipeline> = Arc::new(pipeline);
        assert!(shared.acquire().is_some());
        assert!(shared.acquire().is_none());
    }
}
