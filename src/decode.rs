//! Decode stage: per-packet accounting and link-layer dispatch
//!
//! The protocol parsers themselves live outside this crate. A
//! [`DecodeStage`] keeps decode counters for every packet it sees and hands
//! the packet to the [`LinkLayerDecoder`] registered for its link type.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::pipeline::PacketReceiver;
use crate::types::{LinkType, Packet};

/// Result of decoding one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    Decoded,
    /// The decoder rejected the frame
    Invalid,
    /// No decoder is registered for the packet's link type
    Unsupported,
}

/// Link-layer decoder for one link type
pub trait LinkLayerDecoder: Send {
    fn decode(&mut self, packet: &Packet) -> DecodeOutcome;
}

impl<F> LinkLayerDecoder for F
where
    F: FnMut(&Packet) -> DecodeOutcome + Send,
{
    fn decode(&mut self, packet: &Packet) -> DecodeOutcome {
        self(packet)
    }
}

/// Counters kept by a decode stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecodeCounters {
    pub packets: u64,
    pub bytes: u64,
    pub max_packet_size: usize,
    pub invalid: u64,
    pub unsupported: u64,
    /// Packets seen per link type
    pub per_link_type: BTreeMap<LinkType, u64>,
}

impl DecodeCounters {
    fn update(&mut self, packet: &Packet) {
        self.packets += 1;
        self.bytes += packet.captured_len() as u64;
        self.max_packet_size = self.max_packet_size.max(packet.captured_len());
        *self.per_link_type.entry(packet.link_type).or_default() += 1;
    }
}

/// Counts packets and dispatches them by link type
#[derive(Default)]
pub struct DecodeStage {
    decoders: HashMap<LinkType, Box<dyn LinkLayerDecoder>>,
    counters: DecodeCounters,
}

impl DecodeStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `decoder` for `link_type`, replacing any previous one
    pub fn register(&mut self, link_type: LinkType, decoder: impl LinkLayerDecoder + 'static) -> &mut Self {
        self.decoders.insert(link_type, Box::new(decoder));
        self
    }

    pub fn counters(&self) -> &DecodeCounters {
        &self.counters
    }

    /// Account for one packet and decode it
    pub fn process(&mut self, packet: &Packet) -> DecodeOutcome {
        self.counters.update(packet);

        let outcome = match self.decoders.get_mut(&packet.link_type) {
            Some(decoder) => decoder.decode(packet),
            None => DecodeOutcome::Unsupported,
        };

        match outcome {
            DecodeOutcome::Decoded => {}
            DecodeOutcome::Invalid => self.counters.invalid += 1,
            DecodeOutcome::Unsupported => {
                if self.counters.unsupported == 0 {
                    debug!("No decoder registered for link type {}", packet.link_type);
                }
                self.counters.unsupported += 1;
            }
        }
        outcome
    }

    /// Decode everything submitted to a channel pipeline until every
    /// pipeline handle has been dropped
    ///
    /// Each packet is recycled into the pool after decoding.
    pub async fn run(mut self, mut receiver: PacketReceiver) -> DecodeCounters {
        while let Some(packet) = receiver.recv().await {
            self.process(&packet);
            receiver.recycle(packet);
        }

        info!(
            "Decode stage finished: {} packets, {} bytes ({} invalid, {} unsupported)",
            self.counters.packets, self.counters.bytes, self.counters.invalid, self.counters.unsupported
        );
        self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ChannelPipeline, ExhaustionPolicy, PacketPipeline};

    fn packet(link_type: LinkType, len: usize) -> Packet {
        Packet { link_type, data: vec![0xab; len], original_len: len as u32, ..Default::default() }
    }

    fn ethernet_length_check(packet: &Packet) -> DecodeOutcome {
        if packet.captured_len() >= 14 { DecodeOutcome::Decoded } else { DecodeOutcome::Invalid }
    }

    #[test]
    fn counts_and_dispatches_by_link_type() {
        let mut stage = DecodeStage::new();
        stage.register(LinkType::ETHERNET, ethernet_length_check);

        assert_eq!(stage.process(&packet(LinkType::ETHERNET, 60)), DecodeOutcome::Decoded);
        assert_eq!(stage.process(&packet(LinkType::ETHERNET, 10)), DecodeOutcome::Invalid);
        assert_eq!(stage.process(&packet(LinkType::RAW, 1500)), DecodeOutcome::Unsupported);

        let counters = stage.counters();
        assert_eq!(counters.packets, 3);
        assert_eq!(counters.bytes, 1570);
        assert_eq!(counters.max_packet_size, 1500);
        assert_eq!(counters.invalid, 1);
        assert_eq!(counters.unsupported, 1);
        assert_eq!(counters.per_link_type[&LinkType::ETHERNET], 2);
        assert_eq!(counters.per_link_type[&LinkType::RAW], 1);
    }

    #[test]
    fn stateful_decoders_keep_state() {
        let mut seen = Vec::new();
        let mut stage = DecodeStage::new();
        stage.register(LinkType::RAW, move |packet: &Packet| {
            seen.push(packet.captured_len());
            if seen.len() > 1 { DecodeOutcome::Invalid } else { DecodeOutcome::Decoded }
        });

        assert_eq!(stage.process(&packet(LinkType::RAW, 20)), DecodeOutcome::Decoded);
        assert_eq!(stage.process(&packet(LinkType::RAW, 20)), DecodeOutcome::Invalid);
    }

    #[tokio::test]
    async fn run_drains_pipeline_and_recycles() {
        let (pipeline, receiver) = ChannelPipeline::new(2, 64, ExhaustionPolicy::Wait);
        let mut stage = DecodeStage::new();
        stage.register(LinkType::ETHERNET, ethernet_length_check);
        let decoding = tokio::spawn(stage.run(receiver));

        for len in [60, 40] {
            let mut packet = pipeline.acquire().unwrap();
            packet.data.resize(len, 0);
            pipeline.submit(packet).unwrap();
        }
        let watcher = pipeline.clone();
        drop(pipeline);

        // The watcher keeps the queue open; release it once both packets are back.
        while watcher.stats().available < 2 {
            tokio::task::yield_now().await;
        }
        drop(watcher);

        let counters = decoding.await.unwrap();
        assert_eq!(counters.packets, 2);
        assert_eq!(counters.bytes, 100);
        assert_eq!(counters.invalid, 0);
    }
}
