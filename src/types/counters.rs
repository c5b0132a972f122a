//! Worker counters and connection state

use serde::Serialize;
use std::fmt;

/// Monotonic counters kept by one acquisition worker
///
/// `packets` and `bytes` only advance after the pipeline accepted a packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    /// Packets submitted downstream
    pub packets: u64,
    /// Captured payload bytes submitted downstream
    pub bytes: u64,
    /// Records dropped because the packet pool was exhausted
    pub dropped: u64,
    /// Connections discarded for protocol corruption
    pub malformed: u64,
    /// Successful reconnects after the initial connect
    pub reconnects: u64,
}

impl Counters {
    pub fn record_submitted(&mut self, captured_len: usize) {
        self.packets += 1;
        self.bytes += captured_len as u64;
    }
}

/// Connection lifecycle of the stream ingestor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Shutdown observed; the connection is being torn down
    Draining,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Draining => "draining",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn submitted_sizes_sum_into_bytes(sizes in prop::collection::vec(0usize..65_536, 0..200)) {
            let mut counters = Counters::default();
            for size in &sizes {
                counters.record_submitted(*size);
            }
            prop_assert_eq!(counters.packets, sizes.len() as u64);
            prop_assert_eq!(counters.bytes, sizes.iter().map(|s| *s as u64).sum::<u64>());
            prop_assert_eq!(counters.dropped, 0);
        }
    }

    #[test]
    fn state_display() {
        assert_eq!(ConnectionState::Draining.to_string(), "draining");
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }
}
