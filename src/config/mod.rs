//! Acquisition source configuration.
//!
//! A [`SourceConfig`] describes one PCAP-over-IP source. It is usually loaded
//! from YAML; every field except `endpoint` has a default.
//!
//! ```rust
//! use pcap_over_ip::config::{ByteOrderMode, SourceConfig};
//! use std::time::Duration;
//!
//! let config = SourceConfig::from_yaml_str(
//!     r#"
//! endpoint: tcp@127.0.0.1:4000
//! byte_order: swapped
//! reconnect:
//!   max_attempts: 3
//!   delay_ms: 500
//! "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.endpoint.port(), 4000);
//! assert_eq!(config.byte_order, ByteOrderMode::Swapped);
//! assert_eq!(config.reconnect.delay(), Duration::from_millis(500));
//! assert_eq!(config.max_frame_size, 262_144);
//! ```

mod endpoint;

pub use endpoint::{Endpoint, Transport};

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::types::{ByteOrder, GLOBAL_HEADER_SIZE, LinkType, RECORD_HEADER_SIZE};
use crate::{AcquisitionError, Result};

/// Default plausibility bound for captured lengths (tcpdump's maximum snaplen)
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 262_144;

/// Largest accepted `max_frame_size`
pub const MAX_FRAME_SIZE_LIMIT: u32 = 16 * 1024 * 1024;

const DEFAULT_READ_CHUNK_SIZE: usize = 64 * 1024;
const DEFAULT_READ_TIMEOUT_MS: u64 = 1_000;
const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 2_000;
const DEFAULT_BACKPRESSURE_POLL_MS: u64 = 10;

/// How record header byte order is determined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrderMode {
    /// Detect from the first header of each stream
    #[default]
    Auto,
    /// Headers are always in host order
    Native,
    /// Headers are always byte-reversed
    Swapped,
}

impl ByteOrderMode {
    /// The forced order, if any
    pub fn fixed(self) -> Option<ByteOrder> {
        match self {
            ByteOrderMode::Auto => None,
            ByteOrderMode::Native => Some(ByteOrder::Native),
            ByteOrderMode::Swapped => Some(ByteOrder::Swapped),
        }
    }
}

/// Checksum validation requested from the decode stage
///
/// The acquisition engine only forwards this on every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumMode {
    #[default]
    Auto,
    Enabled,
    Disabled,
}

/// Bounded fixed-delay reconnection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectPolicy {
    #[serde(default = "default_reconnect_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_reconnect_delay_ms")]
    pub delay_ms: u64,
}

impl ReconnectPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_RECONNECT_ATTEMPTS, delay_ms: DEFAULT_RECONNECT_DELAY_MS }
    }
}

/// Configuration of one PCAP-over-IP source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// `tcp@<host>:<port>`
    pub endpoint: Endpoint,

    /// Link type of captured frames unless the stream preamble says otherwise
    #[serde(default)]
    pub link_type: LinkType,

    /// Largest captured length accepted before the stream is considered corrupt
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: u32,

    #[serde(default)]
    pub byte_order: ByteOrderMode,

    #[serde(default)]
    pub checksum_mode: ChecksumMode,

    /// Upper bound on bytes requested per socket read
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,

    /// Deadline for a single socket read
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default)]
    pub reconnect: ReconnectPolicy,

    /// Wait between packet pool retries when the pool applies backpressure
    #[serde(default = "default_backpressure_poll_ms")]
    pub backpressure_poll_ms: u64,
}

impl SourceConfig {
    /// Configuration with defaults for everything but the endpoint
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            link_type: LinkType::default(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            byte_order: ByteOrderMode::default(),
            checksum_mode: ChecksumMode::default(),
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            reconnect: ReconnectPolicy::default(),
            backpressure_poll_ms: DEFAULT_BACKPRESSURE_POLL_MS,
        }
    }

    /// Parse an endpoint descriptor and build a default configuration for it
    pub fn for_endpoint(descriptor: &str) -> Result<Self> {
        Ok(Self::new(descriptor.parse()?))
    }

    /// Load and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: SourceConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            AcquisitionError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Load a YAML list of sources, one worker each
    pub fn list_from_yaml_str(yaml: &str) -> Result<Vec<Self>> {
        let configs: Vec<SourceConfig> = serde_yaml_ng::from_str(yaml)?;
        for config in &configs {
            config.validate()?;
        }
        Ok(configs)
    }

    /// Check field ranges
    pub fn validate(&self) -> Result<()> {
        if self.max_frame_size == 0 || self.max_frame_size > MAX_FRAME_SIZE_LIMIT {
            return Err(AcquisitionError::configuration(format!(
                "max_frame_size {} is outside 1..={}",
                self.max_frame_size, MAX_FRAME_SIZE_LIMIT
            )));
        }
        if self.read_chunk_size == 0 {
            return Err(AcquisitionError::configuration("read_chunk_size must be positive"));
        }
        if self.read_timeout_ms == 0 {
            return Err(AcquisitionError::configuration("read_timeout_ms must be positive"));
        }
        if self.reconnect.max_attempts == 0 {
            return Err(AcquisitionError::configuration("reconnect.max_attempts must be at least 1"));
        }
        Ok(())
    }

    pub fn with_max_frame_size(mut self, max_frame_size: u32) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn with_byte_order(mut self, byte_order: ByteOrderMode) -> Self {
        self.byte_order = byte_order;
        self
    }

    pub fn with_link_type(mut self, link_type: LinkType) -> Self {
        self.link_type = link_type;
        self
    }

    pub fn with_reconnect(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.reconnect = ReconnectPolicy { max_attempts, delay_ms: delay.as_millis() as u64 };
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn backpressure_poll(&self) -> Duration {
        Duration::from_millis(self.backpressure_poll_ms)
    }

    /// Capacity of the ingest buffer: one header plus one maximum payload
    ///
    /// Never smaller than a stream preamble.
    pub fn ingest_capacity(&self) -> usize {
        (RECORD_HEADER_SIZE + self.max_frame_size as usize).max(GLOBAL_HEADER_SIZE)
    }
}

fn default_max_frame_size() -> u32 {
    DEFAULT_MAX_FRAME_SIZE
}

fn default_read_chunk_size() -> usize {
    DEFAULT_READ_CHUNK_SIZE
}

fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

fn default_reconnect_attempts() -> u32 {
    DEFAULT_RECONNECT_ATTEMPTS
}

fn default_reconnect_delay_ms() -> u64 {
    DEFAULT_RECONNECT_DELAY_MS
}

fn default_backpressure_poll_ms() -> u64 {
    DEFAULT_BACKPRESSURE_POLL_MS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn minimal_yaml_uses_defaults() {
        let config = SourceConfig::from_yaml_str("endpoint: tcp@127.0.0.1:4000").unwrap();

        assert_eq!(config, SourceConfig::for_endpoint("tcp@127.0.0.1:4000").unwrap());
        assert_eq!(config.link_type, LinkType::ETHERNET);
        assert_eq!(config.byte_order, ByteOrderMode::Auto);
        assert_eq!(config.checksum_mode, ChecksumMode::Auto);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.delay(), Duration::from_secs(2));
        assert_eq!(config.read_timeout(), Duration::from_secs(1));
        assert_eq!(config.ingest_capacity(), 16 + 262_144);
    }

    #[test]
    fn full_yaml_overrides_everything() {
        let config = SourceConfig::from_yaml_str(
            r#"
endpoint: tcp@sensor-7:57012
link_type: 101
max_frame_size: 9000
byte_order: native
checksum_mode: disabled
read_chunk_size: 4096
read_timeout_ms: 250
reconnect:
  max_attempts: 10
  delay_ms: 100
backpressure_poll_ms: 1
"#,
        )
        .unwrap();

        assert_eq!(config.endpoint.host(), "sensor-7");
        assert_eq!(config.link_type, LinkType::RAW);
        assert_eq!(config.max_frame_size, 9000);
        assert_eq!(config.byte_order.fixed(), Some(ByteOrder::Native));
        assert_eq!(config.checksum_mode, ChecksumMode::Disabled);
        assert_eq!(config.read_chunk_size, 4096);
        assert_eq!(config.read_timeout(), Duration::from_millis(250));
        assert_eq!(config.reconnect, ReconnectPolicy { max_attempts: 10, delay_ms: 100 });
        assert_eq!(config.backpressure_poll(), Duration::from_millis(1));
    }

    #[test]
    fn malformed_endpoint_is_configuration_error() {
        let err = SourceConfig::from_yaml_str("endpoint: 127.0.0.1:4000").unwrap_err();
        assert!(matches!(err, AcquisitionError::Configuration { .. }));
        assert!(err.to_string().contains("tcp@"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = SourceConfig::from_yaml_str("endpoint: tcp@h:1\nsnaplen: 5").unwrap_err();
        assert!(matches!(err, AcquisitionError::Configuration { .. }));
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let base = SourceConfig::for_endpoint("tcp@h:1").unwrap();

        assert!(base.clone().with_max_frame_size(0).validate().is_err());
        assert!(base.clone().with_max_frame_size(MAX_FRAME_SIZE_LIMIT + 1).validate().is_err());
        assert!(base.clone().with_reconnect(0, Duration::from_secs(1)).validate().is_err());
        assert!(base.clone().with_read_timeout(Duration::ZERO).validate().is_err());
        assert!(base.validate().is_ok());
    }

    #[test]
    fn ingest_capacity_holds_a_preamble() {
        let base = SourceConfig::for_endpoint("tcp@h:1").unwrap();
        assert_eq!(base.clone().with_max_frame_size(1).ingest_capacity(), 24);
        assert_eq!(base.clone().with_max_frame_size(8).ingest_capacity(), 24);
        assert_eq!(base.with_max_frame_size(9).ingest_capacity(), 25);
    }

    #[test]
    fn loads_source_list() {
        let configs = SourceConfig::list_from_yaml_str(
            r#"
- endpoint: tcp@10.0.0.1:4000
- endpoint: tcp@10.0.0.2:4000
  byte_order: swapped
"#,
        )
        .unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[1].byte_order, ByteOrderMode::Swapped);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "endpoint: tcp@127.0.0.1:4000").unwrap();
        writeln!(file, "max_frame_size: 65535").unwrap();

        let config = SourceConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.max_frame_size, 65535);

        let missing = SourceConfig::from_yaml_file("/nonexistent/pcap-over-ip.yaml").unwrap_err();
        assert!(matches!(missing, AcquisitionError::Configuration { .. }));
    }
}
