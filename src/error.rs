//! Error types for PCAP-over-IP acquisition.
//!
//! Every failure an acquisition worker can observe maps onto one variant of
//! [`AcquisitionError`]. The variants follow the failure classes of the
//! acquisition path:
//!
//! - **Configuration**: malformed endpoint descriptor or settings; fatal at startup
//! - **Connection**: connect or reconnect failure; retried with a fixed delay
//! - **StreamClosed / Io**: the peer went away; triggers a reconnect
//! - **MalformedStream**: protocol-level corruption; the connection is discarded
//! - **AllocationExhausted**: the packet pool had no buffer to hand out; the record is dropped and counted
//! - **Submission**: the downstream pipeline refused a packet; fatal for the worker
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use pcap_over_ip::AcquisitionError;
//!
//! let error = AcquisitionError::stream_closed();
//! assert!(error.triggers_reconnect());
//! assert!(!error.is_fatal());
//!
//! let error = AcquisitionError::configuration("missing tcp@ prefix");
//! assert!(error.is_fatal());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

/// Result type alias for acquisition operations.
pub type Result<T, E = AcquisitionError> = std::result::Result<T, E>;

/// Main error type for acquisition operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AcquisitionError {
    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    #[error("Failed to connect to {endpoint}: {reason}")]
    Connection {
        endpoint: String,
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Peer closed the connection")]
    StreamClosed,

    #[error("Transport error during {operation}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Read deadline of {duration:?} elapsed without data")]
    ReadTimeout { duration: Duration },

    #[error("Malformed record stream: {details}")]
    MalformedStream { details: String },

    #[error("Packet pool exhausted")]
    AllocationExhausted,

    #[error("Pipeline rejected packet: {reason}")]
    Submission {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Gave up after {attempts} connection attempts to {endpoint}")]
    ReconnectExhausted {
        endpoint: String,
        attempts: u32,
        #[source]
        source: Option<Box<AcquisitionError>>,
    },

    #[error("Shutdown requested")]
    Shutdown,
}

impl AcquisitionError {
    /// Returns whether the failed operation may succeed if attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            AcquisitionError::Connection { .. } => true,
            AcquisitionError::StreamClosed => true,
            AcquisitionError::Io { .. } => true,
            AcquisitionError::ReadTimeout { .. } => true,
            AcquisitionError::MalformedStream { .. } => true,
            AcquisitionError::AllocationExhausted => true,
            AcquisitionError::Configuration { .. } => false,
            AcquisitionError::Submission { .. } => false,
            AcquisitionError::ReconnectExhausted { .. } => false,
            AcquisitionError::Shutdown => false,
        }
    }

    /// Returns whether the current connection must be discarded and re-established.
    pub fn triggers_reconnect(&self) -> bool {
        matches!(
            self,
            AcquisitionError::StreamClosed
                | AcquisitionError::Io { .. }
                | AcquisitionError::MalformedStream { .. }
        )
    }

    /// Returns whether the error ends the worker.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AcquisitionError::Configuration { .. }
                | AcquisitionError::Submission { .. }
                | AcquisitionError::ReconnectExhausted { .. }
        )
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            AcquisitionError::Configuration { .. } => vec![
                "Use the endpoint form tcp@<host>:<port>",
                "Check that the port is between 1 and 65535",
                "Check max_frame_size and reconnect settings",
            ],
            AcquisitionError::Connection { .. } => vec![
                "Ensure the PCAP-over-IP server is running",
                "Check that the host name resolves",
                "Check firewalls between capture host and server",
            ],
            AcquisitionError::StreamClosed | AcquisitionError::Io { .. } => vec![
                "Check the PCAP-over-IP server logs",
                "Verify network stability between the hosts",
            ],
            AcquisitionError::ReadTimeout { .. } => vec![
                "Increase read_timeout_ms for quiet links",
                "Verify the server is producing traffic",
            ],
            AcquisitionError::MalformedStream { .. } => vec![
                "Verify the server sends pcap records, not pcapng blocks",
                "Check the byte_order setting against the producer",
                "Increase max_frame_size if the producer uses large snaplens",
            ],
            AcquisitionError::AllocationExhausted => vec![
                "Increase the packet pool size",
                "Check that downstream stages keep up with the capture rate",
            ],
            AcquisitionError::Submission { .. } => vec![
                "Check that the downstream pipeline is still running",
                "Inspect downstream stage errors",
            ],
            AcquisitionError::ReconnectExhausted { .. } => vec![
                "Raise reconnect.max_attempts or reconnect.delay_ms",
                "Ensure the PCAP-over-IP server is reachable",
            ],
            AcquisitionError::Shutdown => vec!["No action required"],
        }
    }

    /// Helper constructor for configuration errors.
    pub fn configuration(reason: impl Into<String>) -> Self {
        AcquisitionError::Configuration { reason: reason.into() }
    }

    /// Helper constructor for connection errors carrying the transport error.
    pub fn connection_failed(endpoint: impl ToString, source: std::io::Error) -> Self {
        AcquisitionError::Connection {
            endpoint: endpoint.to_string(),
            reason: source.to_string(),
            source: Some(source),
        }
    }

    /// Helper constructor for the clean peer close.
    pub fn stream_closed() -> Self {
        AcquisitionError::StreamClosed
    }

    /// Helper constructor for transport errors.
    pub fn io(operation: &'static str, source: std::io::Error) -> Self {
        AcquisitionError::Io { operation, source }
    }

    /// Helper constructor for protocol corruption.
    pub fn malformed(details: impl Into<String>) -> Self {
        AcquisitionError::MalformedStream { details: details.into() }
    }

    /// Helper constructor for pipeline rejections.
    pub fn submission_failed(
        reason: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        AcquisitionError::Submission { reason: reason.into(), source }
    }

    /// Helper constructor for an exhausted reconnect budget.
    pub fn reconnect_exhausted(
        endpoint: impl ToString,
        attempts: u32,
        last: Option<AcquisitionError>,
    ) -> Self {
        AcquisitionError::ReconnectExhausted {
            endpoint: endpoint.to_string(),
            attempts,
            source: last.map(Box::new),
        }
    }
}

impl From<serde_yaml_ng::Error> for AcquisitionError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        AcquisitionError::Configuration { reason: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_messages_carry_their_context(
            reason in "[a-z ]{1,40}",
            endpoint in "[a-z0-9.]{1,20}:[0-9]{1,5}",
            attempts in 1u32..100u32
          ) {
            let config_msg = AcquisitionError::configuration(reason.clone()).to_string();
            prop_assert!(config_msg.contains(&reason));

            let malformed_msg = AcquisitionError::malformed(reason.clone()).to_string();
            prop_assert!(malformed_msg.contains(&reason));

            let exhausted = AcquisitionError::reconnect_exhausted(endpoint.clone(), attempts, None);
            let exhausted_msg = exhausted.to_string();
            prop_assert!(exhausted_msg.contains(&endpoint));
            prop_assert!(exhausted_msg.contains(&attempts.to_string()));
          }

          #[test]
          fn reconnect_triggers_are_never_fatal(details in ".*") {
            let errors = [
              AcquisitionError::stream_closed(),
              AcquisitionError::io("read", std::io::Error::other(details.clone())),
              AcquisitionError::malformed(details.clone()),
            ];
            for error in errors {
              prop_assert!(error.triggers_reconnect());
              prop_assert!(!error.is_fatal());
              prop_assert!(error.is_retryable());
            }
          }
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<AcquisitionError>();

        let error = AcquisitionError::stream_closed();
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn classification_matches_failure_classes() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let connection = AcquisitionError::connection_failed("127.0.0.1:4000", refused);
        assert!(connection.is_retryable());
        assert!(!connection.triggers_reconnect());
        assert!(!connection.is_fatal());

        let timeout = AcquisitionError::ReadTimeout { duration: Duration::from_secs(1) };
        assert!(!timeout.triggers_reconnect());
        assert!(!timeout.is_fatal());

        assert!(AcquisitionError::configuration("bad").is_fatal());
        assert!(AcquisitionError::submission_failed("queue closed", None).is_fatal());
        assert!(AcquisitionError::reconnect_exhausted("h:1", 3, None).is_fatal());
        assert!(!AcquisitionError::AllocationExhausted.is_fatal());
    }

    #[test]
    fn exhaustion_chains_last_failure() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let last = AcquisitionError::connection_failed("h:1", refused);
        let error = AcquisitionError::reconnect_exhausted("h:1", 5, Some(last));

        let source = std::error::Error::source(&error).expect("source should be chained");
        assert!(source.to_string().contains("refused"));
        let io = std::error::Error::source(source).expect("io error should be chained");
        assert_eq!(io.to_string(), "refused");
    }

    #[test]
    fn recovery_suggestions_are_descriptive() {
        let errors = [
            AcquisitionError::configuration("x"),
            AcquisitionError::malformed("x"),
            AcquisitionError::AllocationExhausted,
            AcquisitionError::stream_closed(),
        ];
        for error in &errors {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty());
            for suggestion in suggestions {
                assert!(suggestion.len() > 5);
            }
        }
    }

    #[test]
    fn yaml_errors_become_configuration_errors() {
        let err = serde_yaml_ng::from_str::<u32>("not: [a number").unwrap_err();
        let converted: AcquisitionError = err.into();
        assert!(matches!(converted, AcquisitionError::Configuration { .. }));
    }
}
