//! Endpoint descriptor parsing (`tcp@<host>:<port>`)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{AcquisitionError, Result};

/// Transport used to reach a PCAP-over-IP server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Tcp,
}

impl Transport {
    fn prefix(self) -> &'static str {
        match self {
            Transport::Tcp => "tcp@",
        }
    }
}

/// Connection target parsed from an endpoint descriptor
///
/// Host is non-empty and port is in `1..=65535`; once constructed the value
/// never changes.
///
/// ```rust
/// use pcap_over_ip::config::Endpoint;
///
/// let endpoint: Endpoint = "tcp@127.0.0.1:4000".parse().unwrap();
/// assert_eq!(endpoint.host(), "127.0.0.1");
/// assert_eq!(endpoint.port(), 4000);
///
/// assert!("127.0.0.1:4000".parse::<Endpoint>().is_err());
/// assert!("tcp@127.0.0.1".parse::<Endpoint>().is_err());
/// assert!("tcp@127.0.0.1:0".parse::<Endpoint>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    transport: Transport,
    host: String,
    port: u16,
}

impl Endpoint {
    /// Build a TCP endpoint from parts
    pub fn tcp(host: impl Into<String>, port: u16) -> Result<Self> {
        let host = host.into();
        if host.is_empty() {
            return Err(AcquisitionError::configuration("endpoint host is empty"));
        }
        if port == 0 {
            return Err(AcquisitionError::configuration("endpoint port must be positive"));
        }
        Ok(Self { transport: Transport::Tcp, host, port })
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for Endpoint {
    type Err = AcquisitionError;

    fn from_str(descriptor: &str) -> Result<Self> {
        let rest = descriptor.strip_prefix(Transport::Tcp.prefix()).ok_or_else(|| {
            AcquisitionError::configuration(format!(
                "endpoint '{}' must start with 'tcp@' (expected tcp@<host>:<port>)",
                descriptor
            ))
        })?;

        let (host, port) = rest.rsplit_once(':').ok_or_else(|| {
            AcquisitionError::configuration(format!(
                "endpoint '{}' is missing ':<port>' (expected tcp@<host>:<port>)",
                descriptor
            ))
        })?;

        // [v6-literal]:port
        let host = match host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
            Some(literal) => literal,
            None if host.contains(':') => {
                return Err(AcquisitionError::configuration(format!(
                    "endpoint '{}' has an unbracketed IPv6 host (expected tcp@[<address>]:<port>)",
                    descriptor
                )));
            }
            None => host,
        };

        let port: i64 = port.trim().parse().map_err(|_| {
            AcquisitionError::configuration(format!(
                "endpoint '{}' has a non-numeric port '{}'",
                descriptor, port
            ))
        })?;
        if port <= 0 || port > u16::MAX as i64 {
            return Err(AcquisitionError::configuration(format!(
                "endpoint '{}' port {} is outside 1..=65535",
                descriptor, port
            )));
        }

        Endpoint::tcp(host, port as u16)
    }
}

impl TryFrom<String> for Endpoint {
    type Error = AcquisitionError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "{}[{}]:{}", self.transport.prefix(), self.host, self.port)
        } else {
            write!(f, "{}{}:{}", self.transport.prefix(), self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ipv4_and_hostname() {
        let endpoint: Endpoint = "tcp@127.0.0.1:4000".parse().unwrap();
        assert_eq!(endpoint.transport(), Transport::Tcp);
        assert_eq!(endpoint.host(), "127.0.0.1");
        assert_eq!(endpoint.port(), 4000);

        let endpoint: Endpoint = "tcp@capture.example.net:57012".parse().unwrap();
        assert_eq!(endpoint.host(), "capture.example.net");
        assert_eq!(endpoint.port(), 57012);
    }

    #[test]
    fn parses_bracketed_ipv6() {
        let endpoint: Endpoint = "tcp@[::1]:4000".parse().unwrap();
        assert_eq!(endpoint.host(), "::1");
        assert_eq!(endpoint.to_string(), "tcp@[::1]:4000");
    }

    #[test]
    fn rejects_malformed_descriptors() {
        for descriptor in [
            "",
            "127.0.0.1:4000",
            "udp@127.0.0.1:4000",
            "tcp@127.0.0.1",
            "tcp@:4000",
            "tcp@127.0.0.1:0",
            "tcp@127.0.0.1:-5",
            "tcp@127.0.0.1:65536",
            "tcp@127.0.0.1:http",
            "tcp@::1",
            "tcp@::1:4000",
            "tcp@fe80::1:57012",
        ] {
            let err = descriptor.parse::<Endpoint>().unwrap_err();
            assert!(
                matches!(err, AcquisitionError::Configuration { .. }),
                "{descriptor:?} should be a configuration error, got {err:?}"
            );
        }
    }

    #[test]
    fn display_matches_descriptor() {
        let endpoint: Endpoint = "tcp@10.0.0.7:4000".parse().unwrap();
        assert_eq!(endpoint.to_string(), "tcp@10.0.0.7:4000");
    }

    #[test]
    fn deserializes_from_yaml_string() {
        let endpoint: Endpoint = serde_yaml_ng::from_str("tcp@localhost:4000").unwrap();
        assert_eq!(endpoint, Endpoint::tcp("localhost", 4000).unwrap());

        assert!(serde_yaml_ng::from_str::<Endpoint>("localhost:4000").is_err());
    }
}
