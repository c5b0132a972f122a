//! Link-layer type of captured frames

use serde::{Deserialize, Serialize};
use std::fmt;

/// Link-layer header type (tcpdump.org `LINKTYPE_*` value)
///
/// The PCAP-over-IP record stream carries no link type of its own; it is
/// configured out of band, or taken from a capture-file preamble when the
/// producer sends one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkType(pub u32);

impl LinkType {
    pub const NULL: LinkType = LinkType(0);
    pub const ETHERNET: LinkType = LinkType(1);
    pub const RAW: LinkType = LinkType(101);
    pub const IEEE802_11: LinkType = LinkType(105);
    pub const LOOP: LinkType = LinkType(108);
    pub const LINUX_SLL: LinkType = LinkType(113);
    pub const IPV4: LinkType = LinkType(228);
    pub const IPV6: LinkType = LinkType(229);
    pub const LINUX_SLL2: LinkType = LinkType(276);

    /// Short name for well-known link types
    pub fn name(self) -> Option<&'static str> {
        match self {
            LinkType::NULL => Some("NULL"),
            LinkType::ETHERNET => Some("EN10MB"),
            LinkType::RAW => Some("RAW"),
            LinkType::IEEE802_11 => Some("IEEE802_11"),
            LinkType::LOOP => Some("LOOP"),
            LinkType::LINUX_SLL => Some("LINUX_SLL"),
            LinkType::IPV4 => Some("IPV4"),
            LinkType::IPV6 => Some("IPV6"),
            LinkType::LINUX_SLL2 => Some("LINUX_SLL2"),
            _ => None,
        }
    }
}

impl Default for LinkType {
    fn default() -> Self {
        LinkType::ETHERNET
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "LINKTYPE {}", self.0),
        }
    }
}
