//! Record source implementations

pub mod pcap_over_ip;

pub use pcap_over_ip::PcapOverIpSource;
