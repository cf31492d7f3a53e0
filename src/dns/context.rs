//! The `ServerContext` holds the listener configuration shared by every
//! interface connector

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::dns::netutil::{MDNS_IPV4_GROUP, MDNS_IPV6_GROUP, MDNS_PORT};

/// Counters updated by the connectors
#[derive(Default)]
pub struct ServerStatistics {
    pub received_packets: AtomicUsize,
    pub dropped_packets: AtomicUsize,
    pub sent_responses: AtomicUsize,
}

impl ServerStatistics {
    pub fn get_received_packets(&self) -> usize {
        self.received_packets.load(Ordering::Acquire)
    }

    pub fn get_dropped_packets(&self) -> usize {
        self.dropped_packets.load(Ordering::Acquire)
    }

    pub fn get_sent_responses(&self) -> usize {
        self.sent_responses.load(Ordering::Acquire)
    }
}

pub struct ServerContext {
    pub ipv4_group: SocketAddr,
    pub ipv6_group: SocketAddr,
    pub enable_ipv4: bool,
    pub enable_ipv6: bool,
    /// Decoded packets waiting for the processing loop
    pub packet_queue_size: usize,
    /// Responses larger than this are truncated and flagged
    pub max_packet_size: usize,
    pub statistics: ServerStatistics,
}

impl Default for ServerContext {
    fn default() -> Self {
        ServerContext::new()
    }
}

impl ServerContext {
    pub fn new() -> ServerContext {
        ServerContext {
            ipv4_group: SocketAddr::new(IpAddr::V4(MDNS_IPV4_GROUP), MDNS_PORT),
            ipv6_group: SocketAddr::new(IpAddr::V6(MDNS_IPV6_GROUP), MDNS_PORT),
            enable_ipv4: true,
            enable_ipv6: true,
            packet_queue_size: 32,
            max_packet_size: 9000,
            statistics: ServerStatistics::default(),
        }
    }

    /// Groups of the enabled address families, IPv4 first
    pub fn groups(&self) -> Vec<SocketAddr> {
        let mut groups = Vec::new();
        if self.enable_ipv4 {
            groups.push(self.ipv4_group);
        }
        if self.enable_ipv6 {
            groups.push(self.ipv6_group);
        }
        groups
    }
}
