//! Network endpoint value type.
//!
//! The canonical string form (`ip:port`, `[ip6]:port`) is the key used by
//! the address book for every map it keeps.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{AddrParseError, IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

/// A network-reachable peer address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }

    pub fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    /// Canonical string used as the address book key.
    pub fn key(&self) -> String {
        self.0.to_string()
    }

    /// Whether outbound connections to this endpoint make sense.
    ///
    /// Rejects port 0 and any address that is unspecified, loopback,
    /// private, link-local, multicast, or in a reserved/documentation range.
    pub fn is_routable(&self) -> bool {
        self.0.port() != 0 && is_routable_ip(&self.0.ip())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Endpoint {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<SocketAddr>().map(Self)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

/// Check whether an IP address is globally routable.
pub fn is_routable_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => ipv4_is_routable(addr),
        IpAddr::V6(addr) => match addr.to_ipv4_mapped() {
            Some(mapped) => ipv4_is_routable(&mapped),
            None => ipv6_is_routable(addr),
        },
    }
}

fn ipv4_is_routable(addr: &Ipv4Addr) -> bool {
    let octets = addr.octets();

    // 100.64.0.0/10 carrier-grade NAT
    let shared = octets[0] == 100 && (octets[1] & 0b1100_0000) == 0b0100_0000;
    // 198.18.0.0/15 benchmarking
    let benchmarking = octets[0] == 198 && (octets[1] & 0xfe) == 18;
    // 240.0.0.0/4 reserved
    let reserved = octets[0] & 0xf0 == 0xf0;

    !addr.is_unspecified()
        && !addr.is_loopback()
        && !addr.is_private()
        && !addr.is_link_local()
        && !addr.is_broadcast()
        && !addr.is_multicast()
        && !addr.is_documentation()
        && !shared
        && !benchmarking
        && !reserved
}

fn ipv6_is_routable(addr: &Ipv6Addr) -> bool {
    let segments = addr.segments();

    let unique_local = segments[0] & 0xfe00 == 0xfc00;
    let link_local = segments[0] & 0xffc0 == 0xfe80;
    let documentation = segments[0] == 0x2001 && segments[1] == 0x0db8;

    !addr.is_unspecified()
        && !addr.is_loopback()
        && !addr.is_multicast()
        && !unique_local
        && !link_local
        && !documentation
}
