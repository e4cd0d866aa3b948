//
// Copyright (c) The Topolink Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

/// Address family of an IP address or socket.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

/// Extension methods for [`IpAddr`].
pub trait IpAddrExt {
    /// Returns the address family of this address.
    fn address_family(&self) -> AddressFamily;

    /// Returns an unspecified ("any") address of the given family.
    fn unspecified(af: AddressFamily) -> IpAddr;

    /// Returns true if the address is usable as a source or destination for
    /// discovery traffic (i.e. not unspecified and not a broadcast/multicast
    /// address received where a unicast one was expected).
    fn is_usable(&self) -> bool;
}

impl IpAddrExt for IpAddr {
    fn address_family(&self) -> AddressFamily {
        match self {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        }
    }

    fn unspecified(af: AddressFamily) -> IpAddr {
        match af {
            AddressFamily::Ipv4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            AddressFamily::Ipv6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    }

    fn is_usable(&self) -> bool {
        !self.is_unspecified() && !self.is_multicast()
    }
}

/// Returns true if `prefix` is a global prefix per §3 of the topology
/// specification: neither loopback (127.0.0.0/8), IPv4 link-local
/// (169.254.0.0/16), nor IPv6 link-local (fe80::/10).
pub fn is_global_prefix(prefix: &IpNetwork) -> bool {
    match prefix.ip() {
        IpAddr::V4(addr) => !addr.is_loopback() && !is_ipv4_link_local(&addr),
        IpAddr::V6(addr) => !addr.is_loopback() && !is_ipv6_link_local(&addr),
    }
}

/// Returns true if `addr` is a link-local address (IPv4 169.254.0.0/16 or
/// IPv6 fe80::/10).
pub fn is_link_local(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(addr) => is_ipv4_link_local(addr),
        IpAddr::V6(addr) => is_ipv6_link_local(addr),
    }
}

fn is_ipv4_link_local(addr: &Ipv4Addr) -> bool {
    addr.octets()[0] == 169 && addr.octets()[1] == 254
}

fn is_ipv6_link_local(addr: &Ipv6Addr) -> bool {
    // fe80::/10
    let segments = addr.segments();
    (segments[0] & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_prefix_excludes_loopback_and_link_local() {
        assert!(!is_global_prefix(&"127.0.0.1/8".parse().unwrap()));
        assert!(!is_global_prefix(&"169.254.1.1/16".parse().unwrap()));
        assert!(!is_global_prefix(&"fe80::1/10".parse().unwrap()));
        assert!(!is_global_prefix(&"::1/128".parse().unwrap()));
        assert!(is_global_prefix(&"10.0.3.0/24".parse().unwrap()));
        assert!(is_global_prefix(&"2001:db8::/64".parse().unwrap()));
    }
}
