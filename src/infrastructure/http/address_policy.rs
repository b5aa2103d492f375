//! Which peer addresses an outbound fetch may connect to.
//!
//! Only globally routable unicast addresses are permitted, unless an
//! address falls inside an explicitly allow-listed network.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::IpNet;
use thiserror::Error;

/// A connection target rejected by the policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("blocked address {address} for host {host}")]
pub struct BlockedAddress {
    /// Host name or literal the address came from.
    pub host: String,
    /// The rejected address.
    pub address: IpAddr,
}

/// Invalid entry in the private network allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid network {entry:?}: {reason}")]
pub struct InvalidNetwork {
    /// The offending configuration entry.
    pub entry: String,
    /// Parser message.
    pub reason: String,
}

/// Peer address policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressPolicy {
    allowed: Vec<IpNet>,
}

impl AddressPolicy {
    /// Policy with no allow-listed networks.
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            allowed: Vec::new(),
        }
    }

    /// Parses CIDR strings. A bare address is taken as a single-host network.
    ///
    /// # Errors
    /// Returns the first entry that is neither a CIDR nor an address.
    pub fn from_cidrs<S: AsRef<str>>(entries: &[S]) -> Result<Self, InvalidNetwork> {
        let allowed = entries
            .iter()
            .map(|entry| {
                let entry = entry.as_ref().trim();
                entry
                    .parse::<IpNet>()
                    .or_else(|e| entry.parse::<IpAddr>().map(host_network).map_err(|_| e))
                    .map_err(|e| InvalidNetwork {
                        entry: entry.to_string(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { allowed })
    }

    /// Returns the allow-listed networks.
    #[must_use]
    pub fn allowed(&self) -> &[IpNet] {
        &self.allowed
    }

    /// Returns true if connecting to `address` must be refused.
    #[must_use]
    pub fn is_blocked(&self, address: IpAddr) -> bool {
        let address = address.to_canonical();
        if self.allowed.iter().any(|net| net.contains(&address)) {
            return false;
        }
        is_non_public(address)
    }

    /// Checks one resolved or literal address.
    ///
    /// # Errors
    /// Returns [`BlockedAddress`] if the address is not permitted.
    pub fn check(&self, host: &str, address: IpAddr) -> Result<(), BlockedAddress> {
        if self.is_blocked(address) {
            return Err(BlockedAddress {
                host: host.to_string(),
                address,
            });
        }
        Ok(())
    }
}

fn host_network(address: IpAddr) -> IpNet {
    match address {
        IpAddr::V4(v4) => IpNet::V4(v4.into()),
        IpAddr::V6(v6) => IpNet::V6(v6.into()),
    }
}

/// Returns true for any address that is not global unicast.
#[must_use]
pub fn is_non_public(address: IpAddr) -> bool {
    match address {
        IpAddr::V4(v4) => is_non_public_v4(v4),
        IpAddr::V6(v6) => is_non_public_v6(v6),
    }
}

fn is_non_public_v4(ip: Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();

    ip.is_unspecified()
        || ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_multicast()
        // 0.0.0.0/8
        || a == 0
        // 100.64.0.0/10 carrier-grade NAT
        || (a == 100 && (b & 0xc0) == 64)
        // 192.0.0.0/24 protocol assignments
        || (a == 192 && b == 0 && c == 0)
        // 192.88.99.0/24 6to4 relay anycast
        || (a == 192 && b == 88 && c == 99)
        // 198.18.0.0/15 benchmarking
        || (a == 198 && (b & 0xfe) == 18)
        // 240.0.0.0/4 reserved
        || a >= 240
}

fn is_non_public_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = embedded_v4(ip) {
        return is_non_public_v4(v4);
    }

    let segments = ip.segments();

    ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_multicast()
        // fc00::/7 unique local
        || (segments[0] & 0xfe00) == 0xfc00
        // fe80::/10 link-local
        || (segments[0] & 0xffc0) == 0xfe80
        // 2001:db8::/32 documentation
        || (segments[0] == 0x2001 && segments[1] == 0x0db8)
        // 2001::/32 Teredo
        || (segments[0] == 0x2001 && segments[1] == 0)
        // 2001:2::/48 benchmarking
        || (segments[0] == 0x2001 && segments[1] == 2 && segments[2] == 0)
        // 2001:3::/32 AMT
        || (segments[0] == 0x2001 && segments[1] == 3)
        // 2001:10::/28 ORCHID, 2001:20::/28 ORCHIDv2, 2001:30::/28 DRIP
        || (segments[0] == 0x2001 && matches!(segments[1] & 0xfff0, 0x0010..=0x0030))
        // 64:ff9b::/32 NAT64 prefixes
        || (segments[0] == 0x0064 && segments[1] == 0xff9b)
        // 2002::/16 6to4
        || segments[0] == 0x2002
        // 100::/64 discard-only
        || (segments[0] == 0x0100 && segments[1..4] == [0, 0, 0])
}

/// IPv4 address carried inside an IPv6 one (mapped or compatible).
fn embedded_v4(ip: Ipv6Addr) -> Option<Ipv4Addr> {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return Some(v4);
    }
    let segments = ip.segments();
    let low = Ipv4Addr::new(
        (segments[6] >> 8) as u8,
        (segments[6] & 0xff) as u8,
        (segments[7] >> 8) as u8,
        (segments[7] & 0xff) as u8,
    );
    // ::a.b.c.d, excluding :: and ::1
    if segments[..6] == [0; 6] && !ip.is_unspecified() && !ip.is_loopback() {
        return Some(low);
    }
    None
}
