//! Target enumeration: expand an IPv4 subnet into the hosts to probe.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use ipnet::{Ipv4AddrRange, Ipv4Net};
use pingsweep_core::Target;

use crate::error::{DiscoverError, Result};

/// An IPv4 network whose base address carries no host bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subnet {
    net: Ipv4Net,
}

impl Subnet {
    /// Parse CIDR (`192.168.0.0/24`) or netmask (`192.168.0.0/255.255.255.0`)
    /// notation. A bare address is a `/32`.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();

        let net = match trimmed.parse::<Ipv4Net>() {
            Ok(net) => net,
            Err(_) => match trimmed.split_once('/') {
                Some((addr, mask)) => with_netmask(input, addr, mask)?,
                None => {
                    let addr: Ipv4Addr = trimmed.parse().map_err(|_| {
                        DiscoverError::invalid_subnet(input, not_ipv4_reason(trimmed))
                    })?;
                    Ipv4Net::new(addr, 32)
                        .map_err(|e| DiscoverError::invalid_subnet(input, e.to_string()))?
                }
            },
        };

        if net.trunc() != net {
            return Err(DiscoverError::invalid_subnet(
                input,
                format!("host bits set, did you mean {}?", net.trunc()),
            ));
        }

        Ok(Self { net })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.net.network()
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        self.net.broadcast()
    }

    pub fn prefix_len(&self) -> u8 {
        self.net.prefix_len()
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.net.contains(&addr)
    }

    /// Number of targets [`targets`](Self::targets) yields.
    ///
    /// `/31` and `/32` have no network/broadcast distinction, so every address
    /// is a host; wider prefixes exclude both ends.
    pub fn len(&self) -> u64 {
        let size = 1u64 << (32 - u32::from(self.prefix_len()));
        if self.prefix_len() >= 31 {
            size
        } else {
            size - 2
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Usable host addresses in ascending order.
    ///
    /// The sequence is lazy; call again (or clone the iterator) to restart it.
    pub fn targets(&self) -> Targets {
        Targets {
            hosts: self.net.hosts(),
        }
    }
}

impl FromStr for Subnet {
    type Err = DiscoverError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.net.fmt(f)
    }
}

fn with_netmask(input: &str, addr: &str, mask: &str) -> Result<Ipv4Net> {
    let (Ok(addr), Ok(mask)) = (addr.parse::<Ipv4Addr>(), mask.parse::<Ipv4Addr>()) else {
        return Err(DiscoverError::invalid_subnet(input, not_ipv4_reason(input.trim())));
    };
    Ipv4Net::with_netmask(addr, mask).map_err(|_| {
        DiscoverError::invalid_subnet(input, format!("netmask {mask} is not contiguous"))
    })
}

fn not_ipv4_reason(input: &str) -> String {
    let addr_part = input.split('/').next().unwrap_or(input);
    match addr_part.parse::<IpAddr>() {
        Ok(IpAddr::V6(_)) => "IPv6 networks are not supported".to_string(),
        Ok(IpAddr::V4(_)) => "prefix must be a length from 0 to 32 or a dotted netmask".to_string(),
        Err(_) => "expected IPv4 CIDR notation such as 192.168.0.0/24".to_string(),
    }
}

/// Lazy iterator over a subnet's host addresses.
#[derive(Debug, Clone)]
pub struct Targets {
    hosts: Ipv4AddrRange,
}

impl Iterator for Targets {
    type Item = Target;

    fn next(&mut self) -> Option<Target> {
        self.hosts.next().map(Target)
    }
}
