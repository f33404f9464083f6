//! Host address discovery

use crate::error::{NanoError, Result};
use nix::ifaddrs::getifaddrs;
use std::net::{Ipv4Addr, SocketAddrV4};

/// IPv4 addresses of every host interface, highest last octet first.
///
/// Sorting on the last octet pushes the loopback address to the end, so the
/// first entry is the address worth showing to users.
pub fn interface_ipv4s() -> Result<Vec<Ipv4Addr>> {
    let addrs = getifaddrs().map_err(|e| {
        NanoError::host_tool(
            "getifaddrs",
            format!("Unable to determine network interface address. {}", e),
        )
    })?;

    let ips = addrs
        .filter_map(|ifaddr| ifaddr.address)
        .filter_map(|addr| addr.as_sockaddr_in().map(|sin| *SocketAddrV4::from(*sin).ip()))
        .collect();

    Ok(sort_by_last_octet(ips))
}

/// The address endpoints are advertised on.
pub fn preferred_ipv4() -> Result<Ipv4Addr> {
    interface_ipv4s()?
        .into_iter()
        .next()
        .ok_or_else(|| NanoError::host_tool("getifaddrs", "no IPv4 address found on this host"))
}

fn sort_by_last_octet(mut ips: Vec<Ipv4Addr>) -> Vec<Ipv4Addr> {
    ips.sort_by(|a, b| b.octets()[3].cmp(&a.octets()[3]));
    ips
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_prefers_high_last_octet() {
        let sorted = sort_by_last_octet(vec![
            Ipv4Addr::new(127, 0, 0, 1),
            Ipv4Addr::new(192, 168, 1, 42),
            Ipv4Addr::new(10, 0, 0, 7),
        ]);
        assert_eq!(
            sorted,
            vec![
                Ipv4Addr::new(192, 168, 1, 42),
                Ipv4Addr::new(10, 0, 0, 7),
                Ipv4Addr::new(127, 0, 0, 1),
            ]
        );
    }

    #[test]
    fn test_host_has_an_ipv4() {
        // Every host has at least loopback.
        let ips = interface_ipv4s().unwrap();
        assert!(!ips.is_empty());
    }
}
