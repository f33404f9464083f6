//! Host port allocation
//!
//! A port is considered free when nothing accepts a TCP connection on it.
//! This is a probe, not a reservation: another process may bind the port
//! before the engine does.

use crate::error::{NanoError, Result};
#[cfg(test)]
use mockall::automock;
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::ops::RangeInclusive;
use std::time::Duration;
use tracing::debug;

/// Ports the object gateway may be published on.
pub const RGW_PORTS: RangeInclusive<u16> = 8000..=8100;

/// Ports the web UI may be published on.
pub const UI_PORTS: RangeInclusive<u16> = 5000..=5100;

/// Answers whether a host port is already in use.
#[cfg_attr(test, automock)]
pub trait PortProbe: Send + Sync {
    fn in_use(&self, port: u16) -> bool;
}

/// Probes ports with a short TCP connect to `0.0.0.0`.
#[derive(Debug, Clone)]
pub struct TcpPortProbe {
    timeout: Duration,
}

impl TcpPortProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TcpPortProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl PortProbe for TcpPortProbe {
    fn in_use(&self, port: u16) -> bool {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        TcpStream::connect_timeout(&addr, self.timeout).is_ok()
    }
}

/// First free port in `range`, scanning upwards.
pub fn allocate(probe: &dyn PortProbe, service: &str, range: RangeInclusive<u16>) -> Result<u16> {
    let (start, end) = (*range.start(), *range.end());
    for port in range {
        if !probe.in_use(port) {
            debug!(service = %service, port = port, "Allocated port");
            return Ok(port);
        }
    }
    Err(NanoError::NoPortAvailable {
        service: service.to_string(),
        start,
        end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use std::net::TcpListener;

    #[test]
    fn test_all_ports_busy() {
        let mut probe = MockPortProbe::new();
        probe.expect_in_use().times(3).returning(|_| true);

        let err = allocate(&probe, "S3", 8000..=8002).unwrap_err();
        assert!(matches!(
            err,
            NanoError::NoPortAvailable { start: 8000, end: 8002, .. }
        ));
    }

    #[test]
    fn test_only_last_port_free() {
        let mut probe = MockPortProbe::new();
        probe
            .expect_in_use()
            .times(3)
            .returning(|port| port != 8002);

        assert_eq!(allocate(&probe, "S3", 8000..=8002).unwrap(), 8002);
    }

    #[test]
    fn test_first_free_port_wins() {
        let mut probe = MockPortProbe::new();
        probe.expect_in_use().with(eq(5000)).times(1).returning(|_| false);

        assert_eq!(allocate(&probe, "UI", UI_PORTS).unwrap(), 5000);
    }

    #[test]
    fn test_tcp_probe_sees_listener() {
        let listener = TcpListener::bind("0.0.0.0:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpPortProbe::default();
        assert!(probe.in_use(port));
        drop(listener);
    }
}
