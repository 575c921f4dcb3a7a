//! Name resolution: resolves a host to an ordered list of address records.
//! The engine keeps only the first IPv4 entry.

use crate::error::TraceError;
use std::net::{IpAddr, ToSocketAddrs};

/// The one field the engine actually needs out of a resolved address; kept
/// as its own type rather than handing back raw `SocketAddr`s so the engine
/// depends on a small, stable surface instead of std's resolver API shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAddress {
    pub ip: IpAddr,
}

/// Resolves `host` (bare hostname, no port) to every address the system
/// resolver returns for it.
pub fn resolve(host: &str) -> Result<Vec<ResolvedAddress>, TraceError> {
    // ToSocketAddrs requires a port; 0 is a placeholder, never dialed.
    (host, 0u16)
        .to_socket_addrs()
        .map(|iter| iter.map(|sa| ResolvedAddress { ip: sa.ip() }).collect())
        .map_err(|e| TraceError::ResolutionFailed(format!("{host}: {e}")))
}

/// Picks the first IPv4 address out of a resolved list.
pub fn first_ipv4(addrs: &[ResolvedAddress]) -> Result<[u8; 4], TraceError> {
    addrs
        .iter()
        .find_map(|a| match a.ip {
            IpAddr::V4(v4) => Some(v4.octets()),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| TraceError::ResolutionFailed("no IPv4 address in resolver response".into()))
}
