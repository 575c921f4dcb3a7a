//! Determines which local IPv4 source address the kernel would use to reach
//! a destination, by connecting a throwaway UDP socket and reading back the
//! address it bound itself to. No packet is actually sent.

use crate::error::TraceError;
use std::net::{SocketAddrV4, UdpSocket};

pub fn pick_source_for(dst_ip: [u8; 4]) -> Result<[u8; 4], TraceError> {
    let sock = UdpSocket::bind("0.0.0.0:0").map_err(TraceError::Io)?;
    let dst = SocketAddrV4::new(dst_ip.into(), 53);
    sock.connect(dst)
        .map_err(|e| TraceError::NetworkUnreachable(format!("no route to {}: {e}", dst.ip())))?;

    match sock.local_addr().map_err(TraceError::Io)? {
        std::net::SocketAddr::V4(v4) => Ok(v4.ip().octets()),
        std::net::SocketAddr::V6(_) => Err(TraceError::NetworkUnreachable("kernel chose an IPv6 source for an IPv4 destination".into())),
    }
}
