//! Connect send path: bind an ephemeral source port and let the kernel
//! build and emit the SYN. The socket's connect status is never read back --
//! correlation happens exclusively through the raw receive sockets, so both
//! send modes look identical to the correlator.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::SocketAddrV4;

/// Opens a probe socket, binds it to `(src_ip, sport)`, sets its TTL, flips
/// it non-blocking, and kicks off a connect toward `(dst_ip, dst_port)`.
/// The returned socket must be retained until the TTL's wait window closes
/// and then dropped (closing the fd).
pub fn send_probe(src_ip: [u8; 4], sport: u16, dst_ip: [u8; 4], dst_port: u16, ttl: u8) -> std::io::Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;

    // A failed bind is non-fatal: the kernel just picks its own ephemeral
    // port, which only matters for correlation, not packet delivery.
    let bind_addr: SockAddr = SocketAddrV4::new(src_ip.into(), sport).into();
    let _ = socket.bind(&bind_addr);

    socket.set_ttl(ttl as u32)?;
    socket.set_nonblocking(true)?;

    let dst: SockAddr = SocketAddrV4::new(dst_ip.into(), dst_port).into();
    match socket.connect(&dst) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
        Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => {}
        Err(e) => return Err(e),
    }

    Ok(socket)
}
