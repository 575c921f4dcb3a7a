//! Raw send path: hand-craft a 40-byte IPv4+TCP-SYN buffer and transmit it
//! through an `IP_HDRINCL` raw socket.

use crate::checksum;
use crate::error::TraceError;
use crate::packet::{ipv4, tcp};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::SocketAddrV4;

pub struct RawSender {
    socket: Socket,
}

impl RawSender {
    pub fn open() -> Result<Self, TraceError> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::TCP)).map_err(|e| TraceError::PermissionDenied(format!("raw TCP send socket: {e}")))?;
        socket
            .set_header_included_v4(true)
            .map_err(|e| TraceError::PermissionDenied(format!("IP_HDRINCL: {e}")))?;
        Ok(RawSender { socket })
    }

    /// Builds and sends a single SYN probe for `(ttl, idx)`, returning the
    /// number of bytes written.
    pub fn send_probe(&self, src_ip: [u8; 4], dst_ip: [u8; 4], dst_port: u16, ttl: u8, idx: u8, sport: u16) -> std::io::Result<usize> {
        let packet = build_syn_packet(src_ip, dst_ip, dst_port, ttl, idx, sport).map_err(std::io::Error::other)?;
        let addr: SockAddr = SocketAddrV4::new(dst_ip.into(), dst_port).into();
        self.socket.send_to(&packet, &addr)
    }
}

/// Builds the wire-exact 40-byte IPv4+TCP SYN buffer described in the send
/// path's packet layout: `id=(ttl<<8)|idx`, `seq=(ttl<<24)|(idx<<16)|0x1234`.
fn build_syn_packet(src_ip: [u8; 4], dst_ip: [u8; 4], dst_port: u16, ttl: u8, idx: u8, sport: u16) -> Result<Vec<u8>, TraceError> {
    let total_len = (ipv4::HEADER_LEN + tcp::HEADER_LEN) as u16;
    let mut pkt = vec![0u8; total_len as usize];

    let id = ((ttl as u16) << 8) | idx as u16;
    ipv4::write_header(&mut pkt[..ipv4::HEADER_LEN], id, ttl, ipv4::PROTO_TCP, src_ip, dst_ip, total_len);

    let seq = ((ttl as u32) << 24) | ((idx as u32) << 16) | 0x1234;
    tcp::write_syn(&mut pkt[ipv4::HEADER_LEN..], sport, dst_port, seq);

    let ip_csum = checksum::ip_checksum(&pkt[..ipv4::HEADER_LEN]);
    ipv4::set_checksum(&mut pkt[..ipv4::HEADER_LEN], ip_csum);

    let tcp_csum = checksum::tcp_checksum(src_ip, dst_ip, &pkt[ipv4::HEADER_LEN..], tcp::HEADER_LEN)?;
    tcp::set_checksum(&mut pkt[ipv4::HEADER_LEN..], tcp_csum);

    Ok(pkt)
}
