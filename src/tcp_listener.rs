//! Raw IPv4/TCP receive socket used to sniff the destination's SYN-ACK/RST
//! replies. Shared by both send modes -- the connect path never reads
//! connect status off its own sockets, it relies on this sniffer instead.

use crate::error::TraceError;
use crate::packet::{ipv4, tcp};
use crate::reply_source::ReplySource;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::unix::AsyncFd;

pub struct TcpReplyListener {
    inner: AsyncFd<Socket>,
}

/// A parsed destination reply: which probe it answers and whether it's a
/// SYN-ACK/RST (as opposed to some other TCP segment grazing the sniffer).
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationReply {
    pub from_ip: [u8; 4],
    pub dst_port: u16,
    pub is_reply: bool,
}

impl TcpReplyListener {
    pub fn open() -> Result<Self, TraceError> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::TCP))
            .map_err(|e| TraceError::PermissionDenied(format!("raw TCP receive socket: {e}")))?;
        socket.set_nonblocking(true).map_err(TraceError::Io)?;
        let inner = AsyncFd::new(socket).map_err(TraceError::Io)?;
        Ok(TcpReplyListener { inner })
    }

    /// Waits for readiness, reads one datagram, and parses it as outer IPv4
    /// + TCP. Returns `None` for truncation or parse failure.
    pub async fn recv_reply(&self) -> std::io::Result<Option<DestinationReply>> {
        use std::mem::MaybeUninit;
        loop {
            let mut guard = self.inner.readable().await?;
            let mut buf = [MaybeUninit::uninit(); 2048];
            match guard.try_io(|inner| inner.get_ref().recv(&mut buf)) {
                Ok(Ok(n)) => {
                    // Safety: `recv` reported `n` initialized bytes.
                    let bytes = unsafe { std::slice::from_raw_parts(buf.as_ptr() as *const u8, n) };
                    return Ok(parse_reply(bytes));
                }
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            }
        }
    }

    /// Non-blocking single attempt: returns `Ok(None)` immediately if no
    /// datagram is queued, instead of awaiting readiness. Used to drain a
    /// reply that arrived in the same wakeup as one already consumed off
    /// the other listener.
    pub fn try_recv_reply(&self) -> std::io::Result<Option<DestinationReply>> {
        use std::mem::MaybeUninit;
        let mut buf = [MaybeUninit::uninit(); 2048];
        match self.inner.get_ref().recv(&mut buf) {
            Ok(n) => {
                // Safety: `recv` reported `n` initialized bytes.
                let bytes = unsafe { std::slice::from_raw_parts(buf.as_ptr() as *const u8, n) };
                Ok(parse_reply(bytes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl ReplySource for TcpReplyListener {
    async fn recv_reply(&self) -> std::io::Result<Option<DestinationReply>> {
        TcpReplyListener::recv_reply(self).await
    }

    fn try_recv_reply(&self) -> std::io::Result<Option<DestinationReply>> {
        TcpReplyListener::try_recv_reply(self)
    }
}

fn parse_reply(datagram: &[u8]) -> Option<DestinationReply> {
    let ip = ipv4::Ipv4View::parse(datagram)?;
    if ip.protocol() != ipv4::PROTO_TCP {
        return None;
    }
    let tcp_view = tcp::TcpView::parse(ip.payload())?;
    Some(DestinationReply {
        from_ip: ip.src(),
        dst_port: tcp_view.dst_port(),
        is_reply: tcp_view.is_syn_ack() || tcp_view.is_rst(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_reply(from: [u8; 4], dst_port: u16, flags: u8) -> Vec<u8> {
        let mut tcp_buf = [0u8; tcp::HEADER_LEN];
        tcp::write_syn(&mut tcp_buf, 443, dst_port, 1);
        tcp_buf[tcp::OFF_FLAGS] = flags;

        let mut ip_buf = vec![0u8; ipv4::HEADER_LEN];
        ipv4::write_header(&mut ip_buf, 1, 64, ipv4::PROTO_TCP, from, [10, 0, 0, 2], (ipv4::HEADER_LEN + tcp::HEADER_LEN) as u16);
        ip_buf.extend_from_slice(&tcp_buf);
        ip_buf
    }

    #[test]
    fn parses_syn_ack_as_a_reply() {
        let datagram = build_reply([93, 184, 216, 34], 33440, tcp::FLAG_SYN | tcp::FLAG_ACK);
        let reply = parse_reply(&datagram).unwrap();
        assert_eq!(reply.from_ip, [93, 184, 216, 34]);
        assert_eq!(reply.dst_port, 33440);
        assert!(reply.is_reply);
    }

    #[test]
    fn parses_rst_as_a_reply() {
        let datagram = build_reply([93, 184, 216, 34], 33441, tcp::FLAG_RST);
        assert!(parse_reply(&datagram).unwrap().is_reply);
    }

    #[test]
    fn non_syn_ack_non_rst_is_not_a_reply() {
        let datagram = build_reply([93, 184, 216, 34], 33442, tcp::FLAG_ACK);
        assert!(!parse_reply(&datagram).unwrap().is_reply);
    }

    #[test]
    fn non_tcp_protocol_is_rejected() {
        let mut ip_buf = vec![0u8; ipv4::HEADER_LEN + 4];
        ipv4::write_header(&mut ip_buf, 1, 64, 17, [1, 2, 3, 4], [10, 0, 0, 2], ip_buf.len() as u16);
        assert!(parse_reply(&ip_buf).is_none());
    }
}
