//! Opens a raw (or kernel-mediated datagram) ICMP socket and turns it into
//! an async source of parsed Time-Exceeded replies.

use crate::error::TraceError;
use crate::packet::icmp::{self, TimeExceeded};
use crate::reply_source::IcmpSource;
use socket2::{Domain, Protocol, Socket, Type};
use std::os::fd::AsRawFd;
use tokio::io::unix::AsyncFd;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpMode {
    RawOnly,
    DatagramOnly,
    Auto,
}

pub struct IcmpListener {
    inner: AsyncFd<Socket>,
}

impl IcmpListener {
    pub fn open(mode: IcmpMode) -> Result<Self, TraceError> {
        let socket = match mode {
            IcmpMode::RawOnly => open_raw()?,
            IcmpMode::DatagramOnly => open_datagram()?,
            IcmpMode::Auto => open_raw().or_else(|_| open_datagram())?,
        };
        socket.set_nonblocking(true).map_err(TraceError::Io)?;
        let inner = AsyncFd::new(socket).map_err(TraceError::Io)?;
        Ok(IcmpListener { inner })
    }

    pub fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.inner.get_ref().as_raw_fd()
    }

    /// Waits for readiness, reads one datagram, and parses it. Returns
    /// `None` for any non-actionable datagram (wrong ICMP type, truncation,
    /// parse failure) rather than erroring -- the caller just wakes up again.
    pub async fn recv_time_exceeded(&self) -> std::io::Result<Option<TimeExceeded>> {
        use std::mem::MaybeUninit;
        loop {
            let mut guard = self.inner.readable().await?;
            let mut buf = [MaybeUninit::uninit(); 2048];
            match guard.try_io(|inner| inner.get_ref().recv(&mut buf)) {
                Ok(Ok(n)) => {
                    // Safety: `recv` reported `n` initialized bytes.
                    let bytes = unsafe { std::slice::from_raw_parts(buf.as_ptr() as *const u8, n) };
                    return Ok(icmp::parse_time_exceeded(bytes));
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
    pub fn try_recv_time_exceeded(&self) -> std::io::Result<Option<TimeExceeded>> {
        use std::mem::MaybeUninit;
        let mut buf = [MaybeUninit::uninit(); 2048];
        match self.inner.get_ref().recv(&mut buf) {
            Ok(n) => {
                // Safety: `recv` reported `n` initialized bytes.
                let bytes = unsafe { std::slice::from_raw_parts(buf.as_ptr() as *const u8, n) };
                Ok(icmp::parse_time_exceeded(bytes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl IcmpSource for IcmpListener {
    async fn recv_time_exceeded(&self) -> std::io::Result<Option<TimeExceeded>> {
        IcmpListener::recv_time_exceeded(self).await
    }

    fn try_recv_time_exceeded(&self) -> std::io::Result<Option<TimeExceeded>> {
        IcmpListener::try_recv_time_exceeded(self)
    }
}

fn open_raw() -> Result<Socket, TraceError> {
    Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).map_err(|e| TraceError::PermissionDenied(format!("raw ICMP socket: {e}")))
}

fn open_datagram() -> Result<Socket, TraceError> {
    Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4)).map_err(|e| TraceError::PermissionDenied(format!("datagram ICMP socket: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datagram_mode_label_distinct_from_raw() {
        assert_ne!(IcmpMode::RawOnly, IcmpMode::DatagramOnly);
    }
}
