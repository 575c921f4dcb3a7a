//! Trait seam between the probe engine's wait loop and its two reply
//! sources (the ICMP Time-Exceeded listener, the raw TCP reply sniffer).
//! `wait_for_replies` is generic over these traits rather than the
//! concrete socket-backed structs, so the orchestration logic can be
//! driven by a scripted mock in tests without requiring `CAP_NET_RAW`.

use crate::packet::icmp::TimeExceeded;
use crate::tcp_listener::DestinationReply;
use std::io;

/// A source of parsed ICMP Time-Exceeded replies.
pub trait IcmpSource {
    /// Waits for readiness, then returns one parsed reply (`None` for a
    /// non-actionable datagram: wrong type, truncation, parse failure).
    async fn recv_time_exceeded(&self) -> io::Result<Option<TimeExceeded>>;

    /// Non-blocking: `Ok(None)` immediately if nothing is ready right now,
    /// rather than waiting for readiness. Used to drain a reply that
    /// became ready in the same wakeup as the other source's reply.
    fn try_recv_time_exceeded(&self) -> io::Result<Option<TimeExceeded>>;
}

/// A source of parsed destination TCP replies (SYN-ACK / RST).
pub trait ReplySource {
    async fn recv_reply(&self) -> io::Result<Option<DestinationReply>>;
    fn try_recv_reply(&self) -> io::Result<Option<DestinationReply>>;
}
