//! The probe engine: setup, the per-TTL send/wait/correlate/aggregate loop,
//! and termination. Everything here runs on a single task -- concurrency is
//! expressed purely as readiness multiplexing with a deadline (§5).

use crate::correlator::{probe_sport, Correlator, HopSummary, ReplyOutcome, PROBES_PER_HOP};
use crate::diag::DiagSink;
use crate::error::TraceError;
use crate::icmp_listener::{IcmpListener, IcmpMode};
use crate::local_source;
use crate::packet::icmp::TimeExceeded;
use crate::reply_source::{IcmpSource, ReplySource};
use crate::resolver;
use crate::sender::{connect, raw::RawSender, SendMode};
use crate::tcp_listener::{DestinationReply, TcpReplyListener};
use socket2::Socket;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Auto,
    Connect,
    Raw,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub host: String,
    pub port: u16,
    pub max_hops: u8,
    pub timeout_ms: u64,
    pub mode: Mode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            host: String::new(),
            port: 443,
            max_hops: 30,
            timeout_ms: 1000,
            mode: Mode::Auto,
        }
    }
}

fn fmt_ip(ip: [u8; 4]) -> String {
    format!("{}.{}.{}.{}", ip[0], ip[1], ip[2], ip[3])
}

/// Runs one complete trace and returns the per-hop summaries collected so
/// far (always contiguous from TTL 1).
pub async fn trace(config: &EngineConfig, diag: &dyn DiagSink) -> Result<Vec<HopSummary>, TraceError> {
    let addrs = resolver::resolve(&config.host)?;
    let dst_ip = resolver::first_ipv4(&addrs)?;
    let src_ip = local_source::pick_source_for(dst_ip)?;

    let icmp_mode = match config.mode {
        Mode::Raw => IcmpMode::RawOnly,
        Mode::Connect => IcmpMode::DatagramOnly,
        Mode::Auto => IcmpMode::Auto,
    };
    let icmp_listener = IcmpListener::open(icmp_mode)?;
    let tcp_listener = TcpReplyListener::open()?;

    // Only explicit Raw mode crafts its own packets; Auto and Connect both
    // let the kernel emit the SYN (§4.3 step 5).
    let send_mode = if config.mode == Mode::Raw { SendMode::Raw } else { SendMode::Connect };
    let raw_sender = match send_mode {
        SendMode::Raw => Some(RawSender::open()?),
        SendMode::Connect => None,
    };

    diag.log(&format!(
        "SETUP dst={} src={} port={} mode={:?} send_mode={:?} max_hops={} timeout_ms={}",
        fmt_ip(dst_ip),
        fmt_ip(src_ip),
        config.port,
        config.mode,
        send_mode,
        config.max_hops,
        config.timeout_ms
    ));

    let mut summaries = Vec::new();
    let mut destination_reached = false;

    for ttl in 1..=config.max_hops {
        let mut correlator = Correlator::new(ttl);
        let mut connect_sockets: Vec<Socket> = Vec::with_capacity(PROBES_PER_HOP as usize);

        for idx in 0..PROBES_PER_HOP {
            let sport = probe_sport(ttl, idx);
            let now = Instant::now();
            correlator.register_probe(sport, now);

            match send_mode {
                SendMode::Raw => {
                    let sender = raw_sender.as_ref().expect("raw sender opened for Raw mode");
                    match sender.send_probe(src_ip, dst_ip, config.port, ttl, idx, sport) {
                        Ok(n) => diag.log(&format!("PROBE_SENT mode=raw ttl={ttl} idx={idx} sport={sport} bytes={n}")),
                        Err(e) => diag.log(&format!("PROBE_SEND_ERR mode=raw ttl={ttl} idx={idx} sport={sport} error={e}")),
                    }
                }
                SendMode::Connect => match connect::send_probe(src_ip, sport, dst_ip, config.port, ttl) {
                    Ok(socket) => {
                        diag.log(&format!("PROBE_SENT mode=connect ttl={ttl} idx={idx} sport={sport}"));
                        connect_sockets.push(socket);
                    }
                    Err(e) => diag.log(&format!("PROBE_SEND_ERR mode=connect ttl={ttl} idx={idx} sport={sport} error={e}")),
                },
            }
        }

        let deadline = Instant::now() + Duration::from_millis(config.timeout_ms);
        wait_for_replies(&mut correlator, &icmp_listener, &tcp_listener, dst_ip, deadline, diag).await;

        // Per-probe connect sockets are released deterministically here,
        // at the close of this TTL's window (§4.4.2 step 6).
        drop(connect_sockets);

        if correlator.destination_reached() {
            destination_reached = true;
        }

        let summary = correlator.finish();
        diag.log(&format!(
            "HOP_SUMMARY ttl={} hop_ip={} num_replies={} min_ms={:.2} avg_ms={:.2} max_ms={:.2} reached={}",
            summary.ttl,
            summary.hop_ip.map(fmt_ip).unwrap_or_else(|| "*".into()),
            summary.num_replies,
            summary.rtt_min_ms,
            summary.rtt_avg_ms,
            summary.rtt_max_ms,
            summary.reached
        ));
        summaries.push(summary);

        if destination_reached {
            break;
        }
    }

    if let Some(flag) = only_gateway_and_destination_responded(&summaries) {
        diag.log(&format!("HEURISTIC {flag}"));
    }

    Ok(summaries)
}

/// Feeds one ICMP receive result into the correlator and logs the outcome.
/// Returns `true` if a datagram was actually present (used by the drain
/// loop below to know when a socket has gone quiet).
fn handle_icmp_result(correlator: &mut Correlator, result: std::io::Result<Option<TimeExceeded>>, diag: &dyn DiagSink) -> bool {
    match result {
        Ok(Some(te)) => {
            let now = Instant::now();
            match correlator.on_icmp_reply(now, te.from_ip, te.orig_sport) {
                ReplyOutcome::Matched { sport, rtt_ms, .. } => {
                    diag.log(&format!("ICMP_MATCHED sport={sport} from={} rtt_ms={:.2}", fmt_ip(te.from_ip), rtt_ms));
                }
                ReplyOutcome::Unmatched => {
                    diag.log(&format!("ICMP_UNMATCHED sport={} from={}", te.orig_sport, fmt_ip(te.from_ip)));
                }
                ReplyOutcome::AlreadyDone { sport } => {
                    diag.log(&format!("ICMP_DUPLICATE sport={sport}"));
                }
            }
            true
        }
        Ok(None) => false,
        Err(e) => {
            diag.log(&format!("ICMP_RECV_ERR error={e}"));
            false
        }
    }
}

/// Feeds one TCP receive result into the correlator and logs the outcome.
/// Returns `true` if a datagram was actually present.
fn handle_tcp_result(correlator: &mut Correlator, result: std::io::Result<Option<DestinationReply>>, dst_ip: [u8; 4], diag: &dyn DiagSink) -> bool {
    match result {
        Ok(Some(reply)) => {
            if reply.from_ip == dst_ip && reply.is_reply {
                let now = Instant::now();
                match correlator.on_tcp_reply(now, reply.from_ip, reply.dst_port) {
                    ReplyOutcome::Matched { sport, rtt_ms, .. } => {
                        diag.log(&format!("TCP_REPLY_MATCHED sport={sport} from={} rtt_ms={:.2}", fmt_ip(reply.from_ip), rtt_ms));
                    }
                    ReplyOutcome::Unmatched => {
                        diag.log(&format!("TCP_REPLY_UNMATCHED sport={} from={}", reply.dst_port, fmt_ip(reply.from_ip)));
                    }
                    ReplyOutcome::AlreadyDone { sport } => {
                        diag.log(&format!("TCP_REPLY_DUPLICATE sport={sport}"));
                    }
                }
            }
            true
        }
        Ok(None) => false,
        Err(e) => {
            diag.log(&format!("TCP_RECV_ERR error={e}"));
            false
        }
    }
}

/// Drains any reply that is already queued on either socket without
/// waiting for further readiness. `tokio::select!` only drives the one
/// branch that woke it; a reply on the *other* socket that became ready in
/// the same wakeup (e.g. an ICMP Time-Exceeded for a sibling probe arriving
/// alongside the TCP reply that just set `destination_reached`) would
/// otherwise never be read before the outer loop exits. This mirrors the
/// original select(2) loop's two unconditional `FD_ISSET` checks per
/// wakeup, rather than `select!`'s single-branch-per-iteration semantics.
fn drain_ready_replies<I: IcmpSource, T: ReplySource>(correlator: &mut Correlator, icmp_listener: &I, tcp_listener: &T, dst_ip: [u8; 4], diag: &dyn DiagSink) {
    // Note: does NOT bail out early just because `destination_reached` is
    // already set -- a reply that raced in on the other socket during the
    // same wakeup that produced the destination reply must still be
    // drained once before the hop's window closes.
    loop {
        if correlator.replies_seen() >= PROBES_PER_HOP {
            break;
        }
        let icmp_drained = handle_icmp_result(correlator, icmp_listener.try_recv_time_exceeded(), diag);
        let tcp_drained = handle_tcp_result(correlator, tcp_listener.try_recv_reply(), dst_ip, diag);
        if !icmp_drained && !tcp_drained {
            break;
        }
    }
}

async fn wait_for_replies<I: IcmpSource, T: ReplySource>(correlator: &mut Correlator, icmp_listener: &I, tcp_listener: &T, dst_ip: [u8; 4], deadline: Instant, diag: &dyn DiagSink) {
    while correlator.replies_seen() < PROBES_PER_HOP && !correlator.destination_reached() {
        let residual = deadline.saturating_duration_since(Instant::now());
        if residual.is_zero() {
            break;
        }

        tokio::select! {
            icmp = icmp_listener.recv_time_exceeded() => {
                handle_icmp_result(correlator, icmp, diag);
            }
            tcp = tcp_listener.recv_reply() => {
                handle_tcp_result(correlator, tcp, dst_ip, diag);
            }
            _ = tokio::time::sleep(residual) => {
                break;
            }
        }

        drain_ready_replies(correlator, icmp_listener, tcp_listener, dst_ip, diag);
    }
}

/// Post-run heuristic: true when only the first hop (presumably the local
/// gateway) and the destination itself ever responded, with every hop in
/// between a star. Purely informational.
fn only_gateway_and_destination_responded(summaries: &[HopSummary]) -> Option<&'static str> {
    if summaries.len() < 3 {
        return None;
    }
    let last = summaries.last()?;
    if !last.reached {
        return None;
    }
    let middle_all_silent = summaries[1..summaries.len() - 1].iter().all(|s| s.num_replies == 0);
    let first_responded = summaries[0].num_replies > 0;
    if first_responded && middle_all_silent {
        Some("only local gateway and destination responded")
    } else {
        None
    }
}
