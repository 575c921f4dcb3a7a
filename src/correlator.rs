//! The per-TTL correlation state machine: in-flight probes, hop aggregation,
//! and the tie-break policy (first responder wins the hop IP, duplicates and
//! late replies are dropped). Pure state, no I/O -- this is what makes the
//! engine's send/receive plumbing separable from what is actually tested.

use std::collections::HashMap;
use std::time::Instant;

pub const PROBES_PER_HOP: u8 = 3;

/// `sport(ttl, idx) = 33434 + 3*ttl + idx`.
pub fn probe_sport(ttl: u8, idx: u8) -> u16 {
    33434 + 3 * ttl as u16 + idx as u16
}

#[derive(Debug, Clone)]
pub struct ProbeState {
    pub ttl: u8,
    pub send_timestamp: Instant,
    pub done: bool,
}

#[derive(Debug, Clone, Default)]
pub struct HopAggregate {
    pub first_responder_ip: Option<[u8; 4]>,
    pub count: u8,
    pub min_ms: f64,
    pub max_ms: f64,
    pub sum_ms: f64,
    pub reached: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HopSummary {
    pub ttl: u8,
    pub hop_ip: Option<[u8; 4]>,
    pub num_replies: u8,
    pub rtt_min_ms: f64,
    pub rtt_avg_ms: f64,
    pub rtt_max_ms: f64,
    pub reached: bool,
}

/// Outcome of feeding a reply into the correlator, for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyOutcome {
    /// Matched an in-flight probe and updated the aggregate.
    Matched { sport: u16, rtt_ms: f64, reached: bool },
    /// The source port did not match any in-flight probe for this TTL.
    Unmatched,
    /// Matched a probe that was already `done` (duplicate or stale).
    AlreadyDone { sport: u16 },
}

/// Per-TTL correlation state. One instance lives for the duration of a
/// single TTL's send/wait window; it is discarded (not reused) when the
/// window closes.
pub struct Correlator {
    ttl: u8,
    in_flight: HashMap<u16, ProbeState>,
    agg: HopAggregate,
}

impl Correlator {
    pub fn new(ttl: u8) -> Self {
        Correlator {
            ttl,
            in_flight: HashMap::with_capacity(PROBES_PER_HOP as usize),
            agg: HopAggregate::default(),
        }
    }

    /// Registers a freshly-sent probe. Called once per index, 0..3.
    pub fn register_probe(&mut self, sport: u16, send_timestamp: Instant) {
        self.in_flight.insert(
            sport,
            ProbeState {
                ttl: self.ttl,
                send_timestamp,
                done: false,
            },
        );
    }

    pub fn replies_seen(&self) -> u8 {
        self.agg.count
    }

    pub fn destination_reached(&self) -> bool {
        self.agg.reached
    }

    fn accept(&mut self, sport: u16, now: Instant, from_ip: [u8; 4], reached: bool) -> ReplyOutcome {
        let Some(probe) = self.in_flight.get_mut(&sport) else {
            return ReplyOutcome::Unmatched;
        };
        if probe.done {
            return ReplyOutcome::AlreadyDone { sport };
        }

        let rtt_ms = now.saturating_duration_since(probe.send_timestamp).as_secs_f64() * 1000.0;
        probe.done = true;

        if self.agg.count == 0 {
            self.agg.first_responder_ip = Some(from_ip);
            self.agg.min_ms = rtt_ms;
            self.agg.max_ms = rtt_ms;
        } else {
            self.agg.min_ms = self.agg.min_ms.min(rtt_ms);
            self.agg.max_ms = self.agg.max_ms.max(rtt_ms);
        }
        self.agg.sum_ms += rtt_ms;
        self.agg.count += 1;
        if reached {
            self.agg.reached = true;
        }

        ReplyOutcome::Matched { sport, rtt_ms, reached }
    }

    /// Feeds an ICMP Time-Exceeded reply in by its embedded original source port.
    pub fn on_icmp_reply(&mut self, now: Instant, from_ip: [u8; 4], orig_sport: u16) -> ReplyOutcome {
        self.accept(orig_sport, now, from_ip, false)
    }

    /// Feeds a destination TCP reply (SYN-ACK or RST) in by the port it
    /// arrived on (the probe's original source port, since the destination
    /// swaps src/dst on its reply).
    pub fn on_tcp_reply(&mut self, now: Instant, from_ip: [u8; 4], dst_port: u16) -> ReplyOutcome {
        self.accept(dst_port, now, from_ip, true)
    }

    /// Consumes the correlator and produces the hop's summary.
    pub fn finish(self) -> HopSummary {
        let count = self.agg.count;
        HopSummary {
            ttl: self.ttl,
            hop_ip: self.agg.first_responder_ip,
            num_replies: count,
            rtt_min_ms: if count > 0 { self.agg.min_ms } else { 0.0 },
            rtt_avg_ms: if count > 0 { self.agg.sum_ms / count as f64 } else { 0.0 },
            rtt_max_ms: if count > 0 { self.agg.max_ms } else { 0.0 },
            reached: self.agg.reached,
        }
    }
}
