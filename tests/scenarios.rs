//! End-to-end correlation scenarios (S1-S6), driven against the pure
//! `Correlator` state machine rather than real sockets -- no raw-socket
//! capability is assumed to be available in a test environment.
//!
//! Each scenario plays a scripted sequence of ICMP/TCP reply events at
//! known offsets from the send timestamp and checks the resulting
//! `HopSummary` against the invariants in the specification's testable
//! properties section.

use pathtrace::correlator::{probe_sport, Correlator, ReplyOutcome, PROBES_PER_HOP};
use std::time::{Duration, Instant};

fn sports(ttl: u8) -> [u16; 3] {
    [probe_sport(ttl, 0), probe_sport(ttl, 1), probe_sport(ttl, 2)]
}

/// Runs a single TTL's worth of probes through the correlator, applying
/// each closure in `events` in order, then returns the finished summary.
fn run_hop(ttl: u8, events: impl FnOnce(Instant, [u16; 3], &mut Correlator)) -> pathtrace::correlator::HopSummary {
    let base = Instant::now();
    let mut correlator = Correlator::new(ttl);
    let sp = sports(ttl);
    for s in sp {
        correlator.register_probe(s, base);
    }
    events(base, sp, &mut correlator);
    correlator.finish()
}

#[test]
fn s1_clean_path_three_hops() {
    // Router at TTL 1 and TTL 2 reply with Time-Exceeded; destination
    // replies with SYN-ACK at TTL 3.
    let hop1 = run_hop(1, |base, sp, c| {
        for s in sp {
            c.on_icmp_reply(base + Duration::from_millis(5), [10, 0, 0, 1], s);
        }
    });
    let hop2 = run_hop(2, |base, sp, c| {
        for s in sp {
            c.on_icmp_reply(base + Duration::from_millis(7), [10, 0, 0, 2], s);
        }
    });
    let dest_ip = [93, 184, 216, 34];
    let hop3 = run_hop(3, |base, sp, c| {
        let outcome = c.on_tcp_reply(base + Duration::from_millis(9), dest_ip, sp[0]);
        assert!(matches!(outcome, ReplyOutcome::Matched { reached: true, .. }));
    });

    assert_eq!(hop1.hop_ip, Some([10, 0, 0, 1]));
    assert_eq!(hop2.hop_ip, Some([10, 0, 0, 2]));
    assert_eq!(hop3.hop_ip, Some(dest_ip));
    assert!(hop3.reached);
    assert!(!hop1.reached && !hop2.reached);

    let summaries = [hop1, hop2, hop3];
    assert_eq!(summaries.iter().filter(|s| s.reached).count(), 1);
    assert!(summaries.last().unwrap().reached);
}

#[test]
fn s2_silent_middle_hop() {
    // TTL 2's probes are dropped with no ICMP at all: an empty hop.
    let hop2 = run_hop(2, |_base, _sp, _c| {
        // no events fed in -- the window simply expires
    });

    assert_eq!(hop2.num_replies, 0);
    assert_eq!(hop2.hop_ip, None);
    assert!(!hop2.reached);
    assert_eq!(hop2.rtt_min_ms, 0.0);
    assert_eq!(hop2.rtt_avg_ms, 0.0);
    assert_eq!(hop2.rtt_max_ms, 0.0);
}

#[test]
fn s3_rst_destination_at_ttl_2() {
    let dest_ip = [93, 184, 216, 34];
    let hop2 = run_hop(2, |base, sp, c| {
        let outcome = c.on_tcp_reply(base + Duration::from_millis(6), dest_ip, sp[0]);
        assert!(matches!(outcome, ReplyOutcome::Matched { reached: true, .. }));
    });

    assert!(hop2.reached);
    assert_eq!(hop2.hop_ip, Some(dest_ip));
    // The engine's main loop would stop here -- no summary beyond TTL 2 is
    // produced, which this test models by simply not running further hops.
}

#[test]
fn s4_out_of_order_late_reply_is_discarded() {
    // A TTL-1 router reply arrives late, after TTL 1's own window closed --
    // there is no cross-TTL matching, so a reply for TTL 1 fed into a
    // TTL 2 correlator must be unmatched.
    let ttl1_sport = probe_sport(1, 0);

    let hop1 = run_hop(1, |base, sp, c| {
        // Only idx=1 and idx=2 reply within the window; idx=0's reply
        // arrives "late" and is modeled by simply never feeding it here.
        c.on_icmp_reply(base + Duration::from_millis(4), [10, 0, 0, 1], sp[1]);
        c.on_icmp_reply(base + Duration::from_millis(6), [10, 0, 0, 1], sp[2]);
    });
    assert_eq!(hop1.num_replies, 2);

    // The late reply for TTL 1's idx=0 probe shows up during TTL 2's
    // window; TTL 2's correlator has never registered that source port,
    // so it is discarded as unmatched.
    let base2 = Instant::now();
    let mut ttl2_correlator = Correlator::new(2);
    for s in sports(2) {
        ttl2_correlator.register_probe(s, base2);
    }
    let late = ttl2_correlator.on_icmp_reply(base2 + Duration::from_millis(1), [10, 0, 0, 1], ttl1_sport);
    assert_eq!(late, ReplyOutcome::Unmatched);
    assert_eq!(ttl2_correlator.replies_seen(), 0);
}

#[test]
fn s5_duplicate_icmp_for_same_probe_counts_once() {
    let hop1 = run_hop(1, |base, sp, c| {
        let first = c.on_icmp_reply(base + Duration::from_millis(3), [10, 0, 0, 1], sp[0]);
        let second = c.on_icmp_reply(base + Duration::from_millis(11), [10, 0, 0, 1], sp[0]);
        assert!(matches!(first, ReplyOutcome::Matched { .. }));
        assert_eq!(second, ReplyOutcome::AlreadyDone { sport: sp[0] });
    });

    assert_eq!(hop1.num_replies, 1);
}

#[test]
fn s6_raw_packet_checksums_verify_to_zero() {
    use pathtrace::checksum;
    use pathtrace::packet::{ipv4, tcp};

    let src = [10, 0, 0, 5];
    let dst = [93, 184, 216, 34];
    let mut pkt = vec![0u8; ipv4::HEADER_LEN + tcp::HEADER_LEN];

    ipv4::write_header(&mut pkt[..ipv4::HEADER_LEN], (7 << 8) | 0, 7, ipv4::PROTO_TCP, src, dst, pkt.len() as u16);
    let ip_csum = checksum::ip_checksum(&pkt[..ipv4::HEADER_LEN]);
    ipv4::set_checksum(&mut pkt[..ipv4::HEADER_LEN], ip_csum);

    tcp::write_syn(&mut pkt[ipv4::HEADER_LEN..], probe_sport(7, 0), 443, (7u32 << 24) | 0x1234);
    let tcp_csum = checksum::tcp_checksum(src, dst, &pkt[ipv4::HEADER_LEN..], tcp::HEADER_LEN).unwrap();
    tcp::set_checksum(&mut pkt[ipv4::HEADER_LEN..], tcp_csum);

    assert_eq!(checksum::ip_checksum(&pkt[..ipv4::HEADER_LEN]), 0);
    let verify = checksum::tcp_checksum(src, dst, &pkt[ipv4::HEADER_LEN..], tcp::HEADER_LEN).unwrap();
    assert_eq!(verify, 0);
}

#[test]
fn sport_allocation_collision_free_across_a_ttl_sweep() {
    // Property 7: source-port allocation must never collide within a TTL,
    // and (by the deterministic formula) never across TTLs either.
    let mut seen = std::collections::HashSet::new();
    for ttl in 1..=30u8 {
        for idx in 0..PROBES_PER_HOP {
            assert!(seen.insert(probe_sport(ttl, idx)), "collision at ttl={ttl} idx={idx}");
        }
    }
}

#[test]
fn invariant_rtt_ordering_and_star_semantics_hold_across_a_sweep() {
    let reached_dest = [8, 8, 8, 8];
    let mut summaries = Vec::new();

    summaries.push(run_hop(1, |base, sp, c| {
        c.on_icmp_reply(base + Duration::from_millis(2), [10, 0, 0, 1], sp[0]);
    }));
    summaries.push(run_hop(2, |_base, _sp, _c| {}));
    summaries.push(run_hop(3, |base, sp, c| {
        c.on_tcp_reply(base + Duration::from_millis(15), reached_dest, sp[0]);
    }));

    assert!(summaries.len() <= 30);
    for (i, s) in summaries.iter().enumerate() {
        assert_eq!(s.ttl as usize, i + 1);
        assert!(s.num_replies <= 3);
        if s.num_replies == 0 {
            assert!(s.hop_ip.is_none());
            assert!(!s.reached);
        } else {
            assert!(s.rtt_min_ms <= s.rtt_avg_ms);
            assert!(s.rtt_avg_ms <= s.rtt_max_ms);
            assert!(s.rtt_min_ms.is_finite() && s.rtt_min_ms >= 0.0);
        }
    }
    assert_eq!(summaries.iter().filter(|s| s.reached).count(), 1);
    assert!(summaries.last().unwrap().reached);
}
