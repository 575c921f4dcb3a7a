//! Pretty printer (§4.9, §6): renders the final hop list to stdout in the
//! program's literal output format. Geo enrichment happens here, after the
//! trace has already finished, so lookup latency never perturbs RTT.

use crate::correlator::HopSummary;
use crate::geo::GeoRecord;

const SEPARATOR: &str = "-------------------------------------------"; // 43 dashes

/// `lookup` is injected so tests can stub out network access.
pub fn print_report(summaries: &[HopSummary], lookup: impl Fn(&str) -> Option<GeoRecord>) {
    for summary in summaries {
        println!("{}", render_hop_line(summary, &lookup));
    }
    println!("{SEPARATOR}");
    println!("Total hops: {}", summaries.len());
}

fn render_hop_line(summary: &HopSummary, lookup: impl Fn(&str) -> Option<GeoRecord>) -> String {
    match summary.hop_ip {
        None => format!("Hop {}: * (no reply) - min/avg/max RTT = * / * / * ms", summary.ttl),
        Some(ip) => {
            let ip_str = format!("{}.{}.{}.{}", ip[0], ip[1], ip[2], ip[3]);
            let desc = lookup(&ip_str).map(describe).unwrap_or_default();
            format!(
                "Hop {}: {} ({}) - min/avg/max RTT = {:.2} / {:.2} / {:.2} ms",
                summary.ttl, ip_str, desc, summary.rtt_min_ms, summary.rtt_avg_ms, summary.rtt_max_ms
            )
        }
    }
}

fn describe(g: GeoRecord) -> String {
    let location = [g.city.as_deref(), g.country.as_deref()].into_iter().flatten().collect::<Vec<_>>().join(", ");
    let org = g.as_name.as_deref().or(g.isp.as_deref()).or(g.org.as_deref());
    match (location.is_empty(), org) {
        (false, Some(org)) => format!("{location}, {org}"),
        (false, None) => location,
        (true, Some(org)) => org.to_string(),
        (true, None) => String::new(),
    }
}
