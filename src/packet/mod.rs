//! Explicit byte-offset layouts for IPv4, TCP, and the ICMP Time-Exceeded
//! payload, replacing reliance on platform `struct ip`/`struct iphdr`
//! conventions that disagree between Linux and BSD.

pub mod icmp;
pub mod ipv4;
pub mod tcp;
