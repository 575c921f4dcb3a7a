//! Geo/ASN enrichment (§4.8): a deliberately tiny HTTP/1.1 client against a
//! public IP-geolocation endpoint, with fields scraped out of the JSON body
//! by regex rather than pulling in a JSON parser for a handful of scalars.

use regex::Regex;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

const GEO_HOST: &str = "ip-api.com";
const GEO_FIELDS: &str = "status,country,city,lat,lon,isp,org,as,asname";
const CONNECT_TIMEOUT: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoRecord {
    pub city: Option<String>,
    pub country: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub isp: Option<String>,
    pub org: Option<String>,
    pub as_text: Option<String>,
    pub asn: Option<String>,
    pub as_name: Option<String>,
}

/// Looks up geo/ASN data for a dotted-quad IPv4 address. `None` on any
/// connection error, non-success status, or unparsable body -- callers treat
/// a missing record as "no description available", never as fatal.
pub fn lookup(ip: &str) -> Option<GeoRecord> {
    let body = http_get(GEO_HOST, &format!("/json/{ip}?fields={GEO_FIELDS}"))?;
    if !field_str(&body, "status").is_some_and(|s| s == "success") {
        return None;
    }
    Some(GeoRecord {
        city: field_str(&body, "city"),
        country: field_str(&body, "country"),
        lat: field_num(&body, "lat"),
        lon: field_num(&body, "lon"),
        isp: field_str(&body, "isp"),
        org: field_str(&body, "org"),
        as_text: field_str(&body, "as"),
        asn: field_str(&body, "as").and_then(|s| s.split_whitespace().next().map(str::to_string)),
        as_name: field_str(&body, "asname"),
    })
}

fn http_get(host: &str, path: &str) -> Option<String> {
    use std::net::ToSocketAddrs;
    let addr = (host, 80u16).to_socket_addrs().ok()?.next()?;
    let mut stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).ok()?;
    stream.set_read_timeout(Some(CONNECT_TIMEOUT)).ok()?;
    stream.set_write_timeout(Some(CONNECT_TIMEOUT)).ok()?;

    let request = format!("GET {path} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).ok()?;

    let mut response = String::new();
    stream.read_to_string(&mut response).ok()?;
    Some(extract_body(&response))
}

fn extract_body(response: &str) -> String {
    match response.find("\r\n\r\n") {
        Some(pos) => response[pos + 4..].to_string(),
        None => response.to_string(),
    }
}

fn field_str(body: &str, key: &str) -> Option<String> {
    let re = Regex::new(&format!(r#""{key}":"([^"]*)""#)).ok()?;
    let caps = re.captures(body)?;
    let value = caps.get(1)?.as_str();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn field_num(body: &str, key: &str) -> Option<f64> {
    let re = Regex::new(&format!(r#""{key}":(-?[0-9.]+)"#)).ok()?;
    let caps = re.captures(body)?;
    caps.get(1)?.as_str().parse().ok()
}
