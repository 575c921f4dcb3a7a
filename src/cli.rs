//! CLI argument parsing (§6, §2.1). Hand-walked `while i < args.len()`, the
//! same style used by this program's ancestors' `nproc`/`mkdir` parsers --
//! no declarative argument-parsing crate.

use crate::engine::Mode;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct TraceArgs {
    pub host: String,
    pub port: u16,
    pub max_hops: u8,
    pub timeout_ms: u64,
    pub mode: Mode,
    pub log_path: Option<PathBuf>,
}

impl Default for TraceArgs {
    fn default() -> Self {
        TraceArgs {
            host: String::new(),
            port: 443,
            max_hops: 30,
            timeout_ms: 1000,
            mode: Mode::Auto,
            log_path: None,
        }
    }
}

/// Parses `trace <host> [port] [max_hops] [timeout_ms] [--mode=...] [--log=PATH]`.
/// Positional arguments fill in left-to-right; flags may appear anywhere.
pub fn parse_arguments(args: &[String]) -> Result<TraceArgs, String> {
    let mut out = TraceArgs::default();
    let mut positional = Vec::new();
    let mut i = 0;

    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            arg if arg.starts_with("--mode=") => {
                out.mode = parse_mode(&arg["--mode=".len()..])?;
                i += 1;
            }
            arg if arg.starts_with("--log=") => {
                out.log_path = Some(PathBuf::from(&arg["--log=".len()..]));
                i += 1;
            }
            "--mode" => {
                let value = args.get(i + 1).ok_or("trace: option '--mode' requires an argument")?;
                out.mode = parse_mode(value)?;
                i += 2;
            }
            "--log" => {
                let value = args.get(i + 1).ok_or("trace: option '--log' requires an argument")?;
                out.log_path = Some(PathBuf::from(value));
                i += 2;
            }
            arg if arg.starts_with('-') && arg != "-" => {
                return Err(format!("trace: invalid option -- '{arg}'"));
            }
            _ => {
                positional.push(arg.clone());
                i += 1;
            }
        }
    }

    let mut pos = positional.into_iter();
    out.host = pos.next().ok_or("trace: missing required argument 'host'")?;
    if let Some(p) = pos.next() {
        out.port = p.parse().map_err(|_| format!("trace: invalid port: '{p}'"))?;
    }
    if let Some(m) = pos.next() {
        out.max_hops = m.parse().map_err(|_| format!("trace: invalid max_hops: '{m}'"))?;
    }
    if let Some(t) = pos.next() {
        out.timeout_ms = t.parse().map_err(|_| format!("trace: invalid timeout_ms: '{t}'"))?;
    }
    if let Some(extra) = pos.next() {
        return Err(format!("trace: extra operand '{extra}'"));
    }

    Ok(out)
}

fn parse_mode(value: &str) -> Result<Mode, String> {
    match value {
        "auto" => Ok(Mode::Auto),
        "connect" => Ok(Mode::Connect),
        "raw" => Ok(Mode::Raw),
        other => Err(format!("trace: invalid mode: '{other}'")),
    }
}
