//! Pluggable diagnostic logging. Presence of a sink must not change engine
//! behaviour or timing beyond the I/O it performs.

use colored::Colorize;
use std::fs::File;
use std::io::Write;
use std::sync::Mutex;

pub trait DiagSink {
    fn log(&self, line: &str);
}

/// Discards everything. Used when the caller did not ask for diagnostics.
pub struct NullSink;

impl DiagSink for NullSink {
    fn log(&self, _line: &str) {}
}

/// Colorized stdout sink: send/recv lines dimmed, the final heuristic flag
/// highlighted, everything else default.
pub struct StdoutSink;

impl DiagSink for StdoutSink {
    fn log(&self, line: &str) {
        if line.starts_with("PROBE_SENT") || line.starts_with("PROBE_SEND_ERR") || line.starts_with("ICMP_") || line.starts_with("TCP_REPLY") {
            eprintln!("{}", line.dimmed());
        } else if line.starts_with("HEURISTIC") {
            eprintln!("{}", line.yellow());
        } else {
            eprintln!("{}", line);
        }
    }
}

/// Plain-text file sink for `--log=PATH`. No color codes.
pub struct FileSink {
    file: Mutex<File>,
}

impl FileSink {
    pub fn open(path: &std::path::Path) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(FileSink { file: Mutex::new(file) })
    }
}

impl DiagSink for FileSink {
    fn log(&self, line: &str) {
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "{}", line);
        }
    }
}
