use colored::*;
use pathtrace::cli;
use pathtrace::diag::{DiagSink, FileSink, StdoutSink};
use pathtrace::engine::{self, EngineConfig};
use pathtrace::geo;
use pathtrace::output;
use std::process::ExitCode;

/// `--log=PATH` redirects diagnostics to a plain-text file instead of the
/// colorized stdout sink (§4.6); the final hop report always goes to stdout.
fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let parsed = match cli::parse_arguments(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("{}", e.red());
            return ExitCode::FAILURE;
        }
    };

    let diag: Box<dyn DiagSink> = match &parsed.log_path {
        Some(path) => match FileSink::open(path) {
            Ok(sink) => Box::new(sink),
            Err(e) => {
                eprintln!("{}", format!("trace: could not open log file: {e}").red());
                return ExitCode::FAILURE;
            }
        },
        None => Box::new(StdoutSink),
    };

    let config = EngineConfig {
        host: parsed.host,
        port: parsed.port,
        max_hops: parsed.max_hops,
        timeout_ms: parsed.timeout_ms,
        mode: parsed.mode,
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}", format!("trace: {e}").red());
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(engine::trace(&config, diag.as_ref())) {
        Ok(summaries) => {
            output::print_report(&summaries, geo::lookup);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", format!("trace: {e}").red());
            ExitCode::FAILURE
        }
    }
}
