use anyhow::{Context, Result};
use geosweep::SweepReport;
use log::LevelFilter;
use std::time::Duration;

/// Initialize `env_logger` on stderr
///
/// `RUST_LOG` is read first so per-module filters still work, then `level`
/// overrides the global filter.
pub fn init_logger(level: LevelFilter) -> Result<()> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);
    builder.target(env_logger::Target::Stderr);
    builder.try_init().context("Failed to initialize logger")
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

pub fn format_rate(per_sec: f64) -> String {
    if per_sec >= 1_000_000.0 {
        format!("{:.2}M/s", per_sec / 1_000_000.0)
    } else if per_sec >= 1_000.0 {
        format!("{:.2}K/s", per_sec / 1_000.0)
    } else {
        format!("{:.2}/s", per_sec)
    }
}

pub fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 3600 {
        format!("{}h{:02}m{:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.3}s", elapsed.as_secs_f64())
    }
}

/// Summary written to stderr by `--stats`
pub fn print_stats(report: &SweepReport) {
    eprintln!();
    eprintln!(
        "[INFO] === Sweep {} ===",
        if report.is_complete() {
            "Complete"
        } else {
            "Interrupted"
        }
    );
    eprintln!("[INFO] Addresses: {}", format_number(report.addresses));
    eprintln!("[INFO] Rows written: {}", format_number(report.rows_written));
    eprintln!(
        "[INFO] Entries found: {}",
        format_number(report.entries_found)
    );
    if report.failures > 0 {
        eprintln!("[INFO] Skipped failures: {}", format_number(report.failures));
    }
    eprintln!("[INFO] Elapsed: {}", format_duration(report.elapsed));
    eprintln!("[INFO] Rate: {}", format_rate(report.rate()));
}
