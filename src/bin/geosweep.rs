mod cli_utils;

use anyhow::{Context, Result};
use clap::Parser;
use geosweep::output::DEFAULT_FLUSH_EVERY;
use geosweep::{
    default_paths, AddressRange, ErrorPolicy, FieldPath, MmdbEngine, OutputFormat, RowLayout,
    Sweep, SweepConfig, SweepError, SweepOutcome,
};
use log::{debug, LevelFilter};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cli_utils::{format_number, init_logger, print_stats};

#[derive(Parser)]
#[command(name = "geosweep")]
#[command(
    about = "Export a geo-IP database as one row per IPv4 address",
    long_about = "geosweep - Exhaustive IPv4 export of a MaxMind DB file\n\n\
    Visits every address from 0.0.0.0 to 255.255.255.255 in ascending order,\n\
    looks it up in the database and writes one delimited row per address to\n\
    stdout. Missing entries, missing fields and non-string values render as\n\
    the placeholder.\n\n\
    Examples:\n\
      geosweep GeoLite2-Country.mmdb > countries.csv\n\
      geosweep --format tsv -p country.iso_code GeoLite2-Country.mmdb\n\
      geosweep --range 10.0.0.0/8 -p city=city.names.en GeoLite2-City.mmdb\n\n\
    Rows are flushed every --flush-every rows. A killed process can lose the\n\
    rows written since the last flush; use --flush-every 1 to flush each row."
)]
#[command(version)]
struct Cli {
    /// Path to the MaxMind DB file (.mmdb)
    #[arg(value_name = "DATABASE")]
    database: PathBuf,

    /// Output format: csv (header, empty placeholder) or tsv (no header, "-" placeholder)
    #[arg(long, default_value = "csv")]
    format: OutputFormat,

    /// Field path to export, as a.b.c or column=a.b.c (repeatable; replaces the defaults)
    #[arg(short = 'p', long = "path", value_name = "PATH")]
    paths: Vec<FieldPath>,

    /// Text written for absent fields (default depends on --format)
    #[arg(long)]
    placeholder: Option<String>,

    /// Write the header line (default depends on --format)
    #[arg(long, value_name = "BOOL", action = clap::ArgAction::Set)]
    header: Option<bool>,

    /// Reaction to a failed lookup: abort (stop the sweep) or skip (placeholder row)
    #[arg(long, default_value = "abort")]
    on_error: ErrorPolicy,

    /// Restrict the sweep to a range: a.b.c.d-e.f.g.h, CIDR, or one address
    #[arg(long)]
    range: Option<AddressRange>,

    /// Rows between output flushes (0 = only at the end, 1 = every row)
    #[arg(long, default_value_t = DEFAULT_FLUSH_EVERY)]
    flush_every: u64,

    /// Print a summary to stderr when done
    #[arg(short, long)]
    stats: bool,

    /// Log level for diagnostics on stderr (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: LevelFilter,
}

impl Cli {
    fn sweep_config(&self) -> SweepConfig {
        let mut layout = RowLayout::new(self.format);
        if let Some(placeholder) = &self.placeholder {
            layout = layout.placeholder(placeholder.as_str());
        }
        if let Some(header) = self.header {
            layout = layout.header(header);
        }

        let paths = if self.paths.is_empty() {
            default_paths()
        } else {
            self.paths.clone()
        };

        SweepConfig::new()
            .paths(paths)
            .layout(layout)
            .on_error(self.on_error)
            .range(self.range.unwrap_or_default())
            .flush_every(self.flush_every)
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            // --help and --version are not failures
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    init_logger(cli.log_level)?;

    let config = cli.sweep_config();
    debug!(
        "format={} paths=[{}] range={} on_error={}",
        config.layout.format,
        config
            .paths
            .iter()
            .map(FieldPath::dotted)
            .collect::<Vec<_>>()
            .join(", "),
        config.range,
        config.on_error
    );

    let engine = match MmdbEngine::open(&cli.database) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("{}", err);
            if let Some(cause) = err.io_cause() {
                eprintln!("    IO error: {}", cause);
            }
            return Ok(ExitCode::FAILURE);
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    let stop_clone = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        stop_clone.store(true, Ordering::Relaxed);
    })
    .context("Failed to set Ctrl+C handler")?;

    let stdout = io::stdout();
    let mut writer = config.writer(io::BufWriter::new(stdout.lock()));
    let result = Sweep::new(&engine, config).run(&mut writer, &stop);
    engine.close();

    let report = match result {
        Ok(report) => report,
        Err(err @ SweepError::Address { .. }) => {
            eprintln!("{}", err);
            if cli.stats {
                eprintln!(
                    "[INFO] {} rows written before the failure",
                    format_number(writer.rows_written())
                );
            }
            return Ok(ExitCode::FAILURE);
        }
        Err(err) => return Err(err).context("Sweep failed"),
    };

    writer.into_inner().context("Failed to flush output")?;

    if cli.stats {
        print_stats(&report);
    }

    match report.outcome {
        SweepOutcome::Complete => Ok(ExitCode::SUCCESS),
        SweepOutcome::Cancelled => {
            eprintln!(
                "interrupted after {} of {} addresses",
                format_number(report.addresses),
                format_number(cli.range.unwrap_or_default().len())
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

