//! Run controller
//!
//! A [`Sweep`] walks its configured [`AddressRange`] in ascending order and,
//! for every address, looks it up, resolves all field paths, writes the row
//! and releases the resolved values before moving on. Nothing is shared
//! between addresses except the engine and the output writer.
//!
//! A row is only rendered once every field of its address has resolved.
//! When an engine error stops the sweep, the failing address therefore
//! produces no output at all, while every earlier row has been flushed.

use crate::address::AddressRange;
use crate::engine::GeoEngine;
use crate::error::{ConfigError, EngineError, SweepError};
use crate::output::{RowLayout, RowWriter, DEFAULT_FLUSH_EVERY};
use crate::path::{default_paths, FieldPath};
use crate::resolver::{FieldResolver, ResolvedRow};
use log::{debug, info, warn};
use std::fmt;
use std::io::Write;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Addresses between progress messages unless configured otherwise (one /8)
pub const DEFAULT_PROGRESS_EVERY: u64 = 1 << 24;

/// What to do when the engine fails for one address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Stop the sweep and report the address
    #[default]
    Abort,
    /// Log it, write a placeholder row and carry on
    Skip,
}

impl FromStr for ErrorPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            _ => Err(ConfigError::UnknownPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorPolicy::Abort => "abort",
            ErrorPolicy::Skip => "skip",
        })
    }
}

/// Everything that shapes a sweep except the engine and the output stream
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Field paths, one output column each, in order
    pub paths: Vec<FieldPath>,
    /// Delimiter, placeholder and header
    pub layout: RowLayout,
    /// Reaction to engine failures
    pub on_error: ErrorPolicy,
    /// Addresses to visit
    pub range: AddressRange,
    /// Data rows between output flushes; 0 flushes only at the end
    pub flush_every: u64,
    /// Addresses between progress messages; 0 disables them
    pub progress_every: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            paths: default_paths(),
            layout: RowLayout::default(),
            on_error: ErrorPolicy::default(),
            range: AddressRange::full(),
            flush_every: DEFAULT_FLUSH_EVERY,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

impl SweepConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the field paths
    pub fn paths(mut self, paths: Vec<FieldPath>) -> Self {
        self.paths = paths;
        self
    }

    /// Replace the row layout
    pub fn layout(mut self, layout: RowLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Set the error policy
    pub fn on_error(mut self, policy: ErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }

    /// Restrict the sweep to `range`
    pub fn range(mut self, range: AddressRange) -> Self {
        self.range = range;
        self
    }

    /// Set the flush interval in rows
    pub fn flush_every(mut self, rows: u64) -> Self {
        self.flush_every = rows;
        self
    }

    /// Set the progress interval in addresses
    pub fn progress_every(mut self, addresses: u64) -> Self {
        self.progress_every = addresses;
        self
    }

    /// Check that the configuration can produce rows
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.paths.is_empty() {
            return Err(ConfigError::NoPaths);
        }
        Ok(())
    }

    /// Row writer over `out` matching this configuration
    pub fn writer<W: Write>(&self, out: W) -> RowWriter<W> {
        RowWriter::new(out, self.layout.clone()).flush_every(self.flush_every)
    }
}

/// How a sweep that returned `Ok` ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Every address in the range was processed
    Complete,
    /// The stop flag was raised before the range was exhausted
    Cancelled,
}

/// Counters collected during a sweep
#[derive(Debug, Clone)]
pub struct SweepReport {
    /// Addresses processed
    pub addresses: u64,
    /// Data rows written
    pub rows_written: u64,
    /// Addresses the database had an entry for
    pub entries_found: u64,
    /// Addresses skipped after an engine failure
    pub failures: u64,
    /// Whether the range was exhausted
    pub outcome: SweepOutcome,
    /// Wall time of the run
    pub elapsed: Duration,
}

impl SweepReport {
    fn new() -> Self {
        Self {
            addresses: 0,
            rows_written: 0,
            entries_found: 0,
            failures: 0,
            outcome: SweepOutcome::Complete,
            elapsed: Duration::ZERO,
        }
    }

    /// Addresses per second
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.addresses as f64 / secs
        } else {
            0.0
        }
    }

    /// Whether the whole range was processed
    pub fn is_complete(&self) -> bool {
        self.outcome == SweepOutcome::Complete
    }
}

/// One pass over an address range against one engine
pub struct Sweep<'a, E> {
    engine: &'a E,
    config: SweepConfig,
}

impl<'a, E: GeoEngine> Sweep<'a, E> {
    /// Prepare a sweep of `engine` with `config`
    pub fn new(engine: &'a E, config: SweepConfig) -> Self {
        Self { engine, config }
    }

    /// Configuration in use
    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Run the sweep, writing the header and one row per address to `writer`
    ///
    /// `stop` is checked before each address. Raising it ends the sweep
    /// between rows with [`SweepOutcome::Cancelled`]. Output is flushed on
    /// every return path that can still reach the writer.
    ///
    /// # Errors
    ///
    /// [`SweepError::Address`] for an engine failure under
    /// [`ErrorPolicy::Abort`], [`SweepError::Output`] when writing fails and
    /// [`SweepError::Config`] when no paths are configured.
    pub fn run<W: Write>(
        &self,
        writer: &mut RowWriter<W>,
        stop: &AtomicBool,
    ) -> Result<SweepReport, SweepError> {
        self.config.validate()?;

        let start = Instant::now();
        let resolver = FieldResolver::new(&self.config.paths);
        let mut row = ResolvedRow::with_capacity(resolver.width());
        let mut report = SweepReport::new();

        debug!(
            "sweeping {} ({} addresses, {} fields, on_error={})",
            self.config.range,
            self.config.range.len(),
            resolver.width(),
            self.config.on_error
        );

        writer.write_header(self.config.paths.iter().map(FieldPath::column))?;

        for address in self.config.range {
            if stop.load(Ordering::Relaxed) {
                info!("stop requested, ending sweep before ip={}", address);
                report.outcome = SweepOutcome::Cancelled;
                break;
            }
            report.addresses += 1;

            if let Err(source) = self.process(&resolver, address, &mut row, &mut report) {
                row.release();
                match self.config.on_error {
                    ErrorPolicy::Abort => {
                        writer.flush()?;
                        return Err(SweepError::Address { address, source });
                    }
                    ErrorPolicy::Skip => {
                        warn!("skipping ip={} - {}", address, source);
                        report.failures += 1;
                        row.fill_absent(resolver.width());
                    }
                }
            }

            writer.write_row(address, row.fields())?;
            report.rows_written += 1;
            row.release();

            if self.config.progress_every > 0 && report.addresses % self.config.progress_every == 0
            {
                info!(
                    "{} addresses done, last ip={}, {} entries found",
                    report.addresses, address, report.entries_found
                );
            }
        }

        writer.flush()?;
        report.elapsed = start.elapsed();
        Ok(report)
    }

    /// Look up `address` and fill `row`
    ///
    /// An entry counts as found as soon as the lookup returns it, even if
    /// resolving its fields then fails.
    fn process(
        &self,
        resolver: &FieldResolver<'_>,
        address: Ipv4Addr,
        row: &mut ResolvedRow<E::Value<'a>>,
        report: &mut SweepReport,
    ) -> Result<(), EngineError> {
        let engine = self.engine;
        let entry = engine.lookup(address)?;
        if entry.is_some() {
            report.entries_found += 1;
        }
        resolver.resolve_into(engine, entry.as_ref(), row)
    }
}
