//! Row formatting and output
//!
//! Rows are written through a [`csv::Writer`] configured to never quote, so
//! field bytes reach the stream exactly as the database stored them. A
//! value that contains the delimiter makes its row ambiguous; that is a
//! known property of the format and is left alone.

use crate::error::ConfigError;
use std::fmt::{self, Write as _};
use std::io::{self, Write};
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Header name of the address column
pub const ADDRESS_COLUMN: &str = "ip";

/// Rows between explicit flushes unless configured otherwise
pub const DEFAULT_FLUSH_EVERY: u64 = 65_536;

/// Delimited text layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Comma separated, empty placeholder, header line
    #[default]
    Csv,
    /// Tab separated, `-` placeholder, no header line
    Tsv,
}

impl OutputFormat {
    /// Field separator byte
    pub fn delimiter(self) -> u8 {
        match self {
            OutputFormat::Csv => b',',
            OutputFormat::Tsv => b'\t',
        }
    }

    /// Text written for absent fields when no placeholder is configured
    pub fn default_placeholder(self) -> &'static str {
        match self {
            OutputFormat::Csv => "",
            OutputFormat::Tsv => "-",
        }
    }

    /// Whether a header line is written when not configured
    pub fn default_header(self) -> bool {
        matches!(self, OutputFormat::Csv)
    }
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "tsv" => Ok(Self::Tsv),
            _ => Err(ConfigError::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Tsv => "tsv",
        })
    }
}

/// Format plus the per-format settings a caller may override
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowLayout {
    /// Delimiter and defaults
    pub format: OutputFormat,
    /// Text for absent or non-string fields
    pub placeholder: String,
    /// Whether to write the header line
    pub header: bool,
}

impl RowLayout {
    /// Layout with the format's default placeholder and header setting
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            placeholder: format.default_placeholder().to_string(),
            header: format.default_header(),
        }
    }

    /// Replace the placeholder
    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    /// Turn the header line on or off
    pub fn header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }
}

impl Default for RowLayout {
    fn default() -> Self {
        Self::new(OutputFormat::default())
    }
}

/// Streams header and data rows to `W`
pub struct RowWriter<W: Write> {
    writer: csv::Writer<W>,
    layout: RowLayout,
    address: String,
    rows: u64,
    flush_every: u64,
}

impl<W: Write> RowWriter<W> {
    /// Writer with `layout`, flushing every [`DEFAULT_FLUSH_EVERY`] rows
    pub fn new(out: W, layout: RowLayout) -> Self {
        let writer = csv::WriterBuilder::new()
            .delimiter(layout.format.delimiter())
            .quote_style(csv::QuoteStyle::Never)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(out);
        Self {
            writer,
            layout,
            address: String::with_capacity(15),
            rows: 0,
            flush_every: DEFAULT_FLUSH_EVERY,
        }
    }

    /// Flush after every `rows` data rows; 0 leaves flushing to the caller
    pub fn flush_every(mut self, rows: u64) -> Self {
        self.flush_every = rows;
        self
    }

    /// Layout in use
    pub fn layout(&self) -> &RowLayout {
        &self.layout
    }

    /// Write the header line, unless the layout turns headers off
    pub fn write_header<'c, I>(&mut self, columns: I) -> io::Result<()>
    where
        I: IntoIterator<Item = &'c str>,
    {
        if !self.layout.header {
            return Ok(());
        }
        let record = std::iter::once(ADDRESS_COLUMN).chain(columns);
        self.writer.write_record(record).map_err(io::Error::from)
    }

    /// Write one data row; `None` fields render as the placeholder
    pub fn write_row<'f, I>(&mut self, address: Ipv4Addr, fields: I) -> io::Result<()>
    where
        I: IntoIterator<Item = Option<&'f str>>,
    {
        self.address.clear();
        // Writing into a String cannot fail
        let _ = write!(self.address, "{}", address);

        let placeholder = self.layout.placeholder.as_str();
        let record = std::iter::once(self.address.as_str())
            .chain(fields.into_iter().map(|field| field.unwrap_or(placeholder)));
        self.writer.write_record(record).map_err(io::Error::from)?;

        self.rows += 1;
        if self.flush_every > 0 && self.rows % self.flush_every == 0 {
            self.writer.flush()?;
        }
        Ok(())
    }

    /// Push buffered rows through to the underlying writer and flush it
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Data rows written so far, header excluded
    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    /// Flush and return the underlying writer
    pub fn into_inner(self) -> io::Result<W> {
        self.writer.into_inner().map_err(|err| err.into_error())
    }
}
