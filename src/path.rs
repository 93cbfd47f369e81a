//! Field paths
//!
//! A [`FieldPath`] names one scalar nested inside a database record, e.g.
//! `country.iso_code`. Each path also carries the column name used in the
//! output header.
//!
//! A segment is a map key, or an array index when the value it applies to
//! is an array: `subdivisions.0.iso_code` reads the first subdivision. A
//! numeric segment applied to a map is still looked up as a key.

use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;

/// Paths queried when none are configured
pub const DEFAULT_PATHS: [&str; 3] = [
    "country.iso_code",
    "registered_country.iso_code",
    "represented_country.iso_code",
];

/// An ordered sequence of keys or indices plus the column it renders into
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    column: String,
    segments: Vec<String>,
}

impl FieldPath {
    /// Parse `a.b.c` or `column=a.b.c`
    ///
    /// Without an explicit column the first segment names the column, so
    /// `registered_country.iso_code` renders under `registered_country`.
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidPath(spec.to_string());

        let (column, dotted) = match spec.split_once('=') {
            Some((column, dotted)) => (Some(column.trim()), dotted.trim()),
            None => (None, spec.trim()),
        };

        let segments: Vec<String> = dotted.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(invalid());
        }

        let column = match column {
            Some("") => return Err(invalid()),
            Some(column) => column.to_string(),
            None => segments[0].clone(),
        };

        Ok(Self { column, segments })
    }

    /// Build a path from explicit parts
    pub fn new<I, S>(column: impl Into<String>, segments: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let column = column.into();
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if column.is_empty() || segments.is_empty() || segments.iter().any(String::is_empty) {
            return Err(ConfigError::InvalidPath(segments.join(".")));
        }
        Ok(Self { column, segments })
    }

    /// Header name for this path
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Segments from the record root down to the value
    pub fn segments(&self) -> impl ExactSizeIterator<Item = &str> + Clone {
        self.segments.iter().map(String::as_str)
    }

    /// Number of segments in the path
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// `a.b.c` form, without the column
    pub fn dotted(&self) -> String {
        self.segments.join(".")
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dotted())
    }
}

impl FromStr for FieldPath {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// The three country code paths of a GeoIP2/GeoLite2 country database
pub fn default_paths() -> Vec<FieldPath> {
    DEFAULT_PATHS
        .iter()
        .filter_map(|spec| FieldPath::parse(spec).ok())
        .collect()
}
