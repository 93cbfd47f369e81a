//! Error types for the geosweep library
//!
//! Absence of data is never an error here: a missing entry, a missing
//! path or a value of the wrong type all resolve to the placeholder inside
//! the resolver. The types below cover the failures that stop a sweep.

use std::io;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while opening a database file
#[derive(Error, Debug)]
pub enum OpenError {
    /// The file could not be read or mapped
    ///
    /// The message names the file only; the cause is reachable through
    /// [`OpenError::io_cause`] or the error source.
    #[error("cannot open database file {}", path.display())]
    Io {
        /// Path that was being opened
        path: PathBuf,
        /// Underlying system error
        #[source]
        source: io::Error,
    },

    /// The file was read but is not a usable database
    #[error("cannot open database file {} - {message}", path.display())]
    InvalidDatabase {
        /// Path that was being opened
        path: PathBuf,
        /// Description from the database reader
        message: String,
    },
}

impl OpenError {
    /// The underlying I/O error, when the failure was I/O related
    pub fn io_cause(&self) -> Option<&io::Error> {
        match self {
            OpenError::Io { source, .. } => Some(source),
            OpenError::InvalidDatabase { .. } => None,
        }
    }
}

/// Genuine failures reported by a database engine
///
/// These are distinct from "not found": an engine reports absence through
/// `Ok(None)` and reserves these variants for broken lookups.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The search tree could not be walked for an address
    #[error("lookup failed: {message}")]
    Lookup {
        /// Engine description of the failure
        message: String,
    },

    /// A field path could not be resolved or materialized
    #[error("cannot resolve {path}: {message}")]
    Resolve {
        /// Dotted form of the path
        path: String,
        /// Engine description of the failure
        message: String,
    },
}

/// Errors that terminate a sweep
#[derive(Error, Debug)]
pub enum SweepError {
    /// An engine failure for one address under [`ErrorPolicy::Abort`](crate::ErrorPolicy::Abort)
    #[error("lookup error for ip={address} - {source}")]
    Address {
        /// Address whose processing failed
        address: Ipv4Addr,
        /// Engine failure
        #[source]
        source: EngineError,
    },

    /// Writing to the output stream failed
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),

    /// The configuration cannot drive a sweep
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Invalid sweep configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A field path was empty or had an empty segment
    #[error("invalid field path '{0}'")]
    InvalidPath(String),

    /// An address range could not be parsed
    #[error("invalid address range '{input}': {reason}")]
    InvalidRange {
        /// Text that was parsed
        input: String,
        /// What was wrong with it
        reason: String,
    },

    /// No field paths were configured
    #[error("at least one field path is required")]
    NoPaths,

    /// Output format name not recognized
    #[error("invalid format '{0}', expected: csv or tsv")]
    UnknownFormat(String),

    /// Error policy name not recognized
    #[error("invalid error policy '{0}', expected: abort or skip")]
    UnknownPolicy(String),
}
