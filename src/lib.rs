//! Geosweep - Exhaustive IPv4 Geo-IP Export
//!
//! Geosweep visits every IPv4 address from `0.0.0.0` to `255.255.255.255`
//! in ascending order, looks each one up in a geo-IP database and writes one
//! delimited row per address. The result is a flat, address-indexed export
//! of the database, useful for diffing database releases or loading into
//! tools that cannot read the binary format.
//!
//! # Quick Start
//!
//! ```rust
//! use geosweep::{MemoryEngine, Sweep, SweepConfig};
//! use serde_json::json;
//! use std::sync::atomic::AtomicBool;
//!
//! let mut engine = MemoryEngine::new();
//! engine.insert_cidr("1.0.0.0/24", json!({"country": {"iso_code": "AU"}}))?;
//!
//! let config = SweepConfig::new().range("1.0.0.0/31".parse()?);
//! let mut writer = config.writer(Vec::new());
//! let report = Sweep::new(&engine, config).run(&mut writer, &AtomicBool::new(false))?;
//!
//! assert_eq!(report.rows_written, 2);
//! assert_eq!(
//!     String::from_utf8(writer.into_inner()?)?,
//!     "ip,country,registered_country,represented_country\n\
//!      1.0.0.0,AU,,\n\
//!      1.0.0.1,AU,,\n"
//! );
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Against a real database, open an [`MmdbEngine`] instead:
//!
//! ```rust,no_run
//! use geosweep::{MmdbEngine, Sweep, SweepConfig};
//! use std::io;
//! use std::sync::atomic::AtomicBool;
//!
//! let engine = MmdbEngine::open("GeoLite2-Country.mmdb")?;
//! let config = SweepConfig::default();
//! let mut writer = config.writer(io::stdout().lock());
//! Sweep::new(&engine, config).run(&mut writer, &AtomicBool::new(false))?;
//! engine.close();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Pipeline
//!
//! ```text
//! AddressIter ─► GeoEngine::lookup ─► FieldResolver ─► RowWriter ─► stdout
//!   (ascending)     (entry or none)    (one value per     (delimited,
//!                                       field path)        unescaped)
//! ```
//!
//! Absent entries, absent paths and values that are not strings all render
//! as the placeholder. Only genuine engine failures are errors.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address;
pub mod engine;
pub mod error;
pub mod memory;
pub mod mmdb;
pub mod output;
pub mod path;
pub mod resolver;
pub mod sweep;

pub use crate::address::{AddressIter, AddressRange};
pub use crate::engine::{DataKind, FieldData, GeoEngine};
pub use crate::error::{ConfigError, EngineError, OpenError, SweepError};
pub use crate::memory::MemoryEngine;
pub use crate::mmdb::{MmdbEngine, MmdbValue};
pub use crate::output::{OutputFormat, RowLayout, RowWriter};
pub use crate::path::{default_paths, FieldPath};
pub use crate::resolver::{FieldResolver, ResolvedRow};
pub use crate::sweep::{ErrorPolicy, Sweep, SweepConfig, SweepOutcome, SweepReport};

/// Library version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
