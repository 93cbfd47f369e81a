//! Database engine interface
//!
//! The sweep never parses a database itself. It talks to an engine through
//! [`GeoEngine`]: look an address up, then resolve field paths against the
//! entry that came back. Entries and values borrow from the engine and are
//! dropped before the next address is processed; dropping a value is its
//! release.

use crate::error::EngineError;
use crate::path::FieldPath;
use std::fmt;
use std::net::Ipv4Addr;

/// Declared type of a materialized value
///
/// Mirrors the MaxMind DB data types. Only [`DataKind::Utf8String`] is ever
/// rendered; everything else is treated as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    /// UTF-8 string
    Utf8String,
    /// IEEE 754 double
    Double,
    /// Raw bytes
    Bytes,
    /// Unsigned 16-bit integer
    Uint16,
    /// Unsigned 32-bit integer
    Uint32,
    /// Key-value map
    Map,
    /// Signed 32-bit integer
    Int32,
    /// Unsigned 64-bit integer
    Uint64,
    /// Unsigned 128-bit integer
    Uint128,
    /// Ordered list
    Array,
    /// Boolean
    Boolean,
    /// IEEE 754 float
    Float,
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataKind::Utf8String => "utf8_string",
            DataKind::Double => "double",
            DataKind::Bytes => "bytes",
            DataKind::Uint16 => "uint16",
            DataKind::Uint32 => "uint32",
            DataKind::Map => "map",
            DataKind::Int32 => "int32",
            DataKind::Uint64 => "uint64",
            DataKind::Uint128 => "uint128",
            DataKind::Array => "array",
            DataKind::Boolean => "boolean",
            DataKind::Float => "float",
        };
        f.write_str(name)
    }
}

/// A materialized value returned by [`GeoEngine::resolve`]
pub trait FieldData {
    /// The value's declared type
    fn kind(&self) -> DataKind;

    /// The string payload, only for [`DataKind::Utf8String`]
    ///
    /// The slice has an explicit length and may point into shared storage.
    fn as_utf8(&self) -> Option<&str>;
}

/// A read-only geo-IP lookup engine
///
/// Implementations must be deterministic: the same address against the same
/// database always yields the same entry and values.
pub trait GeoEngine {
    /// Handle to the record found for one address
    type Entry<'e>
    where
        Self: 'e;

    /// A value materialized from an entry
    type Value<'e>: FieldData
    where
        Self: 'e;

    /// Find the record for `address`
    ///
    /// `Ok(None)` means the database has no entry for the address.
    fn lookup(&self, address: Ipv4Addr) -> Result<Option<Self::Entry<'_>>, EngineError>;

    /// Resolve `path` against `entry` and materialize the value found there
    ///
    /// `Ok(None)` means the path does not exist in this record.
    fn resolve<'e>(
        &'e self,
        entry: &Self::Entry<'e>,
        path: &FieldPath,
    ) -> Result<Option<Self::Value<'e>>, EngineError>;
}
