//! MaxMind DB engine
//!
//! Wraps a [`maxminddb::Reader`] over a memory-mapped database file. Path
//! resolution and materialization happen in one `decode_path` call; the
//! decoded value borrows its string payload straight from the mapping.

use crate::engine::{DataKind, FieldData, GeoEngine};
use crate::error::{EngineError, OpenError};
use crate::path::FieldPath;
use log::debug;
use maxminddb::{LookupResult, MaxMindDbError, PathElement, Reader};
use memmap2::Mmap;
use serde::de::{self, Deserialize, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use std::fmt;
use std::fs::File;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

/// An open, memory-mapped MaxMind DB file
pub struct MmdbEngine {
    reader: Reader<Mmap>,
    path: PathBuf,
}

impl MmdbEngine {
    /// Open and memory-map a database file
    ///
    /// # Errors
    ///
    /// [`OpenError::Io`] when the file cannot be opened or mapped, and
    /// [`OpenError::InvalidDatabase`] when its contents are not a readable
    /// MaxMind DB.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, OpenError> {
        let path = path.as_ref();
        let io_error = |source| OpenError::Io {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(io_error)?;
        // SAFETY: the mapping is only read, and it is owned by the reader so it
        // outlives every value borrowed from it.
        let mmap = unsafe { Mmap::map(&file) }.map_err(io_error)?;

        let reader = Reader::from_source(mmap).map_err(|err| OpenError::InvalidDatabase {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;

        debug!(
            "opened {} (type={}, ip_version={}, nodes={}, build_epoch={})",
            path.display(),
            reader.metadata.database_type,
            reader.metadata.ip_version,
            reader.metadata.node_count,
            reader.metadata.build_epoch
        );

        Ok(Self {
            reader,
            path: path.to_path_buf(),
        })
    }

    /// Path the database was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `database_type` from the file's metadata
    pub fn database_type(&self) -> &str {
        &self.reader.metadata.database_type
    }

    /// `build_epoch` from the file's metadata
    pub fn build_epoch(&self) -> u64 {
        self.reader.metadata.build_epoch
    }

    /// Release the mapping
    pub fn close(self) {
        debug!("closing {}", self.path.display());
    }

    /// Re-walk `path` one segment at a time, choosing a map key or an array
    /// index for each segment from the type of the value it applies to
    ///
    /// Returns `Ok(None)` when a segment cannot apply: the value above it is
    /// missing, a scalar, or an array and the segment is not an index.
    fn structured_elements<'p>(
        entry: &LookupResult<'_, Mmap>,
        path: &'p FieldPath,
    ) -> Result<Option<Vec<PathElement<'p>>>, MaxMindDbError> {
        let mut elements = Vec::with_capacity(path.depth());
        for segment in path.segments() {
            let parent = match entry.decode_path::<MmdbValue<'_>>(&elements)? {
                Some(parent) => parent,
                None => return Ok(None),
            };
            let element = match (parent.kind(), segment.parse::<usize>()) {
                (DataKind::Map, _) => PathElement::Key(segment),
                (DataKind::Array, Ok(index)) => PathElement::Index(index),
                _ => return Ok(None),
            };
            elements.push(element);
        }
        Ok(Some(elements))
    }
}

impl fmt::Debug for MmdbEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MmdbEngine")
            .field("path", &self.path)
            .field("database_type", &self.database_type())
            .finish()
    }
}

impl GeoEngine for MmdbEngine {
    type Entry<'e> = LookupResult<'e, Mmap>;
    type Value<'e> = MmdbValue<'e>;

    fn lookup(&self, address: Ipv4Addr) -> Result<Option<Self::Entry<'_>>, EngineError> {
        let result = self
            .reader
            .lookup(IpAddr::V4(address))
            .map_err(|err| EngineError::Lookup {
                message: err.to_string(),
            })?;
        Ok(result.has_data().then_some(result))
    }

    fn resolve<'e>(
        &'e self,
        entry: &Self::Entry<'e>,
        path: &FieldPath,
    ) -> Result<Option<Self::Value<'e>>, EngineError> {
        let keys: Vec<PathElement<'_>> = path.segments().map(PathElement::Key).collect();
        let err = match entry.decode_path::<MmdbValue<'e>>(&keys) {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        // Keys alone failed: the path may index into an array, or step
        // through a scalar, which is absence rather than a broken record
        let resolve_error = |err: MaxMindDbError| EngineError::Resolve {
            path: path.dotted(),
            message: err.to_string(),
        };
        match Self::structured_elements(entry, path) {
            Ok(None) => Ok(None),
            Ok(Some(elements)) if elements.iter().any(|e| matches!(e, PathElement::Index(_))) => {
                entry.decode_path::<MmdbValue<'e>>(&elements).map_err(resolve_error)
            }
            Ok(Some(_)) | Err(_) => Err(resolve_error(err)),
        }
    }
}

/// A value decoded from the data section
///
/// Strings keep a slice into the mapped file. Maps and arrays are walked
/// to the end and only their type is kept.
#[derive(Debug, Clone, PartialEq)]
pub enum MmdbValue<'a> {
    /// String borrowed from the database
    Str(&'a str),
    /// String the decoder could not lend out
    Owned(String),
    /// Any non-string value
    Other(DataKind),
}

impl FieldData for MmdbValue<'_> {
    fn kind(&self) -> DataKind {
        match self {
            MmdbValue::Str(_) | MmdbValue::Owned(_) => DataKind::Utf8String,
            MmdbValue::Other(kind) => *kind,
        }
    }

    fn as_utf8(&self) -> Option<&str> {
        match self {
            MmdbValue::Str(s) => Some(s),
            MmdbValue::Owned(s) => Some(s.as_str()),
            MmdbValue::Other(_) => None,
        }
    }
}

impl<'de> Deserialize<'de> for MmdbValue<'de> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = MmdbValue<'de>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any MaxMind DB value")
    }

    fn visit_borrowed_str<E: de::Error>(self, v: &'de str) -> Result<Self::Value, E> {
        Ok(MmdbValue::Str(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(MmdbValue::Owned(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(MmdbValue::Owned(v))
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<Self::Value, E> {
        Ok(MmdbValue::Other(DataKind::Boolean))
    }

    fn visit_u16<E: de::Error>(self, _: u16) -> Result<Self::Value, E> {
        Ok(MmdbValue::Other(DataKind::Uint16))
    }

    fn visit_u32<E: de::Error>(self, _: u32) -> Result<Self::Value, E> {
        Ok(MmdbValue::Other(DataKind::Uint32))
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> Result<Self::Value, E> {
        Ok(MmdbValue::Other(DataKind::Uint64))
    }

    fn visit_u128<E: de::Error>(self, _: u128) -> Result<Self::Value, E> {
        Ok(MmdbValue::Other(DataKind::Uint128))
    }

    fn visit_i32<E: de::Error>(self, _: i32) -> Result<Self::Value, E> {
        Ok(MmdbValue::Other(DataKind::Int32))
    }

    // int32 is the only signed integer type in the format; wider values
    // only arrive from generic deserializers
    fn visit_i64<E: de::Error>(self, _: i64) -> Result<Self::Value, E> {
        Ok(MmdbValue::Other(DataKind::Int32))
    }

    fn visit_f32<E: de::Error>(self, _: f32) -> Result<Self::Value, E> {
        Ok(MmdbValue::Other(DataKind::Float))
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> Result<Self::Value, E> {
        Ok(MmdbValue::Other(DataKind::Double))
    }

    fn visit_bytes<E: de::Error>(self, _: &[u8]) -> Result<Self::Value, E> {
        Ok(MmdbValue::Other(DataKind::Bytes))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(MmdbValue::Other(DataKind::Array))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(MmdbValue::Other(DataKind::Map))
    }
}
