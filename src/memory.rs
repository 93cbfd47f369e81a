//! In-memory engine
//!
//! [`MemoryEngine`] answers lookups from a small table of IPv4 networks with
//! JSON records attached. It counts every materialized value and every
//! release, and it can be told to fail for chosen addresses, which makes it
//! the engine of choice for tests, benchmarks and dry runs of a
//! configuration.
//!
//! Lookups scan the table linearly, so it is meant for fixtures with a
//! handful of networks, not for real databases.

use crate::address::AddressRange;
use crate::engine::{DataKind, FieldData, GeoEngine};
use crate::error::{ConfigError, EngineError};
use crate::path::FieldPath;
use serde_json::Value;
use std::cell::Cell;
use std::collections::HashSet;
use std::net::Ipv4Addr;

struct Network {
    range: AddressRange,
    prefix_len: u8,
    record: Value,
}

/// Longest-prefix-match table of JSON records
#[derive(Default)]
pub struct MemoryEngine {
    networks: Vec<Network>,
    failing_lookups: HashSet<Ipv4Addr>,
    failing_resolves: HashSet<Ipv4Addr>,
    lookups: Cell<u64>,
    materialized: Cell<u64>,
    released: Cell<u64>,
}

impl MemoryEngine {
    /// An engine with no networks; every lookup misses
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `record` to `addr/prefix_len`
    ///
    /// The most specific network wins on lookup; among equal prefixes the
    /// one inserted last wins.
    pub fn insert(
        &mut self,
        addr: Ipv4Addr,
        prefix_len: u8,
        record: Value,
    ) -> Result<&mut Self, ConfigError> {
        let range =
            AddressRange::from_cidr(addr, prefix_len).ok_or_else(|| ConfigError::InvalidRange {
                input: format!("{}/{}", addr, prefix_len),
                reason: "prefix length exceeds 32".to_string(),
            })?;
        self.networks.push(Network {
            range,
            prefix_len,
            record,
        });
        Ok(self)
    }

    /// Attach `record` to a network written as `a.b.c.d/n` or a single address
    pub fn insert_cidr(&mut self, cidr: &str, record: Value) -> Result<&mut Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidRange {
            input: cidr.to_string(),
            reason: reason.to_string(),
        };
        let (addr, prefix_len) = match cidr.split_once('/') {
            Some((addr, prefix)) => (
                addr,
                prefix
                    .parse::<u8>()
                    .map_err(|_| invalid("prefix length is not a number"))?,
            ),
            None => (cidr, 32),
        };
        let addr = addr
            .parse::<Ipv4Addr>()
            .map_err(|_| invalid("not an IPv4 address"))?;
        self.insert(addr, prefix_len, record)
    }

    /// Make [`GeoEngine::lookup`] fail for `addr`
    pub fn fail_lookup_at(&mut self, addr: Ipv4Addr) -> &mut Self {
        self.failing_lookups.insert(addr);
        self
    }

    /// Make [`GeoEngine::resolve`] fail for every path of `addr`'s entry
    pub fn fail_resolve_at(&mut self, addr: Ipv4Addr) -> &mut Self {
        self.failing_resolves.insert(addr);
        self
    }

    /// Number of lookups performed
    pub fn lookups(&self) -> u64 {
        self.lookups.get()
    }

    /// Number of values handed out by [`GeoEngine::resolve`]
    pub fn materialized(&self) -> u64 {
        self.materialized.get()
    }

    /// Number of those values that have been dropped
    pub fn released(&self) -> u64 {
        self.released.get()
    }

    /// Values handed out and not yet dropped
    pub fn live_values(&self) -> u64 {
        self.materialized.get() - self.released.get()
    }
}

/// Record found for one address
#[derive(Debug, Clone, Copy)]
pub struct MemoryEntry<'e> {
    address: Ipv4Addr,
    record: &'e Value,
}

impl<'e> MemoryEntry<'e> {
    /// The whole record
    pub fn record(&self) -> &'e Value {
        self.record
    }
}

/// A value resolved from a [`MemoryEntry`]; dropping it counts a release
#[derive(Debug)]
pub struct MemoryValue<'e> {
    value: &'e Value,
    released: &'e Cell<u64>,
}

impl Drop for MemoryValue<'_> {
    fn drop(&mut self) {
        self.released.set(self.released.get() + 1);
    }
}

impl FieldData for MemoryValue<'_> {
    fn kind(&self) -> DataKind {
        match self.value {
            Value::String(_) => DataKind::Utf8String,
            Value::Bool(_) => DataKind::Boolean,
            Value::Array(_) => DataKind::Array,
            Value::Object(_) => DataKind::Map,
            // resolve() reports null as absent, so no value ever wraps one
            Value::Null => unreachable!("null is never materialized"),
            Value::Number(n) => match (n.as_u64(), n.as_i64()) {
                (Some(u), _) if u <= u64::from(u32::MAX) => DataKind::Uint32,
                (Some(_), _) => DataKind::Uint64,
                // int32 is the only signed integer type a database can hold
                (None, Some(_)) => DataKind::Int32,
                (None, None) => DataKind::Double,
            },
        }
    }

    fn as_utf8(&self) -> Option<&str> {
        self.value.as_str()
    }
}

impl GeoEngine for MemoryEngine {
    type Entry<'e> = MemoryEntry<'e>;
    type Value<'e> = MemoryValue<'e>;

    fn lookup(&self, address: Ipv4Addr) -> Result<Option<Self::Entry<'_>>, EngineError> {
        self.lookups.set(self.lookups.get() + 1);
        if self.failing_lookups.contains(&address) {
            return Err(EngineError::Lookup {
                message: "injected lookup failure".to_string(),
            });
        }

        let mut best: Option<&Network> = None;
        for network in &self.networks {
            if network.range.contains(address)
                && best.is_none_or(|b| network.prefix_len >= b.prefix_len)
            {
                best = Some(network);
            }
        }

        Ok(best.map(|network| MemoryEntry {
            address,
            record: &network.record,
        }))
    }

    fn resolve<'e>(
        &'e self,
        entry: &Self::Entry<'e>,
        path: &FieldPath,
    ) -> Result<Option<Self::Value<'e>>, EngineError> {
        if self.failing_resolves.contains(&entry.address) {
            return Err(EngineError::Resolve {
                path: path.dotted(),
                message: "injected resolution failure".to_string(),
            });
        }

        let mut current = entry.record;
        for segment in path.segments() {
            let next = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            match next {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        if current.is_null() {
            return Ok(None);
        }

        self.materialized.set(self.materialized.get() + 1);
        Ok(Some(MemoryValue {
            value: current,
            released: &self.released,
        }))
    }
}
