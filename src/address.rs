//! IPv4 address enumeration
//!
//! [`AddressRange`] describes a closed interval of the IPv4 space and
//! [`AddressIter`] walks it in ascending order. The full space ends at
//! `u32::MAX`, which a `u32` counter cannot step past, so the iterator
//! yields the current value first and only then decides whether to advance
//! or stop. The last address is therefore produced exactly once and the
//! counter never wraps.

use crate::error::ConfigError;
use std::fmt;
use std::iter::FusedIterator;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// A closed range `[first, last]` of IPv4 addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressRange {
    first: u32,
    last: u32,
}

impl AddressRange {
    /// The entire IPv4 space, `0.0.0.0` through `255.255.255.255`
    pub const FULL: AddressRange = AddressRange {
        first: 0,
        last: u32::MAX,
    };

    /// The entire IPv4 space
    pub fn full() -> Self {
        Self::FULL
    }

    /// Build a range from two inclusive bounds
    ///
    /// Returns `None` when `first > last`.
    pub fn new(first: Ipv4Addr, last: Ipv4Addr) -> Option<Self> {
        let (first, last) = (u32::from(first), u32::from(last));
        (first <= last).then_some(Self { first, last })
    }

    /// The network `addr/prefix_len`
    pub fn from_cidr(addr: Ipv4Addr, prefix_len: u8) -> Option<Self> {
        if prefix_len > 32 {
            return None;
        }
        let mask = if prefix_len == 0 {
            0u32
        } else {
            !0u32 << (32 - prefix_len)
        };
        let first = u32::from(addr) & mask;
        Some(Self {
            first,
            last: first | !mask,
        })
    }

    /// First address in the range
    pub fn first(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.first)
    }

    /// Last address in the range
    pub fn last(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.last)
    }

    /// Number of addresses in the range (2^32 for the full space)
    pub fn len(&self) -> u64 {
        u64::from(self.last - self.first) + 1
    }

    /// A range always holds at least one address
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether `addr` falls inside the range
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let addr = u32::from(addr);
        self.first <= addr && addr <= self.last
    }

    /// Iterate the range in ascending order
    pub fn iter(&self) -> AddressIter {
        AddressIter {
            next: self.first,
            last: self.last,
            done: false,
        }
    }
}

impl Default for AddressRange {
    fn default() -> Self {
        Self::FULL
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.first(), self.last())
    }
}

impl FromStr for AddressRange {
    type Err = ConfigError;

    /// Accepts `a.b.c.d-e.f.g.h`, `a.b.c.d/n`, or a single address
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidRange {
            input: s.to_string(),
            reason: reason.to_string(),
        };
        let parse_addr = |text: &str| {
            text.trim()
                .parse::<Ipv4Addr>()
                .map_err(|_| invalid("not an IPv4 address"))
        };

        if let Some((first, last)) = s.split_once('-') {
            let (first, last) = (parse_addr(first)?, parse_addr(last)?);
            return Self::new(first, last).ok_or_else(|| invalid("first address is after last"));
        }

        if let Some((addr, prefix)) = s.split_once('/') {
            let addr = parse_addr(addr)?;
            let prefix_len = prefix
                .trim()
                .parse::<u8>()
                .map_err(|_| invalid("prefix length is not a number"))?;
            return Self::from_cidr(addr, prefix_len)
                .ok_or_else(|| invalid("prefix length exceeds 32"));
        }

        let addr = parse_addr(s)?;
        Ok(Self {
            first: u32::from(addr),
            last: u32::from(addr),
        })
    }
}

impl IntoIterator for AddressRange {
    type Item = Ipv4Addr;
    type IntoIter = AddressIter;

    fn into_iter(self) -> AddressIter {
        self.iter()
    }
}

impl IntoIterator for &AddressRange {
    type Item = Ipv4Addr;
    type IntoIter = AddressIter;

    fn into_iter(self) -> AddressIter {
        self.iter()
    }
}

/// Ascending iterator over an [`AddressRange`]
#[derive(Debug, Clone)]
pub struct AddressIter {
    next: u32,
    last: u32,
    done: bool,
}

impl AddressIter {
    /// Addresses not yet produced
    pub fn remaining(&self) -> u64 {
        if self.done {
            0
        } else {
            u64::from(self.last - self.next) + 1
        }
    }
}

impl Iterator for AddressIter {
    type Item = Ipv4Addr;

    #[inline]
    fn next(&mut self) -> Option<Ipv4Addr> {
        if self.done {
            return None;
        }
        let current = self.next;
        if current == self.last {
            self.done = true;
        } else {
            self.next = current + 1;
        }
        Some(Ipv4Addr::from(current))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match usize::try_from(self.remaining()) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }
}

impl FusedIterator for AddressIter {}
