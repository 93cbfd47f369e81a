//! Minimal MaxMind DB writer for test fixtures
//!
//! Produces IPv4 databases with 24-bit records: search tree, 16-byte
//! separator, data section, metadata marker and metadata map. Records are
//! `serde_json::Value`s encoded with the standard MaxMind DB type tags.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::Write;
use std::net::Ipv4Addr;
use tempfile::NamedTempFile;

const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pointer {
    Node(u32),
    /// Data offset plus the prefix length that put it there
    Data(u32, u8),
    Empty,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    left: Pointer,
    right: Pointer,
}

impl Node {
    fn child(&self, bit: u32) -> Pointer {
        if bit == 0 {
            self.left
        } else {
            self.right
        }
    }

    fn set(&mut self, bit: u32, pointer: Pointer) {
        if bit == 0 {
            self.left = pointer;
        } else {
            self.right = pointer;
        }
    }
}

/// Builds an IPv4 MaxMind DB in memory
pub struct MmdbWriter {
    nodes: Vec<Node>,
    data: Vec<u8>,
    database_type: String,
    build_epoch: u64,
}

impl MmdbWriter {
    pub fn new(database_type: &str) -> Self {
        Self {
            nodes: vec![Node {
                left: Pointer::Empty,
                right: Pointer::Empty,
            }],
            data: Vec::new(),
            database_type: database_type.to_string(),
            build_epoch: 1_700_000_000,
        }
    }

    /// Attach `record` to `cidr` (`a.b.c.d/n`, n >= 1)
    ///
    /// More specific networks win regardless of insertion order.
    pub fn insert(&mut self, cidr: &str, record: Value) -> &mut Self {
        let mut bytes = Vec::new();
        encode(&record, &mut bytes);
        self.insert_raw(cidr, &bytes)
    }

    /// Attach already encoded record bytes to `cidr`, unchecked
    pub fn insert_raw(&mut self, cidr: &str, bytes: &[u8]) -> &mut Self {
        let (addr, prefix) = cidr.split_once('/').expect("cidr must contain '/'");
        let addr = u32::from(addr.parse::<Ipv4Addr>().expect("invalid IPv4 address"));
        let prefix_len: u8 = prefix.parse().expect("invalid prefix length");
        assert!((1..=32).contains(&prefix_len), "prefix length out of range");

        let offset = self.data.len() as u32;
        self.data.extend_from_slice(bytes);
        self.insert_offset(addr, prefix_len, offset);
        self
    }

    fn insert_offset(&mut self, addr: u32, prefix_len: u8, offset: u32) {
        let mut node = 0usize;
        for depth in 0..prefix_len {
            let bit = (addr >> (31 - depth)) & 1;
            let child = self.nodes[node].child(bit);

            if depth + 1 == prefix_len {
                match child {
                    Pointer::Node(id) => self.backfill(id, offset, prefix_len),
                    Pointer::Data(_, existing) if existing > prefix_len => {}
                    _ => self.nodes[node].set(bit, Pointer::Data(offset, prefix_len)),
                }
                return;
            }

            node = match child {
                Pointer::Node(id) => id as usize,
                inherited => {
                    // Split: both halves keep whatever covered the whole
                    let id = self.nodes.len() as u32;
                    self.nodes.push(Node {
                        left: inherited,
                        right: inherited,
                    });
                    self.nodes[node].set(bit, Pointer::Node(id));
                    id as usize
                }
            };
        }
    }

    fn backfill(&mut self, node_id: u32, offset: u32, prefix_len: u8) {
        for bit in [0, 1] {
            match self.nodes[node_id as usize].child(bit) {
                Pointer::Node(child) => self.backfill(child, offset, prefix_len),
                Pointer::Data(_, existing) if existing > prefix_len => {}
                _ => self.nodes[node_id as usize].set(bit, Pointer::Data(offset, prefix_len)),
            }
        }
    }

    fn record_value(pointer: Pointer, node_count: u32) -> u32 {
        match pointer {
            Pointer::Empty => node_count,
            Pointer::Node(id) => id,
            Pointer::Data(offset, _) => node_count + 16 + offset,
        }
    }

    /// Serialize the whole database
    pub fn build(&self) -> Vec<u8> {
        let node_count = self.nodes.len() as u32;
        let mut out = Vec::with_capacity(self.nodes.len() * 6 + 16 + self.data.len() + 256);

        for node in &self.nodes {
            let left = Self::record_value(node.left, node_count);
            let right = Self::record_value(node.right, node_count);
            out.extend_from_slice(&left.to_be_bytes()[1..]);
            out.extend_from_slice(&right.to_be_bytes()[1..]);
        }
        out.extend_from_slice(&[0u8; 16]);
        out.extend_from_slice(&self.data);

        out.extend_from_slice(METADATA_MARKER);
        encode_map_header(9, &mut out);
        encode_key_u16("binary_format_major_version", 2, &mut out);
        encode_key_u16("binary_format_minor_version", 0, &mut out);
        encode_string("build_epoch", &mut out);
        encode_u64(self.build_epoch, &mut out);
        encode_string("database_type", &mut out);
        encode_string(&self.database_type, &mut out);
        encode_string("description", &mut out);
        encode(&json!({"en": "geosweep test fixture"}), &mut out);
        encode_key_u16("ip_version", 4, &mut out);
        encode_string("languages", &mut out);
        encode(&json!(["en"]), &mut out);
        encode_string("node_count", &mut out);
        encode_u32(node_count, &mut out);
        encode_key_u16("record_size", 24, &mut out);
        out
    }

    /// Write the database to a temporary file
    pub fn write_temp(&self) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("create temp file");
        file.write_all(&self.build()).expect("write database");
        file.flush().expect("flush database");
        file
    }
}

/// A small country database:
///
/// - `1.0.0.0/24`: AU everywhere
/// - `1.0.0.128/25`: US country, AU registered
/// - `2.0.0.0/16`: FR, with represented_country and a `languages` array
/// - `3.0.0.0/24`: country is a number, registered_country a nested map
/// - `255.255.255.254/31`: ZZ, exercising the top of the space
pub fn country_fixture() -> MmdbWriter {
    let mut writer = MmdbWriter::new("GeoLite2-Country");
    writer
        .insert(
            "1.0.0.0/24",
            json!({
                "country": {"iso_code": "AU", "geoname_id": 2077456},
                "registered_country": {"iso_code": "AU"}
            }),
        )
        .insert(
            "1.0.0.128/25",
            json!({
                "country": {"iso_code": "US", "names": {"en": "United States"}},
                "registered_country": {"iso_code": "AU"}
            }),
        )
        .insert(
            "2.0.0.0/16",
            json!({
                "country": {"iso_code": "FR", "languages": ["fr", "br"]},
                "registered_country": {"iso_code": "FR"},
                "represented_country": {"iso_code": "DE", "type": "military"}
            }),
        )
        .insert(
            "3.0.0.0/24",
            json!({
                "country": {"iso_code": 36},
                "registered_country": {"iso_code": {"alpha2": "AU"}},
                "represented_country": {"iso_code": true}
            }),
        )
        .insert(
            "255.255.255.254/31",
            json!({
                "country": {"iso_code": "ZZ"},
                "registered_country": {"iso_code": "ZZ"}
            }),
        );
    writer
}

/// [`country_fixture`] plus a broken record at `1.0.0.2/31`
///
/// `registered_country.iso_code` is intact and comes first. The value of
/// `country.iso_code` is a pointer far past the end of the file, so any
/// path that has to read or skip `country` fails to decode.
pub fn corrupt_fixture() -> MmdbWriter {
    let mut record = Vec::new();
    encode_map_header(2, &mut record);
    encode_string("registered_country", &mut record);
    encode(&json!({"iso_code": "AU"}), &mut record);
    encode_string("country", &mut record);
    encode_map_header(1, &mut record);
    encode_string("iso_code", &mut record);
    // Pointer, 3 bytes: 7 << 16 | 0xFFFF, plus 2048
    record.extend_from_slice(&[0x2F, 0xFF, 0xFF]);

    let mut writer = country_fixture();
    writer.insert_raw("1.0.0.2/31", &record);
    writer
}

fn encode(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::String(s) => encode_string(s, out),
        Value::Bool(b) => {
            // Extended type 14, value carried in the size bits
            out.push(u8::from(*b));
            out.push(14 - 7);
        }
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                match u32::try_from(u) {
                    Ok(small) => encode_u32(small, out),
                    Err(_) => encode_u64(u, out),
                }
            } else if let Some(i) = n.as_i64() {
                out.push(4);
                out.push(8 - 7);
                out.extend_from_slice(&(i as i32).to_be_bytes());
            } else {
                out.push((3 << 5) | 8);
                out.extend_from_slice(&n.as_f64().unwrap_or_default().to_be_bytes());
            }
        }
        Value::Array(items) => {
            encode_size(0, items.len(), out);
            out.insert(out.len() - size_bytes(items.len()), 11 - 7);
            for item in items {
                encode(item, out);
            }
        }
        Value::Object(map) => {
            encode_map_header(map.len(), out);
            for (key, value) in map {
                encode_string(key, out);
                encode(value, out);
            }
        }
        Value::Null => panic!("null cannot be stored in a MaxMind DB"),
    }
}

fn encode_string(s: &str, out: &mut Vec<u8>) {
    encode_size(2, s.len(), out);
    out.extend_from_slice(s.as_bytes());
}

fn encode_map_header(len: usize, out: &mut Vec<u8>) {
    encode_size(7, len, out);
}

fn encode_key_u16(key: &str, value: u16, out: &mut Vec<u8>) {
    encode_string(key, out);
    out.push((5 << 5) | 2);
    out.extend_from_slice(&value.to_be_bytes());
}

fn encode_u32(value: u32, out: &mut Vec<u8>) {
    out.push((6 << 5) | 4);
    out.extend_from_slice(&value.to_be_bytes());
}

fn encode_u64(value: u64, out: &mut Vec<u8>) {
    out.push(8);
    out.push(9 - 7);
    out.extend_from_slice(&value.to_be_bytes());
}

/// Control byte plus size extension bytes
fn encode_size(type_id: u8, size: usize, out: &mut Vec<u8>) {
    let type_bits = type_id << 5;
    if size < 29 {
        out.push(type_bits | size as u8);
    } else if size < 29 + 256 {
        out.push(type_bits | 29);
        out.push((size - 29) as u8);
    } else if size < 29 + 256 + 65_536 {
        out.push(type_bits | 30);
        out.extend_from_slice(&((size - 285) as u16).to_be_bytes());
    } else {
        out.push(type_bits | 31);
        out.extend_from_slice(&((size - 65_821) as u32).to_be_bytes()[1..]);
    }
}

fn size_bytes(size: usize) -> usize {
    match size {
        0..=28 => 0,
        29..=284 => 1,
        285..=65_820 => 2,
        _ => 3,
    }
}
