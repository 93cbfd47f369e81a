//! Field resolution
//!
//! Turns one lookup entry into one value per configured [`FieldPath`].
//! Every resolved value stays in the [`ResolvedRow`] until the row has been
//! written, then [`ResolvedRow::release`] drops them all at once. Values of
//! any type other than a UTF-8 string render exactly like missing values.

use crate::engine::{DataKind, FieldData, GeoEngine};
use crate::error::EngineError;
use crate::path::FieldPath;

/// Resolves a fixed, ordered list of paths
#[derive(Debug, Clone, Copy)]
pub struct FieldResolver<'p> {
    paths: &'p [FieldPath],
}

impl<'p> FieldResolver<'p> {
    /// Resolver for `paths`, in that order
    pub fn new(paths: &'p [FieldPath]) -> Self {
        Self { paths }
    }

    /// Number of fields per row
    pub fn width(&self) -> usize {
        self.paths.len()
    }

    /// Resolve every path against `entry`, replacing the contents of `row`
    ///
    /// A missing entry fills the row with absent fields without asking the
    /// engine anything. On error, the values resolved so far remain in `row`
    /// and are dropped by the next [`ResolvedRow::release`].
    pub fn resolve_into<'e, E: GeoEngine>(
        &self,
        engine: &'e E,
        entry: Option<&E::Entry<'e>>,
        row: &mut ResolvedRow<E::Value<'e>>,
    ) -> Result<(), EngineError> {
        row.release();
        let Some(entry) = entry else {
            row.fill_absent(self.width());
            return Ok(());
        };
        for path in self.paths {
            let value = engine.resolve(entry, path)?;
            row.values.push(value);
        }
        Ok(())
    }
}

/// Values resolved for one address, one slot per path
#[derive(Debug)]
pub struct ResolvedRow<V> {
    values: Vec<Option<V>>,
}

impl<V: FieldData> ResolvedRow<V> {
    /// An empty row with room for `width` fields
    pub fn with_capacity(width: usize) -> Self {
        Self {
            values: Vec::with_capacity(width),
        }
    }

    /// Number of slots filled
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no slot is filled
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The string for slot `index`, if it holds a UTF-8 string
    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).and_then(|v| Self::text(v.as_ref()))
    }

    /// Renderable text of every slot, in path order
    pub fn fields(&self) -> impl Iterator<Item = Option<&str>> + '_ {
        self.values.iter().map(|v| Self::text(v.as_ref()))
    }

    /// Drop every held value
    pub fn release(&mut self) {
        self.values.clear();
    }

    /// Append `count` absent slots
    pub fn fill_absent(&mut self, count: usize) {
        self.values.extend((0..count).map(|_| None));
    }

    fn text(value: Option<&V>) -> Option<&str> {
        value
            .filter(|v| v.kind() == DataKind::Utf8String)
            .and_then(FieldData::as_utf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEngine;
    use crate::path::default_paths;
    use serde_json::json;
    use std::net::Ipv4Addr;

    fn engine() -> MemoryEngine {
        let mut engine = MemoryEngine::new();
        engine
            .insert_cidr(
                "1.0.0.0/24",
                json!({
                    "country": {"iso_code": "AU", "geoname_id": 2077456},
                    "registered_country": {"iso_code": "AU"}
                }),
            )
            .unwrap()
            .insert_cidr(
                "2.0.0.0/24",
                json!({
                    "country": {"iso_code": 36},
                    "registered_country": {"iso_code": ["A", "U"]},
                    "represented_country": {"iso_code": {"code": "AU"}}
                }),
            )
            .unwrap();
        engine
    }

    #[test]
    fn test_resolves_strings_and_absence() {
        let engine = engine();
        let paths = default_paths();
        let resolver = FieldResolver::new(&paths);
        let mut row = ResolvedRow::with_capacity(resolver.width());

        let entry = engine.lookup(Ipv4Addr::new(1, 0, 0, 1)).unwrap();
        resolver
            .resolve_into(&engine, entry.as_ref(), &mut row)
            .unwrap();
        assert_eq!(
            row.fields().collect::<Vec<_>>(),
            vec![Some("AU"), Some("AU"), None]
        );
        assert_eq!(engine.live_values(), 2);

        row.release();
        assert_eq!(engine.live_values(), 0);
    }

    #[test]
    fn test_non_strings_render_as_absent() {
        let engine = engine();
        let paths = default_paths();
        let resolver = FieldResolver::new(&paths);
        let mut row = ResolvedRow::with_capacity(resolver.width());

        let entry = engine.lookup(Ipv4Addr::new(2, 0, 0, 7)).unwrap();
        resolver
            .resolve_into(&engine, entry.as_ref(), &mut row)
            .unwrap();
        assert_eq!(row.len(), 3);
        assert!(row.fields().all(|f| f.is_none()));
        // The mismatched values were still materialized and must be released
        assert_eq!(engine.materialized(), 3);
        row.release();
        assert_eq!(engine.released(), 3);
    }

    #[test]
    fn test_missing_entry_skips_engine() {
        let engine = engine();
        let paths = default_paths();
        let resolver = FieldResolver::new(&paths);
        let mut row = ResolvedRow::with_capacity(resolver.width());

        let entry = engine.lookup(Ipv4Addr::new(9, 9, 9, 9)).unwrap();
        assert!(entry.is_none());
        resolver
            .resolve_into(&engine, entry.as_ref(), &mut row)
            .unwrap();
        assert_eq!(row.fields().collect::<Vec<_>>(), vec![None, None, None]);
        assert_eq!(engine.materialized(), 0);
    }

    #[test]
    fn test_error_leaves_partial_row_for_release() {
        let mut engine = engine();
        engine.fail_resolve_at(Ipv4Addr::new(1, 0, 0, 3));
        let paths = default_paths();
        let resolver = FieldResolver::new(&paths);
        let mut row = ResolvedRow::with_capacity(resolver.width());

        let entry = engine.lookup(Ipv4Addr::new(1, 0, 0, 3)).unwrap();
        let err = resolver
            .resolve_into(&engine, entry.as_ref(), &mut row)
            .unwrap_err();
        assert!(matches!(err, EngineError::Resolve { .. }));

        row.release();
        assert_eq!(engine.live_values(), 0);
    }

    #[test]
    fn test_resolve_replaces_previous_row() {
        let engine = engine();
        let paths = default_paths();
        let resolver = FieldResolver::new(&paths);
        let mut row = ResolvedRow::with_capacity(resolver.width());

        for last_octet in 0..4 {
            let entry = engine.lookup(Ipv4Addr::new(1, 0, 0, last_octet)).unwrap();
            resolver
                .resolve_into(&engine, entry.as_ref(), &mut row)
                .unwrap();
            assert_eq!(row.len(), 3);
            assert_eq!(row.get(0), Some("AU"));
        }
        row.release();
        assert_eq!(engine.materialized(), engine.released());
    }
}
