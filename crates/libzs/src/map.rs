//! Insertion-ordered map with duplicate-definition tracking.
//!
//! `ZsHashMap` wraps `IndexMap` and remembers the span each value was
//! inserted with, so a second insert of the same key can be reported as a
//! [`NameAlreadyBound`](crate::error::NameAlreadyBound) error pointing at
//! both definitions.

use std::hash::Hash;

use indexmap::{Equivalent, IndexMap};

use crate::{
    error::{NameAlreadyBound, ZsError},
    span::{Span, ToRange},
};

/// Trait for values that can provide their definition span.
pub trait ValueTrait {
    fn get_span(&self) -> Span;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Value<V> {
    value: V,
    position: std::ops::Range<usize>,
}

/// An insertion-ordered map that can validate inserts against duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZsHashMap<K: Hash + Eq, V: ValueTrait> {
    map: IndexMap<K, Value<V>>,
}

impl<K: Hash + Eq + std::fmt::Display, V: ValueTrait> Default for ZsHashMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq + std::fmt::Display, V: ValueTrait> ZsHashMap<K, V> {
    pub fn new() -> Self {
        Self { map: IndexMap::new() }
    }

    /// Inserts without validation, returning the previous value if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let position = value.get_span().to_range();
        self.map
            .insert(key, Value { value, position })
            .map(|item| item.value)
    }

    /// Inserts with duplicate-definition validation.
    pub fn validate_insert(&mut self, key: K, value: V) -> Result<(), ZsError> {
        let span = value.get_span();
        let name = key.to_string();

        match self.map.insert(key, Value { value, position: span.to_range() }) {
            Some(old) => Err(ZsError::NameAlreadyBound(
                NameAlreadyBound {
                    name,
                    old_position: old.position.into(),
                    new_position: span.to_range().into(),
                    code: (&span.file).into(),
                }
                .into(),
            )),
            None => Ok(()),
        }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.map.get(key).map(|item| &item.value)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.map.contains_key(key)
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.map.shift_remove(key).map(|item| item.value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.map.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.map.values().map(|item| &item.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.map.iter().map(|item| (item.0, &item.1.value))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::SourceFile;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry(Span);

    impl ValueTrait for Entry {
        fn get_span(&self) -> Span {
            self.0.clone()
        }
    }

    fn span(range: std::ops::Range<usize>) -> Span {
        Span::new(
            SourceFile::new(vec!["test".into()], "var abc = 1; var abc = 2;".to_string()),
            range,
        )
    }

    #[test]
    fn validate_insert_reports_both_positions() {
        let mut map: ZsHashMap<String, Entry> = ZsHashMap::new();
        map.validate_insert("abc".into(), Entry(span(4..7))).unwrap();

        let error = map.validate_insert("abc".into(), Entry(span(17..20))).unwrap_err();
        match error {
            ZsError::NameAlreadyBound(error) => {
                assert_eq!(error.old_position.offset(), 4);
                assert_eq!(error.new_position.offset(), 17);
            }
            other => panic!("expected NameAlreadyBound, got {other:?}"),
        }
    }

    #[test]
    fn insertion_order_is_stable() {
        let mut map: ZsHashMap<String, Entry> = ZsHashMap::new();
        map.insert("b".into(), Entry(span(0..1)));
        map.insert("a".into(), Entry(span(1..2)));
        let keys: Vec<_> = map.keys().cloned().collect();
        assert_eq!(keys, vec!["b".to_string(), "a".to_string()]);
    }
}
