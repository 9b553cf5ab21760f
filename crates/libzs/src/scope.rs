//! Hierarchical scope management.
//!
//! Scopes live in an arena ([`ScopeArena`]) and reference their parents by
//! [`ScopeLocation`] index, never by pointer. Each scope distinguishes names
//! it *defines* (introduced here, eligible for export) from names it merely
//! *refers* (visible through imports); lookups treat both identically and
//! walk the parent chain unless told otherwise.

use indexmap::{IndexMap, IndexSet};

/// A unique identifier for a scope within the compilation context.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ScopeLocation(pub usize);

impl ScopeLocation {
    /// Sentinel for a not-yet-assigned scope.
    pub const UNDEFINED: Self = ScopeLocation(usize::MAX);
}

impl From<usize> for ScopeLocation {
    fn from(location: usize) -> Self {
        ScopeLocation(location)
    }
}

/// Scope operation failures; callers attach spans before reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    NameAlreadyBound { name: String },
    NameNotFound { name: String },
}

/// A single binding environment.
#[derive(Debug, Clone)]
pub struct Scope<T> {
    pub parent: Option<ScopeLocation>,
    pub location: ScopeLocation,
    items: IndexMap<String, T>,
    defined: IndexSet<String>,
}

impl<T> Scope<T> {
    fn new(parent: Option<ScopeLocation>, location: ScopeLocation) -> Self {
        Self {
            parent,
            location,
            items: IndexMap::new(),
            defined: IndexSet::new(),
        }
    }

    fn insert(&mut self, name: &str, value: T, define: bool) -> Result<(), ScopeError> {
        if self.items.contains_key(name) {
            return Err(ScopeError::NameAlreadyBound { name: name.to_string() });
        }
        self.items.insert(name.to_string(), value);
        if define {
            self.defined.insert(name.to_string());
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.items.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    /// Names introduced by this scope, in declaration order.
    pub fn defined_names(&self) -> impl Iterator<Item = (&String, &T)> {
        self.items.iter().filter(|(name, _)| self.defined.contains(*name))
    }

    /// Names visible here through `refer_name` only.
    pub fn referred_names(&self) -> impl Iterator<Item = (&String, &T)> {
        self.items.iter().filter(|(name, _)| !self.defined.contains(*name))
    }

    pub fn names(&self) -> impl Iterator<Item = (&String, &T)> {
        self.items.iter()
    }
}

/// Arena of scopes with stable index-based parent links.
#[derive(Debug, Default)]
pub struct ScopeArena<T> {
    scopes: Vec<Scope<T>>,
}

impl<T> ScopeArena<T> {
    pub fn new() -> Self {
        Self { scopes: Vec::new() }
    }

    pub fn create_scope(&mut self, parent: Option<ScopeLocation>) -> ScopeLocation {
        let location = ScopeLocation(self.scopes.len());
        log::debug!("new scope {:?} (parent {:?})", location, parent);
        self.scopes.push(Scope::new(parent, location));
        location
    }

    pub fn get(&self, location: ScopeLocation) -> &Scope<T> {
        &self.scopes[location.0]
    }

    pub fn get_mut(&mut self, location: ScopeLocation) -> &mut Scope<T> {
        &mut self.scopes[location.0]
    }

    /// Introduces a name defined by this scope.
    pub fn create_name(&mut self, scope: ScopeLocation, name: &str, value: T) -> Result<(), ScopeError> {
        log::debug!("create name '{}' in scope {:?}", name, scope);
        self.get_mut(scope).insert(name, value, true)
    }

    /// Makes a name visible without defining it (imports).
    pub fn refer_name(&mut self, scope: ScopeLocation, name: &str, value: T) -> Result<(), ScopeError> {
        log::debug!("refer name '{}' in scope {:?}", name, scope);
        self.get_mut(scope).insert(name, value, false)
    }

    pub fn delete_name(&mut self, scope: ScopeLocation, name: &str, recursive: bool) -> Result<(), ScopeError> {
        let mut current = Some(scope);
        while let Some(location) = current {
            let scope = self.get_mut(location);
            if scope.items.shift_remove(name).is_some() {
                scope.defined.shift_remove(name);
                return Ok(());
            }
            if !recursive {
                break;
            }
            current = scope.parent;
        }
        Err(ScopeError::NameNotFound { name: name.to_string() })
    }

    /// Looks a name up, walking the parent chain when `recursive`.
    pub fn lookup_name(&self, scope: ScopeLocation, name: &str, recursive: bool) -> Option<&T> {
        self.lookup_scope(scope, name, recursive)
            .and_then(|location| self.get(location).get(name))
    }

    /// Returns the scope that actually binds `name`, if any.
    pub fn lookup_scope(&self, scope: ScopeLocation, name: &str, recursive: bool) -> Option<ScopeLocation> {
        let mut current = Some(scope);
        while let Some(location) = current {
            let scope = self.get(location);
            if scope.contains(name) {
                return Some(location);
            }
            if !recursive {
                return None;
            }
            current = scope.parent;
        }
        None
    }

    /// Marks an already-visible name as defined by this scope (re-export).
    pub fn promote_to_defined(&mut self, scope: ScopeLocation, name: &str) -> Result<(), ScopeError> {
        let scope = self.get_mut(scope);
        if !scope.contains(name) {
            return Err(ScopeError::NameNotFound { name: name.to_string() });
        }
        scope.defined.insert(name.to_string());
        Ok(())
    }

    /// Replaces the value bound to an existing name, searching upward.
    pub fn rebind_name(&mut self, scope: ScopeLocation, name: &str, value: T) -> Result<(), ScopeError> {
        match self.lookup_scope(scope, name, true) {
            Some(location) => {
                self.get_mut(location).items.insert(name.to_string(), value);
                Ok(())
            }
            None => Err(ScopeError::NameNotFound { name: name.to_string() }),
        }
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defined_and_referred_are_distinct() {
        let mut arena: ScopeArena<i32> = ScopeArena::new();
        let scope = arena.create_scope(None);

        arena.create_name(scope, "own", 1).unwrap();
        arena.refer_name(scope, "imported", 2).unwrap();

        let defined: Vec<_> = arena.get(scope).defined_names().map(|(n, _)| n.clone()).collect();
        let referred: Vec<_> = arena.get(scope).referred_names().map(|(n, _)| n.clone()).collect();
        assert_eq!(defined, vec!["own"]);
        assert_eq!(referred, vec!["imported"]);

        // lookups treat both identically
        assert_eq!(arena.lookup_name(scope, "own", false), Some(&1));
        assert_eq!(arena.lookup_name(scope, "imported", false), Some(&2));
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut arena: ScopeArena<i32> = ScopeArena::new();
        let scope = arena.create_scope(None);
        arena.create_name(scope, "x", 1).unwrap();
        assert_eq!(
            arena.create_name(scope, "x", 2),
            Err(ScopeError::NameAlreadyBound { name: "x".to_string() })
        );
    }

    #[test]
    fn lookup_walks_parent_chain() {
        let mut arena: ScopeArena<i32> = ScopeArena::new();
        let root = arena.create_scope(None);
        let child = arena.create_scope(Some(root));
        arena.create_name(root, "x", 1).unwrap();

        assert_eq!(arena.lookup_name(child, "x", true), Some(&1));
        assert_eq!(arena.lookup_name(child, "x", false), None);
        assert_eq!(arena.lookup_scope(child, "x", true), Some(root));
    }

    #[test]
    fn shadowing_in_child_scope() {
        let mut arena: ScopeArena<i32> = ScopeArena::new();
        let root = arena.create_scope(None);
        let child = arena.create_scope(Some(root));
        arena.create_name(root, "x", 1).unwrap();
        arena.create_name(child, "x", 2).unwrap();
        assert_eq!(arena.lookup_name(child, "x", true), Some(&2));
    }

    #[test]
    fn rebind_replaces_in_defining_scope() {
        let mut arena: ScopeArena<i32> = ScopeArena::new();
        let root = arena.create_scope(None);
        let child = arena.create_scope(Some(root));
        arena.create_name(root, "x", 1).unwrap();
        arena.rebind_name(child, "x", 9).unwrap();
        assert_eq!(arena.lookup_name(root, "x", false), Some(&9));
        assert!(arena.rebind_name(child, "missing", 0).is_err());
    }

    #[test]
    fn delete_name_respects_recursion_flag() {
        let mut arena: ScopeArena<i32> = ScopeArena::new();
        let root = arena.create_scope(None);
        let child = arena.create_scope(Some(root));
        arena.create_name(root, "x", 1).unwrap();

        assert!(arena.delete_name(child, "x", false).is_err());
        arena.delete_name(child, "x", true).unwrap();
        assert_eq!(arena.lookup_name(root, "x", true), None);
    }
}
