//! Compilation context: the shared state of one compilation unit.
//!
//! `CompilationContext` ties together the shared error state, the resolved
//! node arena, the scope arena, the object arena, the per-document caches
//! and the import system. Everything the passes need flows through it.

use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use crate::{
    ast::Ast,
    debug::DebugInfo,
    error::State,
    file::{DocumentInfo, SourceFile},
    import::ImportSystem,
    objects::{ObjectArena, ObjectLocation, TypeValue, Value},
    resolved::{NodeArena, NodeLocation},
    scope::{ScopeArena, ScopeLocation},
    token::Token,
};

/// What a name in a resolver scope binds to: a resolved node from this
/// compilation unit, or a ready value imported from another unit (or the
/// builtins).
#[derive(Debug, Clone)]
pub enum ScopeValue {
    Node(NodeLocation),
    Object(Value),
}

/// Per-document pipeline cache. Every stage is memoized; requesting a stage
/// runs the preceding stages when missing.
#[derive(Debug)]
pub struct DocumentContext {
    pub info: DocumentInfo,
    pub file: Option<SourceFile>,
    pub tokens: Option<Rc<Vec<Token>>>,
    pub nodes: Option<Rc<Vec<Rc<Ast>>>>,
    pub resolved: Option<Vec<NodeLocation>>,
    pub build_order: Option<Vec<Vec<NodeLocation>>>,
    pub objects: Option<Vec<ObjectLocation>>,
    /// The document's root scope; its defined names are the public surface
    pub scope: ScopeLocation,
    /// Set while the document's pipeline is running, to detect import cycles
    pub in_progress: bool,
    /// Set when a stage failed; later stages are skipped
    pub failed: bool,
}

impl DocumentContext {
    pub fn new(info: DocumentInfo, scope: ScopeLocation) -> Self {
        Self {
            info,
            file: None,
            tokens: None,
            nodes: None,
            resolved: None,
            build_order: None,
            objects: None,
            scope,
            in_progress: false,
            failed: false,
        }
    }
}

/// Cache of compiled objects keyed by resolved node, with the set of nodes
/// whose define stage has completed.
#[derive(Debug, Default)]
pub struct CompilerCache {
    cache: IndexMap<NodeLocation, ObjectLocation>,
    defined: IndexSet<NodeLocation>,
    /// Values produced by defining value-level nodes (top-level vars,
    /// imported names)
    values: IndexMap<NodeLocation, Value>,
}

impl CompilerCache {
    pub fn get(&self, node: NodeLocation) -> Option<ObjectLocation> {
        self.cache.get(&node).copied()
    }

    pub fn insert(&mut self, node: NodeLocation, object: ObjectLocation) {
        self.cache.insert(node, object);
    }

    pub fn is_defined(&self, node: NodeLocation) -> bool {
        self.defined.contains(&node)
    }

    pub fn mark_defined(&mut self, node: NodeLocation) {
        self.defined.insert(node);
    }

    pub fn value(&self, node: NodeLocation) -> Option<&Value> {
        self.values.get(&node)
    }

    pub fn set_value(&mut self, node: NodeLocation, value: Value) {
        self.values.insert(node, value);
    }
}

/// The single source of truth for one compilation unit.
#[derive(Debug)]
pub struct CompilationContext {
    pub state: State,
    pub nodes: NodeArena,
    pub scopes: ScopeArena<ScopeValue>,
    pub objects: ObjectArena,
    pub documents: IndexMap<String, DocumentContext>,
    pub import_system: ImportSystem,
    /// Scope shared by every document of the unit; holds the builtins
    pub global_scope: ScopeLocation,
    pub compiler_cache: CompilerCache,
    /// Operator overload groups, keyed by the registry name (`_+_`, `-_`)
    pub operators: IndexMap<String, ObjectLocation>,
    /// Generic instances cached by origin plus argument tuple
    pub generic_instances: IndexMap<(ObjectLocation, Vec<TypeValue>), ObjectLocation>,
    pub debug: DebugInfo,
}

impl CompilationContext {
    pub fn new() -> Self {
        let mut scopes = ScopeArena::new();
        let global_scope = scopes.create_scope(None);

        let mut context = Self {
            state: State::new(),
            nodes: NodeArena::new(),
            scopes,
            objects: ObjectArena::new(),
            documents: IndexMap::new(),
            import_system: ImportSystem::new(),
            global_scope,
            compiler_cache: CompilerCache::default(),
            operators: IndexMap::new(),
            generic_instances: IndexMap::new(),
            debug: DebugInfo::default(),
        };
        crate::builtins::install(&mut context);
        context
    }

    /// Creates (or returns) the document context for a path.
    pub fn document_context(&mut self, info: DocumentInfo) -> &mut DocumentContext {
        let key = info.path_string();
        if !self.documents.contains_key(&key) {
            let scope = self.scopes.create_scope(Some(self.global_scope));
            self.documents.insert(key.clone(), DocumentContext::new(info, scope));
        }
        self.documents.get_mut(&key).unwrap()
    }

    pub fn get_document(&self, path: &str) -> Option<&DocumentContext> {
        self.documents.get(path)
    }

    pub fn has_errors(&self) -> bool {
        self.state.has_errors()
    }
}

impl Default for CompilationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_contexts_are_cached() {
        let mut context = CompilationContext::new();
        let info = DocumentInfo::from_path("main.zs");
        let scope = context.document_context(info.clone()).scope;
        let again = context.document_context(info).scope;
        assert_eq!(scope, again);
        assert_eq!(context.documents.len(), 1);
    }

    #[test]
    fn builtins_are_visible_from_document_scopes() {
        let mut context = CompilationContext::new();
        let info = DocumentInfo::from_path("main.zs");
        let scope = context.document_context(info).scope;
        assert!(context.scopes.lookup_name(scope, "Int32", true).is_some());
        assert!(context.scopes.lookup_name(scope, "Any", true).is_some());
        assert!(context.scopes.lookup_name(scope, "missing", true).is_none());
    }
}
