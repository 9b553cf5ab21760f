//! The toolchain driver: one memoized pipeline per document.
//!
//! Stages run in order — Tokens, AST, ResolvedAST, BuildOrder, Objects —
//! and each is cached on the document context, so requesting any stage runs
//! the preceding ones at most once. A stage error is appended to the shared
//! state and marks the document failed; later stages are skipped for it
//! while sibling documents continue.
//!
//! Document imports complete the imported document's pipeline through
//! Objects before the importing document's compile stage runs, and land in
//! the import cache so a second import returns the same scope without
//! re-compiling.

use std::rc::Rc;

use crate::{
    compiler::NodeCompiler,
    context::{CompilationContext, ScopeValue},
    deps,
    error::{CyclicImport, Phase, ZsError},
    file::{DocumentInfo, SourceFile},
    import::{ImporterKind, ImportRoute, ImportScope},
    lexer,
    objects::Value,
    parser,
    resolved::{NodeLocation, ResolvedNode},
    resolver::Resolver,
};

/// The stages a document request can stop at.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ToolchainResult {
    Tokens,
    Ast,
    ResolvedAst,
    BuildOrder,
    Objects,
    DocumentContext,
}

/// Drives documents through the pipeline against one compilation context.
pub struct Toolchain {
    pub context: CompilationContext,
}

impl Toolchain {
    pub fn new() -> Self {
        Self { context: CompilationContext::new() }
    }

    /// Registers an in-memory document (used by tests and the REPL-style
    /// entry points); the path does not need to exist on disk.
    pub fn add_source(&mut self, path: &str, code: &str) -> DocumentInfo {
        let info = DocumentInfo::from_path(path);
        let file = SourceFile::new(
            path.split('/').map(|part| part.to_string()).collect(),
            code.to_string(),
        );
        let document = self.context.document_context(info.clone());
        document.file = Some(file);
        info
    }

    /// Runs a document's pipeline up to the requested stage.
    ///
    /// Returns `false` when the document failed at or before that stage;
    /// diagnostics are in the shared state.
    pub fn execute_document(&mut self, info: &DocumentInfo, result: ToolchainResult) -> bool {
        let key = info.path_string();
        self.context.document_context(info.clone());

        if result >= ToolchainResult::Tokens && !self.ensure_tokens(&key) {
            return false;
        }
        if result >= ToolchainResult::Ast && !self.ensure_ast(&key) {
            return false;
        }
        if result >= ToolchainResult::ResolvedAst && !self.ensure_resolved(&key) {
            return false;
        }
        if result >= ToolchainResult::BuildOrder && !self.ensure_build_order(&key) {
            return false;
        }
        if result >= ToolchainResult::Objects && !self.ensure_objects(&key) {
            return false;
        }
        true
    }

    fn document(&mut self, key: &str) -> &mut crate::context::DocumentContext {
        self.context.documents.get_mut(key).expect("document context exists")
    }

    fn ensure_tokens(&mut self, key: &str) -> bool {
        if self.document(key).failed {
            return false;
        }
        if self.document(key).tokens.is_some() {
            return true;
        }

        let file = match self.document(key).file.clone() {
            Some(file) => file,
            None => {
                let path = self.document(key).info.path().to_path_buf();
                match std::fs::read_to_string(&path) {
                    Ok(code) => {
                        let file = SourceFile::new(
                            path.iter().map(|part| part.to_string_lossy().into_owned()).collect(),
                            code,
                        );
                        self.document(key).file = Some(file.clone());
                        file
                    }
                    Err(error) => {
                        self.context.state.warning(
                            Phase::Lexer,
                            format!("cannot read '{}': {error}", path.display()),
                            None,
                        );
                        self.document(key).failed = true;
                        return false;
                    }
                }
            }
        };

        match lexer::tokenize(&file) {
            Ok(tokens) => {
                self.document(key).tokens = Some(Rc::new(tokens));
                true
            }
            Err(error) => {
                self.context.state.error(Phase::Lexer, error);
                self.document(key).failed = true;
                false
            }
        }
    }

    fn ensure_ast(&mut self, key: &str) -> bool {
        if self.document(key).failed {
            return false;
        }
        if self.document(key).nodes.is_some() {
            return true;
        }

        let file = self.document(key).file.clone().expect("tokens stage sets the file");
        let tokens = self.document(key).tokens.clone().expect("tokens stage ran");

        match parser::parse(&file, &tokens) {
            Ok(nodes) => {
                self.document(key).nodes = Some(Rc::new(nodes));
                true
            }
            Err(error) => {
                self.context.state.error(Phase::Parser, error);
                self.document(key).failed = true;
                false
            }
        }
    }

    fn ensure_resolved(&mut self, key: &str) -> bool {
        if self.document(key).failed {
            return false;
        }
        if self.document(key).resolved.is_some() {
            return true;
        }

        let file = self.document(key).file.clone().expect("ast stage sets the file");
        let nodes = self.document(key).nodes.clone().expect("ast stage ran");
        let scope = self.document(key).scope;

        let errors_before = self.context.state.errors().len();
        let mut resolver = Resolver::new(&mut self.context, scope, file);
        let resolved = resolver.process(&nodes);
        self.document(key).resolved = Some(resolved);

        if self.context.state.errors().len() > errors_before {
            self.document(key).failed = true;
            return false;
        }
        true
    }

    fn ensure_build_order(&mut self, key: &str) -> bool {
        if self.document(key).failed {
            return false;
        }
        if self.document(key).build_order.is_some() {
            return true;
        }

        let resolved = self.document(key).resolved.clone().expect("resolve stage ran");
        match deps::build_order(&self.context, &resolved) {
            Ok(order) => {
                self.document(key).build_order = Some(order);
                true
            }
            Err(error) => {
                self.context.state.error(Phase::Dependency, error);
                self.document(key).failed = true;
                false
            }
        }
    }

    fn ensure_objects(&mut self, key: &str) -> bool {
        if self.document(key).failed {
            return false;
        }
        if self.document(key).objects.is_some() {
            return true;
        }

        self.document(key).in_progress = true;

        // complete document imports first, so their results are cached for
        // the compile stage
        let order = self.document(key).build_order.clone().expect("order stage ran");
        let flattened: Vec<NodeLocation> = order.iter().flatten().copied().collect();
        if !self.execute_pending_imports(key, &flattened) {
            self.document(key).in_progress = false;
            self.document(key).failed = true;
            return false;
        }

        let errors_before = self.context.state.errors().len();
        let scope = self.document(key).scope;
        let compiled = {
            let mut compiler = NodeCompiler::new(&mut self.context);
            compiler.compile_all(&flattened).and_then(|objects| {
                // every defined name of the document compiles, referenced
                // from this document or not, so the published surface is
                // complete
                let defined: Vec<NodeLocation> = compiler
                    .ctx
                    .scopes
                    .get(scope)
                    .defined_names()
                    .filter_map(|(_, value)| match value {
                        ScopeValue::Node(node) => Some(*node),
                        ScopeValue::Object(_) => None,
                    })
                    .collect();
                for node in defined {
                    compiler.require_definition(node)?;
                    compiler.require_function_bodies(node)?;
                }
                Ok(objects)
            })
        };
        let objects = match compiled {
            Ok(objects) => objects,
            Err(error) => {
                self.context.state.error(Phase::Compiler, error);
                self.document(key).in_progress = false;
                self.document(key).failed = true;
                return false;
            }
        };

        self.document(key).objects = Some(objects);
        self.document(key).in_progress = false;

        if self.context.state.errors().len() > errors_before {
            self.document(key).failed = true;
            return false;
        }

        // publish the document's import surface
        let scope = self.public_scope(key);
        let source_key = self.document(key).info.path_string();
        self.context.import_system.cache_result(source_key, scope);
        true
    }

    /// Walks the document's top level for imports and exports whose source
    /// is a compile-time string routed to another document, and completes
    /// those documents through the Objects stage.
    fn execute_pending_imports(&mut self, key: &str, nodes: &[NodeLocation]) -> bool {
        let origin = self.document(key).info.directory().map(|path| path.to_path_buf());

        let mut sources = Vec::new();
        for node in nodes.iter() {
            let (source_node, span) = match self.ctx_node(*node) {
                ResolvedNode::Import(import) => (import.source, import.ast.span.clone()),
                ResolvedNode::Export(export) => match export.source {
                    Some(source) => (source, export.ast.span.clone()),
                    None => continue,
                },
                _ => continue,
            };
            if let ResolvedNode::Object(object) = self.ctx_node(source_node) {
                if let Value::String(source) = &object.value {
                    sources.push((source.to_string(), span));
                }
            }
        }

        for (source, span) in sources {
            if self.context.import_system.cached(&source).is_some() {
                continue;
            }
            let route = self.context.import_system.route(&source, origin.as_deref());
            if let ImportRoute::File { importer: ImporterKind::Document, path } = route {
                let info = DocumentInfo::from_path(&path);
                let target_key = info.path_string();

                if let Some(target) = self.context.documents.get(&target_key) {
                    if target.in_progress {
                        self.context.state.error(
                            Phase::Import,
                            ZsError::CyclicImport(
                                CyclicImport {
                                    import_source: source.clone(),
                                    position: span.position.clone().into(),
                                    code: (&span.file).into(),
                                }
                                .into(),
                            ),
                        );
                        return false;
                    }
                }

                if !self.execute_document(&info, ToolchainResult::Objects) {
                    return false;
                }
                let scope = self.public_scope(&target_key);
                self.context.import_system.cache_result(source, scope);
            }
        }
        true
    }

    fn ctx_node(&self, node: NodeLocation) -> &ResolvedNode {
        self.context.nodes.get(node)
    }

    /// The import surface of a compiled document: every name its root
    /// scope defines, mapped to the compiled value.
    fn public_scope(&self, key: &str) -> ImportScope {
        let mut scope = ImportScope::new();
        let document = match self.context.documents.get(key) {
            Some(document) => document,
            None => return scope,
        };
        for (name, value) in self.context.scopes.get(document.scope).defined_names() {
            let exported = match value {
                ScopeValue::Object(value) => Some(value.clone()),
                ScopeValue::Node(node) => match self.context.compiler_cache.get(*node) {
                    Some(object) => Some(Value::Object(object)),
                    None => self.context.compiler_cache.value(*node).cloned(),
                },
            };
            if let Some(value) = exported {
                scope.define(name.clone(), value);
            }
        }
        scope
    }
}

impl Default for Toolchain {
    fn default() -> Self {
        Self::new()
    }
}
