//! Name resolution: AST to resolved AST.
//!
//! Resolution happens in two passes over each document. The *registry* pass
//! ([`registry`]) walks the AST, creates resolved nodes, populates scopes
//! and synthesizes overload groups. The *name-linker* pass ([`linker`])
//! walks the resolved tree and replaces every identifier reference with a
//! direct link to the node or value it names; a failed lookup reports an
//! error at the identifier's span and aborts that subtree, leaving siblings
//! to continue.
//!
//! Function bodies are registered lazily by the linker inside the
//! function's own scope, which is where `var` statements become locals.

use std::rc::Rc;

use indexmap::IndexSet;

use crate::{
    ast::Ast,
    context::{CompilationContext, ScopeValue},
    error::{NameNotFound, Phase, ZsError},
    file::SourceFile,
    resolved::{NodeLocation, ResolvedNode},
    scope::{ScopeError, ScopeLocation},
    span::Span,
};

mod linker;
mod registry;

/// One document's resolution driver: shared scope cursor and memoization
/// for both passes.
pub struct Resolver<'ctx> {
    pub(crate) ctx: &'ctx mut CompilationContext,
    pub(crate) current_scope: ScopeLocation,
    /// Nodes the linker has already visited
    resolved: IndexSet<NodeLocation>,
    /// Synthesized nodes (overload groups) that need a linker visit
    injected: Vec<NodeLocation>,
    pub(crate) file: SourceFile,
}

impl<'ctx> Resolver<'ctx> {
    pub fn new(ctx: &'ctx mut CompilationContext, document_scope: ScopeLocation, file: SourceFile) -> Self {
        Self {
            ctx,
            current_scope: document_scope,
            resolved: IndexSet::new(),
            injected: Vec::new(),
            file,
        }
    }

    /// Runs both passes over a document's top-level nodes.
    ///
    /// Errors are appended to the shared state; the returned list contains
    /// every node that was registered, resolved or not.
    pub fn process(&mut self, nodes: &[Rc<Ast>]) -> Vec<NodeLocation> {
        log::debug!("resolving document {}", self.file.name());
        let mut result = Vec::new();

        for ast in nodes.iter() {
            match self.register(ast) {
                Ok(location) => result.push(location),
                Err(error) => self.ctx.state.error(Phase::Resolver, error),
            }
        }

        for location in result.clone().into_iter() {
            if let Err(error) = self.resolve(location) {
                self.ctx.state.error(Phase::Resolver, error);
            }
        }

        let injected = std::mem::take(&mut self.injected);
        for location in injected.into_iter() {
            if let Err(error) = self.resolve(location) {
                self.ctx.state.error(Phase::Resolver, error);
            }
        }

        result
    }

    // region shared helpers

    pub(crate) fn in_scope<T>(
        &mut self,
        scope: ScopeLocation,
        body: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let saved = std::mem::replace(&mut self.current_scope, scope);
        let result = body(self);
        self.current_scope = saved;
        result
    }

    pub(crate) fn create_child_scope(&mut self) -> ScopeLocation {
        self.ctx.scopes.create_scope(Some(self.current_scope))
    }

    pub(crate) fn inject(&mut self, node: NodeLocation) {
        self.injected.push(node);
    }

    pub(crate) fn mark_resolved(&mut self, node: NodeLocation) -> bool {
        self.resolved.insert(node)
    }

    /// Builds a `NameNotFound` diagnostic, suggesting similar visible names.
    pub(crate) fn name_not_found(&self, name: &str, span: &Span) -> ZsError {
        let mut similar = Vec::new();
        let mut scope = Some(self.current_scope);
        while let Some(location) = scope {
            let current = self.ctx.scopes.get(location);
            for (candidate, _) in current.names() {
                if candidate != name
                    && (candidate.ends_with(name) || name.ends_with(candidate.as_str()))
                {
                    similar.push(candidate.clone());
                }
            }
            scope = current.parent;
        }

        let advice = if similar.is_empty() {
            None
        } else {
            let list = similar
                .iter()
                .map(|item| format!(" - {item}"))
                .collect::<Vec<_>>()
                .join("\n");
            Some(format!("the following visible names are similar:\n{list}"))
        };

        ZsError::NameNotFound(
            NameNotFound {
                name: name.to_string(),
                position: span.position.clone().into(),
                code: (&span.file).into(),
                advice,
            }
            .into(),
        )
    }

    /// Converts a scope failure into a diagnostic at `span`, digging out the
    /// original definition span when the clashing value is a node.
    pub(crate) fn scope_error(&self, error: ScopeError, span: &Span) -> ZsError {
        match error {
            ScopeError::NameNotFound { name } => self.name_not_found(&name, span),
            ScopeError::NameAlreadyBound { name } => {
                let old_position = self
                    .ctx
                    .scopes
                    .lookup_name(self.current_scope, &name, true)
                    .and_then(|value| match value {
                        ScopeValue::Node(node) => self.ctx.nodes.get(*node).span(),
                        ScopeValue::Object(_) => None,
                    })
                    .map(|span| span.position)
                    .unwrap_or_else(|| span.position.clone());

                ZsError::NameAlreadyBound(
                    crate::error::NameAlreadyBound {
                        name,
                        old_position: old_position.into(),
                        new_position: span.position.clone().into(),
                        code: (&span.file).into(),
                    }
                    .into(),
                )
            }
        }
    }

    pub(crate) fn add_node(&mut self, node: ResolvedNode) -> NodeLocation {
        self.ctx.nodes.add(node)
    }

    // endregion
}
