//! The name-linker pass.
//!
//! Walks the resolved tree and replaces identifier references with direct
//! links: an identifier either resolves to another resolved node or to a
//! compile-time value wrapped in a resolved-object node. Resolution is
//! idempotent and memoized. Function bodies are registered here, inside the
//! function's scope, so their `var` statements bind at body scope.

use crate::{
    ast::AstKind,
    context::ScopeValue,
    error::{Phase, ZsError},
    resolved::{NodeLocation, ResolvedNode, ResolvedObject},
};

use super::Resolver;

impl Resolver<'_> {
    /// Resolves one node, returning the node every reference to it should
    /// now point at (identifiers return their target).
    pub(crate) fn resolve(&mut self, location: NodeLocation) -> Result<NodeLocation, ZsError> {
        if !self.mark_resolved(location) {
            return Ok(location);
        }

        let node = self.ctx.nodes.get(location).clone();
        match node {
            ResolvedNode::Identifier(identifier) => {
                let value = self
                    .ctx
                    .scopes
                    .lookup_name(self.current_scope, &identifier.name, true)
                    .cloned();
                match value {
                    Some(ScopeValue::Node(target)) => {
                        // the reference is replaced with the definition
                        self.resolved.swap_remove(&location);
                        Ok(target)
                    }
                    Some(ScopeValue::Object(object)) => {
                        self.resolved.swap_remove(&location);
                        Ok(self.add_node(ResolvedNode::Object(ResolvedObject {
                            value: object,
                            span: Some(identifier.ast.span.clone()),
                        })))
                    }
                    None => Err(self.name_not_found(&identifier.name, &identifier.ast.span)),
                }
            }

            ResolvedNode::Object(_)
            | ResolvedNode::GenericParameter(_)
            | ResolvedNode::ImportedName(_)
            | ResolvedNode::Break(_)
            | ResolvedNode::Continue(_)
            | ResolvedNode::FunctionBody(_) => Ok(location),

            ResolvedNode::Module(module) => {
                self.in_scope(module.scope, |resolver| {
                    for (index, item) in module.items.iter().enumerate() {
                        let resolved = resolver.resolve(*item)?;
                        if let ResolvedNode::Module(node) = resolver.ctx.nodes.get_mut(location) {
                            node.items[index] = resolved;
                        }
                    }
                    Ok::<_, ZsError>(())
                })?;
                Ok(location)
            }

            ResolvedNode::Class(class) => {
                // bases see the generic parameters but not the members
                self.in_scope(class.signature_scope, |resolver| {
                    for (index, base) in class.bases.iter().enumerate() {
                        let resolved = resolver.resolve(*base)?;
                        if let ResolvedNode::Class(node) = resolver.ctx.nodes.get_mut(location) {
                            node.bases[index] = resolved;
                        }
                    }
                    Ok::<_, ZsError>(())
                })?;
                self.in_scope(class.body_scope, |resolver| {
                    for item in class.items.iter() {
                        resolver.resolve(*item)?;
                    }
                    Ok::<_, ZsError>(())
                })?;
                Ok(location)
            }

            ResolvedNode::Function(function) => {
                self.in_scope(function.scope, |resolver| {
                    for parameter in function.positional_parameters.iter() {
                        resolver.resolve(*parameter)?;
                    }
                    for parameter in function.named_parameters.iter() {
                        resolver.resolve(*parameter)?;
                    }
                    if let Some(parameter) = function.variadic_positional_parameter {
                        resolver.resolve(parameter)?;
                    }
                    if let Some(parameter) = function.variadic_named_parameter {
                        resolver.resolve(parameter)?;
                    }

                    if let Some(return_type) = function.return_type {
                        let resolved = resolver.resolve(return_type)?;
                        if let ResolvedNode::Function(node) = resolver.ctx.nodes.get_mut(location) {
                            node.return_type = Some(resolved);
                        }
                    }

                    // the body is registered lazily, in the function scope
                    if let Some(body_location) = function.body {
                        let statements = match &function.ast.kind {
                            AstKind::Function(ast) => ast.body.clone().unwrap_or_default(),
                            _ => Vec::new(),
                        };
                        let mut instructions = Vec::new();
                        for statement in statements.iter() {
                            let registered = resolver.register(statement)?;
                            instructions.push(resolver.resolve(registered)?);
                        }
                        if let ResolvedNode::FunctionBody(node) = resolver.ctx.nodes.get_mut(body_location) {
                            node.instructions = Some(instructions);
                        }
                    }
                    Ok::<_, ZsError>(())
                })?;
                Ok(location)
            }

            ResolvedNode::OverloadGroup(group) => {
                // the parent group is whatever the same name means just
                // outside the scope this group was defined in
                let outer = self.ctx.scopes.get(group.defining_scope).parent;
                let parent = outer.and_then(|outer| {
                    self.ctx.scopes.lookup_name(outer, &group.name, true).cloned()
                });
                if let Some(ScopeValue::Node(parent_location)) = parent {
                    if matches!(self.ctx.nodes.get(parent_location), ResolvedNode::OverloadGroup(_)) {
                        if let ResolvedNode::OverloadGroup(node) = self.ctx.nodes.get_mut(location) {
                            node.parent = Some(parent_location);
                        }
                    }
                }
                for overload in group.overloads.iter() {
                    self.resolve(*overload)?;
                }
                Ok(location)
            }

            ResolvedNode::Parameter(parameter) => {
                if let Some(parameter_type) = parameter.parameter_type {
                    let resolved = self.resolve(parameter_type)?;
                    if let ResolvedNode::Parameter(node) = self.ctx.nodes.get_mut(location) {
                        node.parameter_type = Some(resolved);
                    }
                }
                if let Some(initializer) = parameter.initializer {
                    let resolved = self.resolve(initializer)?;
                    if let ResolvedNode::Parameter(node) = self.ctx.nodes.get_mut(location) {
                        node.initializer = Some(resolved);
                    }
                }
                Ok(location)
            }

            ResolvedNode::Var(var) => {
                if let Some(var_type) = var.var_type {
                    let resolved = self.resolve(var_type)?;
                    if let ResolvedNode::Var(node) = self.ctx.nodes.get_mut(location) {
                        node.var_type = Some(resolved);
                    }
                }
                if let Some(initializer) = var.initializer {
                    let resolved = self.resolve(initializer)?;
                    if let ResolvedNode::Var(node) = self.ctx.nodes.get_mut(location) {
                        node.initializer = Some(resolved);
                    }
                }
                Ok(location)
            }

            ResolvedNode::Set(set) => {
                let target = self
                    .ctx
                    .scopes
                    .lookup_name(self.current_scope, &set.name, true)
                    .cloned();
                let target = match target {
                    Some(ScopeValue::Node(target)) => target,
                    Some(ScopeValue::Object(object)) => self.add_node(ResolvedNode::Object(ResolvedObject {
                        value: object,
                        span: Some(set.ast.span.clone()),
                    })),
                    None => return Err(self.name_not_found(&set.name, &set.ast.span)),
                };
                let value = self.resolve(set.value)?;
                if let ResolvedNode::Set(node) = self.ctx.nodes.get_mut(location) {
                    node.target = Some(target);
                    node.value = value;
                }
                Ok(location)
            }

            ResolvedNode::Import(import) => {
                let source = self.resolve(import.source)?;
                if let ResolvedNode::Import(node) = self.ctx.nodes.get_mut(location) {
                    node.source = source;
                }
                Ok(location)
            }

            ResolvedNode::Export(export) => {
                if let Some(source) = export.source {
                    let resolved = self.resolve(source)?;
                    if let ResolvedNode::Export(node) = self.ctx.nodes.get_mut(location) {
                        node.source = Some(resolved);
                    }
                }
                if let crate::resolved::ResolvedExportItems::Declaration(declaration) = export.items {
                    self.resolve(declaration)?;
                }
                Ok(location)
            }

            ResolvedNode::Typeclass(typeclass) => {
                self.in_scope(typeclass.scope, |resolver| {
                    for item in typeclass.items.iter() {
                        resolver.resolve(*item)?;
                    }
                    Ok::<_, ZsError>(())
                })?;
                Ok(location)
            }

            ResolvedNode::TypeclassImpl(implementation) => {
                let target = self
                    .ctx
                    .scopes
                    .lookup_name(self.current_scope, &implementation.name, true)
                    .cloned();
                match target {
                    Some(ScopeValue::Node(typeclass))
                        if matches!(self.ctx.nodes.get(typeclass), ResolvedNode::Typeclass(_)) =>
                    {
                        if let ResolvedNode::TypeclassImpl(node) = self.ctx.nodes.get_mut(location) {
                            node.typeclass = Some(typeclass);
                        }
                    }
                    _ => {
                        return Err(self.name_not_found(&implementation.name, &implementation.ast.span));
                    }
                }

                let implemented_type = self.resolve(implementation.implemented_type)?;
                if let ResolvedNode::TypeclassImpl(node) = self.ctx.nodes.get_mut(location) {
                    node.implemented_type = implemented_type;
                }
                self.in_scope(implementation.scope, |resolver| {
                    for item in implementation.items.iter() {
                        resolver.resolve(*item)?;
                    }
                    Ok::<_, ZsError>(())
                })?;
                Ok(location)
            }

            ResolvedNode::Assign(assign) => {
                let target = self.resolve(assign.target)?;
                let value = self.resolve(assign.value)?;
                if let ResolvedNode::Assign(node) = self.ctx.nodes.get_mut(location) {
                    node.target = target;
                    node.value = value;
                }
                Ok(location)
            }

            ResolvedNode::Binary(binary) => {
                let left = self.resolve(binary.left)?;
                let right = self.resolve(binary.right)?;
                if let ResolvedNode::Binary(node) = self.ctx.nodes.get_mut(location) {
                    node.left = left;
                    node.right = right;
                }
                Ok(location)
            }

            ResolvedNode::Unary(unary) => {
                let operand = self.resolve(unary.operand)?;
                if let ResolvedNode::Unary(node) = self.ctx.nodes.get_mut(location) {
                    node.operand = operand;
                }
                Ok(location)
            }

            ResolvedNode::Block(block) => {
                for (index, statement) in block.body.iter().enumerate() {
                    let resolved = self.resolve(*statement)?;
                    if let ResolvedNode::Block(node) = self.ctx.nodes.get_mut(location) {
                        node.body[index] = resolved;
                    }
                }
                Ok(location)
            }

            ResolvedNode::If(if_node) => {
                let condition = self.resolve(if_node.condition)?;
                let if_body = self.resolve(if_node.if_body)?;
                let else_body = match if_node.else_body {
                    Some(else_body) => Some(self.resolve(else_body)?),
                    None => None,
                };
                if let ResolvedNode::If(node) = self.ctx.nodes.get_mut(location) {
                    node.condition = condition;
                    node.if_body = if_body;
                    node.else_body = else_body;
                }
                Ok(location)
            }

            ResolvedNode::While(while_node) => {
                let condition = self.resolve(while_node.condition)?;
                if let ResolvedNode::While(node) = self.ctx.nodes.get_mut(location) {
                    node.condition = condition;
                }
                self.in_scope(while_node.scope, |resolver| {
                    let body = resolver.resolve(while_node.body)?;
                    let else_body = match while_node.else_body {
                        Some(else_body) => Some(resolver.resolve(else_body)?),
                        None => None,
                    };
                    if let ResolvedNode::While(node) = resolver.ctx.nodes.get_mut(location) {
                        node.body = body;
                        node.else_body = else_body;
                    }
                    Ok::<_, ZsError>(())
                })?;
                Ok(location)
            }

            ResolvedNode::When(when) => {
                let subject = self.resolve(when.subject)?;
                if let ResolvedNode::When(node) = self.ctx.nodes.get_mut(location) {
                    node.subject = subject;
                }
                for (index, (expression, body)) in when.cases.iter().enumerate() {
                    let expression = self.resolve(*expression)?;
                    let body = self.resolve(*body)?;
                    if let ResolvedNode::When(node) = self.ctx.nodes.get_mut(location) {
                        node.cases[index] = (expression, body);
                    }
                }
                if let Some(else_body) = when.else_body {
                    let resolved = self.resolve(else_body)?;
                    if let ResolvedNode::When(node) = self.ctx.nodes.get_mut(location) {
                        node.else_body = Some(resolved);
                    }
                }
                Ok(location)
            }

            ResolvedNode::Return(return_node) => {
                if let Some(expression) = return_node.expression {
                    let resolved = self.resolve(expression)?;
                    if let ResolvedNode::Return(node) = self.ctx.nodes.get_mut(location) {
                        node.expression = Some(resolved);
                    }
                }
                Ok(location)
            }

            ResolvedNode::Call(call) => {
                let callable = self.resolve(call.callable)?;
                if let ResolvedNode::Call(node) = self.ctx.nodes.get_mut(location) {
                    node.callable = callable;
                }
                for (index, argument) in call.arguments.iter().enumerate() {
                    let resolved = self.resolve(*argument)?;
                    if let ResolvedNode::Call(node) = self.ctx.nodes.get_mut(location) {
                        node.arguments[index] = resolved;
                    }
                }
                for (index, (name, argument)) in call.keyword_arguments.iter().enumerate() {
                    let resolved = self.resolve(*argument)?;
                    if let ResolvedNode::Call(node) = self.ctx.nodes.get_mut(location) {
                        node.keyword_arguments[index] = (name.clone(), resolved);
                    }
                }
                Ok(location)
            }

            ResolvedNode::MemberAccess(access) => {
                let object = self.resolve(access.object)?;
                if let ResolvedNode::MemberAccess(node) = self.ctx.nodes.get_mut(location) {
                    node.object = object;
                }
                Ok(location)
            }

            ResolvedNode::ExpressionStatement(statement) => {
                // a name error inside an expression statement has already
                // been reported; the statement itself survives
                match self.resolve(statement.expression) {
                    Ok(expression) => {
                        if let ResolvedNode::ExpressionStatement(node) = self.ctx.nodes.get_mut(location) {
                            node.expression = expression;
                        }
                    }
                    Err(error) => {
                        self.ctx.state.error(Phase::Resolver, error);
                    }
                }
                Ok(location)
            }
        }
    }
}
