//! The compiler: resolved nodes to objects and instructions.
//!
//! Every node goes through two stages. *Construct* allocates the target
//! object (module, class, function, ...) and caches it keyed by the resolved
//! node, so mutually recursive declarations can reference each other.
//! *Define* fills the object in: evaluates signature expressions through the
//! VM, compiles bodies to instructions and runs overload resolution.
//! `require_definition` is the demand-driven entry: it returns the cached
//! object, running the define stage first if it has not happened yet.

use crate::{
    context::CompilationContext,
    error::{CodeCompilation, ZsError},
    objects::{ObjectLocation, Value},
    resolved::{NodeLocation, ResolvedNode},
    span::Span,
    vm::Interpreter,
};

use indexmap::IndexSet;

mod class;
mod code;
mod function;
mod module;

pub(crate) use code::CodeState;

/// The compiler for one compilation unit. Construction and definition
/// results accumulate in the context's compiler cache, shared across
/// documents of the unit.
pub struct NodeCompiler<'ctx> {
    pub(crate) ctx: &'ctx mut CompilationContext,
    pub(crate) interpreter: Interpreter,
    /// Nodes whose define stage is currently on the call stack
    defining: IndexSet<NodeLocation>,
}

impl<'ctx> NodeCompiler<'ctx> {
    pub fn new(ctx: &'ctx mut CompilationContext) -> Self {
        Self {
            ctx,
            interpreter: Interpreter::new(),
            defining: IndexSet::new(),
        }
    }

    /// Compiles a list of top-level nodes: construct everything first so
    /// later definitions can reference earlier declarations freely, then
    /// define in the given order.
    pub fn compile_all(&mut self, nodes: &[NodeLocation]) -> Result<Vec<ObjectLocation>, ZsError> {
        for node in nodes.iter() {
            self.construct(*node)?;
        }
        let mut result = Vec::new();
        for node in nodes.iter() {
            if let Some(object) = self.require_definition(*node)? {
                result.push(object);
            }
            // bodies compile after the signature surface of the whole
            // equivalence class exists
            self.require_function_bodies(*node)?;
        }
        Ok(result)
    }

    /// Returns the node's object, running its define stage if needed.
    pub fn require_definition(&mut self, node: NodeLocation) -> Result<Option<ObjectLocation>, ZsError> {
        let object = self.construct(node)?;
        if self.ctx.compiler_cache.is_defined(node) {
            return Ok(object);
        }
        if !self.defining.insert(node) {
            return Err(self.error_at(node, "definition depends on itself"));
        }

        let result = self.define(node, object);
        self.defining.swap_remove(&node);
        result?;

        self.ctx.compiler_cache.mark_defined(node);
        Ok(self.ctx.compiler_cache.get(node).or(object))
    }

    /// The construct stage: allocate and cache the skeleton object.
    pub fn construct(&mut self, node: NodeLocation) -> Result<Option<ObjectLocation>, ZsError> {
        if let Some(cached) = self.ctx.compiler_cache.get(node) {
            return Ok(Some(cached));
        }

        let constructed = match self.ctx.nodes.get(node).clone() {
            ResolvedNode::Module(module) => Some(self.construct_module(node, &module)?),
            ResolvedNode::Class(class) => Some(self.construct_class(node, &class)?),
            ResolvedNode::Function(function) => Some(self.construct_function(node, &function, None)?),
            ResolvedNode::FunctionBody(body) => {
                self.construct(body.function)?;
                self.ctx.compiler_cache.get(node)
            }
            ResolvedNode::OverloadGroup(group) => Some(self.construct_group(node, &group)?),
            ResolvedNode::Typeclass(typeclass) => Some(self.construct_typeclass(node, &typeclass)?),

            // value-level and directive nodes have no skeleton object
            ResolvedNode::Var(_)
            | ResolvedNode::Import(_)
            | ResolvedNode::ImportedName(_)
            | ResolvedNode::Export(_)
            | ResolvedNode::TypeclassImpl(_)
            | ResolvedNode::Set(_)
            | ResolvedNode::Object(_)
            | ResolvedNode::ExpressionStatement(_) => None,

            other => {
                return Err(self.error_at(
                    node,
                    format!("node of this kind may not appear on the top level: {other:?}"),
                ))
            }
        };

        if let Some(object) = constructed {
            self.ctx.compiler_cache.insert(node, object);
        }
        Ok(constructed)
    }

    /// The define stage dispatch.
    fn define(&mut self, node: NodeLocation, object: Option<ObjectLocation>) -> Result<(), ZsError> {
        match self.ctx.nodes.get(node).clone() {
            // members define themselves
            ResolvedNode::Module(module) => self.define_module(node, &module, object),
            ResolvedNode::Class(class) => self.define_class(node, &class, object),
            ResolvedNode::Function(function) => self.define_function(node, &function, object),
            ResolvedNode::FunctionBody(_) => self.define_function_body(node),
            ResolvedNode::OverloadGroup(group) => self.define_group(node, &group, object),
            ResolvedNode::Typeclass(typeclass) => self.define_typeclass(node, &typeclass, object),
            ResolvedNode::TypeclassImpl(implementation) => {
                self.define_typeclass_impl(node, &implementation)
            }
            ResolvedNode::Var(var) => self.define_top_level_var(node, &var),
            ResolvedNode::Import(import) => self.define_import(node, &import),
            ResolvedNode::ImportedName(imported) => {
                // defining an imported name defines its whole import
                self.require_definition(imported.import)?;
                Ok(())
            }
            ResolvedNode::Export(export) => self.define_export(node, &export),
            ResolvedNode::Set(set) => self.define_top_level_set(node, &set),
            ResolvedNode::Object(_) => Ok(()),
            ResolvedNode::ExpressionStatement(statement) => {
                // top-level expression statements run for their effects
                self.evaluate(statement.expression)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Evaluates an expression node at compile time: compiles it to
    /// instructions and runs the VM over them.
    pub fn evaluate(&mut self, node: NodeLocation) -> Result<Option<Value>, ZsError> {
        let mut state = CodeState::top_level();
        self.compile_expression(&mut state, node)?;
        let instructions = state.instructions;
        self.interpreter
            .run(&self.ctx.objects, &instructions)
            .map(|mut context| context.pop(None))
            .map_err(|error| self.error_at(node, error.message))
    }

    /// Evaluates an expression that must denote a type.
    pub(crate) fn evaluate_type(&mut self, node: NodeLocation) -> Result<crate::objects::TypeValue, ZsError> {
        // a generic parameter in type position stands for itself
        if let ResolvedNode::GenericParameter(_) = self.ctx.nodes.get(node) {
            let object = self.construct_generic_parameter(node)?;
            return Ok(crate::objects::TypeValue::GenericParameter(object));
        }

        let value = self.evaluate(node)?;
        value
            .as_ref()
            .and_then(|value| value.as_type(&self.ctx.objects))
            .ok_or_else(|| self.error_at(node, "expression does not denote a type"))
    }

    pub(crate) fn construct_generic_parameter(&mut self, node: NodeLocation) -> Result<ObjectLocation, ZsError> {
        if let Some(cached) = self.ctx.compiler_cache.get(node) {
            return Ok(cached);
        }
        let name = match self.ctx.nodes.get(node) {
            ResolvedNode::GenericParameter(parameter) => parameter.name.clone(),
            _ => return Err(self.error_at(node, "expected a generic parameter")),
        };
        let object = self
            .ctx
            .objects
            .add(crate::objects::Object::GenericParameter(crate::objects::GenericParameter { name }));
        self.ctx.compiler_cache.insert(node, object);
        Ok(object)
    }

    // region helpers

    pub(crate) fn node_span(&self, node: NodeLocation) -> Option<Span> {
        self.ctx.nodes.get(node).span()
    }

    pub(crate) fn error_at(&self, node: NodeLocation, message: impl Into<String>) -> ZsError {
        let span = self.node_span(node);
        let (position, code) = match span {
            Some(span) => (span.position.clone(), (&span.file).into()),
            None => (0..0, crate::file::SourceFile::new(vec!["<unknown>".into()], String::new()).into()),
        };
        ZsError::CodeCompilation(
            CodeCompilation {
                message: message.into(),
                position: position.into(),
                code,
            }
            .into(),
        )
    }

    // endregion
}
