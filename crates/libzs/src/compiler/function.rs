//! Function and method compilation.
//!
//! Construct creates the skeleton: parameter objects, the local slots
//! extracted from `var` statements in the body, and the (still empty)
//! instruction list. Define evaluates the signature expressions, compiles
//! the body and infers the return type when it was not annotated.

use crate::{
    error::{AmbiguousReturn, ZsError},
    objects::{
        types::{assignable_to, type_list_name, type_name},
        Binding, Function, FunctionBody, FunctionSignature, Local, Method, Object, ObjectLocation,
        Parameter, TypeValue,
    },
    resolved::{NodeLocation, ResolvedFunction, ResolvedNode},
};

use super::{CodeState, NodeCompiler};

impl NodeCompiler<'_> {
    pub(crate) fn construct_function(
        &mut self,
        node: NodeLocation,
        function: &ResolvedFunction,
        owner: Option<ObjectLocation>,
    ) -> Result<ObjectLocation, ZsError> {
        let mut index = 0usize;
        let mut make_parameter = |compiler: &mut Self, parameter_node: NodeLocation| {
            let name = compiler
                .ctx
                .nodes
                .get(parameter_node)
                .name()
                .unwrap_or("<parameter>")
                .to_string();
            let object = compiler
                .ctx
                .objects
                .add(Object::Parameter(Parameter::new(name, index)));
            index += 1;
            compiler.ctx.compiler_cache.insert(parameter_node, object);
            object
        };

        let mut positional = Vec::new();
        for parameter in function.positional_parameters.iter() {
            positional.push(make_parameter(self, *parameter));
        }
        let mut named = Vec::new();
        for parameter in function.named_parameters.iter() {
            named.push(make_parameter(self, *parameter));
        }
        let variadic_positional = function
            .variadic_positional_parameter
            .map(|parameter| make_parameter(self, parameter));
        let variadic_named = function
            .variadic_named_parameter
            .map(|parameter| make_parameter(self, parameter));

        // vars in the body become local slots up front, so forward stores
        // inside nested blocks see stable indices
        let body = match function.body {
            Some(body_node) => {
                let statements = match self.ctx.nodes.get(body_node) {
                    ResolvedNode::FunctionBody(body) => body.instructions.clone().unwrap_or_default(),
                    _ => Vec::new(),
                };
                let mut locals = Vec::new();
                for statement in statements.iter() {
                    self.collect_locals(*statement, &mut locals)?;
                }
                Some(FunctionBody { instructions: Vec::new(), locals })
            }
            None => None,
        };

        let mut compiled = Function::new(function.name.clone());
        compiled.signature = FunctionSignature {
            positional_parameters: positional,
            named_parameters: named,
            variadic_positional_parameter: variadic_positional,
            variadic_named_parameter: variadic_named,
            return_type: TypeValue::Any,
        };
        compiled.body = body;

        let object = match owner.or_else(|| {
            function
                .owner_class
                .and_then(|class_node| self.ctx.compiler_cache.get(class_node))
        }) {
            Some(owner) => self.ctx.objects.add(Object::Method(Method {
                function: compiled,
                binding: Binding::Instance,
                owner,
            })),
            None => self.ctx.objects.add(Object::Function(compiled)),
        };

        self.ctx.compiler_cache.insert(node, object);
        if let Some(body_node) = function.body {
            self.ctx.compiler_cache.insert(body_node, object);
        }
        Ok(object)
    }

    /// Walks a body statement tree collecting `var` declarations into local
    /// slots. Nested functions keep their own locals.
    fn collect_locals(&mut self, node: NodeLocation, locals: &mut Vec<ObjectLocation>) -> Result<(), ZsError> {
        match self.ctx.nodes.get(node).clone() {
            ResolvedNode::Var(var) => {
                if var.var_type.is_none() && var.initializer.is_none() {
                    return Err(self.error_at(node, "'var' requires a type or an initializer"));
                }
                let local = self.ctx.objects.add(Object::Local(Local {
                    name: var.name.clone(),
                    target_type: TypeValue::Any,
                    index: locals.len(),
                }));
                self.ctx.compiler_cache.insert(node, local);
                locals.push(local);
            }
            ResolvedNode::Block(block) => {
                for statement in block.body.iter() {
                    self.collect_locals(*statement, locals)?;
                }
            }
            ResolvedNode::If(if_node) => {
                self.collect_locals(if_node.if_body, locals)?;
                if let Some(else_body) = if_node.else_body {
                    self.collect_locals(else_body, locals)?;
                }
            }
            ResolvedNode::While(while_node) => {
                self.collect_locals(while_node.body, locals)?;
                if let Some(else_body) = while_node.else_body {
                    self.collect_locals(else_body, locals)?;
                }
            }
            ResolvedNode::When(when) => {
                for (_, body) in when.cases.iter() {
                    self.collect_locals(*body, locals)?;
                }
                if let Some(else_body) = when.else_body {
                    self.collect_locals(else_body, locals)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Function definition is the *signature* half of the declare/define
    /// split: parameter types, defaults and the declared return type. The
    /// body compiles as its own node, so mutually recursive functions can
    /// each see the other's finished signature first.
    pub(crate) fn define_function(
        &mut self,
        node: NodeLocation,
        function: &ResolvedFunction,
        object: Option<ObjectLocation>,
    ) -> Result<(), ZsError> {
        let location = object.expect("functions always construct an object");

        for generic in function.generic_parameters.iter() {
            let parameter = self.construct_generic_parameter(*generic)?;
            if let Some(compiled) = self.ctx.objects.function_mut(location) {
                compiled.generic_parameters.push(parameter);
            }
        }

        // signature context: parameter types, defaults, return type
        let all_parameters: Vec<NodeLocation> = function
            .positional_parameters
            .iter()
            .chain(function.named_parameters.iter())
            .chain(function.variadic_positional_parameter.iter())
            .chain(function.variadic_named_parameter.iter())
            .copied()
            .collect();

        for parameter_node in all_parameters {
            let (type_node, initializer) = match self.ctx.nodes.get(parameter_node) {
                ResolvedNode::Parameter(parameter) => (parameter.parameter_type, parameter.initializer),
                _ => continue,
            };

            let parameter_type = match type_node {
                Some(type_node) => self.evaluate_type(type_node)?,
                None => TypeValue::Any,
            };

            let default_value = match initializer {
                Some(initializer) => {
                    let mut state = CodeState::top_level();
                    self.compile_expression(&mut state, initializer)?;
                    let default_type = state.type_stack.peek().cloned().unwrap_or(TypeValue::Any);
                    if !matches!(parameter_type, TypeValue::GenericParameter(_))
                        && !assignable_to(&self.ctx.objects, &default_type, &parameter_type)
                    {
                        return Err(self.types_do_not_match(parameter_node, &parameter_type, &default_type));
                    }
                    Some(state.instructions)
                }
                None => None,
            };

            let parameter_object = self
                .ctx
                .compiler_cache
                .get(parameter_node)
                .expect("parameters are cached at construct");
            if let Object::Parameter(parameter) = self.ctx.objects.get_mut(parameter_object) {
                parameter.parameter_type = parameter_type;
                parameter.default_value = default_value;
            }
        }

        let declared_return = match function.return_type {
            Some(return_type) => Some(self.evaluate_type(return_type)?),
            None => None,
        };
        // unannotated signatures keep Any until the body's return-type
        // analysis replaces it
        if let Some(declared) = &declared_return {
            if let Some(compiled) = self.ctx.objects.function_mut(location) {
                compiled.signature.return_type = declared.clone();
            }
        }

        Ok(())
    }

    /// The body half of the split: compile every statement to instructions
    /// and reconcile the return types.
    pub(crate) fn define_function_body(&mut self, body_node: NodeLocation) -> Result<(), ZsError> {
        let function_node = match self.ctx.nodes.get(body_node) {
            ResolvedNode::FunctionBody(body) => body.function,
            _ => return Ok(()),
        };
        let function = match self.ctx.nodes.get(function_node).clone() {
            ResolvedNode::Function(function) => function,
            _ => return Ok(()),
        };
        let location = self
            .require_definition(function_node)?
            .expect("functions always construct an object");

        let statements = match self.ctx.nodes.get(body_node) {
            ResolvedNode::FunctionBody(body) => body.instructions.clone().unwrap_or_default(),
            _ => Vec::new(),
        };

        let mut state = CodeState::function(location, function_node);
        for statement in statements.iter() {
            self.compile_statement(&mut state, *statement)?;
        }

        let return_types = state.return_types.clone();
        let instructions = std::mem::take(&mut state.instructions);
        for (index, span) in state.spans.iter() {
            self.ctx.debug.record(location, *index, span.clone());
        }
        if let Some(compiled) = self.ctx.objects.function_mut(location) {
            if let Some(body) = compiled.body.as_mut() {
                body.instructions = instructions;
            }
        }

        let declared_return = match function.return_type {
            Some(_) => Some(
                self.ctx
                    .objects
                    .function(location)
                    .map(|compiled| compiled.signature.return_type.clone())
                    .unwrap_or(TypeValue::Any),
            ),
            None => None,
        };

        match declared_return {
            Some(declared) => {
                if declared != TypeValue::Void && return_types.is_empty() {
                    return Err(self.error_at(function_node, "a non-void function must return a value"));
                }
                for (return_type, return_node) in return_types.iter() {
                    if declared == TypeValue::Void {
                        if *return_type != TypeValue::Void {
                            return Err(self.types_do_not_match(*return_node, &TypeValue::Void, return_type));
                        }
                    } else if *return_type == TypeValue::Void {
                        return Err(self.error_at(
                            *return_node,
                            "empty return from a non-void function",
                        ));
                    } else if !assignable_to(&self.ctx.objects, return_type, &declared) {
                        return Err(self.types_do_not_match(*return_node, &declared, return_type));
                    }
                }
            }
            None => {
                // return-type inference: every return must agree
                let mut distinct: Vec<TypeValue> = Vec::new();
                for (return_type, _) in return_types.iter() {
                    if !distinct.contains(return_type) {
                        distinct.push(return_type.clone());
                    }
                }
                let inferred = match distinct.len() {
                    0 => TypeValue::Void,
                    1 => distinct.into_iter().next().unwrap(),
                    _ => {
                        let span = self
                            .node_span(function_node)
                            .expect("functions have source spans");
                        return Err(ZsError::AmbiguousReturn(
                            AmbiguousReturn {
                                types: type_list_name(&self.ctx.objects, &distinct),
                                position: span.position.clone().into(),
                                code: (&span.file).into(),
                            }
                            .into(),
                        ));
                    }
                };
                log::debug!(
                    "inferred return type {} for '{}'",
                    type_name(&self.ctx.objects, &inferred),
                    function.name.as_deref().unwrap_or("<anonymous>")
                );
                if let Some(compiled) = self.ctx.objects.function_mut(location) {
                    compiled.signature.return_type = inferred;
                }
            }
        }

        Ok(())
    }

    /// Requests body definitions for every function reachable from a
    /// top-level node. Signatures define on demand; bodies define here, in
    /// build order, after the whole declaration surface is available.
    pub(crate) fn require_function_bodies(&mut self, node: NodeLocation) -> Result<(), ZsError> {
        match self.ctx.nodes.get(node).clone() {
            ResolvedNode::Function(function) => {
                if let Some(body) = function.body {
                    self.require_definition(body)?;
                }
            }
            ResolvedNode::Module(module) => {
                for item in module.items.iter() {
                    self.require_function_bodies(*item)?;
                }
            }
            ResolvedNode::Class(class) => {
                for item in class.items.iter() {
                    self.require_function_bodies(*item)?;
                }
            }
            ResolvedNode::OverloadGroup(group) => {
                for overload in group.overloads.iter() {
                    self.require_function_bodies(*overload)?;
                }
            }
            ResolvedNode::Typeclass(typeclass) => {
                for item in typeclass.items.iter() {
                    self.require_function_bodies(*item)?;
                }
            }
            ResolvedNode::TypeclassImpl(implementation) => {
                for item in implementation.items.iter() {
                    self.require_function_bodies(*item)?;
                }
            }
            ResolvedNode::Export(export) => {
                if let crate::resolved::ResolvedExportItems::Declaration(declaration) = export.items {
                    self.require_function_bodies(declaration)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}
