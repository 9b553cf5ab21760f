//! The expression and statement compiler.
//!
//! Produces VM instructions while maintaining the static type stack in
//! lockstep, so every emission is typechecked immediately. A stack of code
//! contexts tracks the surrounding loops (and `when` cases) for
//! `break`/`continue` targeting; the surrounding function, when there is
//! one, provides argument and local slots.

use crate::{
    builtins::{binary_operator_key, unary_operator_key},
    error::{NotCallable, OperatorNotDefined, OverloadMatch, ZsError},
    objects::{
        overloading::{match_callable, Argument, OverloadMatchResult},
        types::{assignable_to, type_list_name, type_name},
        MemberResult, Object, ObjectLocation, TypeValue, Value,
    },
    resolved::{NodeLocation, ResolvedCall, ResolvedNode},
    span::{Span, SpanInfo},
    vm::{Instruction, TypeStack},
};

use super::NodeCompiler;

/// Loop and `when`-case tracking for `break`/`continue`.
#[derive(Debug)]
pub(crate) enum CodeContext {
    Loop {
        label: Option<String>,
        continue_target: usize,
        break_patches: Vec<usize>,
    },
    WhenCase {
        label: Option<String>,
        /// `continue` jumps here: patched to the next case's body
        continue_patches: Vec<usize>,
    },
}

/// The mutable state of one code compilation: the instruction stream under
/// construction, its type stack, contexts and collected return types.
#[derive(Debug, Default)]
pub(crate) struct CodeState {
    pub instructions: Vec<Instruction>,
    pub spans: Vec<(usize, SpanInfo)>,
    pub type_stack: TypeStack,
    pub contexts: Vec<CodeContext>,
    /// The surrounding function object and node, if compiling a body
    pub current_function: Option<(ObjectLocation, NodeLocation)>,
    pub return_types: Vec<(TypeValue, NodeLocation)>,
    /// Hidden local slots allocated past the declared locals
    pub hidden_locals: usize,
}

impl CodeState {
    pub fn top_level() -> Self {
        Self::default()
    }

    pub fn function(function: ObjectLocation, node: NodeLocation) -> Self {
        Self {
            current_function: Some((function, node)),
            ..Self::default()
        }
    }

    fn emit(&mut self, instruction: Instruction, span: Option<&Span>) -> usize {
        let index = self.instructions.len();
        self.instructions.push(instruction);
        if let Some(span) = span {
            self.spans.push((index, span.into()));
        }
        index
    }

    fn patch(&mut self, at: usize, target: usize) {
        match &mut self.instructions[at] {
            Instruction::Jump(slot) | Instruction::JumpIfFalse(slot) => *slot = target,
            other => panic!("patched instruction is not a jump: {other:?}"),
        }
    }

    fn here(&self) -> usize {
        self.instructions.len()
    }
}

impl NodeCompiler<'_> {
    fn isolated_state(&self, state: &CodeState) -> CodeState {
        CodeState {
            current_function: state.current_function,
            hidden_locals: state.hidden_locals,
            ..CodeState::default()
        }
    }

    /// Compiles an expression: emits instructions with a net effect of one
    /// pushed value.
    pub(crate) fn compile_expression(&mut self, state: &mut CodeState, node: NodeLocation) -> Result<(), ZsError> {
        let span = self.node_span(node);
        match self.ctx.nodes.get(node).clone() {
            ResolvedNode::Object(object) => {
                state.emit(Instruction::LoadObject(object.value.clone()), span.as_ref());
                state.type_stack.push_value(&self.ctx.objects, &object.value);
                Ok(())
            }

            // a type reference needs only the declaration, so the skeleton
            // from the construct stage is enough to load
            ResolvedNode::Class(_) | ResolvedNode::Typeclass(_) => {
                let object = self
                    .construct(node)?
                    .ok_or_else(|| self.error_at(node, "declaration has no object"))?;
                let value = Value::Object(object);
                state.emit(Instruction::LoadObject(value.clone()), span.as_ref());
                state.type_stack.push_value(&self.ctx.objects, &value);
                Ok(())
            }

            ResolvedNode::Module(_) => {
                let object = self
                    .require_definition(node)?
                    .ok_or_else(|| self.error_at(node, "module has no object"))?;
                let value = Value::Object(object);
                state.emit(Instruction::LoadObject(value.clone()), span.as_ref());
                state.type_stack.push_value(&self.ctx.objects, &value);
                Ok(())
            }

            ResolvedNode::Function(_) => {
                let object = self
                    .require_definition(node)?
                    .ok_or_else(|| self.error_at(node, "function has no object"))?;
                // an anonymous function used as a value needs its body too
                self.require_function_bodies(node)?;
                let value = Value::Object(object);
                state.emit(Instruction::LoadObject(value.clone()), span.as_ref());
                state.type_stack.push_value(&self.ctx.objects, &value);
                Ok(())
            }

            // a group reference needs only the overload signatures; bodies
            // follow in build order
            ResolvedNode::OverloadGroup(_) => {
                let object = self
                    .require_definition(node)?
                    .ok_or_else(|| self.error_at(node, "group has no object"))?;
                let value = Value::Object(object);
                state.emit(Instruction::LoadObject(value.clone()), span.as_ref());
                state.type_stack.push_value(&self.ctx.objects, &value);
                Ok(())
            }

            ResolvedNode::GenericParameter(_) => {
                let object = self.construct_generic_parameter(node)?;
                let value = Value::Object(object);
                state.emit(Instruction::LoadObject(value.clone()), span.as_ref());
                state.type_stack.push_value(&self.ctx.objects, &value);
                Ok(())
            }

            ResolvedNode::Var(_) => {
                match self.ctx.compiler_cache.get(node).map(|object| self.ctx.objects.get(object).clone()) {
                    Some(Object::Local(local)) => {
                        state.emit(Instruction::LoadLocal(local.index), span.as_ref());
                        state.type_stack.push_type(local.target_type.clone());
                        Ok(())
                    }
                    _ => {
                        // a top-level compile-time binding
                        self.require_definition(node)?;
                        let value = self
                            .ctx
                            .compiler_cache
                            .value(node)
                            .cloned()
                            .ok_or_else(|| self.error_at(node, "binding has no value"))?;
                        state.emit(Instruction::LoadObject(value.clone()), span.as_ref());
                        state.type_stack.push_value(&self.ctx.objects, &value);
                        Ok(())
                    }
                }
            }

            ResolvedNode::Parameter(_) => {
                if state.current_function.is_none() {
                    return Err(self.error_at(node, "parameters are only usable inside a function body"));
                }
                let parameter = self
                    .ctx
                    .compiler_cache
                    .get(node)
                    .ok_or_else(|| self.error_at(node, "parameter has no object"))?;
                let index = self
                    .ctx
                    .objects
                    .parameter(parameter)
                    .map(|parameter| parameter.index)
                    .ok_or_else(|| self.error_at(node, "parameter object is malformed"))?;
                state.emit(Instruction::LoadArgument(index), span.as_ref());
                state.type_stack.push_argument(&self.ctx.objects, parameter);
                Ok(())
            }

            ResolvedNode::ImportedName(_) => {
                self.require_definition(node)?;
                let value = self
                    .ctx
                    .compiler_cache
                    .value(node)
                    .cloned()
                    .ok_or_else(|| self.error_at(node, "imported name has no value"))?;
                state.emit(Instruction::LoadObject(value.clone()), span.as_ref());
                state.type_stack.push_value(&self.ctx.objects, &value);
                Ok(())
            }

            ResolvedNode::Call(call) => self.compile_call(state, node, &call),

            ResolvedNode::MemberAccess(_) => self.compile_member_access(state, node),

            ResolvedNode::Binary(binary) => {
                let before = state.type_stack.size();
                self.compile_expression(state, binary.left)?;
                self.compile_expression(state, binary.right)?;
                if state.type_stack.size() < before + 2 {
                    return Err(self.error_at(node, "operand has no value"));
                }
                let operand_types = state.type_stack.top(2).to_vec();
                let key = binary_operator_key(&binary.operator);
                self.emit_operator_call(state, node, &key, &binary.operator, &operand_types, &binary.operator_span)
            }

            ResolvedNode::Unary(unary) => {
                let before = state.type_stack.size();
                self.compile_expression(state, unary.operand)?;
                if state.type_stack.size() < before + 1 {
                    return Err(self.error_at(node, "operand has no value"));
                }
                let operand_types = state.type_stack.top(1).to_vec();
                let key = unary_operator_key(&unary.operator);
                self.emit_operator_call(state, node, &key, &unary.operator, &operand_types, &unary.operator_span)
            }

            ResolvedNode::If(_) => Err(self.error_at(node, "'if' cannot be used in value position")),

            ResolvedNode::Identifier(identifier) => {
                Err(self.error_at(node, format!("unresolved identifier '{}'", identifier.name)))
            }

            other => Err(self.error_at(node, format!("{} is not a value expression", kind_name(&other)))),
        }
    }

    /// Compiles a statement: emits instructions with a net effect of zero.
    pub(crate) fn compile_statement(&mut self, state: &mut CodeState, node: NodeLocation) -> Result<(), ZsError> {
        let span = self.node_span(node);
        match self.ctx.nodes.get(node).clone() {
            ResolvedNode::Var(var) => {
                let local = self
                    .ctx
                    .compiler_cache
                    .get(node)
                    .ok_or_else(|| self.error_at(node, "'var' is only allowed inside a function body"))?;

                let declared = match var.var_type {
                    Some(type_node) => Some(self.evaluate_type(type_node)?),
                    None => None,
                };

                let index = match self.ctx.objects.local(local) {
                    Some(object) => object.index,
                    None => return Err(self.error_at(node, "'var' did not produce a local slot")),
                };

                match var.initializer {
                    Some(initializer) => {
                        self.compile_expression(state, initializer)?;
                        let initializer_type = state
                            .type_stack
                            .pop()
                            .ok_or_else(|| self.error_at(node, "initializer has no value"))?;
                        let target_type = match declared {
                            Some(declared) => {
                                if !assignable_to(&self.ctx.objects, &initializer_type, &declared) {
                                    return Err(self.types_do_not_match(node, &declared, &initializer_type));
                                }
                                declared
                            }
                            None => initializer_type,
                        };
                        if let Object::Local(local) = self.ctx.objects.get_mut(local) {
                            local.target_type = target_type;
                        }
                        state.emit(Instruction::SetLocal(index), span.as_ref());
                    }
                    None => {
                        let declared = declared.expect("checked when locals were collected");
                        if let Object::Local(local) = self.ctx.objects.get_mut(local) {
                            local.target_type = declared;
                        }
                    }
                }
                Ok(())
            }

            ResolvedNode::Assign(assign) => self.compile_store(state, node, assign.target, assign.value),

            ResolvedNode::Set(set) => {
                let target = set
                    .target
                    .ok_or_else(|| self.error_at(node, format!("'{}' is not bound", set.name)))?;
                self.compile_store(state, node, target, set.value)
            }

            ResolvedNode::Return(return_node) => {
                match return_node.expression {
                    Some(expression) => {
                        self.compile_expression(state, expression)?;
                        let return_type = state
                            .type_stack
                            .pop()
                            .ok_or_else(|| self.error_at(node, "return expression has no value"))?;
                        state.return_types.push((return_type, node));
                    }
                    None => {
                        state.return_types.push((TypeValue::Void, node));
                    }
                }
                state.emit(Instruction::Return, span.as_ref());
                Ok(())
            }

            ResolvedNode::If(if_node) => {
                self.compile_condition(state, if_node.condition)?;
                let to_else = state.emit(Instruction::JumpIfFalse(0), span.as_ref());
                state.type_stack.pop();

                self.compile_statement(state, if_node.if_body)?;

                match if_node.else_body {
                    Some(else_body) => {
                        let to_end = state.emit(Instruction::Jump(0), span.as_ref());
                        let else_start = state.here();
                        state.patch(to_else, else_start);
                        self.compile_statement(state, else_body)?;
                        let end = state.here();
                        state.patch(to_end, end);
                    }
                    None => {
                        let end = state.here();
                        state.patch(to_else, end);
                    }
                }
                Ok(())
            }

            ResolvedNode::While(while_node) => {
                let loop_start = state.here();
                self.compile_condition(state, while_node.condition)?;
                let exit_jump = state.emit(Instruction::JumpIfFalse(0), span.as_ref());
                state.type_stack.pop();

                state.contexts.push(CodeContext::Loop {
                    label: while_node.label.clone(),
                    continue_target: loop_start,
                    break_patches: Vec::new(),
                });
                let body_result = self.compile_statement(state, while_node.body);
                let context = state.contexts.pop();
                body_result?;

                state.emit(Instruction::Jump(loop_start), span.as_ref());
                let else_start = state.here();
                state.patch(exit_jump, else_start);

                if let Some(else_body) = while_node.else_body {
                    self.compile_statement(state, else_body)?;
                }

                // break lands immediately after the else block
                let end = state.here();
                if let Some(CodeContext::Loop { break_patches, .. }) = context {
                    for patch in break_patches {
                        state.patch(patch, end);
                    }
                }
                Ok(())
            }

            ResolvedNode::When(when) => self.compile_when(state, node, &when),

            ResolvedNode::Break(break_node) => {
                let jump = state.emit(Instruction::Jump(0), span.as_ref());
                let mut found = false;
                for context in state.contexts.iter_mut().rev() {
                    if let CodeContext::Loop { label, break_patches, .. } = context {
                        let matches = match &break_node.label {
                            Some(wanted) => label.as_ref() == Some(wanted),
                            None => true,
                        };
                        if matches {
                            break_patches.push(jump);
                            found = true;
                            break;
                        }
                    }
                }
                if !found {
                    return Err(self.error_at(node, "'break' outside of a matching loop"));
                }
                Ok(())
            }

            ResolvedNode::Continue(continue_node) => {
                let mut action: Option<Result<usize, ()>> = None;
                for context in state.contexts.iter_mut().rev() {
                    match context {
                        CodeContext::Loop { label, continue_target, .. } => {
                            let matches = match &continue_node.label {
                                Some(wanted) => label.as_ref() == Some(wanted),
                                None => true,
                            };
                            if matches {
                                action = Some(Ok(*continue_target));
                                break;
                            }
                        }
                        CodeContext::WhenCase { label, .. } => {
                            let matches = match &continue_node.label {
                                Some(wanted) => label.as_ref() == Some(wanted),
                                None => true,
                            };
                            if matches {
                                action = Some(Err(()));
                                break;
                            }
                        }
                    }
                }
                match action {
                    Some(Ok(target)) => {
                        state.emit(Instruction::Jump(target), span.as_ref());
                        Ok(())
                    }
                    Some(Err(())) => {
                        // fall through to the next case's body
                        let jump = state.emit(Instruction::Jump(0), span.as_ref());
                        for context in state.contexts.iter_mut().rev() {
                            if let CodeContext::WhenCase { continue_patches, .. } = context {
                                continue_patches.push(jump);
                                break;
                            }
                        }
                        Ok(())
                    }
                    None => Err(self.error_at(node, "'continue' outside of a matching loop or case")),
                }
            }

            ResolvedNode::Block(block) => {
                for statement in block.body.iter() {
                    self.compile_statement(state, *statement)?;
                }
                Ok(())
            }

            ResolvedNode::ExpressionStatement(statement) => {
                match self.ctx.nodes.get(statement.expression) {
                    ResolvedNode::Assign(_) | ResolvedNode::Set(_) => {
                        self.compile_statement(state, statement.expression)
                    }
                    _ => {
                        let before = state.type_stack.size();
                        self.compile_expression(state, statement.expression)?;
                        // discard the value
                        if state.type_stack.size() > before {
                            state.type_stack.pop();
                            state.emit(Instruction::Pop, span.as_ref());
                        }
                        Ok(())
                    }
                }
            }

            // declarations inside a body define themselves and emit nothing
            ResolvedNode::Function(_) | ResolvedNode::Class(_) | ResolvedNode::OverloadGroup(_) => {
                self.require_definition(node)?;
                self.require_function_bodies(node)?;
                Ok(())
            }

            ResolvedNode::Import(_) | ResolvedNode::Export(_) => {
                Err(self.error_at(node, "imports and exports are only allowed at the top level"))
            }

            _ => {
                let before = state.type_stack.size();
                self.compile_expression(state, node)?;
                if state.type_stack.size() > before {
                    state.type_stack.pop();
                    state.emit(Instruction::Pop, span.as_ref());
                }
                Ok(())
            }
        }
    }

    /// `when` lowering: the subject lands in a hidden local; every case is
    /// an equality test; `continue` inside a case falls through into the
    /// next case's body.
    fn compile_when(
        &mut self,
        state: &mut CodeState,
        node: NodeLocation,
        when: &crate::resolved::ResolvedWhen,
    ) -> Result<(), ZsError> {
        let span = self.node_span(node);

        let base_locals = state
            .current_function
            .and_then(|(function, _)| self.ctx.objects.function(function))
            .and_then(|function| function.body.as_ref())
            .map(|body| body.locals.len())
            .unwrap_or(0);
        let subject_slot = base_locals + state.hidden_locals;
        state.hidden_locals += 1;

        self.compile_expression(state, when.subject)?;
        let subject_type = state
            .type_stack
            .pop()
            .ok_or_else(|| self.error_at(node, "'when' subject has no value"))?;
        state.emit(Instruction::SetLocal(subject_slot), span.as_ref());

        let equality_key = binary_operator_key("==");

        let mut pending_exit: Option<usize> = None;
        let mut pending_continues: Vec<usize> = Vec::new();
        let mut end_jumps: Vec<usize> = Vec::new();

        for (case_expression, case_body) in when.cases.iter() {
            // previous case's failed test lands on this test
            if let Some(exit) = pending_exit.take() {
                let test_start = state.here();
                state.patch(exit, test_start);
            }

            state.emit(Instruction::LoadLocal(subject_slot), span.as_ref());
            let before = state.type_stack.size();
            state.type_stack.push_type(subject_type.clone());
            self.compile_expression(state, *case_expression)?;
            if state.type_stack.size() < before + 2 {
                return Err(self.error_at(*case_expression, "case expression has no value"));
            }
            let operand_types = state.type_stack.top(2).to_vec();
            let operator_span = self
                .node_span(*case_expression)
                .unwrap_or_else(|| span.clone().expect("when nodes have spans"));
            self.emit_operator_call(state, node, &equality_key, "==", &operand_types, &operator_span)?;

            let exit = state.emit(Instruction::JumpIfFalse(0), span.as_ref());
            state.type_stack.pop();
            pending_exit = Some(exit);

            // a continue from the previous case falls through to this body
            let body_start = state.here();
            for patch in pending_continues.drain(..) {
                state.patch(patch, body_start);
            }

            state.contexts.push(CodeContext::WhenCase {
                label: when.label.clone(),
                continue_patches: Vec::new(),
            });
            let body_result = self.compile_statement(state, *case_body);
            let context = state.contexts.pop();
            body_result?;
            if let Some(CodeContext::WhenCase { continue_patches, .. }) = context {
                pending_continues = continue_patches;
            }

            end_jumps.push(state.emit(Instruction::Jump(0), span.as_ref()));
        }

        // no case matched, or the last case continued
        let else_start = state.here();
        if let Some(exit) = pending_exit.take() {
            state.patch(exit, else_start);
        }
        for patch in pending_continues.drain(..) {
            state.patch(patch, else_start);
        }
        if let Some(else_body) = when.else_body {
            self.compile_statement(state, else_body)?;
        }

        let end = state.here();
        for jump in end_jumps {
            state.patch(jump, end);
        }
        Ok(())
    }

    /// Assignment lowering: looks up the pattern for the target and emits
    /// the matching store.
    fn compile_store(
        &mut self,
        state: &mut CodeState,
        node: NodeLocation,
        target: NodeLocation,
        value: NodeLocation,
    ) -> Result<(), ZsError> {
        let span = self.node_span(node);
        match self.ctx.nodes.get(target).clone() {
            ResolvedNode::Var(_) => {
                let local = self
                    .ctx
                    .compiler_cache
                    .get(target)
                    .and_then(|object| self.ctx.objects.local(object).cloned());
                match local {
                    Some(local) => {
                        self.compile_expression(state, value)?;
                        let value_type = state
                            .type_stack
                            .pop()
                            .ok_or_else(|| self.error_at(node, "assigned expression has no value"))?;
                        if !assignable_to(&self.ctx.objects, &value_type, &local.target_type) {
                            return Err(self.types_do_not_match(node, &local.target_type, &value_type));
                        }
                        state.emit(Instruction::SetLocal(local.index), span.as_ref());
                        Ok(())
                    }
                    None => Err(self.error_at(node, "cannot assign to a compile-time binding")),
                }
            }
            ResolvedNode::Parameter(_) => Err(self.error_at(node, "cannot assign to a parameter")),
            ResolvedNode::MemberAccess(_) => {
                Err(self.error_at(node, "field assignment is not supported"))
            }
            _ => Err(self.error_at(node, "invalid assignment target")),
        }
    }

    /// Compiles a condition and coerces it to `Bool`, looking up a `->bool`
    /// conversion when the static type is something else.
    fn compile_condition(&mut self, state: &mut CodeState, node: NodeLocation) -> Result<(), ZsError> {
        self.compile_expression(state, node)?;
        let condition_type = state
            .type_stack
            .peek()
            .cloned()
            .ok_or_else(|| self.error_at(node, "condition has no value"))?;
        if condition_type == TypeValue::Bool {
            return Ok(());
        }

        let conversion_key = unary_operator_key("->bool");
        if self.ctx.operators.contains_key(&conversion_key) {
            let span = self.node_span(node).expect("conditions have spans");
            let operand_types = state.type_stack.top(1).to_vec();
            if self
                .emit_operator_call(state, node, &conversion_key, "->bool", &operand_types, &span)
                .is_ok()
            {
                return Ok(());
            }
        }

        Err(self.types_do_not_match(node, &TypeValue::Bool, &condition_type))
    }

    /// Looks up an operator group in the registry, matches the operand
    /// types and emits the call. Operands are already on the stack.
    fn emit_operator_call(
        &mut self,
        state: &mut CodeState,
        node: NodeLocation,
        registry_key: &str,
        operator: &str,
        operand_types: &[TypeValue],
        operator_span: &Span,
    ) -> Result<(), ZsError> {
        let group = match self.ctx.operators.get(registry_key) {
            Some(group) => *group,
            None => {
                return Err(self.operator_not_defined(operator, operand_types, operator_span));
            }
        };

        let arguments: Vec<Argument> = operand_types
            .iter()
            .map(|ty| Argument { instructions: Vec::new(), ty: ty.clone() })
            .collect();

        let result = crate::objects::overloading::match_group(&self.ctx.objects, group, &arguments, &[], None)
            .map_err(|_| self.operator_not_defined(operator, operand_types, operator_span))?;

        state
            .type_stack
            .apply_signature(&self.ctx.objects, result.callee)
            .map_err(|message| self.error_at(node, message))?;
        state.emit(Instruction::Call(result.callee), Some(operator_span));
        Ok(())
    }

    fn operator_not_defined(&self, operator: &str, operand_types: &[TypeValue], span: &Span) -> ZsError {
        ZsError::OperatorNotDefined(
            OperatorNotDefined {
                operator: operator.to_string(),
                operand_types: type_list_name(&self.ctx.objects, operand_types),
                position: span.position.clone().into(),
                code: (&span.file).into(),
            }
            .into(),
        )
    }

    /// Member access in value position.
    fn compile_member_access(&mut self, state: &mut CodeState, node: NodeLocation) -> Result<(), ZsError> {
        let access = match self.ctx.nodes.get(node).clone() {
            ResolvedNode::MemberAccess(access) => access,
            _ => unreachable!(),
        };
        let span = self.node_span(node);

        let mut receiver = self.isolated_state(state);
        self.compile_expression(&mut receiver, access.object)?;
        let receiver_type = receiver
            .type_stack
            .peek()
            .cloned()
            .ok_or_else(|| self.error_at(node, "member access target has no value"))?;

        match receiver_type {
            TypeValue::Class(class) | TypeValue::GenericInstance(class) => {
                let member = self
                    .ctx
                    .objects
                    .get_member(class, &access.member)
                    .ok_or_else(|| self.name_not_found_at(&access.member, &access.member_span))?;
                match member {
                    MemberResult::Field(field) => {
                        let field_type = self.substituted_field_type(class, field);
                        let offset = state.instructions.len();
                        state.instructions.extend(receiver.instructions);
                        state
                            .spans
                            .extend(receiver.spans.into_iter().map(|(index, span)| (index + offset, span)));
                        state.emit(Instruction::LoadField(field), span.as_ref());
                        state.type_stack.push_type(field_type);
                        Ok(())
                    }
                    MemberResult::MethodGroup(_) => {
                        Err(self.error_at(node, "a bound method must be called"))
                    }
                    MemberResult::Value(value) => {
                        // static member: the receiver instructions are
                        // discarded
                        state.emit(Instruction::LoadObject(value.clone()), span.as_ref());
                        state.type_stack.push_value(&self.ctx.objects, &value);
                        Ok(())
                    }
                }
            }
            TypeValue::Module(module) => {
                let value = self
                    .ctx
                    .objects
                    .module(module)
                    .and_then(|module| module.get_name(&access.member))
                    .cloned()
                    .ok_or_else(|| self.name_not_found_at(&access.member, &access.member_span))?;
                state.emit(Instruction::LoadObject(value.clone()), span.as_ref());
                state.type_stack.push_value(&self.ctx.objects, &value);
                Ok(())
            }
            TypeValue::Type => {
                // static access through a type value known at compile time
                let target = self
                    .evaluate(access.object)?
                    .and_then(|value| value.as_type(&self.ctx.objects));
                match target {
                    Some(TypeValue::Class(class)) | Some(TypeValue::GenericInstance(class)) => {
                        let member = self
                            .ctx
                            .objects
                            .get_member(class, &access.member)
                            .ok_or_else(|| self.name_not_found_at(&access.member, &access.member_span))?;
                        match member {
                            MemberResult::Value(value) => {
                                state.emit(Instruction::LoadObject(value.clone()), span.as_ref());
                                state.type_stack.push_value(&self.ctx.objects, &value);
                                Ok(())
                            }
                            MemberResult::Field(_) => {
                                Err(self.error_at(node, "an instance field requires an instance"))
                            }
                            MemberResult::MethodGroup(_) => {
                                Err(self.error_at(node, "an instance method requires an instance"))
                            }
                        }
                    }
                    _ => Err(self.error_at(node, "this type does not expose members")),
                }
            }
            other => Err(self.error_at(
                node,
                format!(
                    "type '{}' does not implement the scope protocol",
                    type_name(&self.ctx.objects, &other)
                ),
            )),
        }
    }

    /// Compiles one argument into its own instruction row.
    fn compile_argument(&mut self, state: &CodeState, node: NodeLocation) -> Result<Argument, ZsError> {
        let mut isolated = self.isolated_state(state);
        self.compile_expression(&mut isolated, node)?;
        let ty = isolated
            .type_stack
            .peek()
            .cloned()
            .ok_or_else(|| self.error_at(node, "argument has no value"))?;
        Ok(Argument { instructions: isolated.instructions, ty })
    }

    /// Call-site compilation: dispatches through the callable protocol by
    /// the bracket used and the compile-time callee.
    fn compile_call(&mut self, state: &mut CodeState, node: NodeLocation, call: &ResolvedCall) -> Result<(), ZsError> {
        // instance method calls go through the bound-member path
        if let ResolvedNode::MemberAccess(access) = self.ctx.nodes.get(call.callable).clone() {
            let mut receiver = self.isolated_state(state);
            self.compile_expression(&mut receiver, access.object)?;
            let receiver_type = receiver
                .type_stack
                .peek()
                .cloned()
                .ok_or_else(|| self.error_at(node, "call target has no value"))?;
            if let TypeValue::Class(class) | TypeValue::GenericInstance(class) = receiver_type.clone() {
                if let Some(MemberResult::MethodGroup(methods)) =
                    self.ctx.objects.get_member(class, &access.member)
                {
                    if call.bracket != crate::ast::CallBracket::Curvy {
                        return Err(self.invalid_call_operator(node, call, &receiver_type));
                    }
                    let receiver_argument = Argument {
                        instructions: receiver.instructions,
                        ty: receiver_type,
                    };
                    return self.emit_candidates_call(
                        state,
                        node,
                        call,
                        &access.member,
                        &methods,
                        Some(receiver_argument),
                        CallKind::Invoke,
                    );
                }
            }
        }

        // otherwise the callee must be known at compile time
        let callee = self
            .evaluate(call.callable)?
            .ok_or_else(|| self.error_at(node, "callable expression has no value"))?;

        match callee {
            Value::Object(location) => match self.ctx.objects.get(location).clone() {
                Object::OverloadGroup(group) => {
                    if call.bracket != crate::ast::CallBracket::Curvy {
                        return Err(self.invalid_call_operator(node, call, &TypeValue::Group(location)));
                    }
                    let mut candidates = Vec::new();
                    let mut current = Some(location);
                    while let Some(group_location) = current {
                        match self.ctx.objects.group(group_location) {
                            Some(group) => {
                                candidates.extend(group.overloads.iter().copied());
                                current = group.parent;
                            }
                            None => break,
                        }
                    }
                    // strict matching stays within the group itself
                    let own: Vec<ObjectLocation> =
                        self.ctx.objects.group(location).map(|g| g.overloads.clone()).unwrap_or_default();
                    self.emit_group_call(state, node, call, &group.name, &own, &candidates)
                }
                Object::Function(_) | Object::Method(_) | Object::NativeFunction(_) => {
                    if call.bracket != crate::ast::CallBracket::Curvy {
                        let ty = Value::Object(location).runtime_type(&self.ctx.objects);
                        return Err(self.invalid_call_operator(node, call, &ty));
                    }
                    let name = self.ctx.objects.display_name(location);
                    self.emit_candidates_call(state, node, call, &name, &[location], None, CallKind::Invoke)
                }
                Object::Class(_) => self.compile_class_call(state, node, call, location),
                Object::GenericInstance(_) => self.compile_class_call(state, node, call, location),
                _ => Err(self.not_callable(node, call, &Value::Object(location))),
            },
            Value::Type(TypeValue::Class(class)) => self.compile_class_call(state, node, call, class),
            Value::Type(TypeValue::GenericInstance(instance)) => {
                self.compile_class_call(state, node, call, instance)
            }
            other => Err(self.not_callable(node, call, &other)),
        }
    }

    /// Class call sites: `()` invokes the constructor overload set, `[]`
    /// instantiates the generics with the argument values.
    fn compile_class_call(
        &mut self,
        state: &mut CodeState,
        node: NodeLocation,
        call: &ResolvedCall,
        class: ObjectLocation,
    ) -> Result<(), ZsError> {
        let span = self.node_span(node);
        match call.bracket {
            crate::ast::CallBracket::Square => {
                if !call.keyword_arguments.is_empty() {
                    return Err(self.error_at(node, "generic arguments cannot be named"));
                }
                let mut arguments = Vec::new();
                for argument in call.arguments.iter() {
                    arguments.push(self.evaluate_type(*argument)?);
                }
                let instance = self.instantiate_generic(node, class, arguments)?;
                let value = Value::Object(instance);
                state.emit(Instruction::LoadObject(value.clone()), span.as_ref());
                state.type_stack.push_value(&self.ctx.objects, &value);
                Ok(())
            }
            crate::ast::CallBracket::Curvy => {
                let constructors = match self.ctx.objects.get(class) {
                    Object::Class(compiled) => compiled.constructors.clone(),
                    Object::GenericInstance(instance) => self
                        .ctx
                        .objects
                        .class(instance.origin)
                        .map(|origin| origin.constructors.clone())
                        .unwrap_or_default(),
                    _ => Vec::new(),
                };

                if constructors.is_empty() {
                    if !call.arguments.is_empty() || !call.keyword_arguments.is_empty() {
                        return Err(self.error_at(node, "this class has no constructor taking arguments"));
                    }
                    state.emit(Instruction::CreateInstance(class), span.as_ref());
                    let created = match self.ctx.objects.get(class) {
                        Object::GenericInstance(_) => TypeValue::GenericInstance(class),
                        _ => TypeValue::Class(class),
                    };
                    state.type_stack.push_type(created);
                    return Ok(());
                }

                let name = self.ctx.objects.display_name(class);
                let receiver = Argument {
                    instructions: Vec::new(),
                    ty: match self.ctx.objects.get(class) {
                        Object::GenericInstance(_) => TypeValue::GenericInstance(class),
                        _ => TypeValue::Class(class),
                    },
                };
                self.emit_candidates_call(
                    state,
                    node,
                    call,
                    &name,
                    &constructors,
                    Some(receiver),
                    CallKind::Construct(class),
                )
            }
            crate::ast::CallBracket::Curly => {
                Err(self.error_at(node, "the curly call operator is not defined for classes"))
            }
        }
    }

    /// Group call with distinct strict candidates (the group's own
    /// overloads) and permissive candidates (parents included).
    fn emit_group_call(
        &mut self,
        state: &mut CodeState,
        node: NodeLocation,
        call: &ResolvedCall,
        group_name: &str,
        strict_candidates: &[ObjectLocation],
        permissive_candidates: &[ObjectLocation],
    ) -> Result<(), ZsError> {
        let arguments = self.compile_call_arguments(state, call)?;
        let keyword_arguments = self.compile_call_keyword_arguments(state, call)?;

        let result = self
            .match_candidate_passes(strict_candidates, permissive_candidates, &arguments, &keyword_arguments)
            .map_err(|matches| self.overload_match_error(node, group_name, &arguments, matches))?;

        self.emit_match(state, node, result, CallKind::Invoke)
    }

    /// Candidate-list call used for methods, constructors and direct
    /// function references.
    #[allow(clippy::too_many_arguments)]
    fn emit_candidates_call(
        &mut self,
        state: &mut CodeState,
        node: NodeLocation,
        call: &ResolvedCall,
        name: &str,
        candidates: &[ObjectLocation],
        receiver: Option<Argument>,
        kind: CallKind,
    ) -> Result<(), ZsError> {
        let mut arguments = Vec::new();
        if let Some(receiver) = receiver {
            arguments.push(receiver);
        }
        arguments.extend(self.compile_call_arguments(state, call)?);
        let keyword_arguments = self.compile_call_keyword_arguments(state, call)?;

        let result = self
            .match_candidate_passes(candidates, candidates, &arguments, &keyword_arguments)
            .map_err(|matches| self.overload_match_error(node, name, &arguments, matches))?;

        self.emit_match(state, node, result, kind)
    }

    fn compile_call_arguments(&mut self, state: &CodeState, call: &ResolvedCall) -> Result<Vec<Argument>, ZsError> {
        let mut arguments = Vec::new();
        for argument in call.arguments.iter() {
            arguments.push(self.compile_argument(state, *argument)?);
        }
        Ok(arguments)
    }

    fn compile_call_keyword_arguments(
        &mut self,
        state: &CodeState,
        call: &ResolvedCall,
    ) -> Result<Vec<(String, Argument)>, ZsError> {
        let mut keyword_arguments = Vec::new();
        for (name, argument) in call.keyword_arguments.iter() {
            keyword_arguments.push((name.clone(), self.compile_argument(state, *argument)?));
        }
        Ok(keyword_arguments)
    }

    /// Strict pass over `strict_candidates`, then a permissive pass over
    /// `permissive_candidates`. Exactly one match is required.
    fn match_candidate_passes(
        &self,
        strict_candidates: &[ObjectLocation],
        permissive_candidates: &[ObjectLocation],
        arguments: &[Argument],
        keyword_arguments: &[(String, Argument)],
    ) -> Result<OverloadMatchResult, usize> {
        let strict: Vec<OverloadMatchResult> = strict_candidates
            .iter()
            .filter_map(|candidate| {
                match_callable(&self.ctx.objects, *candidate, arguments, keyword_arguments, true, None)
            })
            .collect();
        if strict.len() == 1 {
            return Ok(strict.into_iter().next().unwrap());
        }
        if strict.len() > 1 {
            return Err(strict.len());
        }

        let permissive: Vec<OverloadMatchResult> = permissive_candidates
            .iter()
            .filter_map(|candidate| {
                match_callable(&self.ctx.objects, *candidate, arguments, keyword_arguments, false, None)
            })
            .collect();
        if permissive.len() == 1 {
            Ok(permissive.into_iter().next().unwrap())
        } else {
            Err(permissive.len())
        }
    }

    /// Emits a matched call: every argument row in signature order, then
    /// the call instruction, with the matching type-stack effect.
    fn emit_match(
        &mut self,
        state: &mut CodeState,
        node: NodeLocation,
        result: OverloadMatchResult,
        kind: CallKind,
    ) -> Result<(), ZsError> {
        let span = self.node_span(node);

        match kind {
            CallKind::Invoke => {
                for argument in result.arguments.iter() {
                    state.instructions.extend(argument.instructions.iter().cloned());
                    state.type_stack.push_type(argument.ty.clone());
                }
                state
                    .type_stack
                    .apply_signature(&self.ctx.objects, result.callee)
                    .map_err(|message| self.error_at(node, message))?;
                state.emit(Instruction::Call(result.callee), span.as_ref());
            }
            CallKind::Construct(class) => {
                // the first matched argument is the receiver slot the
                // CreateInstance instruction provides itself
                for argument in result.arguments.iter().skip(1) {
                    state.instructions.extend(argument.instructions.iter().cloned());
                    state.type_stack.push_type(argument.ty.clone());
                }
                for _ in 1..result.arguments.len() {
                    state.type_stack.pop();
                }
                state.emit(Instruction::CreateInstance(result.callee), span.as_ref());
                let created = match self.ctx.objects.get(class) {
                    Object::GenericInstance(_) => TypeValue::GenericInstance(class),
                    _ => TypeValue::Class(class),
                };
                state.type_stack.push_type(created);
            }
        }
        Ok(())
    }

    // region diagnostics

    fn overload_match_error(
        &self,
        node: NodeLocation,
        group: &str,
        arguments: &[Argument],
        matches: usize,
    ) -> ZsError {
        let span = self.node_span(node).expect("call sites have spans");
        let types: Vec<TypeValue> = arguments.iter().map(|argument| argument.ty.clone()).collect();
        ZsError::OverloadMatch(
            OverloadMatch {
                group: group.to_string(),
                argument_types: type_list_name(&self.ctx.objects, &types),
                matches,
                position: span.position.clone().into(),
                code: (&span.file).into(),
            }
            .into(),
        )
    }

    fn not_callable(&self, node: NodeLocation, call: &ResolvedCall, value: &Value) -> ZsError {
        let span = self.node_span(node).expect("call sites have spans");
        ZsError::NotCallable(
            NotCallable {
                type_name: type_name(&self.ctx.objects, &value.runtime_type(&self.ctx.objects)),
                operator: call.bracket.as_str().to_string(),
                position: span.position.clone().into(),
                code: (&span.file).into(),
            }
            .into(),
        )
    }

    fn invalid_call_operator(&self, node: NodeLocation, call: &ResolvedCall, ty: &TypeValue) -> ZsError {
        let span = self.node_span(node).expect("call sites have spans");
        ZsError::NotCallable(
            NotCallable {
                type_name: type_name(&self.ctx.objects, ty),
                operator: call.bracket.as_str().to_string(),
                position: span.position.clone().into(),
                code: (&span.file).into(),
            }
            .into(),
        )
    }

    fn name_not_found_at(&self, name: &str, span: &Span) -> ZsError {
        ZsError::NameNotFound(
            crate::error::NameNotFound {
                name: name.to_string(),
                position: span.position.clone().into(),
                code: (&span.file).into(),
                advice: None,
            }
            .into(),
        )
    }

    // endregion
}

#[derive(Debug, Copy, Clone)]
enum CallKind {
    Invoke,
    Construct(ObjectLocation),
}

fn kind_name(node: &ResolvedNode) -> &'static str {
    match node {
        ResolvedNode::Module(_) => "a module",
        ResolvedNode::Import(_) => "an import",
        ResolvedNode::Export(_) => "an export",
        ResolvedNode::While(_) => "a loop",
        ResolvedNode::When(_) => "a 'when'",
        ResolvedNode::Return(_) => "a return",
        ResolvedNode::Break(_) => "a break",
        ResolvedNode::Continue(_) => "a continue",
        ResolvedNode::Block(_) => "a block",
        ResolvedNode::Assign(_) => "an assignment",
        ResolvedNode::Set(_) => "a 'set' statement",
        _ => "this construct",
    }
}
