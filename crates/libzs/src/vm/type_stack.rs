//! The static type stack.
//!
//! Code generation maintains this stack in lockstep with the instructions it
//! emits: every instruction has a corresponding stack effect, so the code
//! compiler typechecks as it goes instead of in a separate pass. The same
//! effects drive [`simulate_function`], which re-walks a finished body to
//! collect return types (for inference) and to check the final stack against
//! the declared return type.

use crate::objects::{
    types::{assignable_to, type_name},
    Object, ObjectArena, ObjectLocation, TypeValue, Value,
};

use super::Instruction;

/// The compile-time mirror of the VM value stack.
#[derive(Debug, Default, Clone)]
pub struct TypeStack {
    stack: Vec<TypeValue>,
}

impl TypeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> usize {
        self.stack.len()
    }

    pub fn push_type(&mut self, value: TypeValue) {
        self.stack.push(value);
    }

    pub fn push_value(&mut self, arena: &ObjectArena, value: &Value) {
        self.stack.push(value.runtime_type(arena));
    }

    pub fn push_argument(&mut self, arena: &ObjectArena, parameter: ObjectLocation) {
        let parameter_type = arena
            .parameter(parameter)
            .map(|parameter| parameter.parameter_type.clone())
            .unwrap_or(TypeValue::Any);
        self.stack.push(parameter_type);
    }

    pub fn push_field(&mut self, arena: &ObjectArena, field: ObjectLocation) {
        let field_type = arena
            .field(field)
            .map(|field| field.field_type.clone())
            .unwrap_or(TypeValue::Any);
        self.stack.push(field_type);
    }

    pub fn pop(&mut self) -> Option<TypeValue> {
        self.stack.pop()
    }

    /// The `n` topmost types, bottom-to-top order.
    pub fn top(&self, n: usize) -> &[TypeValue] {
        &self.stack[self.stack.len() - n..]
    }

    pub fn peek(&self) -> Option<&TypeValue> {
        self.stack.last()
    }

    /// Swaps in a new stack state and returns the previous one.
    pub fn reset(&mut self, state: Vec<TypeValue>) -> Vec<TypeValue> {
        std::mem::replace(&mut self.stack, state)
    }

    /// Applies a callable's signature: pops one type per parameter slot,
    /// checking assignability, then pushes the return type unless it is
    /// `Void`. On a mismatch the stack is restored and an error returned.
    pub fn apply_signature(&mut self, arena: &ObjectArena, callee: ObjectLocation) -> Result<(), String> {
        let (parameter_types, return_type) = signature_types(arena, callee)
            .ok_or_else(|| format!("'{}' is not callable", arena.display_name(callee)))?;

        if self.stack.len() < parameter_types.len() {
            return Err("not enough values on the stack for this call".to_string());
        }

        let mut cache = Vec::new();
        for parameter_type in parameter_types.iter().rev() {
            let top = self.stack.pop().expect("length checked above");
            cache.push(top.clone());

            let matches = matches!(parameter_type, TypeValue::GenericParameter(_))
                || assignable_to(arena, &top, parameter_type);
            if !matches {
                // restore and report
                for value in cache.into_iter().rev() {
                    self.stack.push(value);
                }
                return Err(format!(
                    "'{}' is not assignable to parameter type '{}'",
                    type_name(arena, &top),
                    type_name(arena, parameter_type)
                ));
            }
        }

        if return_type != TypeValue::Void {
            self.stack.push(return_type);
        }
        Ok(())
    }
}

/// Parameter slot types and return type of a callable object.
pub fn signature_types(arena: &ObjectArena, callee: ObjectLocation) -> Option<(Vec<TypeValue>, TypeValue)> {
    match arena.get(callee) {
        Object::Function(function) | Object::Method(crate::objects::Method { function, .. }) => {
            let mut parameters = Vec::new();
            for parameter in function
                .signature
                .positional_parameters
                .iter()
                .chain(function.signature.named_parameters.iter())
            {
                parameters.push(
                    arena
                        .parameter(*parameter)
                        .map(|parameter| parameter.parameter_type.clone())
                        .unwrap_or(TypeValue::Any),
                );
            }
            Some((parameters, function.signature.return_type.clone()))
        }
        Object::NativeFunction(native) => {
            Some((native.parameter_types.clone(), native.return_type.clone()))
        }
        _ => None,
    }
}

/// Applies one instruction's stack effect.
///
/// `function` provides the surrounding frame context for argument and local
/// slots; pass `None` for top-level code.
pub fn apply_instruction(
    arena: &ObjectArena,
    stack: &mut TypeStack,
    instruction: &Instruction,
    function: Option<ObjectLocation>,
) -> Result<(), String> {
    match instruction {
        Instruction::LoadObject(value) => {
            stack.push_value(arena, value);
            Ok(())
        }
        Instruction::LoadArgument(index) => {
            let parameter_type = function
                .and_then(|function| arena.function(function))
                .and_then(|function| {
                    function
                        .signature
                        .positional_parameters
                        .iter()
                        .chain(function.signature.named_parameters.iter())
                        .nth(*index)
                        .copied()
                })
                .and_then(|parameter| arena.parameter(parameter))
                .map(|parameter| parameter.parameter_type.clone())
                .unwrap_or(TypeValue::Any);
            stack.push_type(parameter_type);
            Ok(())
        }
        Instruction::LoadLocal(index) => {
            let local_type = function
                .and_then(|function| arena.function(function))
                .and_then(|function| function.body.as_ref())
                .and_then(|body| body.locals.get(*index).copied())
                .and_then(|local| arena.local(local))
                .map(|local| local.target_type.clone())
                .unwrap_or(TypeValue::Any);
            stack.push_type(local_type);
            Ok(())
        }
        Instruction::SetLocal(_) => {
            stack.pop().ok_or_else(|| "stack underflow in SetLocal".to_string())?;
            Ok(())
        }
        Instruction::LoadField(field) => {
            stack.pop().ok_or_else(|| "stack underflow in LoadField".to_string())?;
            stack.push_field(arena, *field);
            Ok(())
        }
        Instruction::Call(callee) => stack.apply_signature(arena, *callee),
        Instruction::CreateInstance(target) => {
            match arena.get(*target) {
                Object::Class(_) => {
                    stack.push_type(TypeValue::Class(*target));
                    Ok(())
                }
                Object::GenericInstance(_) => {
                    stack.push_type(TypeValue::GenericInstance(*target));
                    Ok(())
                }
                Object::Method(method) => {
                    let signature = &method.function.signature;
                    let explicit = (signature.positional_parameters.len()
                        + signature.named_parameters.len())
                    .saturating_sub(1);
                    for _ in 0..explicit {
                        stack.pop().ok_or_else(|| "stack underflow in CreateInstance".to_string())?;
                    }
                    stack.push_type(TypeValue::Class(method.owner));
                    Ok(())
                }
                _ => Err("CreateInstance target cannot be instantiated".to_string()),
            }
        }
        Instruction::Return => Ok(()),
        Instruction::Jump(_) | Instruction::NoOperation => Ok(()),
        Instruction::JumpIfFalse(_) => {
            stack.pop().ok_or_else(|| "stack underflow in JumpIfFalse".to_string())?;
            Ok(())
        }
        Instruction::Pop => {
            stack.pop().ok_or_else(|| "stack underflow in Pop".to_string())?;
            Ok(())
        }
    }
}

/// Linear simulation of a function body.
///
/// Collects the stack-top type at every `Return` (for return-type inference)
/// and yields the final stack so callers can check it against the declared
/// return type. Code after a `Return` stays in the walk but returns already
/// recorded are unaffected; the analyzer deliberately ignores
/// unreachability.
pub fn simulate_function(
    arena: &ObjectArena,
    function: ObjectLocation,
) -> Result<(Vec<TypeValue>, Vec<TypeValue>), String> {
    let body = arena
        .function(function)
        .and_then(|f| f.body.as_ref())
        .ok_or_else(|| "function has no body".to_string())?;

    let mut stack = TypeStack::new();
    let mut return_types = Vec::new();

    for instruction in body.instructions.iter() {
        if let Instruction::Return = instruction {
            match stack.pop() {
                Some(top) => return_types.push(top),
                None => return_types.push(TypeValue::Void),
            }
            continue;
        }
        apply_instruction(arena, &mut stack, instruction, Some(function))?;
    }

    Ok((return_types, stack.reset(Vec::new())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{Function, FunctionBody, FunctionSignature, IntKind, Parameter};

    fn int32() -> TypeValue {
        TypeValue::Int(IntKind::I32)
    }

    #[test]
    fn apply_signature_checks_and_pushes_return() {
        let mut arena = ObjectArena::new();
        let mut parameter = Parameter::new("x", 0);
        parameter.parameter_type = int32();
        let parameter = arena.add(Object::Parameter(parameter));

        let mut function = Function::new(Some("f".into()));
        function.signature = FunctionSignature {
            positional_parameters: vec![parameter],
            return_type: TypeValue::String,
            ..Default::default()
        };
        let function = arena.add(Object::Function(function));

        let mut stack = TypeStack::new();
        stack.push_type(int32());
        stack.apply_signature(&arena, function).unwrap();
        assert_eq!(stack.peek(), Some(&TypeValue::String));

        // a mismatch restores the stack
        let mut stack = TypeStack::new();
        stack.push_type(TypeValue::Bool);
        assert!(stack.apply_signature(&arena, function).is_err());
        assert_eq!(stack.peek(), Some(&TypeValue::Bool));
    }

    #[test]
    fn simulation_collects_return_types() {
        let mut arena = ObjectArena::new();
        let mut function = Function::new(Some("f".into()));
        function.signature.return_type = int32();
        function.body = Some(FunctionBody {
            instructions: vec![
                Instruction::LoadObject(Value::I32(1)),
                Instruction::Return,
            ],
            locals: vec![],
        });
        let function = arena.add(Object::Function(function));

        let (returns, final_stack) = simulate_function(&arena, function).unwrap();
        assert_eq!(returns, vec![int32()]);
        assert!(final_stack.is_empty());
    }

    #[test]
    fn empty_return_simulates_as_void() {
        let mut arena = ObjectArena::new();
        let mut function = Function::new(Some("f".into()));
        function.body = Some(FunctionBody {
            instructions: vec![Instruction::Return],
            locals: vec![],
        });
        let function = arena.add(Object::Function(function));

        let (returns, _) = simulate_function(&arena, function).unwrap();
        assert_eq!(returns, vec![TypeValue::Void]);
    }
}
