//! The stack virtual machine used as the compiler's evaluation engine.
//!
//! The instruction set is closed and small; new language features lower to
//! existing instructions. Execution is single-threaded, synchronous and
//! reentrant: the compiler may invoke the interpreter while compiling a body
//! that itself calls compile-time functions which invoke it again.

use std::{cell::RefCell, rc::Rc};

use crate::objects::{Instance, Object, ObjectArena, ObjectLocation, Value};

pub mod type_stack;

pub use type_stack::TypeStack;

/// One VM instruction. Jump targets are instruction indices.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Push a compile-time value
    LoadObject(Value),
    /// Push the argument in the given slot
    LoadArgument(usize),
    /// Push the local in the given slot
    LoadLocal(usize),
    /// Pop into the local in the given slot
    SetLocal(usize),
    /// Pop an instance, push the field's value
    LoadField(ObjectLocation),
    /// Pop the callee's arguments, invoke, push the result if any
    Call(ObjectLocation),
    /// Allocate an instance, run the constructor over it, push the instance
    CreateInstance(ObjectLocation),
    /// Leave the current frame with the stack top as result
    Return,
    Jump(usize),
    /// Pop a Bool; jump when it is false
    JumpIfFalse(usize),
    NoOperation,
    Pop,
}

/// Execution failure inside the VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmError {
    pub message: String,
}

impl VmError {
    fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl std::fmt::Display for VmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// A call frame: argument slots and local slots.
#[derive(Debug, Default)]
struct Frame {
    arguments: Vec<Value>,
    locals: Vec<Value>,
}

/// The result of a finished run; `pop` yields the last value.
#[derive(Debug)]
pub struct ExecutionContext {
    stack: Vec<Value>,
}

impl ExecutionContext {
    /// Pops the result value, or returns `default` when the stack is empty.
    pub fn pop(&mut self, default: Option<Value>) -> Option<Value> {
        self.stack.pop().or(default)
    }
}

const MAX_CALL_DEPTH: usize = 512;

/// The interpreter. Stateless between runs; all state lives on the frames
/// and stacks of one `run`.
#[derive(Debug, Default)]
pub struct Interpreter;

impl Interpreter {
    pub fn new() -> Self {
        Self
    }

    /// Runs a top-level instruction sequence and returns its final stack.
    pub fn run(&self, arena: &ObjectArena, instructions: &[Instruction]) -> Result<ExecutionContext, VmError> {
        let mut frame = Frame::default();
        let mut stack = Vec::new();
        self.execute(arena, instructions, &mut frame, &mut stack, 0)?;
        Ok(ExecutionContext { stack })
    }

    /// Invokes a callable with already-evaluated arguments.
    pub fn call(
        &self,
        arena: &ObjectArena,
        callee: ObjectLocation,
        arguments: Vec<Value>,
        depth: usize,
    ) -> Result<Option<Value>, VmError> {
        if depth > MAX_CALL_DEPTH {
            return Err(VmError::new("call depth exceeded"));
        }

        match arena.get(callee) {
            Object::Function(function) | Object::Method(crate::objects::Method { function, .. }) => {
                let body = function
                    .body
                    .as_ref()
                    .ok_or_else(|| VmError::new(format!("'{}' has no body", function.display_name())))?;

                let mut frame = Frame {
                    arguments,
                    locals: vec![Value::Null; body.locals.len()],
                };
                let mut stack = Vec::new();
                let flow = self.execute(arena, &body.instructions, &mut frame, &mut stack, depth + 1)?;
                match flow {
                    Flow::Returned(value) => Ok(value),
                    Flow::Finished => Ok(None),
                }
            }
            Object::NativeFunction(native) => {
                let result = (native.handler)(&arguments).map_err(VmError::new)?;
                if native.return_type == crate::objects::TypeValue::Void {
                    Ok(None)
                } else {
                    Ok(Some(result))
                }
            }
            _ => Err(VmError::new(format!("'{}' is not callable", arena.display_name(callee)))),
        }
    }

    fn execute(
        &self,
        arena: &ObjectArena,
        instructions: &[Instruction],
        frame: &mut Frame,
        stack: &mut Vec<Value>,
        depth: usize,
    ) -> Result<Flow, VmError> {
        let mut counter = 0usize;

        while counter < instructions.len() {
            match &instructions[counter] {
                Instruction::LoadObject(value) => stack.push(value.clone()),
                Instruction::LoadArgument(index) => {
                    let value = frame
                        .arguments
                        .get(*index)
                        .cloned()
                        .ok_or_else(|| VmError::new(format!("argument slot {index} out of range")))?;
                    stack.push(value);
                }
                Instruction::LoadLocal(index) => {
                    let value = frame
                        .locals
                        .get(*index)
                        .cloned()
                        .ok_or_else(|| VmError::new(format!("local slot {index} out of range")))?;
                    stack.push(value);
                }
                Instruction::SetLocal(index) => {
                    let value = stack.pop().ok_or_else(|| VmError::new("stack underflow in SetLocal"))?;
                    if frame.locals.len() <= *index {
                        frame.locals.resize(*index + 1, Value::Null);
                    }
                    frame.locals[*index] = value;
                }
                Instruction::LoadField(field_location) => {
                    let field = arena
                        .field(*field_location)
                        .ok_or_else(|| VmError::new("LoadField target is not a field"))?;
                    let value = stack.pop().ok_or_else(|| VmError::new("stack underflow in LoadField"))?;
                    match value {
                        Value::Instance(instance) => {
                            let instance = instance.borrow();
                            let value = instance
                                .fields
                                .get(field.index)
                                .cloned()
                                .ok_or_else(|| VmError::new(format!("field slot {} out of range", field.index)))?;
                            stack.push(value);
                        }
                        other => {
                            return Err(VmError::new(format!(
                                "cannot load field '{}' from non-instance value '{}'",
                                field.name,
                                other.display(arena)
                            )))
                        }
                    }
                }
                Instruction::Call(callee) => {
                    let arity = callable_arity(arena, *callee)
                        .ok_or_else(|| VmError::new(format!("'{}' is not callable", arena.display_name(*callee))))?;
                    if stack.len() < arity {
                        return Err(VmError::new("stack underflow in Call"));
                    }
                    let arguments = stack.split_off(stack.len() - arity);
                    if let Some(value) = self.call(arena, *callee, arguments, depth)? {
                        stack.push(value);
                    }
                }
                Instruction::CreateInstance(target) => {
                    let instance = self.create_instance(arena, *target, stack, depth)?;
                    stack.push(instance);
                }
                Instruction::Return => {
                    return Ok(Flow::Returned(stack.pop()));
                }
                Instruction::Jump(target) => {
                    counter = *target;
                    continue;
                }
                Instruction::JumpIfFalse(target) => {
                    let condition = stack.pop().ok_or_else(|| VmError::new("stack underflow in JumpIfFalse"))?;
                    match condition.is_truthy() {
                        Some(true) => {}
                        Some(false) => {
                            counter = *target;
                            continue;
                        }
                        None => {
                            return Err(VmError::new(format!(
                                "condition is not a Bool: '{}'",
                                condition.display(arena)
                            )))
                        }
                    }
                }
                Instruction::NoOperation => {}
                Instruction::Pop => {
                    stack.pop().ok_or_else(|| VmError::new("stack underflow in Pop"))?;
                }
            }
            counter += 1;
        }

        Ok(Flow::Finished)
    }

    fn create_instance(
        &self,
        arena: &ObjectArena,
        target: ObjectLocation,
        stack: &mut Vec<Value>,
        depth: usize,
    ) -> Result<Value, VmError> {
        match arena.get(target) {
            // default construction of a class without a constructor call
            Object::Class(class) => Ok(Value::Instance(Rc::new(RefCell::new(Instance {
                class: target,
                fields: vec![Value::Null; class.fields.len()],
            })))),
            Object::GenericInstance(instance) => {
                let field_count = arena
                    .class(instance.origin)
                    .map(|class| class.fields.len())
                    .unwrap_or(0);
                Ok(Value::Instance(Rc::new(RefCell::new(Instance {
                    class: target,
                    fields: vec![Value::Null; field_count],
                }))))
            }
            // a constructor: allocate, bind the instance as the receiver,
            // run the body, yield the instance
            Object::Method(method) => {
                let class = arena
                    .class(method.owner)
                    .ok_or_else(|| VmError::new("constructor owner is not a class"))?;
                let instance = Value::Instance(Rc::new(RefCell::new(Instance {
                    class: method.owner,
                    fields: vec![Value::Null; class.fields.len()],
                })));

                let signature = &method.function.signature;
                let arity = signature.positional_parameters.len() + signature.named_parameters.len();
                // the receiver slot is part of the signature
                let explicit = arity.saturating_sub(1);
                if stack.len() < explicit {
                    return Err(VmError::new("stack underflow in CreateInstance"));
                }
                let mut arguments = stack.split_off(stack.len() - explicit);
                arguments.insert(0, instance.clone());

                self.call(arena, target, arguments, depth)?;
                Ok(instance)
            }
            _ => Err(VmError::new(format!(
                "'{}' cannot be instantiated",
                arena.display_name(target)
            ))),
        }
    }
}

enum Flow {
    Finished,
    Returned(Option<Value>),
}

/// Number of argument slots a callable consumes from the stack.
pub fn callable_arity(arena: &ObjectArena, callee: ObjectLocation) -> Option<usize> {
    match arena.get(callee) {
        Object::Function(function) | Object::Method(crate::objects::Method { function, .. }) => Some(
            function.signature.positional_parameters.len() + function.signature.named_parameters.len(),
        ),
        Object::NativeFunction(native) => Some(native.parameter_types.len()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{Function, FunctionBody, FunctionSignature, NativeFunction, Parameter, TypeValue};

    #[test]
    fn arithmetic_over_native_call() {
        let mut arena = ObjectArena::new();
        let add = arena.add(Object::NativeFunction(NativeFunction {
            name: "+".into(),
            parameter_types: vec![TypeValue::Int(crate::objects::IntKind::I32); 2],
            return_type: TypeValue::Int(crate::objects::IntKind::I32),
            handler: |arguments| match (&arguments[0], &arguments[1]) {
                (Value::I32(left), Value::I32(right)) => Ok(Value::I32(left.wrapping_add(*right))),
                _ => Err("expected Int32 operands".into()),
            },
        }));

        let interpreter = Interpreter::new();
        let mut context = interpreter
            .run(
                &arena,
                &[
                    Instruction::LoadObject(Value::I32(1)),
                    Instruction::LoadObject(Value::I32(2)),
                    Instruction::Call(add),
                ],
            )
            .unwrap();
        assert_eq!(context.pop(None), Some(Value::I32(3)));
    }

    #[test]
    fn function_call_with_arguments_and_return() {
        let mut arena = ObjectArena::new();
        let parameter_a = arena.add(Object::Parameter(Parameter::new("a", 0)));
        let parameter_b = arena.add(Object::Parameter(Parameter::new("b", 1)));

        let mut function = Function::new(Some("first".into()));
        function.signature = FunctionSignature {
            positional_parameters: vec![parameter_a, parameter_b],
            named_parameters: vec![],
            variadic_positional_parameter: None,
            variadic_named_parameter: None,
            return_type: TypeValue::Any,
        };
        function.body = Some(FunctionBody {
            instructions: vec![Instruction::LoadArgument(0), Instruction::Return],
            locals: vec![],
        });
        let first = arena.add(Object::Function(function));

        let interpreter = Interpreter::new();
        let mut context = interpreter
            .run(
                &arena,
                &[
                    Instruction::LoadObject(Value::String("keep".into())),
                    Instruction::LoadObject(Value::String("drop".into())),
                    Instruction::Call(first),
                ],
            )
            .unwrap();
        assert_eq!(context.pop(None), Some(Value::String("keep".into())));
    }

    #[test]
    fn locals_and_jumps() {
        let arena = ObjectArena::new();
        let interpreter = Interpreter::new();

        // local = 1; if (false) local = 2; push local
        let mut context = interpreter
            .run(
                &arena,
                &[
                    Instruction::LoadObject(Value::I32(1)),
                    Instruction::SetLocal(0),
                    Instruction::LoadObject(Value::Bool(false)),
                    Instruction::JumpIfFalse(6),
                    Instruction::LoadObject(Value::I32(2)),
                    Instruction::SetLocal(0),
                    Instruction::LoadLocal(0),
                ],
            )
            .unwrap();
        assert_eq!(context.pop(None), Some(Value::I32(1)));
    }

    #[test]
    fn infinite_recursion_is_bounded() {
        let mut arena = ObjectArena::new();
        let location = ObjectLocation(arena.len());
        let mut function = Function::new(Some("loop_forever".into()));
        function.body = Some(FunctionBody {
            instructions: vec![Instruction::Call(location), Instruction::Return],
            locals: vec![],
        });
        arena.add(Object::Function(function));

        let interpreter = Interpreter::new();
        let error = interpreter.run(&arena, &[Instruction::Call(location)]).unwrap_err();
        assert!(error.message.contains("call depth"), "{}", error.message);
    }

    #[test]
    fn pop_default_when_stack_is_empty() {
        let arena = ObjectArena::new();
        let interpreter = Interpreter::new();
        let mut context = interpreter.run(&arena, &[Instruction::NoOperation]).unwrap();
        assert_eq!(context.pop(Some(Value::Unit)), Some(Value::Unit));
    }
}
