//! Runtime values of the compile-time VM.

use std::{cell::RefCell, rc::Rc};

use num_bigint::{BigInt, BigUint};

use super::{
    types::{CallableType, FloatKind, IntKind, TypeValue},
    Object, ObjectArena, ObjectLocation,
};

/// An instance of a class: its class and one slot per field.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub class: ObjectLocation,
    pub fields: Vec<Value>,
}

/// A value on the VM stack.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Int(BigInt),
    UInt(BigUint),
    F32(f32),
    F64(f64),
    String(Rc<str>),
    /// A first-class type
    Type(TypeValue),
    /// A function, overload group, module or other named object
    Object(ObjectLocation),
    Instance(Rc<RefCell<Instance>>),
}

impl Value {
    /// The exact runtime type of this value.
    pub fn runtime_type(&self, arena: &ObjectArena) -> TypeValue {
        match self {
            Value::Unit => TypeValue::Unit,
            Value::Null => TypeValue::Null,
            Value::Bool(_) => TypeValue::Bool,
            Value::I8(_) => TypeValue::Int(IntKind::I8),
            Value::I16(_) => TypeValue::Int(IntKind::I16),
            Value::I32(_) => TypeValue::Int(IntKind::I32),
            Value::I64(_) => TypeValue::Int(IntKind::I64),
            Value::U8(_) => TypeValue::Int(IntKind::U8),
            Value::U16(_) => TypeValue::Int(IntKind::U16),
            Value::U32(_) => TypeValue::Int(IntKind::U32),
            Value::U64(_) => TypeValue::Int(IntKind::U64),
            Value::Int(_) => TypeValue::Int(IntKind::Int),
            Value::UInt(_) => TypeValue::Int(IntKind::UInt),
            Value::F32(_) => TypeValue::Float(FloatKind::F32),
            Value::F64(_) => TypeValue::Float(FloatKind::F64),
            Value::String(_) => TypeValue::String,
            Value::Type(_) => TypeValue::Type,
            Value::Object(location) => match arena.get(*location) {
                Object::Function(function) => {
                    TypeValue::Callable(Box::new(CallableType {
                        parameters: function
                            .signature
                            .positional_parameters
                            .iter()
                            .filter_map(|parameter| arena.parameter(*parameter))
                            .map(|parameter| parameter.parameter_type.clone())
                            .collect(),
                        return_type: function.signature.return_type.clone(),
                    }))
                }
                Object::Method(method) => {
                    TypeValue::Callable(Box::new(CallableType {
                        parameters: method
                            .function
                            .signature
                            .positional_parameters
                            .iter()
                            .filter_map(|parameter| arena.parameter(*parameter))
                            .map(|parameter| parameter.parameter_type.clone())
                            .collect(),
                        return_type: method.function.signature.return_type.clone(),
                    }))
                }
                Object::NativeFunction(native) => {
                    TypeValue::Callable(Box::new(CallableType {
                        parameters: native.parameter_types.clone(),
                        return_type: native.return_type.clone(),
                    }))
                }
                Object::OverloadGroup(_) => TypeValue::Group(*location),
                Object::Module(_) => TypeValue::Module(*location),
                Object::Class(_) => TypeValue::Type,
                Object::GenericInstance(_) => TypeValue::Type,
                Object::Typeclass(_) => TypeValue::Type,
                _ => TypeValue::Any,
            },
            Value::Instance(instance) => {
                let instance = instance.borrow();
                match arena.get(instance.class) {
                    Object::GenericInstance(_) => TypeValue::GenericInstance(instance.class),
                    _ => TypeValue::Class(instance.class),
                }
            }
        }
    }

    /// The type this value denotes when used in type position, if any.
    pub fn as_type(&self, arena: &ObjectArena) -> Option<TypeValue> {
        match self {
            Value::Type(value) => Some(value.clone()),
            Value::Object(location) => match arena.get(*location) {
                Object::Class(_) => Some(TypeValue::Class(*location)),
                Object::GenericInstance(_) => Some(TypeValue::GenericInstance(*location)),
                Object::Typeclass(_) => Some(TypeValue::Typeclass(*location)),
                Object::GenericParameter(_) => Some(TypeValue::GenericParameter(*location)),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Display form used by `print` and diagnostics.
    pub fn display(&self, arena: &ObjectArena) -> String {
        match self {
            Value::Unit => "unit".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(value) => value.to_string(),
            Value::I8(value) => value.to_string(),
            Value::I16(value) => value.to_string(),
            Value::I32(value) => value.to_string(),
            Value::I64(value) => value.to_string(),
            Value::U8(value) => value.to_string(),
            Value::U16(value) => value.to_string(),
            Value::U32(value) => value.to_string(),
            Value::U64(value) => value.to_string(),
            Value::Int(value) => value.to_string(),
            Value::UInt(value) => value.to_string(),
            Value::F32(value) => value.to_string(),
            Value::F64(value) => value.to_string(),
            Value::String(value) => value.to_string(),
            Value::Type(value) => super::types::type_name(arena, value),
            Value::Object(location) => arena.display_name(*location),
            Value::Instance(instance) => {
                format!("<instance of {}>", arena.display_name(instance.borrow().class))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_types_of_primitives() {
        let arena = ObjectArena::new();
        assert_eq!(Value::I32(1).runtime_type(&arena), TypeValue::Int(IntKind::I32));
        assert_eq!(Value::Bool(true).runtime_type(&arena), TypeValue::Bool);
        assert_eq!(
            Value::String("x".into()).runtime_type(&arena),
            TypeValue::String
        );
        assert_eq!(Value::Null.runtime_type(&arena), TypeValue::Null);
    }

    #[test]
    fn class_value_denotes_a_type() {
        let mut arena = ObjectArena::new();
        let class = arena.add(Object::Class(crate::objects::Class::new(Some("Box".into()))));
        let value = Value::Object(class);
        assert_eq!(value.as_type(&arena), Some(TypeValue::Class(class)));
        assert_eq!(value.runtime_type(&arena), TypeValue::Type);
    }
}
