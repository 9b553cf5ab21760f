//! The type lattice.
//!
//! `Any` is the top type; everything flows into it. Assignability is the
//! reflexive, transitive "may flow into" relation: identity, subclassing,
//! `Null` into class types, numeric widening, and typeclass membership. The
//! strict comparison used by the first overload-matching pass is plain type
//! identity.

use super::{Object, ObjectArena, ObjectLocation};

/// Integer kinds: fixed widths plus the arbitrary-precision `Int`/`UInt`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum IntKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    Int,
    UInt,
}

impl IntKind {
    pub fn is_signed(&self) -> bool {
        matches!(self, IntKind::I8 | IntKind::I16 | IntKind::I32 | IntKind::I64 | IntKind::Int)
    }

    /// Width rank used by the widening rule; arbitrary precision is widest.
    fn rank(&self) -> u8 {
        match self {
            IntKind::I8 | IntKind::U8 => 1,
            IntKind::I16 | IntKind::U16 => 2,
            IntKind::I32 | IntKind::U32 => 3,
            IntKind::I64 | IntKind::U64 => 4,
            IntKind::Int | IntKind::UInt => 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            IntKind::I8 => "Int8",
            IntKind::I16 => "Int16",
            IntKind::I32 => "Int32",
            IntKind::I64 => "Int64",
            IntKind::U8 => "UInt8",
            IntKind::U16 => "UInt16",
            IntKind::U32 => "UInt32",
            IntKind::U64 => "UInt64",
            IntKind::Int => "Int",
            IntKind::UInt => "UInt",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FloatKind {
    F32,
    F64,
}

impl FloatKind {
    pub fn name(&self) -> &'static str {
        match self {
            FloatKind::F32 => "Float32",
            FloatKind::F64 => "Float64",
        }
    }
}

/// A callable's type: parameter types and result type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallableType {
    pub parameters: Vec<TypeValue>,
    pub return_type: TypeValue,
}

/// A static type as tracked on the type stack and in signatures.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeValue {
    /// The top type
    Any,
    /// The type with no values
    Void,
    /// The type with exactly one value
    Unit,
    Bool,
    /// The type of `null`
    Null,
    String,
    /// The kind of types
    Type,
    Int(IntKind),
    Float(FloatKind),
    Class(ObjectLocation),
    Typeclass(ObjectLocation),
    GenericParameter(ObjectLocation),
    GenericInstance(ObjectLocation),
    Module(ObjectLocation),
    /// The type of an overload group value
    Group(ObjectLocation),
    Callable(Box<CallableType>),
}

impl Default for TypeValue {
    fn default() -> Self {
        TypeValue::Any
    }
}

/// Strict comparison: type identity only, no widening, no subtyping.
pub fn are_identical(source: &TypeValue, target: &TypeValue) -> bool {
    source == target
}

/// The permissive "may flow into" relation over the lattice.
pub fn assignable_to(arena: &ObjectArena, source: &TypeValue, target: &TypeValue) -> bool {
    if target == &TypeValue::Any || source == target {
        return true;
    }

    match (source, target) {
        // null flows into every class-shaped type
        (TypeValue::Null, TypeValue::Class(_) | TypeValue::GenericInstance(_)) => true,

        // numeric widening within the same signedness family
        (TypeValue::Int(source_kind), TypeValue::Int(target_kind)) => {
            source_kind.is_signed() == target_kind.is_signed()
                && source_kind.rank() < target_kind.rank()
        }
        (TypeValue::Float(FloatKind::F32), TypeValue::Float(FloatKind::F64)) => true,

        // subclassing
        (TypeValue::Class(source_class), TypeValue::Class(target_class)) => {
            is_subclass_of(arena, *source_class, *target_class)
        }

        // a generic instance flows into its origin class
        (TypeValue::GenericInstance(instance), TypeValue::Class(target_class)) => {
            match arena.get(*instance) {
                Object::GenericInstance(generic) => is_subclass_of(arena, generic.origin, *target_class),
                _ => false,
            }
        }

        // a class flows into a typeclass it implements
        (TypeValue::Class(source_class), TypeValue::Typeclass(typeclass)) => {
            class_implements(arena, *source_class, *typeclass)
        }
        (source, TypeValue::Typeclass(typeclass)) => {
            typeclass_covers(arena, *typeclass, source)
        }

        _ => false,
    }
}

fn is_subclass_of(arena: &ObjectArena, source: ObjectLocation, target: ObjectLocation) -> bool {
    let mut current = Some(source);
    while let Some(location) = current {
        if location == target {
            return true;
        }
        current = arena.class(location).and_then(|class| class.base);
    }
    false
}

fn class_implements(arena: &ObjectArena, class: ObjectLocation, typeclass: ObjectLocation) -> bool {
    if let Some(class) = arena.class(class) {
        if class.specifications.contains(&typeclass) {
            return true;
        }
    }
    typeclass_covers(arena, typeclass, &TypeValue::Class(class))
}

fn typeclass_covers(arena: &ObjectArena, typeclass: ObjectLocation, source: &TypeValue) -> bool {
    match arena.get(typeclass) {
        Object::Typeclass(typeclass) => typeclass
            .implementations
            .iter()
            .any(|implementation| &implementation.target == source),
        _ => false,
    }
}

/// Human-readable type name for diagnostics.
pub fn type_name(arena: &ObjectArena, value: &TypeValue) -> String {
    match value {
        TypeValue::Any => "Any".to_string(),
        TypeValue::Void => "Void".to_string(),
        TypeValue::Unit => "Unit".to_string(),
        TypeValue::Bool => "Bool".to_string(),
        TypeValue::Null => "Null".to_string(),
        TypeValue::String => "String".to_string(),
        TypeValue::Type => "Type".to_string(),
        TypeValue::Int(kind) => kind.name().to_string(),
        TypeValue::Float(kind) => kind.name().to_string(),
        TypeValue::Class(location)
        | TypeValue::Typeclass(location)
        | TypeValue::GenericParameter(location)
        | TypeValue::GenericInstance(location)
        | TypeValue::Module(location)
        | TypeValue::Group(location) => arena.display_name(*location),
        TypeValue::Callable(callable) => {
            let parameters = callable
                .parameters
                .iter()
                .map(|parameter| type_name(arena, parameter))
                .collect::<Vec<_>>()
                .join(", ");
            format!("({parameters}) -> {}", type_name(arena, &callable.return_type))
        }
    }
}

/// The list form used by overload diagnostics: `Int32, String`.
pub fn type_list_name(arena: &ObjectArena, values: &[TypeValue]) -> String {
    values
        .iter()
        .map(|value| type_name(arena, value))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::Class;

    #[test]
    fn any_is_top() {
        let arena = ObjectArena::new();
        assert!(assignable_to(&arena, &TypeValue::Int(IntKind::I32), &TypeValue::Any));
        assert!(assignable_to(&arena, &TypeValue::String, &TypeValue::Any));
        assert!(!assignable_to(&arena, &TypeValue::Any, &TypeValue::String));
    }

    #[test]
    fn widening_is_one_directional_and_same_family() {
        let arena = ObjectArena::new();
        assert!(assignable_to(&arena, &TypeValue::Int(IntKind::I8), &TypeValue::Int(IntKind::I32)));
        assert!(!assignable_to(&arena, &TypeValue::Int(IntKind::I32), &TypeValue::Int(IntKind::I8)));
        assert!(!assignable_to(&arena, &TypeValue::Int(IntKind::U8), &TypeValue::Int(IntKind::I32)));
        assert!(assignable_to(&arena, &TypeValue::Int(IntKind::I64), &TypeValue::Int(IntKind::Int)));
        assert!(assignable_to(&arena, &TypeValue::Float(FloatKind::F32), &TypeValue::Float(FloatKind::F64)));
    }

    #[test]
    fn strict_identity_rejects_widening() {
        assert!(are_identical(&TypeValue::Int(IntKind::I32), &TypeValue::Int(IntKind::I32)));
        assert!(!are_identical(&TypeValue::Int(IntKind::I8), &TypeValue::Int(IntKind::I32)));
    }

    #[test]
    fn subclass_chain_is_assignable() {
        let mut arena = ObjectArena::new();
        let base = arena.add(Object::Class(Class::new(Some("Base".into()))));
        let mut derived_class = Class::new(Some("Derived".into()));
        derived_class.base = Some(base);
        let derived = arena.add(Object::Class(derived_class));

        assert!(assignable_to(&arena, &TypeValue::Class(derived), &TypeValue::Class(base)));
        assert!(!assignable_to(&arena, &TypeValue::Class(base), &TypeValue::Class(derived)));
        assert!(assignable_to(&arena, &TypeValue::Null, &TypeValue::Class(base)));
    }
}
