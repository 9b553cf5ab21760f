//! Built-in types, the `core` module and the operator registry.
//!
//! The primitive type names are installed into the global scope so every
//! document sees them without imports. The `core` module (reachable through
//! `module:core`) re-exports those types and adds the native `print`
//! overloads. Binary and unary operators resolve through overload groups of
//! native functions registered here; constant folding falls out of the VM
//! executing those natives at compile time.

use num_bigint::BigInt;

use crate::{
    context::{CompilationContext, ScopeValue},
    import::ImportScope,
    objects::{
        FloatKind, IntKind, NativeFunction, NativeHandler, Object, ObjectArena, ObjectLocation,
        OverloadGroup, TypeValue, Value,
    },
};

/// Registry key of a binary operator group (`_+_`, `_==_`, ...).
pub fn binary_operator_key(operator: &str) -> String {
    format!("_{operator}_")
}

/// Registry key of a prefix operator group (`-_`, `!_`).
pub fn unary_operator_key(operator: &str) -> String {
    format!("{operator}_")
}

fn native(
    arena: &mut ObjectArena,
    name: &str,
    parameter_types: Vec<TypeValue>,
    return_type: TypeValue,
    handler: NativeHandler,
) -> ObjectLocation {
    arena.add(Object::NativeFunction(NativeFunction {
        name: name.to_string(),
        parameter_types,
        return_type,
        handler,
    }))
}

fn group(arena: &mut ObjectArena, name: &str, overloads: Vec<ObjectLocation>) -> ObjectLocation {
    arena.add(Object::OverloadGroup(OverloadGroup {
        name: name.to_string(),
        parent: None,
        overloads,
    }))
}

fn int32() -> TypeValue {
    TypeValue::Int(IntKind::I32)
}

fn int64() -> TypeValue {
    TypeValue::Int(IntKind::I64)
}

fn float64() -> TypeValue {
    TypeValue::Float(FloatKind::F64)
}

macro_rules! arithmetic_handler {
    ($variant:ident, $op:tt) => {
        |arguments| match (&arguments[0], &arguments[1]) {
            (Value::$variant(left), Value::$variant(right)) => Ok(Value::$variant(left $op right)),
            _ => Err("operand type mismatch".to_string()),
        }
    };
}

macro_rules! comparison_handler {
    ($variant:ident, $op:tt) => {
        |arguments| match (&arguments[0], &arguments[1]) {
            (Value::$variant(left), Value::$variant(right)) => Ok(Value::Bool(left $op right)),
            _ => Err("operand type mismatch".to_string()),
        }
    };
}

fn install_operators(context: &mut CompilationContext) {
    let arena = &mut context.objects;

    // addition also concatenates strings
    let concat = native(arena, "+", vec![TypeValue::String, TypeValue::String], TypeValue::String, |arguments| {
        match (&arguments[0], &arguments[1]) {
            (Value::String(left), Value::String(right)) => {
                Ok(Value::String(format!("{left}{right}").into()))
            }
            _ => Err("operand type mismatch".to_string()),
        }
    });

    let mut binary_groups: Vec<(String, Vec<ObjectLocation>)> = Vec::new();

    // arithmetic over the common numeric kinds
    let add_i32 = native(arena, "+", vec![int32(), int32()], int32(), |a| match (&a[0], &a[1]) {
        (Value::I32(l), Value::I32(r)) => Ok(Value::I32(l.wrapping_add(*r))),
        _ => Err("operand type mismatch".to_string()),
    });
    let add_i64 = native(arena, "+", vec![int64(), int64()], int64(), |a| match (&a[0], &a[1]) {
        (Value::I64(l), Value::I64(r)) => Ok(Value::I64(l.wrapping_add(*r))),
        _ => Err("operand type mismatch".to_string()),
    });
    let add_int = native(arena, "+", vec![TypeValue::Int(IntKind::Int); 2], TypeValue::Int(IntKind::Int), |a| {
        match (&a[0], &a[1]) {
            (Value::Int(l), Value::Int(r)) => Ok(Value::Int(l + r)),
            _ => Err("operand type mismatch".to_string()),
        }
    });
    let add_f64 = native(arena, "+", vec![float64(), float64()], float64(), arithmetic_handler!(F64, +));
    binary_groups.push(("+".into(), vec![add_i32, add_i64, add_int, add_f64, concat]));

    let sub_i32 = native(arena, "-", vec![int32(), int32()], int32(), |a| match (&a[0], &a[1]) {
        (Value::I32(l), Value::I32(r)) => Ok(Value::I32(l.wrapping_sub(*r))),
        _ => Err("operand type mismatch".to_string()),
    });
    let sub_i64 = native(arena, "-", vec![int64(), int64()], int64(), |a| match (&a[0], &a[1]) {
        (Value::I64(l), Value::I64(r)) => Ok(Value::I64(l.wrapping_sub(*r))),
        _ => Err("operand type mismatch".to_string()),
    });
    let sub_f64 = native(arena, "-", vec![float64(), float64()], float64(), arithmetic_handler!(F64, -));
    binary_groups.push(("-".into(), vec![sub_i32, sub_i64, sub_f64]));

    let mul_i32 = native(arena, "*", vec![int32(), int32()], int32(), |a| match (&a[0], &a[1]) {
        (Value::I32(l), Value::I32(r)) => Ok(Value::I32(l.wrapping_mul(*r))),
        _ => Err("operand type mismatch".to_string()),
    });
    let mul_i64 = native(arena, "*", vec![int64(), int64()], int64(), |a| match (&a[0], &a[1]) {
        (Value::I64(l), Value::I64(r)) => Ok(Value::I64(l.wrapping_mul(*r))),
        _ => Err("operand type mismatch".to_string()),
    });
    let mul_f64 = native(arena, "*", vec![float64(), float64()], float64(), arithmetic_handler!(F64, *));
    binary_groups.push(("*".into(), vec![mul_i32, mul_i64, mul_f64]));

    let div_i32 = native(arena, "/", vec![int32(), int32()], int32(), |a| match (&a[0], &a[1]) {
        (Value::I32(_), Value::I32(0)) => Err("division by zero".to_string()),
        (Value::I32(l), Value::I32(r)) => Ok(Value::I32(l.wrapping_div(*r))),
        _ => Err("operand type mismatch".to_string()),
    });
    let div_i64 = native(arena, "/", vec![int64(), int64()], int64(), |a| match (&a[0], &a[1]) {
        (Value::I64(_), Value::I64(0)) => Err("division by zero".to_string()),
        (Value::I64(l), Value::I64(r)) => Ok(Value::I64(l.wrapping_div(*r))),
        _ => Err("operand type mismatch".to_string()),
    });
    let div_f64 = native(arena, "/", vec![float64(), float64()], float64(), arithmetic_handler!(F64, /));
    binary_groups.push(("/".into(), vec![div_i32, div_i64, div_f64]));

    let rem_i32 = native(arena, "%", vec![int32(), int32()], int32(), |a| match (&a[0], &a[1]) {
        (Value::I32(_), Value::I32(0)) => Err("division by zero".to_string()),
        (Value::I32(l), Value::I32(r)) => Ok(Value::I32(l.wrapping_rem(*r))),
        _ => Err("operand type mismatch".to_string()),
    });
    let rem_i64 = native(arena, "%", vec![int64(), int64()], int64(), |a| match (&a[0], &a[1]) {
        (Value::I64(_), Value::I64(0)) => Err("division by zero".to_string()),
        (Value::I64(l), Value::I64(r)) => Ok(Value::I64(l.wrapping_rem(*r))),
        _ => Err("operand type mismatch".to_string()),
    });
    binary_groups.push(("%".into(), vec![rem_i32, rem_i64]));

    // equality: exact overloads first, a structural fallback for the rest
    let eq_i32 = native(arena, "==", vec![int32(), int32()], TypeValue::Bool, comparison_handler!(I32, ==));
    let eq_string = native(arena, "==", vec![TypeValue::String, TypeValue::String], TypeValue::Bool, comparison_handler!(String, ==));
    let eq_bool = native(arena, "==", vec![TypeValue::Bool, TypeValue::Bool], TypeValue::Bool, comparison_handler!(Bool, ==));
    let eq_any = native(arena, "==", vec![TypeValue::Any, TypeValue::Any], TypeValue::Bool, |a| {
        Ok(Value::Bool(a[0] == a[1]))
    });
    binary_groups.push(("==".into(), vec![eq_i32, eq_string, eq_bool, eq_any]));

    let ne_any = native(arena, "!=", vec![TypeValue::Any, TypeValue::Any], TypeValue::Bool, |a| {
        Ok(Value::Bool(a[0] != a[1]))
    });
    binary_groups.push(("!=".into(), vec![ne_any]));

    for (operator, i32_handler, i64_handler, f64_handler) in [
        ("<", comparison_handler!(I32, <) as NativeHandler, comparison_handler!(I64, <) as NativeHandler, comparison_handler!(F64, <) as NativeHandler),
        ("<=", comparison_handler!(I32, <=), comparison_handler!(I64, <=), comparison_handler!(F64, <=)),
        (">", comparison_handler!(I32, >), comparison_handler!(I64, >), comparison_handler!(F64, >)),
        (">=", comparison_handler!(I32, >=), comparison_handler!(I64, >=), comparison_handler!(F64, >=)),
    ] {
        let over_i32 = native(arena, operator, vec![int32(), int32()], TypeValue::Bool, i32_handler);
        let over_i64 = native(arena, operator, vec![int64(), int64()], TypeValue::Bool, i64_handler);
        let over_f64 = native(arena, operator, vec![float64(), float64()], TypeValue::Bool, f64_handler);
        binary_groups.push((operator.into(), vec![over_i32, over_i64, over_f64]));
    }

    for (operator, overloads) in binary_groups {
        let key = binary_operator_key(&operator);
        let location = group(arena, &key, overloads);
        context.operators.insert(key, location);
    }

    // prefix operators
    let neg_i32 = native(arena, "-", vec![int32()], int32(), |a| match &a[0] {
        Value::I32(value) => Ok(Value::I32(value.wrapping_neg())),
        _ => Err("operand type mismatch".to_string()),
    });
    let neg_i64 = native(arena, "-", vec![int64()], int64(), |a| match &a[0] {
        Value::I64(value) => Ok(Value::I64(value.wrapping_neg())),
        _ => Err("operand type mismatch".to_string()),
    });
    let neg_f64 = native(arena, "-", vec![float64()], float64(), |a| match &a[0] {
        Value::F64(value) => Ok(Value::F64(-value)),
        _ => Err("operand type mismatch".to_string()),
    });
    let neg_int = native(arena, "-", vec![TypeValue::Int(IntKind::Int)], TypeValue::Int(IntKind::Int), |a| {
        match &a[0] {
            Value::Int(value) => Ok(Value::Int(-value.clone())),
            _ => Err("operand type mismatch".to_string()),
        }
    });
    let neg_key = unary_operator_key("-");
    let neg_group = group(arena, &neg_key, vec![neg_i32, neg_i64, neg_f64, neg_int]);
    context.operators.insert(neg_key, neg_group);

    let not_bool = native(arena, "!", vec![TypeValue::Bool], TypeValue::Bool, |a| match &a[0] {
        Value::Bool(value) => Ok(Value::Bool(!value)),
        _ => Err("operand type mismatch".to_string()),
    });
    let not_key = unary_operator_key("!");
    let not_group = group(arena, &not_key, vec![not_bool]);
    context.operators.insert(not_key, not_group);
}

/// The primitive type names visible in every scope.
pub fn primitive_types() -> Vec<(&'static str, TypeValue)> {
    vec![
        ("Any", TypeValue::Any),
        ("Void", TypeValue::Void),
        ("Unit", TypeValue::Unit),
        ("Bool", TypeValue::Bool),
        ("String", TypeValue::String),
        ("Type", TypeValue::Type),
        ("Int8", TypeValue::Int(IntKind::I8)),
        ("Int16", TypeValue::Int(IntKind::I16)),
        ("Int32", TypeValue::Int(IntKind::I32)),
        ("Int64", TypeValue::Int(IntKind::I64)),
        ("UInt8", TypeValue::Int(IntKind::U8)),
        ("UInt16", TypeValue::Int(IntKind::U16)),
        ("UInt32", TypeValue::Int(IntKind::U32)),
        ("UInt64", TypeValue::Int(IntKind::U64)),
        ("Int", TypeValue::Int(IntKind::Int)),
        ("UInt", TypeValue::Int(IntKind::UInt)),
        ("Float32", TypeValue::Float(FloatKind::F32)),
        ("Float64", TypeValue::Float(FloatKind::F64)),
    ]
}

fn install_core_module(context: &mut CompilationContext) {
    let arena = &mut context.objects;

    let print_one = native(arena, "print", vec![TypeValue::Any], TypeValue::Void, |arguments| {
        println!("{}", display_for_print(&arguments[0]));
        Ok(Value::Unit)
    });
    let print_two = native(
        arena,
        "print",
        vec![TypeValue::Any, TypeValue::Any],
        TypeValue::Void,
        |arguments| {
            println!("{} {}", display_for_print(&arguments[0]), display_for_print(&arguments[1]));
            Ok(Value::Unit)
        },
    );
    let print_group = group(arena, "print", vec![print_one, print_two]);

    let mut core = ImportScope::new();
    for (name, value) in primitive_types() {
        core.define(name, Value::Type(value));
    }
    core.define("print", Value::Object(print_group));

    context.import_system.add_module("core", core);
}

fn display_for_print(value: &Value) -> String {
    match value {
        Value::String(text) => text.to_string(),
        Value::Bool(value) => value.to_string(),
        Value::I8(v) => v.to_string(),
        Value::I16(v) => v.to_string(),
        Value::I32(v) => v.to_string(),
        Value::I64(v) => v.to_string(),
        Value::U8(v) => v.to_string(),
        Value::U16(v) => v.to_string(),
        Value::U32(v) => v.to_string(),
        Value::U64(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::F32(v) => v.to_string(),
        Value::F64(v) => v.to_string(),
        Value::Unit => "unit".to_string(),
        Value::Null => "null".to_string(),
        other => format!("{other:?}"),
    }
}

/// Parses the arbitrary-precision `I`-suffixed integer literals.
pub fn parse_big_int(text: &str) -> Option<Value> {
    text.parse::<BigInt>().ok().map(Value::Int)
}

/// Installs the builtins into a fresh compilation context: global type
/// names, the operator registry and the `core` module.
pub fn install(context: &mut CompilationContext) {
    for (name, value) in primitive_types() {
        context
            .scopes
            .create_name(context.global_scope, name, ScopeValue::Object(Value::Type(value)))
            .expect("builtin type names are unique");
    }

    install_operators(context);
    install_core_module(context);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_registry_has_arithmetic_groups() {
        let context = CompilationContext::new();
        for operator in ["+", "-", "*", "/", "%", "==", "<"] {
            assert!(
                context.operators.contains_key(&binary_operator_key(operator)),
                "missing operator group for {operator}"
            );
        }
        assert!(context.operators.contains_key(&unary_operator_key("-")));
    }

    #[test]
    fn core_module_exposes_print_and_types() {
        let context = CompilationContext::new();
        let core = context.import_system.get_module("core").unwrap();
        assert!(core.get_name("print").is_some());
        assert!(core.get_name("Int32").is_some());
        assert!(core.get_name("missing").is_none());
    }

    #[test]
    fn addition_native_folds() {
        let context = CompilationContext::new();
        let group = context.operators[&binary_operator_key("+")];
        let overloads = context.objects.group(group).unwrap().overloads.clone();
        // the Int32 overload is the first registered
        let first = overloads[0];
        match context.objects.get(first) {
            Object::NativeFunction(native) => {
                let result = (native.handler)(&[Value::I32(20), Value::I32(22)]).unwrap();
                assert_eq!(result, Value::I32(42));
            }
            other => panic!("expected native function, got {other:?}"),
        }
    }
}
