//! End-to-end pipeline tests: source text through resolution, ordering,
//! compilation and compile-time evaluation.

use pretty_assertions::assert_eq;

use crate::{
    error::ZsError,
    objects::{IntKind, Object, TypeValue, Value},
    resolved::ResolvedNode,
    toolchain::{Toolchain, ToolchainResult},
    vm::{type_stack::simulate_function, Instruction},
};

use super::{assert_clean, compile_documents, compile_single, find_function, find_node, top_level_value};

#[test]
fn add_function_compiles_and_folds() {
    let toolchain = compile_single(
        "fun add(a: Int32, b: Int32): Int32 { return a + b; }\nvar result = add(1, 2);",
    );
    assert_clean(&toolchain);

    let add = find_function(&toolchain, "add").expect("add is compiled");
    let function = toolchain.context.objects.function(add).unwrap();
    assert_eq!(function.signature.return_type, TypeValue::Int(IntKind::I32));
    let body = function.body.as_ref().unwrap();
    assert_eq!(body.instructions.last(), Some(&Instruction::Return));

    assert_eq!(top_level_value(&toolchain, "result"), Some(Value::I32(3)));
}

#[test]
fn type_stack_simulation_matches_declared_return() {
    let toolchain = compile_single("fun add(a: Int32, b: Int32): Int32 { return a + b; }");
    assert_clean(&toolchain);

    let add = find_function(&toolchain, "add").unwrap();
    let (returns, final_stack) = simulate_function(&toolchain.context.objects, add).unwrap();
    assert_eq!(returns, vec![TypeValue::Int(IntKind::I32)]);
    assert!(final_stack.is_empty());
}

#[test]
fn overload_is_chosen_by_argument_type() {
    let toolchain = compile_single(
        "fun f(x: Int32): Int32 { return x; }\nfun f(x: String): String { return x; }\nvar r = f(\"hi\");",
    );
    assert_clean(&toolchain);
    assert_eq!(top_level_value(&toolchain, "r"), Some(Value::String("hi".into())));
}

#[test]
fn overload_mismatch_reports_group_and_types() {
    let toolchain = compile_single("fun f(x: Int32): Int32 { return x; }\nvar r = f(true);");
    let errors = toolchain.context.state.errors();
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ZsError::OverloadMatch(error) => {
            assert_eq!(error.group, "f");
            assert_eq!(error.argument_types, "Bool");
            assert_eq!(error.matches, 0);
        }
        other => panic!("expected an overload match error, got {other:?}"),
    }
}

#[test]
fn generic_class_instantiates_once_per_argument_tuple() {
    let toolchain = compile_single(
        "class Box[T] { var value: T; }\nclass Holder { var box: Box[Int32]; }\nclass Other { var box: Box[Int32]; }",
    );
    assert_clean(&toolchain);

    assert_eq!(toolchain.context.generic_instances.len(), 1);
    let (&(origin, ref arguments), &instance) =
        toolchain.context.generic_instances.iter().next().unwrap();
    assert_eq!(arguments, &vec![TypeValue::Int(IntKind::I32)]);

    // the origin is the Box class and the substitution covers T
    let box_class = toolchain.context.objects.class(origin).unwrap();
    assert_eq!(box_class.name.as_deref(), Some("Box"));
    match toolchain.context.objects.get(instance) {
        Object::GenericInstance(generic) => {
            assert_eq!(generic.arguments, vec![TypeValue::Int(IntKind::I32)]);
            assert_eq!(
                generic.substitutions.values().next(),
                Some(&TypeValue::Int(IntKind::I32))
            );
        }
        other => panic!("expected a generic instance, got {other:?}"),
    }

    // both field types point at the same cached instance
    for holder_name in ["Holder", "Other"] {
        let holder = toolchain
            .context
            .objects
            .iter()
            .find_map(|(_, object)| match object {
                Object::Class(class) if class.name.as_deref() == Some(holder_name) => Some(class),
                _ => None,
            })
            .unwrap();
        let field = toolchain.context.objects.field(holder.fields[0]).unwrap();
        assert_eq!(field.field_type, TypeValue::GenericInstance(instance));
    }
}

#[test]
fn local_assignment_and_void_inference() {
    let toolchain = compile_single("fun go() { var x = 1; x = 2; }");
    assert_clean(&toolchain);

    let go = find_function(&toolchain, "go").unwrap();
    let function = toolchain.context.objects.function(go).unwrap();
    assert_eq!(function.signature.return_type, TypeValue::Void);

    let body = function.body.as_ref().unwrap();
    assert_eq!(body.locals.len(), 1);
    assert_eq!(
        body.instructions,
        vec![
            Instruction::LoadObject(Value::I32(1)),
            Instruction::SetLocal(0),
            Instruction::LoadObject(Value::I32(2)),
            Instruction::SetLocal(0),
        ]
    );
}

#[test]
fn import_core_print_resolves_to_its_group() {
    let toolchain = compile_single("import { print } from \"module:core\";\nprint(\"hi\");");
    assert_clean(&toolchain);
    assert!(toolchain.context.import_system.cached("module:core").is_some());

    let imported = toolchain
        .context
        .nodes
        .iter()
        .find_map(|(location, node)| match node {
            ResolvedNode::ImportedName(name) if name.name == "print" => Some(location),
            _ => None,
        })
        .expect("print is imported");
    match toolchain.context.compiler_cache.value(imported) {
        Some(Value::Object(group)) => {
            assert!(toolchain.context.objects.group(*group).is_some());
        }
        other => panic!("expected print to bind to its overload group, got {other:?}"),
    }
}

#[test]
fn importing_the_same_module_twice_is_idempotent() {
    let toolchain = compile_documents(&[
        ("a.zs", "import { print } from \"module:core\";"),
        ("b.zs", "import { print } from \"module:core\";"),
    ]);
    assert_clean(&toolchain);

    let values: Vec<Value> = toolchain
        .context
        .nodes
        .iter()
        .filter_map(|(location, node)| match node {
            ResolvedNode::ImportedName(name) if name.name == "print" => {
                toolchain.context.compiler_cache.value(location).cloned()
            }
            _ => None,
        })
        .collect();
    assert_eq!(values.len(), 2);
    // object-identical: the same overload group location both times
    assert_eq!(values[0], values[1]);
}

#[test]
fn document_import_compiles_the_source_once() {
    let toolchain = compile_documents(&[
        ("lib.zs", "fun seven(): Int32 { return 7; }"),
        ("app.zs", "import { seven } from \"lib.zs\";\nvar r = seven();"),
    ]);
    assert_clean(&toolchain);
    assert_eq!(top_level_value(&toolchain, "r"), Some(Value::I32(7)));
    assert!(toolchain.context.import_system.cached("lib.zs").is_some());
}

#[test]
fn export_declaration_is_part_of_the_public_surface() {
    let toolchain = compile_documents(&[
        ("lib.zs", "export fun helper(): Int32 { return 7; }"),
        ("app.zs", "import { helper } from \"lib.zs\";\nvar r = helper();"),
    ]);
    assert_clean(&toolchain);
    assert_eq!(top_level_value(&toolchain, "r"), Some(Value::I32(7)));
}

#[test]
fn mutually_recursive_functions_compile() {
    let toolchain = compile_single(
        "fun a(): Int32 { return b(); }\nfun b(): Int32 { return a(); }",
    );
    assert_clean(&toolchain);

    for name in ["a", "b"] {
        let function = find_function(&toolchain, name).unwrap();
        let function = toolchain.context.objects.function(function).unwrap();
        let body = function.body.as_ref().unwrap();
        assert!(
            body.instructions.iter().any(|i| matches!(i, Instruction::Call(_))),
            "{name} should call its sibling"
        );
    }
}

#[test]
fn dependency_order_defines_used_values_first() {
    // `total` is declared before `base` but evaluates after it
    let toolchain = compile_single("var total = base + 1;\nvar base = 41;");
    assert_clean(&toolchain);
    assert_eq!(top_level_value(&toolchain, "total"), Some(Value::I32(42)));
}

#[test]
fn unbreakable_cycle_is_reported() {
    let toolchain = compile_single("var a = b;\nvar b = a;");
    let errors = toolchain.context.state.errors();
    assert_eq!(errors.len(), 1);
    assert!(
        matches!(errors[0], ZsError::DependencyCycle(_)),
        "expected a dependency cycle, got {:?}",
        errors[0]
    );
}

#[test]
fn name_error_aborts_subtree_but_not_siblings() {
    let mut toolchain = Toolchain::new();
    let info = toolchain.add_source("main.zs", "var x = missing;\nvar y = 1;");
    toolchain.execute_document(&info, ToolchainResult::ResolvedAst);

    let errors = toolchain.context.state.errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], ZsError::NameNotFound(_)));

    // the sibling var still resolved
    assert!(find_node(&toolchain, "y").is_some());
}

#[test]
fn while_loop_with_break_lowers_to_jumps() {
    let toolchain = compile_single(
        "fun count(limit: Int32): Int32 {\n    var n = 0;\n    while (n < limit) {\n        n = n + 1;\n        if (n == 3) { break; }\n    }\n    return n;\n}\nvar r = count(10);",
    );
    assert_clean(&toolchain);
    assert_eq!(top_level_value(&toolchain, "r"), Some(Value::I32(3)));

    let count = find_function(&toolchain, "count").unwrap();
    let function = toolchain.context.objects.function(count).unwrap();
    let instructions = &function.body.as_ref().unwrap().instructions;
    assert!(instructions.iter().any(|i| matches!(i, Instruction::JumpIfFalse(_))));
    assert!(instructions.iter().any(|i| matches!(i, Instruction::Jump(_))));
}

#[test]
fn while_else_runs_on_normal_exit() {
    let toolchain = compile_single(
        "fun total(): Int32 {\n    var n = 0;\n    while (n < 3) {\n        n = n + 1;\n    } else {\n        n = n + 100;\n    }\n    return n;\n}\nvar r = total();",
    );
    assert_clean(&toolchain);
    assert_eq!(top_level_value(&toolchain, "r"), Some(Value::I32(103)));
}

#[test]
fn when_matches_by_equality() {
    let toolchain = compile_single(
        "fun pick(x: Int32): Int32 {\n    when (x) {\n        case (1) { return 10; }\n        case (2) { return 20; }\n    } else {\n        return 0;\n    }\n}\nvar r = pick(2);\nvar fallback = pick(9);",
    );
    assert_clean(&toolchain);
    assert_eq!(top_level_value(&toolchain, "r"), Some(Value::I32(20)));
    assert_eq!(top_level_value(&toolchain, "fallback"), Some(Value::I32(0)));
}

#[test]
fn when_continue_falls_through_to_the_next_case() {
    let toolchain = compile_single(
        "fun pick(x: Int32): Int32 {\n    when (x) {\n        case (1) { continue; }\n        case (2) { return 20; }\n    } else {\n        return 0;\n    }\n}\nvar r = pick(1);",
    );
    assert_clean(&toolchain);
    assert_eq!(top_level_value(&toolchain, "r"), Some(Value::I32(20)));
}

#[test]
fn if_else_selects_a_branch_at_runtime() {
    let toolchain = compile_single(
        "fun larger(a: Int32, b: Int32): Int32 {\n    if (a < b) { return b; } else { return a; }\n}\nvar r = larger(3, 9);",
    );
    assert_clean(&toolchain);
    assert_eq!(top_level_value(&toolchain, "r"), Some(Value::I32(9)));
}

#[test]
fn ambiguous_return_types_are_an_error() {
    let toolchain = compile_single(
        "fun confused(flag: Bool) {\n    if (flag) { return 1; } else { return \"one\"; }\n}",
    );
    let errors = toolchain.context.state.errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], ZsError::AmbiguousReturn(_)));
}

#[test]
fn empty_return_from_non_void_function_is_an_error() {
    let toolchain = compile_single("fun f(): Int32 { return; }");
    assert!(toolchain.context.has_errors());
}

#[test]
fn typeclass_implementation_registers_and_checks_members() {
    let toolchain = compile_single(
        "typeclass Eq {\n    fun equals(other: Any): Bool;\n}\ntypeclass Eq(Int32) {\n    fun equals(other: Any): Bool { return true; }\n}",
    );
    assert_clean(&toolchain);

    let typeclass = toolchain
        .context
        .objects
        .iter()
        .find_map(|(_, object)| match object {
            Object::Typeclass(typeclass) if typeclass.name == "Eq" => Some(typeclass),
            _ => None,
        })
        .unwrap();
    assert_eq!(typeclass.implementations.len(), 1);
    assert_eq!(
        typeclass.implementations[0].target,
        TypeValue::Int(IntKind::I32)
    );
}

#[test]
fn incomplete_typeclass_implementation_is_an_error() {
    let toolchain = compile_single(
        "typeclass Eq {\n    fun equals(other: Any): Bool;\n}\ntypeclass Eq(Int32) {\n}",
    );
    assert!(toolchain.context.has_errors());
}

#[test]
fn class_with_typeclass_base_records_a_specification() {
    let toolchain = compile_single(
        "typeclass Show {\n}\nclass Point < Show {\n    var x: Int32;\n}",
    );
    assert_clean(&toolchain);

    let point = toolchain
        .context
        .objects
        .iter()
        .find_map(|(_, object)| match object {
            Object::Class(class) if class.name.as_deref() == Some("Point") => Some(class),
            _ => None,
        })
        .unwrap();
    assert_eq!(point.specifications.len(), 1);
    assert!(point.base.is_none());
}

#[test]
fn class_constructor_runs_through_create_instance() {
    let toolchain = compile_single(
        "class Point {\n    var x: Int32;\n    fun size(): Int32 { return 4; }\n}\nvar p = Point();\nvar s = p.size();",
    );
    assert_clean(&toolchain);
    assert!(matches!(top_level_value(&toolchain, "p"), Some(Value::Instance(_))));
    assert_eq!(top_level_value(&toolchain, "s"), Some(Value::I32(4)));
}

#[test]
fn module_members_are_reachable_by_member_access() {
    let toolchain = compile_single(
        "module geometry {\n    fun area(width: Int32, height: Int32): Int32 { return width * height; }\n}\nvar r = geometry.area(3, 4);",
    );
    assert_clean(&toolchain);
    assert_eq!(top_level_value(&toolchain, "r"), Some(Value::I32(12)));
}

#[test]
fn named_arguments_match_by_name() {
    let toolchain = compile_single(
        "fun scale(value: Int32, {factor: Int32 = 2}): Int32 { return value * factor; }\nvar doubled = scale(21);\nvar tripled = scale(14, factor: 3);",
    );
    assert_clean(&toolchain);
    assert_eq!(top_level_value(&toolchain, "doubled"), Some(Value::I32(42)));
    assert_eq!(top_level_value(&toolchain, "tripled"), Some(Value::I32(42)));
}

#[test]
fn validate_stage_stops_before_objects() {
    let mut toolchain = Toolchain::new();
    let info = toolchain.add_source("main.zs", "fun f(): Int32 { return 1; }");
    assert!(toolchain.execute_document(&info, ToolchainResult::BuildOrder));
    let document = toolchain.context.get_document("main.zs").unwrap();
    assert!(document.build_order.is_some());
    assert!(document.objects.is_none());
}
