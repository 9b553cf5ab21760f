//! Resolver tests: scope population, overload group synthesis, identifier
//! linking.

use pretty_assertions::assert_eq;

use crate::{
    context::ScopeValue,
    error::ZsError,
    resolved::ResolvedNode,
    toolchain::{Toolchain, ToolchainResult},
};

use super::find_node;

fn resolve(code: &str) -> Toolchain {
    let mut toolchain = Toolchain::new();
    let info = toolchain.add_source("main.zs", code);
    toolchain.execute_document(&info, ToolchainResult::ResolvedAst);
    toolchain
}

fn find_group(toolchain: &Toolchain, name: &str) -> Option<crate::resolved::ResolvedOverloadGroup> {
    toolchain.context.nodes.iter().find_map(|(_, node)| match node {
        ResolvedNode::OverloadGroup(group) if group.name == name => Some(group.clone()),
        _ => None,
    })
}

#[test]
fn named_functions_share_one_overload_group() {
    let toolchain = resolve("fun f() { }\nfun f(x: Int32) { }");
    assert!(!toolchain.context.has_errors());

    let group = find_group(&toolchain, "f").expect("group is in scope");
    assert_eq!(group.overloads.len(), 2);

    // the scope binds the name to the group, not to either function
    let document = toolchain.context.get_document("main.zs").unwrap();
    match toolchain.context.scopes.lookup_name(document.scope, "f", false) {
        Some(ScopeValue::Node(node)) => {
            assert!(matches!(toolchain.context.nodes.get(*node), ResolvedNode::OverloadGroup(_)));
        }
        other => panic!("expected 'f' in the document scope, got {other:?}"),
    }
}

#[test]
fn group_membership_follows_declaration_order() {
    let toolchain = resolve("fun f() { }\nfun f(x: Int32) { }\nfun f(x: String) { }");
    let overloads = find_group(&toolchain, "f").unwrap().overloads;

    let parameter_counts: Vec<usize> = overloads
        .iter()
        .map(|overload| match toolchain.context.nodes.get(*overload) {
            ResolvedNode::Function(function) => function.positional_parameters.len(),
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(parameter_counts, vec![0, 1, 1]);
}

#[test]
fn identifier_links_to_a_node_reachable_by_lookup() {
    let toolchain = resolve("fun f(a: Int32): Int32 { return a; }");
    assert!(!toolchain.context.has_errors());

    let function = toolchain
        .context
        .nodes
        .iter()
        .find_map(|(_, node)| match node {
            ResolvedNode::Function(function) if function.name.as_deref() == Some("f") => {
                Some(function.clone())
            }
            _ => None,
        })
        .unwrap();

    // the body's `return a` links straight to the parameter node
    let body = match toolchain.context.nodes.get(function.body.unwrap()) {
        ResolvedNode::FunctionBody(body) => body.instructions.clone().unwrap(),
        _ => unreachable!(),
    };
    let returned = match toolchain.context.nodes.get(body[0]) {
        ResolvedNode::Return(statement) => statement.expression.unwrap(),
        other => panic!("expected a return, got {other:?}"),
    };
    assert_eq!(Some(&returned), function.positional_parameters.first());

    // and the same node is reachable by scope lookup from the body scope
    match toolchain.context.scopes.lookup_name(function.scope, "a", true) {
        Some(ScopeValue::Node(node)) => assert_eq!(*node, returned),
        other => panic!("expected 'a' in the function scope, got {other:?}"),
    }
}

#[test]
fn imports_are_referred_not_defined() {
    let toolchain = resolve("import { print } from \"module:core\";");
    assert!(!toolchain.context.has_errors());

    let document = toolchain.context.get_document("main.zs").unwrap();
    let scope = toolchain.context.scopes.get(document.scope);

    let referred: Vec<_> = scope.referred_names().map(|(name, _)| name.clone()).collect();
    let defined: Vec<_> = scope.defined_names().map(|(name, _)| name.clone()).collect();
    assert!(referred.contains(&"print".to_string()));
    assert!(!defined.contains(&"print".to_string()));
}

#[test]
fn import_alias_binds_the_alias() {
    let toolchain = resolve("import { print as put } from \"module:core\";");
    assert!(!toolchain.context.has_errors());

    let imported = find_node(&toolchain, "put").expect("alias is bound");
    match toolchain.context.nodes.get(imported) {
        ResolvedNode::ImportedName(name) => {
            assert_eq!(name.name, "put");
            assert_eq!(name.origin, "print");
        }
        other => panic!("expected an imported name, got {other:?}"),
    }
}

#[test]
fn class_generics_live_in_the_signature_scope() {
    let toolchain = resolve("class Box[T] { var value: T; }");
    assert!(!toolchain.context.has_errors());

    let class = toolchain
        .context
        .nodes
        .iter()
        .find_map(|(_, node)| match node {
            ResolvedNode::Class(class) if class.name.as_deref() == Some("Box") => Some(class.clone()),
            _ => None,
        })
        .unwrap();

    // the field's type expression resolved to the generic parameter
    let field_type = match toolchain.context.nodes.get(class.items[0]) {
        ResolvedNode::Var(var) => var.var_type.unwrap(),
        other => panic!("expected the field, got {other:?}"),
    };
    assert!(matches!(
        toolchain.context.nodes.get(field_type),
        ResolvedNode::GenericParameter(parameter) if parameter.name == "T"
    ));

    // the generic is bound in the signature scope, not the body scope
    assert!(toolchain
        .context
        .scopes
        .get(class.signature_scope)
        .contains("T"));
    assert!(!toolchain.context.scopes.get(class.body_scope).contains("T"));
}

#[test]
fn duplicate_definitions_are_rejected() {
    let toolchain = resolve("class A { }\nclass A { }");
    let errors = toolchain.context.state.errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], ZsError::NameAlreadyBound(_)));
}

#[test]
fn function_and_class_with_one_name_clash() {
    let toolchain = resolve("fun a() { }\nclass a { }");
    assert!(toolchain.context.has_errors());
}

#[test]
fn set_links_to_the_existing_binding() {
    let toolchain = resolve("var x = 1;\nset x = 2;");
    assert!(!toolchain.context.has_errors());

    let var = find_node(&toolchain, "x").unwrap();
    let set = toolchain
        .context
        .nodes
        .iter()
        .find_map(|(_, node)| match node {
            ResolvedNode::Set(set) => Some(set.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(set.target, Some(var));
}

#[test]
fn methods_get_an_implicit_receiver() {
    let toolchain = resolve("class Point { fun size(): Int32 { return 4; } }");
    assert!(!toolchain.context.has_errors());

    let method = toolchain
        .context
        .nodes
        .iter()
        .find_map(|(_, node)| match node {
            ResolvedNode::Function(function) if function.name.as_deref() == Some("size") => {
                Some(function.clone())
            }
            _ => None,
        })
        .unwrap();

    assert!(method.owner_class.is_some());
    let receiver = method.positional_parameters[0];
    match toolchain.context.nodes.get(receiver) {
        ResolvedNode::Parameter(parameter) => assert_eq!(parameter.name, "this"),
        other => panic!("expected the receiver parameter, got {other:?}"),
    }
}

#[test]
fn while_label_is_visible_to_its_body() {
    let toolchain = resolve("fun go() { while outer (true) { break outer; } }");
    assert!(!toolchain.context.has_errors());
}
