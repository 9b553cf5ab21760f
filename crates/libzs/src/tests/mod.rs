//! Cross-module tests: resolver behavior and the full pipeline.

use crate::{
    objects::{Object, ObjectLocation, Value},
    resolved::{NodeLocation, ResolvedNode},
    toolchain::{Toolchain, ToolchainResult},
};

mod pipeline;
mod resolver;

/// Compiles in-memory documents in order through the full pipeline.
pub(crate) fn compile_documents(sources: &[(&str, &str)]) -> Toolchain {
    let mut toolchain = Toolchain::new();
    let infos: Vec<_> = sources
        .iter()
        .map(|(path, code)| toolchain.add_source(path, code))
        .collect();
    for info in infos.iter() {
        toolchain.execute_document(info, ToolchainResult::DocumentContext);
    }
    toolchain
}

pub(crate) fn compile_single(code: &str) -> Toolchain {
    compile_documents(&[("main.zs", code)])
}

pub(crate) fn assert_clean(toolchain: &Toolchain) {
    assert!(
        !toolchain.context.has_errors(),
        "unexpected errors: {:#?}",
        toolchain.context.state.errors()
    );
}

/// The compiled value of a top-level `var`.
pub(crate) fn top_level_value(toolchain: &Toolchain, name: &str) -> Option<Value> {
    toolchain
        .context
        .nodes
        .iter()
        .find(|(_, node)| matches!(node, ResolvedNode::Var(var) if var.name == name))
        .and_then(|(location, _)| toolchain.context.compiler_cache.value(location).cloned())
}

/// Finds a compiled function or method object by name.
pub(crate) fn find_function(toolchain: &Toolchain, name: &str) -> Option<ObjectLocation> {
    toolchain.context.objects.iter().find_map(|(location, object)| match object {
        Object::Function(function) if function.name.as_deref() == Some(name) => Some(location),
        Object::Method(method) if method.function.name.as_deref() == Some(name) => Some(location),
        _ => None,
    })
}

/// Finds the resolved node of a named declaration.
pub(crate) fn find_node(toolchain: &Toolchain, name: &str) -> Option<NodeLocation> {
    toolchain
        .context
        .nodes
        .iter()
        .find(|(_, node)| node.name() == Some(name))
        .map(|(location, _)| location)
}
