//! Dependency ordering of top-level declarations.
//!
//! Two relations feed one graph. *Weak* edges (runtime and typing
//! dependencies) only require the target's declaration, which the
//! construct-all-first compiler satisfies unconditionally; they still steer
//! the order. *Strong* edges (compile-time dependencies) require the target
//! to be fully defined first: anything referenced from an expression the
//! define stage evaluates in the VM.
//!
//! The output is a list of strongly-connected components in dependency
//! order. Mutually recursive members of one component are handled by the
//! declare/define split; a component held together by strong edges cannot
//! be broken and is reported as a cycle error.

use indexmap::{IndexMap, IndexSet};

use crate::{
    context::CompilationContext,
    error::{DependencyCycle, ZsError},
    resolved::{NodeLocation, ResolvedNode},
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum EdgeKind {
    /// Declaration suffices (runtime and typing dependencies)
    Weak,
    /// Full definition required (compile-time dependencies)
    Strong,
}

pub struct DependencyFinder<'ctx> {
    ctx: &'ctx CompilationContext,
    cache: IndexMap<NodeLocation, Vec<(NodeLocation, EdgeKind)>>,
}

impl<'ctx> DependencyFinder<'ctx> {
    pub fn new(ctx: &'ctx CompilationContext) -> Self {
        Self { ctx, cache: IndexMap::new() }
    }

    /// Extra nodes a top-level node contributes to the ordering universe
    /// (module members, overload group members).
    pub fn flatten_tree(&mut self, location: NodeLocation) -> Vec<NodeLocation> {
        match self.ctx.nodes.get(location) {
            ResolvedNode::Module(module) => {
                let items = module.items.clone();
                let mut result = items.clone();
                for item in items {
                    result.extend(self.flatten_tree(item));
                }
                result
            }
            ResolvedNode::OverloadGroup(group) => group.overloads.clone(),
            _ => Vec::new(),
        }
    }

    fn find_dependencies(&mut self, location: NodeLocation) -> Vec<(NodeLocation, EdgeKind)> {
        if let Some(cached) = self.cache.get(&location) {
            return cached.clone();
        }
        // break self-recursive queries while computing
        self.cache.insert(location, Vec::new());
        let result = self.compute_dependencies(location);
        self.cache.insert(location, result.clone());
        result
    }

    fn compute_dependencies(&mut self, location: NodeLocation) -> Vec<(NodeLocation, EdgeKind)> {
        match self.ctx.nodes.get(location).clone() {
            ResolvedNode::Module(_) => Vec::new(),

            ResolvedNode::Class(class) => {
                let mut result = Vec::new();
                for base in class.bases.iter() {
                    result.extend(self.typing_dependencies(*base));
                }
                for item in class.items.iter() {
                    result.extend(self.find_dependencies(*item));
                }
                result
            }

            ResolvedNode::Function(function) => {
                let mut result = Vec::new();
                for parameter in function
                    .positional_parameters
                    .iter()
                    .chain(function.named_parameters.iter())
                    .chain(function.variadic_positional_parameter.iter())
                    .chain(function.variadic_named_parameter.iter())
                {
                    result.extend(self.find_dependencies(*parameter));
                }
                if let Some(return_type) = function.return_type {
                    result.extend(self.typing_dependencies(return_type));
                }
                result
            }

            ResolvedNode::OverloadGroup(group) => {
                let mut result = Vec::new();
                for overload in group.overloads.iter() {
                    result.extend(self.find_dependencies(*overload));
                }
                result
            }

            ResolvedNode::Parameter(parameter) => {
                let mut result = Vec::new();
                if let Some(parameter_type) = parameter.parameter_type {
                    result.extend(self.typing_dependencies(parameter_type));
                }
                if let Some(initializer) = parameter.initializer {
                    result.extend(self.expression_dependencies(initializer));
                }
                result
            }

            ResolvedNode::Var(var) => {
                let mut result = Vec::new();
                if let Some(var_type) = var.var_type {
                    result.extend(self.typing_dependencies(var_type));
                }
                if let Some(initializer) = var.initializer {
                    result.extend(self.expression_dependencies(initializer));
                }
                result
            }

            ResolvedNode::Typeclass(typeclass) => {
                let mut result = Vec::new();
                for item in typeclass.items.iter() {
                    result.extend(self.find_dependencies(*item));
                }
                result
            }

            ResolvedNode::TypeclassImpl(implementation) => {
                let mut result = Vec::new();
                if let Some(typeclass) = implementation.typeclass {
                    result.push((typeclass, EdgeKind::Strong));
                }
                result.extend(self.typing_dependencies(implementation.implemented_type));
                for item in implementation.items.iter() {
                    result.extend(self.find_dependencies(*item));
                }
                result
            }

            ResolvedNode::Set(set) => {
                let mut result = Vec::new();
                if let Some(target) = set.target {
                    result.push((target, EdgeKind::Strong));
                }
                result.extend(self.expression_dependencies(set.value));
                result
            }

            ResolvedNode::Import(_) | ResolvedNode::Export(_) | ResolvedNode::Object(_) => Vec::new(),

            _ => Vec::new(),
        }
    }

    /// The typing variant: a type position holding a direct reference to a
    /// declaration needs only that declaration, so no ordering edge beyond a
    /// weak one; any computed type expression falls back to compile-time
    /// dependencies.
    fn typing_dependencies(&mut self, location: NodeLocation) -> Vec<(NodeLocation, EdgeKind)> {
        match self.ctx.nodes.get(location) {
            ResolvedNode::Class(_)
            | ResolvedNode::Typeclass(_)
            | ResolvedNode::GenericParameter(_)
            | ResolvedNode::Object(_) => vec![(location, EdgeKind::Weak)],
            _ => self.expression_dependencies(location),
        }
    }

    /// Transitive references of an expression the define stage will
    /// evaluate: all strong.
    fn expression_dependencies(&mut self, location: NodeLocation) -> Vec<(NodeLocation, EdgeKind)> {
        let mut result = Vec::new();
        self.collect_expression(location, &mut result);
        result
    }

    fn collect_expression(&mut self, location: NodeLocation, result: &mut Vec<(NodeLocation, EdgeKind)>) {
        match self.ctx.nodes.get(location).clone() {
            ResolvedNode::Class(_)
            | ResolvedNode::Function(_)
            | ResolvedNode::Var(_)
            | ResolvedNode::Typeclass(_)
            | ResolvedNode::Module(_)
            | ResolvedNode::ImportedName(_) => result.push((location, EdgeKind::Strong)),

            // a group reference pulls in the member functions, which are
            // what actually appears in the ordering universe
            ResolvedNode::OverloadGroup(group) => {
                result.push((location, EdgeKind::Strong));
                for overload in group.overloads.iter() {
                    result.push((*overload, EdgeKind::Strong));
                }
            }

            ResolvedNode::Call(call) => {
                self.collect_expression(call.callable, result);
                for argument in call.arguments.iter() {
                    self.collect_expression(*argument, result);
                }
                for (_, argument) in call.keyword_arguments.iter() {
                    self.collect_expression(*argument, result);
                }
            }
            ResolvedNode::MemberAccess(access) => self.collect_expression(access.object, result),
            ResolvedNode::Binary(binary) => {
                self.collect_expression(binary.left, result);
                self.collect_expression(binary.right, result);
            }
            ResolvedNode::Unary(unary) => self.collect_expression(unary.operand, result),
            ResolvedNode::Assign(assign) => {
                self.collect_expression(assign.target, result);
                self.collect_expression(assign.value, result);
            }
            _ => {}
        }
    }
}

/// Computes the build order of a document's top-level nodes.
///
/// Returns equivalence classes of mutually recursive nodes in dependency
/// order. A class whose recursion runs through a strong edge is an
/// unbreakable cycle and is reported as an error.
pub fn build_order(
    ctx: &CompilationContext,
    top_level: &[NodeLocation],
) -> Result<Vec<Vec<NodeLocation>>, ZsError> {
    let mut finder = DependencyFinder::new(ctx);

    let mut universe: IndexSet<NodeLocation> = IndexSet::new();
    for node in top_level.iter() {
        universe.insert(*node);
    }
    for node in top_level.iter() {
        for extra in finder.flatten_tree(*node) {
            universe.insert(extra);
        }
    }

    let mut edges: IndexMap<NodeLocation, Vec<(NodeLocation, EdgeKind)>> = IndexMap::new();
    for node in universe.iter() {
        let dependencies = finder
            .find_dependencies(*node)
            .into_iter()
            .filter(|(target, _)| universe.contains(target) && target != node)
            .collect();
        edges.insert(*node, dependencies);
    }

    let components = strongly_connected_components(&universe, &edges);

    // a strong edge between two members of one component cannot be broken
    // by the declare/define split
    for component in components.iter() {
        if component.len() < 2 {
            continue;
        }
        let members: IndexSet<NodeLocation> = component.iter().copied().collect();
        for member in component.iter() {
            for (target, kind) in edges.get(member).into_iter().flatten() {
                if *kind == EdgeKind::Strong && members.contains(target) {
                    let names = component
                        .iter()
                        .map(|node| {
                            ctx.nodes
                                .get(*node)
                                .name()
                                .map(|name| name.to_string())
                                .unwrap_or_else(|| "<unnamed>".to_string())
                        })
                        .collect::<Vec<_>>()
                        .join(" -> ");
                    let span = ctx
                        .nodes
                        .get(*member)
                        .span()
                        .expect("cyclic definitions have source spans");
                    return Err(ZsError::DependencyCycle(
                        DependencyCycle {
                            cycle: names,
                            position: span.position.clone().into(),
                            code: (&span.file).into(),
                        }
                        .into(),
                    ));
                }
            }
        }
    }

    Ok(components)
}

/// Tarjan's algorithm over the universe in insertion order. With edges
/// pointing from a node to its dependencies, components finish dependencies
/// first, so the output list is already in dependency order.
fn strongly_connected_components(
    universe: &IndexSet<NodeLocation>,
    edges: &IndexMap<NodeLocation, Vec<(NodeLocation, EdgeKind)>>,
) -> Vec<Vec<NodeLocation>> {
    struct Tarjan<'a> {
        edges: &'a IndexMap<NodeLocation, Vec<(NodeLocation, EdgeKind)>>,
        index: usize,
        indices: IndexMap<NodeLocation, usize>,
        low_links: IndexMap<NodeLocation, usize>,
        on_stack: IndexSet<NodeLocation>,
        stack: Vec<NodeLocation>,
        components: Vec<Vec<NodeLocation>>,
    }

    impl Tarjan<'_> {
        fn visit(&mut self, node: NodeLocation) {
            self.indices.insert(node, self.index);
            self.low_links.insert(node, self.index);
            self.index += 1;
            self.stack.push(node);
            self.on_stack.insert(node);

            for (target, _) in self.edges.get(&node).into_iter().flatten() {
                if !self.indices.contains_key(target) {
                    self.visit(*target);
                    let target_low = self.low_links[target];
                    let low = self.low_links[&node].min(target_low);
                    self.low_links.insert(node, low);
                } else if self.on_stack.contains(target) {
                    let low = self.low_links[&node].min(self.indices[target]);
                    self.low_links.insert(node, low);
                }
            }

            if self.low_links[&node] == self.indices[&node] {
                let mut component = Vec::new();
                while let Some(member) = self.stack.pop() {
                    self.on_stack.swap_remove(&member);
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                component.reverse();
                self.components.push(component);
            }
        }
    }

    let mut tarjan = Tarjan {
        edges,
        index: 0,
        indices: IndexMap::new(),
        low_links: IndexMap::new(),
        on_stack: IndexSet::new(),
        stack: Vec::new(),
        components: Vec::new(),
    };

    for node in universe.iter() {
        if !tarjan.indices.contains_key(node) {
            tarjan.visit(*node);
        }
    }

    // Tarjan emits a component only after everything it depends on; that is
    // already dependency order for our edge direction (node -> dependency)
    // because dependencies get their own components first
    tarjan.components
}
