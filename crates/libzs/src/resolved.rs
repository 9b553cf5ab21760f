//! The resolved AST: a semantic twin of the syntax tree.
//!
//! Resolved nodes live in a single arena and reference each other through
//! [`NodeLocation`] indices. Every node keeps a link to the AST node it came
//! from. Nodes are created by the resolver's registry pass, mutated by the
//! name-linker and the compiler, and frozen once their object is defined.

use std::rc::Rc;

use strum_macros::EnumDiscriminants;

use crate::{
    ast::{Ast, CallBracket},
    objects::Value,
    scope::ScopeLocation,
    span::Span,
};

/// A unique identifier for a resolved node within the compilation context.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeLocation(pub usize);

impl From<usize> for NodeLocation {
    fn from(location: usize) -> Self {
        NodeLocation(location)
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedModule {
    pub ast: Rc<Ast>,
    pub name: Option<String>,
    pub items: Vec<NodeLocation>,
    pub scope: ScopeLocation,
}

#[derive(Debug, Clone)]
pub struct ResolvedClass {
    pub ast: Rc<Ast>,
    pub name: Option<String>,
    pub generic_parameters: Vec<NodeLocation>,
    pub bases: Vec<NodeLocation>,
    pub items: Vec<NodeLocation>,
    /// Scope holding the generic parameters; wraps the body scope
    pub signature_scope: ScopeLocation,
    pub body_scope: ScopeLocation,
}

#[derive(Debug, Clone)]
pub struct ResolvedFunction {
    pub ast: Rc<Ast>,
    pub name: Option<String>,
    pub generic_parameters: Vec<NodeLocation>,
    pub positional_parameters: Vec<NodeLocation>,
    pub named_parameters: Vec<NodeLocation>,
    pub variadic_positional_parameter: Option<NodeLocation>,
    pub variadic_named_parameter: Option<NodeLocation>,
    pub return_type: Option<NodeLocation>,
    /// The body wrapper node; `None` for bodyless declarations
    pub body: Option<NodeLocation>,
    pub scope: ScopeLocation,
    /// Set when this function is a class member
    pub owner_class: Option<NodeLocation>,
}

/// Wrapper holding a function's body statements once the linker has
/// registered them (bodies are registered lazily, inside the function's
/// scope).
#[derive(Debug, Clone)]
pub struct ResolvedFunctionBody {
    pub function: NodeLocation,
    pub instructions: Option<Vec<NodeLocation>>,
}

#[derive(Debug, Clone)]
pub struct ResolvedParameter {
    pub ast: Rc<Ast>,
    pub name: String,
    pub alias: Option<String>,
    pub parameter_type: Option<NodeLocation>,
    pub initializer: Option<NodeLocation>,
}

#[derive(Debug, Clone)]
pub struct ResolvedGenericParameter {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ResolvedVar {
    pub ast: Rc<Ast>,
    pub name: String,
    pub var_type: Option<NodeLocation>,
    pub initializer: Option<NodeLocation>,
}

#[derive(Debug, Clone)]
pub struct ResolvedSet {
    pub ast: Rc<Ast>,
    pub name: String,
    /// The node the name resolved to
    pub target: Option<NodeLocation>,
    pub value: NodeLocation,
}

#[derive(Debug, Clone)]
pub struct ResolvedOverloadGroup {
    pub name: String,
    /// Group of the same name visible from the enclosing scope
    pub parent: Option<NodeLocation>,
    pub overloads: Vec<NodeLocation>,
    /// The scope the group was created in
    pub defining_scope: ScopeLocation,
}

#[derive(Debug, Clone)]
pub struct ResolvedImportedName {
    pub name: String,
    pub origin: String,
    pub span: Span,
    pub import: NodeLocation,
}

#[derive(Debug, Clone)]
pub struct ResolvedImport {
    pub ast: Rc<Ast>,
    pub source: NodeLocation,
    pub imported_names: Vec<NodeLocation>,
    /// `import * from ...`
    pub import_all: bool,
}

#[derive(Debug, Clone)]
pub enum ResolvedExportItems {
    All,
    Named(Vec<(String, String)>),
    Declaration(NodeLocation),
    Name(String),
}

#[derive(Debug, Clone)]
pub struct ResolvedExport {
    pub ast: Rc<Ast>,
    pub items: ResolvedExportItems,
    pub source: Option<NodeLocation>,
}

#[derive(Debug, Clone)]
pub struct ResolvedTypeclass {
    pub ast: Rc<Ast>,
    pub name: String,
    pub items: Vec<NodeLocation>,
    pub scope: ScopeLocation,
}

#[derive(Debug, Clone)]
pub struct ResolvedTypeclassImpl {
    pub ast: Rc<Ast>,
    pub name: String,
    /// The typeclass node the name resolved to
    pub typeclass: Option<NodeLocation>,
    pub implemented_type: NodeLocation,
    pub items: Vec<NodeLocation>,
    pub scope: ScopeLocation,
}

/// A resolved compile-time value (decoded literal or imported object).
#[derive(Debug, Clone)]
pub struct ResolvedObject {
    pub value: Value,
    pub span: Option<Span>,
}

#[derive(Debug, Clone)]
pub struct ResolvedIdentifier {
    pub ast: Rc<Ast>,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedAssign {
    pub ast: Rc<Ast>,
    pub target: NodeLocation,
    pub value: NodeLocation,
}

#[derive(Debug, Clone)]
pub struct ResolvedBinary {
    pub ast: Rc<Ast>,
    pub operator: String,
    pub operator_span: Span,
    pub left: NodeLocation,
    pub right: NodeLocation,
}

#[derive(Debug, Clone)]
pub struct ResolvedUnary {
    pub ast: Rc<Ast>,
    pub operator: String,
    pub operator_span: Span,
    pub operand: NodeLocation,
}

#[derive(Debug, Clone)]
pub struct ResolvedBlock {
    pub ast: Rc<Ast>,
    pub body: Vec<NodeLocation>,
}

#[derive(Debug, Clone)]
pub struct ResolvedBreak {
    pub ast: Rc<Ast>,
    pub label: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedContinue {
    pub ast: Rc<Ast>,
    pub label: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedIf {
    pub ast: Rc<Ast>,
    pub condition: NodeLocation,
    pub if_body: NodeLocation,
    pub else_body: Option<NodeLocation>,
}

#[derive(Debug, Clone)]
pub struct ResolvedWhile {
    pub ast: Rc<Ast>,
    pub label: Option<String>,
    pub condition: NodeLocation,
    pub body: NodeLocation,
    pub else_body: Option<NodeLocation>,
    pub scope: ScopeLocation,
}

#[derive(Debug, Clone)]
pub struct ResolvedWhen {
    pub ast: Rc<Ast>,
    pub label: Option<String>,
    pub subject: NodeLocation,
    pub cases: Vec<(NodeLocation, NodeLocation)>,
    pub else_body: Option<NodeLocation>,
}

#[derive(Debug, Clone)]
pub struct ResolvedReturn {
    pub ast: Rc<Ast>,
    pub expression: Option<NodeLocation>,
}

#[derive(Debug, Clone)]
pub struct ResolvedCall {
    pub ast: Rc<Ast>,
    pub callable: NodeLocation,
    pub bracket: CallBracket,
    pub arguments: Vec<NodeLocation>,
    pub keyword_arguments: Vec<(String, NodeLocation)>,
}

#[derive(Debug, Clone)]
pub struct ResolvedMemberAccess {
    pub ast: Rc<Ast>,
    pub object: NodeLocation,
    pub member: String,
    pub member_span: Span,
}

#[derive(Debug, Clone)]
pub struct ResolvedExpressionStatement {
    pub ast: Rc<Ast>,
    pub expression: NodeLocation,
}

/// All resolved node kinds, tagged.
#[derive(Debug, Clone, EnumDiscriminants)]
#[strum_discriminants(name(ResolvedNodeKind))]
pub enum ResolvedNode {
    Module(ResolvedModule),
    Class(ResolvedClass),
    Function(ResolvedFunction),
    FunctionBody(ResolvedFunctionBody),
    Parameter(ResolvedParameter),
    GenericParameter(ResolvedGenericParameter),
    Var(ResolvedVar),
    Set(ResolvedSet),
    OverloadGroup(ResolvedOverloadGroup),
    Import(ResolvedImport),
    ImportedName(ResolvedImportedName),
    Export(ResolvedExport),
    Typeclass(ResolvedTypeclass),
    TypeclassImpl(ResolvedTypeclassImpl),
    Object(ResolvedObject),
    Identifier(ResolvedIdentifier),
    Assign(ResolvedAssign),
    Binary(ResolvedBinary),
    Unary(ResolvedUnary),
    Block(ResolvedBlock),
    Break(ResolvedBreak),
    Continue(ResolvedContinue),
    If(ResolvedIf),
    While(ResolvedWhile),
    When(ResolvedWhen),
    Return(ResolvedReturn),
    Call(ResolvedCall),
    MemberAccess(ResolvedMemberAccess),
    ExpressionStatement(ResolvedExpressionStatement),
}

impl ResolvedNode {
    /// The source span of the node, when one is known.
    pub fn span(&self) -> Option<Span> {
        match self {
            ResolvedNode::Module(node) => Some(node.ast.span.clone()),
            ResolvedNode::Class(node) => Some(node.ast.span.clone()),
            ResolvedNode::Function(node) => Some(node.ast.span.clone()),
            ResolvedNode::FunctionBody(_) => None,
            ResolvedNode::Parameter(node) => Some(node.ast.span.clone()),
            ResolvedNode::GenericParameter(node) => Some(node.span.clone()),
            ResolvedNode::Var(node) => Some(node.ast.span.clone()),
            ResolvedNode::Set(node) => Some(node.ast.span.clone()),
            ResolvedNode::OverloadGroup(_) => None,
            ResolvedNode::Import(node) => Some(node.ast.span.clone()),
            ResolvedNode::ImportedName(node) => Some(node.span.clone()),
            ResolvedNode::Export(node) => Some(node.ast.span.clone()),
            ResolvedNode::Typeclass(node) => Some(node.ast.span.clone()),
            ResolvedNode::TypeclassImpl(node) => Some(node.ast.span.clone()),
            ResolvedNode::Object(node) => node.span.clone(),
            ResolvedNode::Identifier(node) => Some(node.ast.span.clone()),
            ResolvedNode::Assign(node) => Some(node.ast.span.clone()),
            ResolvedNode::Binary(node) => Some(node.ast.span.clone()),
            ResolvedNode::Unary(node) => Some(node.ast.span.clone()),
            ResolvedNode::Block(node) => Some(node.ast.span.clone()),
            ResolvedNode::Break(node) => Some(node.ast.span.clone()),
            ResolvedNode::Continue(node) => Some(node.ast.span.clone()),
            ResolvedNode::If(node) => Some(node.ast.span.clone()),
            ResolvedNode::While(node) => Some(node.ast.span.clone()),
            ResolvedNode::When(node) => Some(node.ast.span.clone()),
            ResolvedNode::Return(node) => Some(node.ast.span.clone()),
            ResolvedNode::Call(node) => Some(node.ast.span.clone()),
            ResolvedNode::MemberAccess(node) => Some(node.ast.span.clone()),
            ResolvedNode::ExpressionStatement(node) => Some(node.ast.span.clone()),
        }
    }

    /// The declared name, for nodes that have one.
    pub fn name(&self) -> Option<&str> {
        match self {
            ResolvedNode::Module(node) => node.name.as_deref(),
            ResolvedNode::Class(node) => node.name.as_deref(),
            ResolvedNode::Function(node) => node.name.as_deref(),
            ResolvedNode::Parameter(node) => Some(&node.name),
            ResolvedNode::GenericParameter(node) => Some(&node.name),
            ResolvedNode::Var(node) => Some(&node.name),
            ResolvedNode::OverloadGroup(node) => Some(&node.name),
            ResolvedNode::ImportedName(node) => Some(&node.name),
            ResolvedNode::Typeclass(node) => Some(&node.name),
            ResolvedNode::TypeclassImpl(node) => Some(&node.name),
            _ => None,
        }
    }
}

/// Arena of all resolved nodes in one compilation context.
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: Vec<ResolvedNode>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: ResolvedNode) -> NodeLocation {
        let location = NodeLocation(self.nodes.len());
        self.nodes.push(node);
        location
    }

    pub fn get(&self, location: NodeLocation) -> &ResolvedNode {
        &self.nodes[location.0]
    }

    pub fn get_mut(&mut self, location: NodeLocation) -> &mut ResolvedNode {
        &mut self.nodes[location.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeLocation, &ResolvedNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (NodeLocation(index), node))
    }
}
