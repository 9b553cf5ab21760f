//! Abstract Syntax Tree definitions for the Z# language.
//!
//! The AST is pure data produced by the parser: a tagged union over every
//! language construct, with child nodes behind `Rc` so later passes (the
//! resolver keeps a link from every resolved node back to its AST node) can
//! share them without copying. Every node carries a [`Span`] and a stable
//! [`AstIndex`] assigned at construction; caches are keyed by that index,
//! never by pointer identity.

use std::rc::Rc;

use strum_macros::EnumDiscriminants;

use crate::span::Span;

/// Unique identifier for AST nodes within a compilation unit.
#[derive(PartialEq, Debug, Copy, Clone, Eq, PartialOrd, Ord, Hash)]
pub struct AstIndex(pub usize);

/// One AST node: stable index, source span and the construct itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Ast {
    pub index: AstIndex,
    pub span: Span,
    pub kind: AstKind,
}

impl Ast {
    pub fn new(index: AstIndex, span: Span, kind: AstKind) -> Self {
        Self { index, span, kind }
    }
}

/// The tagged union over all language constructs.
#[derive(Debug, Clone, PartialEq, EnumDiscriminants)]
#[strum_discriminants(name(AstKindDiscriminants))]
pub enum AstKind {
    Literal(LiteralAst),
    Identifier(IdentifierAst),
    MemberAccess(MemberAccessAst),
    Call(CallAst),
    Assign(AssignAst),
    Binary(BinaryAst),
    Unary(UnaryAst),
    Block(BlockAst),
    If(IfAst),
    While(WhileAst),
    When(WhenAst),
    Break(BreakAst),
    Continue(ContinueAst),
    Return(ReturnAst),
    Var(VarAst),
    Set(SetAst),
    Parameter(ParameterAst),
    Function(FunctionAst),
    Class(ClassAst),
    Typeclass(TypeclassAst),
    TypeclassImpl(TypeclassImplAst),
    Module(ModuleAst),
    Import(ImportAst),
    Export(ExportAst),
    ExpressionStatement(ExpressionStatementAst),
}

/// The literal kinds as they come out of the lexer; decoding into typed
/// values happens in the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    String,
    Character,
    Hex,
    Decimal,
    Real,
    True,
    False,
    Null,
    Unit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiteralAst {
    pub kind: LiteralKind,
    /// Raw lexeme, including quotes and numeric suffixes
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdentifierAst {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberAccessAst {
    pub object: Rc<Ast>,
    pub member: IdentifierAst,
}

/// Which bracket pair was used at a call site. `()`, `[]` and `{}` are
/// distinct call operators resolved through the callable protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallBracket {
    Curvy,
    Square,
    Curly,
}

impl CallBracket {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallBracket::Curvy => "()",
            CallBracket::Square => "[]",
            CallBracket::Curly => "{}",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallAst {
    pub callable: Rc<Ast>,
    pub bracket: CallBracket,
    pub arguments: Vec<Rc<Ast>>,
    pub keyword_arguments: Vec<(IdentifierAst, Rc<Ast>)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignAst {
    pub target: Rc<Ast>,
    pub value: Rc<Ast>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryAst {
    pub left: Rc<Ast>,
    pub operator: String,
    pub operator_span: Span,
    pub right: Rc<Ast>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryAst {
    pub operator: String,
    pub operator_span: Span,
    pub operand: Rc<Ast>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockAst {
    pub statements: Vec<Rc<Ast>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfAst {
    pub label: Option<IdentifierAst>,
    pub condition: Rc<Ast>,
    pub if_true: Rc<Ast>,
    pub if_false: Option<Rc<Ast>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileAst {
    pub label: Option<IdentifierAst>,
    pub condition: Rc<Ast>,
    pub body: Rc<Ast>,
    pub else_body: Option<Rc<Ast>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhenCaseAst {
    pub expression: Rc<Ast>,
    pub body: Rc<Ast>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhenAst {
    pub label: Option<IdentifierAst>,
    pub subject: Rc<Ast>,
    pub cases: Vec<WhenCaseAst>,
    pub else_body: Option<Rc<Ast>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreakAst {
    pub label: Option<IdentifierAst>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContinueAst {
    pub label: Option<IdentifierAst>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnAst {
    pub expression: Option<Rc<Ast>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarAst {
    pub name: IdentifierAst,
    pub var_type: Option<Rc<Ast>>,
    pub initializer: Option<Rc<Ast>>,
}

/// `set name = expression;` — rebinds an already-defined name.
#[derive(Debug, Clone, PartialEq)]
pub struct SetAst {
    pub name: IdentifierAst,
    pub value: Rc<Ast>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterAst {
    pub name: IdentifierAst,
    pub alias: Option<IdentifierAst>,
    pub parameter_type: Option<Rc<Ast>>,
    pub default_value: Option<Rc<Ast>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionAst {
    pub name: Option<IdentifierAst>,
    pub generic_parameters: Option<Vec<IdentifierAst>>,
    /// Parameters are `Ast` nodes with [`AstKind::Parameter`]
    pub positional_parameters: Vec<Rc<Ast>>,
    pub named_parameters: Vec<Rc<Ast>>,
    pub variadic_positional_parameter: Option<Rc<Ast>>,
    pub variadic_named_parameter: Option<Rc<Ast>>,
    pub return_type: Option<Rc<Ast>>,
    /// `None` for bodyless declarations (`fun f();`)
    pub body: Option<Vec<Rc<Ast>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassAst {
    pub name: Option<IdentifierAst>,
    pub generic_parameters: Option<Vec<IdentifierAst>>,
    /// Base expressions after `<`; the first class among them becomes the
    /// base class, the rest must be typeclasses
    pub bases: Vec<Rc<Ast>>,
    pub items: Vec<Rc<Ast>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeclassAst {
    pub name: IdentifierAst,
    pub items: Vec<Rc<Ast>>,
}

/// `typeclass Name(Type) { ... }` — an implementation of `Name` for `Type`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeclassImplAst {
    pub name: IdentifierAst,
    pub implemented_type: Rc<Ast>,
    pub items: Vec<Rc<Ast>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleAst {
    pub name: Option<IdentifierAst>,
    pub items: Vec<Rc<Ast>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportNameAst {
    pub name: IdentifierAst,
    pub alias: Option<IdentifierAst>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportNames {
    /// `import * from ...` with an optional `as` alias
    All { alias: Option<IdentifierAst> },
    /// `import { a, b as c } from ...`
    Named(Vec<ImportNameAst>),
    /// `import "source";` — run the document for its side effects only
    SourceOnly,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportAst {
    pub names: ImportNames,
    pub source: Rc<Ast>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportItems {
    /// `export * from ...`; `* as alias` is rejected later
    All { alias: Option<IdentifierAst> },
    /// `export { a, b as c } from ...`
    Named(Vec<ImportNameAst>),
    /// `export fun ... { }` and friends
    Declaration(Rc<Ast>),
    /// `export name;`
    Name(IdentifierAst),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportAst {
    pub items: ExportItems,
    pub source: Option<Rc<Ast>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionStatementAst {
    pub expression: Rc<Ast>,
}

impl AstKind {
    /// Display name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            AstKind::Literal(_) => "literal",
            AstKind::Identifier(_) => "identifier",
            AstKind::MemberAccess(_) => "member access",
            AstKind::Call(_) => "call",
            AstKind::Assign(_) => "assignment",
            AstKind::Binary(_) => "binary expression",
            AstKind::Unary(_) => "unary expression",
            AstKind::Block(_) => "block",
            AstKind::If(_) => "if",
            AstKind::While(_) => "while",
            AstKind::When(_) => "when",
            AstKind::Break(_) => "break",
            AstKind::Continue(_) => "continue",
            AstKind::Return(_) => "return",
            AstKind::Var(_) => "var",
            AstKind::Set(_) => "set",
            AstKind::Parameter(_) => "parameter",
            AstKind::Function(_) => "function",
            AstKind::Class(_) => "class",
            AstKind::Typeclass(_) => "typeclass",
            AstKind::TypeclassImpl(_) => "typeclass implementation",
            AstKind::Module(_) => "module",
            AstKind::Import(_) => "import",
            AstKind::Export(_) => "export",
            AstKind::ExpressionStatement(_) => "expression statement",
        }
    }
}
