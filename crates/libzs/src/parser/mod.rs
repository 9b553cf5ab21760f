//! The Z# parser: token stream to AST.
//!
//! Statements are dispatched on their leading token; expressions go through
//! the Pratt core in [`expression`]. `typeclass`, `export`, `set` and
//! `return` are soft keywords recognized by lexeme, matching the reference
//! grammar. A parse error skips the offending token and parsing continues
//! with the next statement; all problems of a document are reported together.

use std::rc::Rc;

use crate::{
    ast::{
        Ast, AstIndex, AstKind, BlockAst, BreakAst, ClassAst, ContinueAst, ExportAst,
        ExportItems, ExpressionStatementAst, FunctionAst, IdentifierAst, IfAst, ImportAst,
        ImportNameAst, ImportNames, ModuleAst, ParameterAst, ReturnAst, SetAst, TypeclassAst,
        TypeclassImplAst, VarAst, WhenAst, WhenCaseAst, WhileAst,
    },
    error::{SyntaxErrorItem, ZsError},
    file::SourceFile,
    span::Span,
    token::{Keyword, Token, TokenKind},
};

mod expression;

/// Internal parse failure; becomes a [`SyntaxErrorItem`] on report.
#[derive(Debug, Clone)]
pub(crate) struct ParseFailure {
    pub position: std::ops::Range<usize>,
    pub message: String,
}

pub(crate) type ParseResult<T> = Result<T, ParseFailure>;

pub struct Parser<'tokens> {
    tokens: &'tokens [Token],
    position: usize,
    file: SourceFile,
    next_index: usize,
    /// Curly calls are disabled while parsing class bases and return types,
    /// where `{` starts the following body instead.
    pub(crate) allow_curly_call: bool,
}

/// Parses a whole document into its top-level AST nodes.
pub fn parse(file: &SourceFile, tokens: &[Token]) -> Result<Vec<Rc<Ast>>, ZsError> {
    let mut parser = Parser::new(file.clone(), tokens);
    let mut nodes = Vec::new();
    let mut errors = Vec::new();

    while !parser.at_eof() {
        match parser.parse_statement() {
            Ok(node) => nodes.push(node),
            Err(failure) => {
                errors.push(SyntaxErrorItem {
                    position: failure.position.into(),
                    code: file.into(),
                    message: failure.message,
                });
                // recover by skipping the offending token
                parser.bump();
            }
        }
    }

    if errors.is_empty() {
        Ok(nodes)
    } else {
        Err(ZsError::syntax_error(errors))
    }
}

impl<'tokens> Parser<'tokens> {
    pub fn new(file: SourceFile, tokens: &'tokens [Token]) -> Self {
        Self {
            tokens,
            position: 0,
            file,
            next_index: 0,
            allow_curly_call: true,
        }
    }

    // region token access

    pub(crate) fn peek(&self) -> &Token {
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    pub(crate) fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    pub(crate) fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
        token
    }

    pub(crate) fn failure(&self, message: impl Into<String>) -> ParseFailure {
        ParseFailure {
            position: self.peek().span.position.clone(),
            message: message.into(),
        }
    }

    pub(crate) fn eat(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.peek().kind == kind {
            Ok(self.bump())
        } else {
            Err(self.failure(format!("expected {kind:?}, found '{}'", self.peek())))
        }
    }

    pub(crate) fn eat_keyword(&mut self, keyword: Keyword) -> ParseResult<Token> {
        self.eat(TokenKind::Keyword(keyword))
    }

    pub(crate) fn eat_operator(&mut self, lexeme: &str) -> ParseResult<Token> {
        if self.peek().is_operator(lexeme) {
            Ok(self.bump())
        } else {
            Err(self.failure(format!("expected '{lexeme}', found '{}'", self.peek())))
        }
    }

    pub(crate) fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    pub(crate) fn at_operator(&self, lexeme: &str) -> bool {
        self.peek().is_operator(lexeme)
    }

    /// True for an identifier token with the given soft-keyword lexeme.
    pub(crate) fn at_word(&self, word: &str) -> bool {
        self.peek().kind == TokenKind::Identifier && self.peek().text() == word
    }

    fn eat_word(&mut self, word: &str) -> ParseResult<Token> {
        if self.at_word(word) {
            Ok(self.bump())
        } else {
            Err(self.failure(format!("expected '{word}', found '{}'", self.peek())))
        }
    }

    pub(crate) fn checkpoint(&self) -> usize {
        self.position
    }

    pub(crate) fn rewind(&mut self, checkpoint: usize) {
        self.position = checkpoint;
    }

    /// Consumes the token if present; reports whether it was.
    pub(crate) fn eat_if(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn previous_span(&self) -> Span {
        let index = self.position.saturating_sub(1);
        self.tokens[index].span.clone()
    }

    pub(crate) fn make(&mut self, start: &Span, kind: AstKind) -> Rc<Ast> {
        let index = AstIndex(self.next_index);
        self.next_index += 1;
        let span = start.merge(&self.previous_span());
        Rc::new(Ast::new(index, span, kind))
    }

    /// True when the token can serve as a name: identifiers, plus reserved
    /// words that have no grammar role of their own (`value`, `let`, ...).
    pub(crate) fn at_name(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Identifier
                | TokenKind::Keyword(
                    Keyword::Value
                        | Keyword::Let
                        | Keyword::In
                        | Keyword::For
                        | Keyword::Where
                        | Keyword::Using
                        | Keyword::Try
                        | Keyword::Catch
                        | Keyword::Finally
                )
        )
    }

    pub(crate) fn identifier(&mut self) -> ParseResult<IdentifierAst> {
        if !self.at_name() {
            return Err(self.failure(format!("expected an identifier, found '{}'", self.peek())));
        }
        let token = self.bump();
        Ok(IdentifierAst {
            name: token.text().to_string(),
            span: token.span,
        })
    }

    // endregion

    // region statements

    pub fn parse_statement(&mut self) -> ParseResult<Rc<Ast>> {
        match self.peek().kind {
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::While) => self.parse_while(),
            TokenKind::Keyword(Keyword::When) => self.parse_when(),
            TokenKind::Keyword(Keyword::Break) => self.parse_break(),
            TokenKind::Keyword(Keyword::Continue) => self.parse_continue(),
            TokenKind::Keyword(Keyword::Var) => self.parse_var(),
            TokenKind::Keyword(Keyword::Fun) => self.parse_function(),
            TokenKind::Keyword(Keyword::Class) => self.parse_class(),
            TokenKind::Keyword(Keyword::Module) => self.parse_module(),
            TokenKind::Keyword(Keyword::Import) => self.parse_import(),
            TokenKind::LeftCurly => self.parse_block(),
            TokenKind::Identifier if self.at_word("return") => self.parse_return(),
            TokenKind::Identifier if self.at_word("typeclass") => self.parse_typeclass(),
            TokenKind::Identifier if self.at_word("export") => self.parse_export(),
            TokenKind::Identifier if self.at_word("set") => self.parse_set(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_expression_statement(&mut self) -> ParseResult<Rc<Ast>> {
        let start = self.peek().span.clone();
        let expression = self.parse_expression(0)?;
        self.eat(TokenKind::Semicolon)?;
        Ok(self.make(&start, AstKind::ExpressionStatement(ExpressionStatementAst { expression })))
    }

    fn parse_block(&mut self) -> ParseResult<Rc<Ast>> {
        let start = self.eat(TokenKind::LeftCurly)?.span;
        let mut statements = Vec::new();
        while !self.at(TokenKind::RightCurly) && !self.at_eof() {
            statements.push(self.parse_statement()?);
        }
        self.eat(TokenKind::RightCurly)?;
        Ok(self.make(&start, AstKind::Block(BlockAst { statements })))
    }

    fn optional_label(&mut self) -> Option<IdentifierAst> {
        if self.at(TokenKind::Identifier) {
            self.identifier().ok()
        } else {
            None
        }
    }

    fn parse_if(&mut self) -> ParseResult<Rc<Ast>> {
        let start = self.eat_keyword(Keyword::If)?.span;
        let label = self.optional_label();
        self.eat(TokenKind::LeftCurvy)?;
        let condition = self.parse_expression(0)?;
        self.eat(TokenKind::RightCurvy)?;
        let if_true = self.parse_statement()?;
        let if_false = if self.eat_if(TokenKind::Keyword(Keyword::Else)) {
            Some(self.parse_statement()?)
        } else {
            None
        };
        Ok(self.make(&start, AstKind::If(IfAst { label, condition, if_true, if_false })))
    }

    fn parse_while(&mut self) -> ParseResult<Rc<Ast>> {
        let start = self.eat_keyword(Keyword::While)?.span;
        let label = self.optional_label();
        self.eat(TokenKind::LeftCurvy)?;
        let condition = self.parse_expression(0)?;
        self.eat(TokenKind::RightCurvy)?;
        let body = self.parse_statement()?;
        let else_body = if self.eat_if(TokenKind::Keyword(Keyword::Else)) {
            Some(self.parse_statement()?)
        } else {
            None
        };
        Ok(self.make(&start, AstKind::While(WhileAst { label, condition, body, else_body })))
    }

    fn parse_when(&mut self) -> ParseResult<Rc<Ast>> {
        let start = self.eat_keyword(Keyword::When)?.span;
        let label = self.optional_label();
        self.eat(TokenKind::LeftCurvy)?;
        let subject = self.parse_expression(0)?;
        self.eat(TokenKind::RightCurvy)?;
        self.eat(TokenKind::LeftCurly)?;

        let mut cases = Vec::new();
        while !self.at(TokenKind::RightCurly) && !self.at_eof() {
            self.eat_keyword(Keyword::Case)?;
            self.eat(TokenKind::LeftCurvy)?;
            let expression = self.parse_expression(0)?;
            self.eat(TokenKind::RightCurvy)?;
            let body = self.parse_statement()?;
            cases.push(WhenCaseAst { expression, body });
        }
        self.eat(TokenKind::RightCurly)?;

        let else_body = if self.eat_if(TokenKind::Keyword(Keyword::Else)) {
            Some(self.parse_statement()?)
        } else {
            None
        };

        Ok(self.make(&start, AstKind::When(WhenAst { label, subject, cases, else_body })))
    }

    fn parse_break(&mut self) -> ParseResult<Rc<Ast>> {
        let start = self.eat_keyword(Keyword::Break)?.span;
        let label = if !self.at(TokenKind::Semicolon) {
            Some(self.identifier()?)
        } else {
            None
        };
        self.eat(TokenKind::Semicolon)?;
        Ok(self.make(&start, AstKind::Break(BreakAst { label })))
    }

    fn parse_continue(&mut self) -> ParseResult<Rc<Ast>> {
        let start = self.eat_keyword(Keyword::Continue)?.span;
        let label = if !self.at(TokenKind::Semicolon) {
            Some(self.identifier()?)
        } else {
            None
        };
        self.eat(TokenKind::Semicolon)?;
        Ok(self.make(&start, AstKind::Continue(ContinueAst { label })))
    }

    fn parse_return(&mut self) -> ParseResult<Rc<Ast>> {
        let start = self.eat_word("return")?.span;
        let expression = if !self.at(TokenKind::Semicolon) {
            Some(self.parse_expression(0)?)
        } else {
            None
        };
        self.eat(TokenKind::Semicolon)?;
        Ok(self.make(&start, AstKind::Return(ReturnAst { expression })))
    }

    fn parse_var(&mut self) -> ParseResult<Rc<Ast>> {
        let start = self.eat_keyword(Keyword::Var)?.span;
        let name = self.identifier()?;

        let var_type = if self.eat_if(TokenKind::Colon) {
            Some(self.parse_expression(expression::TYPE_BINDING_POWER)?)
        } else {
            None
        };

        let initializer = if self.at_operator("=") {
            self.eat_operator("=")?;
            Some(self.parse_expression(0)?)
        } else {
            None
        };

        self.eat(TokenKind::Semicolon)?;
        Ok(self.make(&start, AstKind::Var(VarAst { name, var_type, initializer })))
    }

    fn parse_set(&mut self) -> ParseResult<Rc<Ast>> {
        let start = self.eat_word("set")?.span;
        let name = self.identifier()?;
        self.eat_operator("=")?;
        let value = self.parse_expression(0)?;
        self.eat(TokenKind::Semicolon)?;
        Ok(self.make(&start, AstKind::Set(SetAst { name, value })))
    }

    fn parse_parameter(&mut self) -> ParseResult<Rc<Ast>> {
        let start = self.peek().span.clone();
        let name = self.identifier()?;

        let alias = if self.at(TokenKind::Keyword(Keyword::As)) {
            self.eat_keyword(Keyword::As)?;
            Some(self.identifier()?)
        } else {
            None
        };

        let parameter_type = if self.eat_if(TokenKind::Colon) {
            Some(self.parse_expression(expression::TYPE_BINDING_POWER)?)
        } else {
            None
        };

        let default_value = if self.at_operator("=") {
            self.eat_operator("=")?;
            Some(self.parse_expression(0)?)
        } else {
            None
        };

        Ok(self.make(&start, AstKind::Parameter(ParameterAst { name, alias, parameter_type, default_value })))
    }

    fn parse_generic_list(&mut self) -> ParseResult<Option<Vec<IdentifierAst>>> {
        if !self.at(TokenKind::LeftSquare) {
            return Ok(None);
        }
        self.eat(TokenKind::LeftSquare)?;
        let mut parameters = Vec::new();
        while !self.at(TokenKind::RightSquare) {
            parameters.push(self.identifier()?);
            if !self.eat_if(TokenKind::Comma) {
                break;
            }
        }
        self.eat(TokenKind::RightSquare)?;
        Ok(Some(parameters))
    }

    pub(crate) fn parse_function(&mut self) -> ParseResult<Rc<Ast>> {
        let start = self.eat_keyword(Keyword::Fun)?.span;

        let name = if self.at(TokenKind::Identifier) {
            Some(self.identifier()?)
        } else if self.at(TokenKind::String) {
            let token = self.bump();
            let text = token.text();
            Some(IdentifierAst {
                name: text[1..text.len() - 1].to_string(),
                span: token.span,
            })
        } else {
            None
        };

        let generic_parameters = self.parse_generic_list()?;

        let mut positional_parameters = Vec::new();
        let mut named_parameters = Vec::new();
        let mut variadic_positional_parameter = None;
        let mut variadic_named_parameter = None;

        self.eat(TokenKind::LeftCurvy)?;
        while !self.at(TokenKind::RightCurvy) {
            if self.at_operator("*") || self.at_operator("**") {
                break;
            }
            if self.eat_if(TokenKind::LeftCurly) {
                while !self.at(TokenKind::RightCurly) {
                    named_parameters.push(self.parse_parameter()?);
                    if !self.eat_if(TokenKind::Comma) {
                        break;
                    }
                }
                self.eat(TokenKind::RightCurly)?;
            } else {
                positional_parameters.push(self.parse_parameter()?);
            }
            if !self.eat_if(TokenKind::Comma) {
                break;
            }
        }

        if self.at_operator("*") {
            self.eat_operator("*")?;
            variadic_positional_parameter = Some(self.parse_parameter()?);
            self.eat_if(TokenKind::Comma);
        }
        if self.at_operator("**") {
            self.eat_operator("**")?;
            variadic_named_parameter = Some(self.parse_parameter()?);
            self.eat_if(TokenKind::Comma);
        }

        self.eat(TokenKind::RightCurvy)?;

        let return_type = if self.eat_if(TokenKind::Colon) {
            let previous = self.allow_curly_call;
            self.allow_curly_call = false;
            let result = self.parse_expression(0);
            self.allow_curly_call = previous;
            Some(result?)
        } else {
            None
        };

        let body = if self.eat_if(TokenKind::Semicolon) {
            None
        } else {
            self.eat(TokenKind::LeftCurly)?;
            let mut statements = Vec::new();
            while !self.at(TokenKind::RightCurly) && !self.at_eof() {
                statements.push(self.parse_statement()?);
            }
            self.eat(TokenKind::RightCurly)?;
            Some(statements)
        };

        Ok(self.make(&start, AstKind::Function(FunctionAst {
            name,
            generic_parameters,
            positional_parameters,
            named_parameters,
            variadic_positional_parameter,
            variadic_named_parameter,
            return_type,
            body,
        })))
    }

    pub(crate) fn parse_class(&mut self) -> ParseResult<Rc<Ast>> {
        let start = self.eat_keyword(Keyword::Class)?.span;

        let name = if self.at(TokenKind::Identifier) {
            Some(self.identifier()?)
        } else {
            None
        };

        let generic_parameters = self.parse_generic_list()?;

        let mut bases = Vec::new();
        if self.at_operator("<") {
            self.eat_operator("<")?;
            let previous = self.allow_curly_call;
            self.allow_curly_call = false;
            loop {
                match self.parse_expression(0) {
                    Ok(base) => bases.push(base),
                    Err(failure) => {
                        self.allow_curly_call = previous;
                        return Err(failure);
                    }
                }
                if !self.eat_if(TokenKind::Comma) {
                    break;
                }
            }
            self.allow_curly_call = previous;
        }

        self.eat(TokenKind::LeftCurly)?;
        let mut items = Vec::new();
        while !self.at(TokenKind::RightCurly) && !self.at_eof() {
            let item = match self.peek().kind {
                TokenKind::Keyword(Keyword::Var) => self.parse_var()?,
                TokenKind::Keyword(Keyword::Fun) => self.parse_function()?,
                TokenKind::Keyword(Keyword::Class) => self.parse_class()?,
                _ => return Err(self.failure("expected 'var', 'fun' or 'class' inside class body")),
            };
            items.push(item);
        }
        self.eat(TokenKind::RightCurly)?;

        Ok(self.make(&start, AstKind::Class(ClassAst { name, generic_parameters, bases, items })))
    }

    fn parse_module(&mut self) -> ParseResult<Rc<Ast>> {
        let start = self.eat_keyword(Keyword::Module)?.span;

        let name = if self.at(TokenKind::Identifier) {
            Some(self.identifier()?)
        } else {
            None
        };

        let mut items = Vec::new();
        if !self.eat_if(TokenKind::Semicolon) {
            self.eat(TokenKind::LeftCurly)?;
            while !self.at(TokenKind::RightCurly) && !self.at_eof() {
                items.push(self.parse_statement()?);
            }
            self.eat(TokenKind::RightCurly)?;
        }

        Ok(self.make(&start, AstKind::Module(ModuleAst { name, items })))
    }

    fn parse_import_name_list(&mut self) -> ParseResult<Vec<ImportNameAst>> {
        let mut names = Vec::new();
        self.eat(TokenKind::LeftCurly)?;
        while !self.at(TokenKind::RightCurly) {
            let name = self.identifier()?;
            let alias = if self.at(TokenKind::Keyword(Keyword::As)) {
                self.eat_keyword(Keyword::As)?;
                Some(self.identifier()?)
            } else {
                None
            };
            names.push(ImportNameAst { name, alias });
            if !self.at(TokenKind::RightCurly) {
                self.eat(TokenKind::Comma)?;
            } else {
                break;
            }
        }
        self.eat(TokenKind::RightCurly)?;
        Ok(names)
    }

    fn parse_import(&mut self) -> ParseResult<Rc<Ast>> {
        let start = self.eat_keyword(Keyword::Import)?.span;

        if self.at(TokenKind::String) {
            // `import "source";` runs the document for its side effects
            let source = self.parse_expression(0)?;
            self.eat(TokenKind::Semicolon)?;
            return Ok(self.make(&start, AstKind::Import(ImportAst {
                names: ImportNames::SourceOnly,
                source,
            })));
        }

        let names = if self.at_operator("*") {
            self.eat_operator("*")?;
            let alias = if self.at(TokenKind::Keyword(Keyword::As)) {
                self.eat_keyword(Keyword::As)?;
                Some(self.identifier()?)
            } else {
                None
            };
            ImportNames::All { alias }
        } else {
            ImportNames::Named(self.parse_import_name_list()?)
        };

        self.eat_keyword(Keyword::From)?;
        let source = self.parse_expression(0)?;
        self.eat(TokenKind::Semicolon)?;

        Ok(self.make(&start, AstKind::Import(ImportAst { names, source })))
    }

    fn parse_export(&mut self) -> ParseResult<Rc<Ast>> {
        let start = self.eat_word("export")?.span;

        if self.at_operator("*") {
            self.eat_operator("*")?;
            let alias = if self.at(TokenKind::Keyword(Keyword::As)) {
                self.eat_keyword(Keyword::As)?;
                Some(self.identifier()?)
            } else {
                None
            };
            self.eat_keyword(Keyword::From)?;
            let source = self.parse_expression(0)?;
            self.eat(TokenKind::Semicolon)?;
            return Ok(self.make(&start, AstKind::Export(ExportAst {
                items: ExportItems::All { alias },
                source: Some(source),
            })));
        }

        if self.at(TokenKind::LeftCurly) {
            let names = self.parse_import_name_list()?;
            self.eat_keyword(Keyword::From)?;
            let source = self.parse_expression(0)?;
            self.eat(TokenKind::Semicolon)?;
            return Ok(self.make(&start, AstKind::Export(ExportAst {
                items: ExportItems::Named(names),
                source: Some(source),
            })));
        }

        // exported declaration or a bare name
        let items = match self.peek().kind {
            TokenKind::Keyword(Keyword::Var) => ExportItems::Declaration(self.parse_var()?),
            TokenKind::Keyword(Keyword::Fun) => ExportItems::Declaration(self.parse_function()?),
            TokenKind::Keyword(Keyword::Class) => ExportItems::Declaration(self.parse_class()?),
            TokenKind::Keyword(Keyword::Module) => ExportItems::Declaration(self.parse_module()?),
            TokenKind::Keyword(Keyword::Import) => ExportItems::Declaration(self.parse_import()?),
            TokenKind::Identifier if self.at_word("typeclass") => {
                ExportItems::Declaration(self.parse_typeclass()?)
            }
            TokenKind::Identifier => {
                let name = self.identifier()?;
                self.eat(TokenKind::Semicolon)?;
                ExportItems::Name(name)
            }
            _ => return Err(self.failure("expected a declaration, a name, '*' or '{' after 'export'")),
        };

        Ok(self.make(&start, AstKind::Export(ExportAst { items, source: None })))
    }

    pub(crate) fn parse_typeclass(&mut self) -> ParseResult<Rc<Ast>> {
        let start = self.eat_word("typeclass")?.span;
        let name = self.identifier()?;

        let implemented_type = if self.eat_if(TokenKind::LeftCurvy) {
            let implemented = self.parse_expression(0)?;
            self.eat(TokenKind::RightCurvy)?;
            Some(implemented)
        } else {
            None
        };

        self.eat(TokenKind::LeftCurly)?;
        let mut items = Vec::new();
        while !self.at(TokenKind::RightCurly) && !self.at_eof() {
            let item = match self.peek().kind {
                TokenKind::Keyword(Keyword::Var) => self.parse_var()?,
                TokenKind::Keyword(Keyword::Fun) => self.parse_function()?,
                TokenKind::Keyword(Keyword::Class) => self.parse_class()?,
                TokenKind::Identifier if self.at_word("typeclass") => self.parse_typeclass()?,
                _ => return Err(self.failure("expected 'var', 'fun', 'class' or 'typeclass' inside typeclass body")),
            };
            items.push(item);
        }
        self.eat(TokenKind::RightCurly)?;

        let kind = match implemented_type {
            Some(implemented_type) => AstKind::TypeclassImpl(TypeclassImplAst { name, implemented_type, items }),
            None => AstKind::Typeclass(TypeclassAst { name, items }),
        };
        Ok(self.make(&start, kind))
    }

    // endregion
}
