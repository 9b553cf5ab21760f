//! Pratt expression parsing.
//!
//! Binding powers follow the language definition: member access 120,
//! call/index/curly 100, arithmetic operators 50 (left-associative, all on
//! one level), assignment 5 (right-associative). Any other operator lexeme
//! parses as a binary expression at the arithmetic level; whether an
//! overload exists for it is a question for the compiler, not the parser.

use std::rc::Rc;

use crate::{
    ast::{
        Ast, AssignAst, AstKind, BinaryAst, CallAst, CallBracket, IdentifierAst, LiteralAst,
        LiteralKind, MemberAccessAst, UnaryAst,
    },
    token::{Keyword, TokenKind},
};

use super::{ParseResult, Parser};

/// Binding power used for type annotations: tighter than `=` (5) so a
/// parameter default value is not swallowed into its type expression.
pub(crate) const TYPE_BINDING_POWER: u8 = 7;

const MEMBER_BINDING_POWER: u8 = 120;
const CALL_BINDING_POWER: u8 = 100;
const UNARY_BINDING_POWER: u8 = 70;
const OPERATOR_BINDING_POWER: u8 = 50;
const ASSIGN_BINDING_POWER: u8 = 5;

impl Parser<'_> {
    pub(crate) fn parse_expression(&mut self, min_bp: u8) -> ParseResult<Rc<Ast>> {
        let start = self.peek().span.clone();
        let mut left = self.parse_prefix()?;

        loop {
            let binding_power = match self.peek().kind {
                TokenKind::LeftCurvy | TokenKind::LeftSquare => CALL_BINDING_POWER,
                TokenKind::LeftCurly if self.allow_curly_call => CALL_BINDING_POWER,
                TokenKind::Operator => match self.peek().text() {
                    "." => MEMBER_BINDING_POWER,
                    "=" => ASSIGN_BINDING_POWER,
                    _ => OPERATOR_BINDING_POWER,
                },
                _ => break,
            };

            if binding_power < min_bp {
                break;
            }

            left = match self.peek().kind {
                TokenKind::LeftCurvy => {
                    self.parse_call(left, CallBracket::Curvy, TokenKind::LeftCurvy, TokenKind::RightCurvy, &start)?
                }
                TokenKind::LeftSquare => {
                    self.parse_call(left, CallBracket::Square, TokenKind::LeftSquare, TokenKind::RightSquare, &start)?
                }
                TokenKind::LeftCurly => {
                    self.parse_call(left, CallBracket::Curly, TokenKind::LeftCurly, TokenKind::RightCurly, &start)?
                }
                TokenKind::Operator if self.peek().text() == "." => {
                    self.bump();
                    let member = self.identifier()?;
                    self.make(&start, AstKind::MemberAccess(MemberAccessAst { object: left, member }))
                }
                TokenKind::Operator if self.peek().text() == "=" => {
                    self.bump();
                    // right-associative: parse the value at the same level
                    let value = self.parse_expression(ASSIGN_BINDING_POWER)?;
                    self.make(&start, AstKind::Assign(AssignAst { target: left, value }))
                }
                TokenKind::Operator => {
                    let operator_token = self.bump();
                    let right = self.parse_expression(binding_power + 1)?;
                    self.make(&start, AstKind::Binary(BinaryAst {
                        left,
                        operator: operator_token.text().to_string(),
                        operator_span: operator_token.span,
                        right,
                    }))
                }
                _ => unreachable!(),
            };
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> ParseResult<Rc<Ast>> {
        let start = self.peek().span.clone();

        let literal = |kind: LiteralKind, text: String| AstKind::Literal(LiteralAst { kind, text });

        match self.peek().kind {
            TokenKind::String => {
                let token = self.bump();
                Ok(self.make(&start, literal(LiteralKind::String, token.text().to_string())))
            }
            TokenKind::Character => {
                let token = self.bump();
                Ok(self.make(&start, literal(LiteralKind::Character, token.text().to_string())))
            }
            TokenKind::Hex => {
                let token = self.bump();
                Ok(self.make(&start, literal(LiteralKind::Hex, token.text().to_string())))
            }
            TokenKind::Decimal => {
                let token = self.bump();
                Ok(self.make(&start, literal(LiteralKind::Decimal, token.text().to_string())))
            }
            TokenKind::Real => {
                let token = self.bump();
                Ok(self.make(&start, literal(LiteralKind::Real, token.text().to_string())))
            }
            TokenKind::True => {
                let token = self.bump();
                Ok(self.make(&start, literal(LiteralKind::True, token.text().to_string())))
            }
            TokenKind::False => {
                let token = self.bump();
                Ok(self.make(&start, literal(LiteralKind::False, token.text().to_string())))
            }
            TokenKind::Null => {
                let token = self.bump();
                Ok(self.make(&start, literal(LiteralKind::Null, token.text().to_string())))
            }
            TokenKind::Unit => {
                let token = self.bump();
                Ok(self.make(&start, literal(LiteralKind::Unit, token.text().to_string())))
            }
            TokenKind::This => {
                let token = self.bump();
                Ok(self.make(&start, AstKind::Identifier(IdentifierAst {
                    name: "this".to_string(),
                    span: token.span,
                })))
            }
            _ if self.at_name() => {
                let identifier = self.identifier()?;
                Ok(self.make(&start, AstKind::Identifier(identifier)))
            }
            TokenKind::LeftCurvy => {
                self.bump();
                let expression = self.parse_expression(0)?;
                if self.at(TokenKind::Comma) {
                    return Err(self.failure("tuples are not supported"));
                }
                self.eat(TokenKind::RightCurvy)?;
                Ok(expression)
            }
            TokenKind::Keyword(Keyword::Fun) => self.parse_function(),
            TokenKind::Keyword(Keyword::Class) => self.parse_class(),
            TokenKind::Operator => {
                let operator_token = self.bump();
                let operand = self.parse_expression(UNARY_BINDING_POWER)?;
                Ok(self.make(&start, AstKind::Unary(UnaryAst {
                    operator: operator_token.text().to_string(),
                    operator_span: operator_token.span,
                    operand,
                })))
            }
            _ => Err(self.failure(format!("unexpected token '{}' in expression", self.peek()))),
        }
    }

    fn parse_call(
        &mut self,
        callable: Rc<Ast>,
        bracket: CallBracket,
        left: TokenKind,
        right: TokenKind,
        start: &crate::span::Span,
    ) -> ParseResult<Rc<Ast>> {
        self.eat(left)?;

        let mut arguments = Vec::new();
        let mut keyword_arguments: Vec<(IdentifierAst, Rc<Ast>)> = Vec::new();

        while !self.at(right) {
            // `name: expr` is a keyword argument; backtrack otherwise
            if self.at(TokenKind::Identifier) {
                let checkpoint = self.checkpoint();
                let name = self.identifier()?;
                if self.eat_if(TokenKind::Colon) {
                    let value = self.parse_expression(0)?;
                    keyword_arguments.push((name, value));
                    if !self.eat_if(TokenKind::Comma) {
                        break;
                    }
                    continue;
                }
                self.rewind(checkpoint);
            }

            arguments.push(self.parse_expression(0)?);
            if !self.eat_if(TokenKind::Comma) {
                break;
            }
        }

        self.eat(right)?;
        Ok(self.make(start, AstKind::Call(CallAst { callable, bracket, arguments, keyword_arguments })))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{ast::{AstKind, CallBracket}, file::SourceFile, lexer::tokenize, parser::parse};

    fn parse_source(code: &str) -> Vec<std::rc::Rc<crate::ast::Ast>> {
        let file = SourceFile::new(vec!["test".into()], code.to_string());
        let tokens = tokenize(&file).unwrap();
        parse(&file, &tokens).unwrap()
    }

    fn first_expression(code: &str) -> std::rc::Rc<crate::ast::Ast> {
        let nodes = parse_source(code);
        match &nodes[0].kind {
            AstKind::ExpressionStatement(statement) => statement.expression.clone(),
            other => panic!("expected expression statement, got {}", other.name()),
        }
    }

    #[test]
    fn flat_arithmetic_is_left_associative() {
        // all arithmetic operators share one level
        let expression = first_expression("a + b * c;");
        match &expression.kind {
            AstKind::Binary(binary) => {
                assert_eq!(binary.operator, "*");
                match &binary.left.kind {
                    AstKind::Binary(inner) => assert_eq!(inner.operator, "+"),
                    other => panic!("expected nested binary, got {}", other.name()),
                }
            }
            other => panic!("expected binary, got {}", other.name()),
        }
    }

    #[test]
    fn member_access_binds_tighter_than_call_argument() {
        let expression = first_expression("a.b(c);");
        match &expression.kind {
            AstKind::Call(call) => {
                assert_eq!(call.bracket, CallBracket::Curvy);
                assert!(matches!(call.callable.kind, AstKind::MemberAccess(_)));
                assert_eq!(call.arguments.len(), 1);
            }
            other => panic!("expected call, got {}", other.name()),
        }
    }

    #[test]
    fn assignment_is_right_associative() {
        let expression = first_expression("a = b = c;");
        match &expression.kind {
            AstKind::Assign(assign) => {
                assert!(matches!(assign.value.kind, AstKind::Assign(_)));
            }
            other => panic!("expected assign, got {}", other.name()),
        }
    }

    #[test]
    fn bracket_kinds_are_distinct() {
        for (code, bracket) in [
            ("f(1);", CallBracket::Curvy),
            ("f[1];", CallBracket::Square),
            ("f{1};", CallBracket::Curly),
        ] {
            let expression = first_expression(code);
            match &expression.kind {
                AstKind::Call(call) => assert_eq!(call.bracket, bracket),
                other => panic!("expected call, got {}", other.name()),
            }
        }
    }

    #[test]
    fn keyword_arguments_parse_by_name() {
        let expression = first_expression("f(1, size: 2);");
        match &expression.kind {
            AstKind::Call(call) => {
                assert_eq!(call.arguments.len(), 1);
                assert_eq!(call.keyword_arguments.len(), 1);
                assert_eq!(call.keyword_arguments[0].0.name, "size");
            }
            other => panic!("expected call, got {}", other.name()),
        }
    }

    #[test]
    fn function_declaration_with_variadics() {
        let nodes = parse_source("fun f(a: Int32, {b: Int32 = 1}, *rest, **options): Int32;");
        match &nodes[0].kind {
            AstKind::Function(function) => {
                assert_eq!(function.positional_parameters.len(), 1);
                assert_eq!(function.named_parameters.len(), 1);
                assert!(function.variadic_positional_parameter.is_some());
                assert!(function.variadic_named_parameter.is_some());
                assert!(function.body.is_none());
            }
            other => panic!("expected function, got {}", other.name()),
        }
    }

    #[test]
    fn class_bases_do_not_swallow_the_body() {
        let nodes = parse_source("class A < B, C { var x: B; }");
        match &nodes[0].kind {
            AstKind::Class(class) => {
                assert_eq!(class.bases.len(), 2);
                assert_eq!(class.items.len(), 1);
            }
            other => panic!("expected class, got {}", other.name()),
        }
    }

    #[test]
    fn import_and_export_forms() {
        let nodes = parse_source(
            "import { print, put as p } from \"module:core\";\nexport { a } from \"./other.zs\";\nexport fun g() { }",
        );
        assert!(matches!(nodes[0].kind, AstKind::Import(_)));
        assert!(matches!(nodes[1].kind, AstKind::Export(_)));
        assert!(matches!(nodes[2].kind, AstKind::Export(_)));
    }

    #[test]
    fn when_with_cases_and_else() {
        let nodes = parse_source("when (x) { case (1) { a; } case (2) { b; } } else { c; }");
        match &nodes[0].kind {
            AstKind::When(when) => {
                assert_eq!(when.cases.len(), 2);
                assert!(when.else_body.is_some());
            }
            other => panic!("expected when, got {}", other.name()),
        }
    }

    #[test]
    fn typeclass_and_implementation() {
        let nodes = parse_source("typeclass Eq { fun equals(other: Any): Bool; }\ntypeclass Eq(Int32) { fun equals(other: Any): Bool { return true; } }");
        assert!(matches!(nodes[0].kind, AstKind::Typeclass(_)));
        assert!(matches!(nodes[1].kind, AstKind::TypeclassImpl(_)));
    }

    #[test]
    fn parse_error_recovers_and_reports() {
        let file = SourceFile::new(vec!["test".into()], "fun () {} ;;;".to_string());
        let tokens = tokenize(&file).unwrap();
        // a nameless function at top level is fine; stray semicolons are not
        assert!(parse(&file, &tokens).is_err());
    }
}
