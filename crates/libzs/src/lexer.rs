//! The Z# tokenizer, built on nom combinators.
//!
//! Produces a flat token stream ending with a single `Eof` token. Whitespace
//! and comments are consumed between tokens and never reach the parser.
//! Operators are lexed maximal-munch over the operator character class; the
//! parser decides what a given operator lexeme means.
//!
//! Unknown characters are recovered by skipping them; all lexical problems of
//! a document are collected into one syntax error.

use nom::{
    branch::alt,
    bytes::complete::{escaped, is_not, tag, take_until, take_while, take_while1},
    character::complete::{anychar, char, multispace1, one_of},
    combinator::{opt, recognize},
    sequence::{delimited, pair, preceded},
    IResult, Input as _, Parser,
};
use nom_language::error::VerboseError;
use nom_locate::LocatedSpan;

use crate::{
    error::{SyntaxErrorItem, ZsError},
    file::SourceFile,
    span::Span,
    token::{Keyword, Token, TokenKind},
};

type Input<'base> = LocatedSpan<&'base str>;
type LexResult<'base, T> = IResult<Input<'base>, T, VerboseError<Input<'base>>>;

/// The operator character class; runs of these form one `Operator` token.
const OPERATOR_CHARS: &str = "./|+-=<>!@#$%^&*~?";

fn is_operator_char(c: char) -> bool {
    OPERATOR_CHARS.contains(c)
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn line_comment(input: Input) -> LexResult<Input> {
    recognize(pair(tag("//"), take_while(|c| c != '\n'))).parse(input)
}

fn block_comment(input: Input) -> LexResult<Input> {
    recognize(delimited(tag("/*"), take_until("*/"), tag("*/"))).parse(input)
}

/// Consumes whitespace and comments. Never fails.
fn trivia(mut input: Input) -> Input {
    loop {
        let before = input.location_offset();
        if let Ok((rest, _)) = multispace1::<Input, VerboseError<Input>>(input) {
            input = rest;
        }
        if let Ok((rest, _)) = line_comment(input) {
            input = rest;
        }
        if let Ok((rest, _)) = block_comment(input) {
            input = rest;
        }
        if input.location_offset() == before {
            return input;
        }
    }
}

fn identifier(input: Input) -> LexResult<Input> {
    recognize(pair(
        take_while1(is_identifier_start),
        take_while(is_identifier_continue),
    ))
    .parse(input)
}

fn string_literal(input: Input) -> LexResult<Input> {
    recognize(delimited(
        char('"'),
        opt(escaped(is_not("\"\\"), '\\', anychar)),
        char('"'),
    ))
    .parse(input)
}

fn character_literal(input: Input) -> LexResult<Input> {
    recognize(delimited(
        char('\''),
        alt((preceded(char('\\'), anychar), anychar)),
        char('\''),
    ))
    .parse(input)
}

fn hex_literal(input: Input) -> LexResult<Input> {
    recognize(preceded(
        tag("0x"),
        take_while1(|c: char| c.is_ascii_hexdigit() || c == '_'),
    ))
    .parse(input)
}

/// Decimal or real number, with any trailing alphanumeric suffix kept as
/// part of the lexeme (`32i8`, `1.5f64`). The suffix is decoded by the
/// resolver, not here.
fn number_literal(input: Input) -> LexResult<(TokenKind, Input)> {
    let digits = take_while1(|c: char| c.is_ascii_digit() || c == '_');

    let (rest, fragment) = recognize((
        take_while1(|c: char| c.is_ascii_digit()),
        opt(recognize(pair(char('.'), digits))),
        take_while(|c: char| c.is_ascii_alphanumeric()),
    ))
    .parse(input)?;

    let kind = if fragment.fragment().contains('.') {
        TokenKind::Real
    } else {
        TokenKind::Decimal
    };

    Ok((rest, (kind, fragment)))
}

fn operator(input: Input) -> LexResult<Input> {
    take_while1(is_operator_char).parse(input)
}

fn symbol(input: Input) -> LexResult<(TokenKind, Input)> {
    let (rest, fragment) = recognize(one_of("{}()[];:,")).parse(input)?;
    let kind = match *fragment.fragment() {
        "{" => TokenKind::LeftCurly,
        "}" => TokenKind::RightCurly,
        "(" => TokenKind::LeftCurvy,
        ")" => TokenKind::RightCurvy,
        "[" => TokenKind::LeftSquare,
        "]" => TokenKind::RightSquare,
        ";" => TokenKind::Semicolon,
        ":" => TokenKind::Colon,
        "," => TokenKind::Comma,
        _ => unreachable!(),
    };
    Ok((rest, (kind, fragment)))
}

fn identifier_kind(lexeme: &str) -> TokenKind {
    match lexeme {
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        "this" => TokenKind::This,
        "unit" => TokenKind::Unit,
        _ => match Keyword::from_lexeme(lexeme) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Identifier,
        },
    }
}

fn scan_token(input: Input) -> LexResult<(TokenKind, Input)> {
    if let Ok((rest, fragment)) = identifier(input) {
        return Ok((rest, (identifier_kind(fragment.fragment()), fragment)));
    }
    if let Ok((rest, fragment)) = string_literal(input) {
        return Ok((rest, (TokenKind::String, fragment)));
    }
    if let Ok((rest, fragment)) = character_literal(input) {
        return Ok((rest, (TokenKind::Character, fragment)));
    }
    if let Ok((rest, fragment)) = hex_literal(input) {
        return Ok((rest, (TokenKind::Hex, fragment)));
    }
    if let Ok(result) = number_literal(input) {
        return Ok(result);
    }
    if let Ok(result) = symbol(input) {
        return Ok(result);
    }
    if let Ok((rest, fragment)) = operator(input) {
        return Ok((rest, (TokenKind::Operator, fragment)));
    }

    Err(nom::Err::Error(VerboseError {
        errors: vec![(input, nom_language::error::VerboseErrorKind::Context("unexpected character"))],
    }))
}

fn fragment_span(file: &SourceFile, fragment: &Input) -> Span {
    let start = fragment.location_offset();
    Span::new(file.clone(), start..start + fragment.fragment().len())
}

/// Tokenizes a source document.
///
/// Returns the complete token stream, `Eof`-terminated. All unknown
/// characters are skipped and reported together as one syntax error.
pub fn tokenize(file: &SourceFile) -> Result<Vec<Token>, ZsError> {
    let mut tokens = Vec::new();
    let mut errors: Vec<SyntaxErrorItem> = Vec::new();

    let mut input = Input::new(file.code());

    loop {
        input = trivia(input);

        if input.fragment().is_empty() {
            let end = input.location_offset();
            tokens.push(Token::new(TokenKind::Eof, Span::new(file.clone(), end..end)));
            break;
        }

        match scan_token(input) {
            Ok((rest, (kind, fragment))) => {
                tokens.push(Token::new(kind, fragment_span(file, &fragment)));
                input = rest;
            }
            Err(_) => {
                let offset = input.location_offset();
                errors.push(SyntaxErrorItem {
                    position: (offset..offset + 1).into(),
                    code: file.into(),
                    message: "unexpected character".to_string(),
                });
                let (rest, _) = input.take_split(input.fragment().chars().next().map(|c| c.len_utf8()).unwrap_or(1));
                input = rest;
            }
        }
    }

    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(ZsError::syntax_error(errors))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn lex(code: &str) -> Vec<Token> {
        let file = SourceFile::new(vec!["test".into()], code.to_string());
        tokenize(&file).unwrap()
    }

    fn kinds(code: &str) -> Vec<TokenKind> {
        lex(code).into_iter().map(|token| token.kind).collect()
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            kinds("fun add while abc"),
            vec![
                TokenKind::Keyword(Keyword::Fun),
                TokenKind::Identifier,
                TokenKind::Keyword(Keyword::While),
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn literal_words_have_their_own_kinds() {
        assert_eq!(
            kinds("true false null unit this"),
            vec![
                TokenKind::True,
                TokenKind::False,
                TokenKind::Null,
                TokenKind::Unit,
                TokenKind::This,
                TokenKind::Eof,
            ]
        );
    }

    #[rstest]
    #[case("42", TokenKind::Decimal)]
    #[case("42i8", TokenKind::Decimal)]
    #[case("123I", TokenKind::Decimal)]
    #[case("1.5", TokenKind::Real)]
    #[case("1.5f64", TokenKind::Real)]
    #[case("0xff_00", TokenKind::Hex)]
    #[case("\"hi\\\"there\"", TokenKind::String)]
    #[case("'x'", TokenKind::Character)]
    fn literal_kinds(#[case] code: &str, #[case] expected: TokenKind) {
        let tokens = lex(code);
        assert_eq!(tokens[0].kind, expected);
        assert_eq!(tokens[0].text(), code);
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn operators_are_maximal_munch() {
        let tokens = lex("a ** b . c == d");
        let texts: Vec<_> = tokens.iter().map(|t| t.text().to_string()).collect();
        assert_eq!(texts, vec!["a", "**", "b", ".", "c", "==", "d", ""]);
    }

    #[test]
    fn comments_are_trivia() {
        assert_eq!(
            kinds("a // comment\n /* block\n comment */ b"),
            vec![TokenKind::Identifier, TokenKind::Identifier, TokenKind::Eof]
        );
    }

    #[test]
    fn token_round_trip() {
        let code = "fun add(a: Int32, b: Int32): Int32 { return a + b; }";
        let tokens = lex(code);
        // every token's span text is its lexeme, and the spans are ordered
        let mut last_end = 0;
        for token in tokens.iter() {
            assert!(token.span.position.start >= last_end);
            assert_eq!(token.text(), &code[token.span.position.clone()]);
            last_end = token.span.position.end;
        }
        // concatenating lexemes and the trivia between them reproduces the source
        let mut rebuilt = String::new();
        let mut cursor = 0;
        for token in tokens.iter() {
            rebuilt.push_str(&code[cursor..token.span.position.start]);
            rebuilt.push_str(token.text());
            cursor = token.span.position.end;
        }
        assert_eq!(rebuilt, code);
    }

    #[test]
    fn unknown_character_is_collected() {
        let file = SourceFile::new(vec!["test".into()], "a ` b".to_string());
        let error = tokenize(&file).unwrap_err();
        match error {
            ZsError::SyntaxError(error) => assert_eq!(error.errors.len(), 1),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }
}
