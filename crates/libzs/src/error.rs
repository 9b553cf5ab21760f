//! Error taxonomy, shared compilation state and diagnostic reporting.
//!
//! Every user-facing problem is a concrete struct deriving
//! [`thiserror::Error`] and [`miette::Diagnostic`], collected under the
//! [`ZsError`] enum as boxed variants. Errors are appended to the shared
//! [`State`] together with a plain-text message line; sibling subtrees keep
//! compiling after an error, and the driver refuses to continue into codegen
//! for a document once its state carries errors.
//!
//! Rendering goes through [`ReportGenerator`]; the default
//! [`CodeSpanReportGenerator`] prints rich annotated snippets with
//! `codespan-reporting`.

use std::ops::Range;

use codespan_reporting::{
    diagnostic::{Diagnostic, Label},
    files::SimpleFiles,
    term::{self, termcolor::{ColorChoice, StandardStream}},
};
use miette::{NamedSource, SourceSpan};
use strum_macros::EnumDiscriminants;

use crate::span::SpanInfo;

/// File extension for Z# source documents.
pub static ZS_LANG_EXT: &str = "zs";

/// Compilation phases, used to tag messages in the shared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lexer,
    Parser,
    Resolver,
    Dependency,
    Compiler,
    Import,
    Vm,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Lexer => "Lexer",
            Phase::Parser => "Parser",
            Phase::Resolver => "Resolver",
            Phase::Dependency => "Dependency",
            Phase::Compiler => "Compiler",
            Phase::Import => "Import",
            Phase::Vm => "Vm",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Severity::Info => "Info",
            Severity::Warning => "Warning",
            Severity::Error => "Error",
        };
        f.write_str(name)
    }
}

/// One line of the compilation log: severity, phase, origin and content.
#[derive(Debug, Clone)]
pub struct Message {
    pub severity: Severity,
    pub phase: Phase,
    pub content: String,
    pub origin: Option<SpanInfo>,
}

impl Message {
    /// Formats the message as `[phase] [severity] origin -> message`.
    pub fn format_line(&self) -> String {
        let origin = self
            .origin
            .as_ref()
            .map(|span| span.origin())
            .unwrap_or_else(|| "<unknown>".to_string());
        format!("[{}] [{}] {} -> {}", self.phase, self.severity, origin, self.content)
    }
}

/// Shared mutable compilation state: collected messages and rich errors.
#[derive(Debug, Default)]
pub struct State {
    messages: Vec<Message>,
    errors: Vec<ZsError>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn errors(&self) -> &[ZsError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Records a rich error; the message line is derived from it.
    pub fn error(&mut self, phase: Phase, error: ZsError) {
        let parts = error.parts();
        self.messages.push(Message {
            severity: Severity::Error,
            phase,
            content: parts.message,
            origin: parts.origin,
        });
        self.errors.push(error);
    }

    pub fn warning(&mut self, phase: Phase, content: impl Into<String>, origin: Option<SpanInfo>) {
        self.messages.push(Message {
            severity: Severity::Warning,
            phase,
            content: content.into(),
            origin,
        });
    }

    pub fn info(&mut self, phase: Phase, content: impl Into<String>, origin: Option<SpanInfo>) {
        self.messages.push(Message {
            severity: Severity::Info,
            phase,
            content: content.into(),
            origin,
        });
    }
}

/// A single syntax problem with its location.
#[derive(Clone, Debug, thiserror::Error, miette::Diagnostic)]
#[error("Syntax error")]
pub struct SyntaxErrorItem {
    #[label("{message}")]
    pub position: SourceSpan,

    #[source_code]
    pub code: NamedSource<String>,

    pub message: String,
}

/// All syntax problems found while parsing one document.
#[derive(Clone, Debug, thiserror::Error, miette::Diagnostic)]
#[error("{} syntax error(s) detected", .errors.len())]
pub struct SyntaxError {
    #[related]
    pub errors: Vec<SyntaxErrorItem>,
}

/// A name lookup that found nothing in the enclosing scope chain.
#[derive(Clone, Debug, thiserror::Error, miette::Diagnostic)]
#[error("'{name}' not found")]
#[diagnostic(code("zs::error::name_not_found"))]
pub struct NameNotFound {
    pub name: String,

    #[label("no definition or import is visible from here")]
    pub position: SourceSpan,

    #[source_code]
    pub code: NamedSource<String>,

    #[help]
    pub advice: Option<String>,
}

/// A name created twice in the same scope.
#[derive(Clone, Debug, thiserror::Error, miette::Diagnostic)]
#[error("'{name}' is already bound")]
#[diagnostic(code("zs::error::name_already_bound"), help("rename one of the definitions or remove it"))]
pub struct NameAlreadyBound {
    pub name: String,

    #[label("already bound here")]
    pub old_position: SourceSpan,

    #[label("but it is bound again here")]
    pub new_position: SourceSpan,

    #[source_code]
    pub code: NamedSource<String>,
}

/// A call whose target is not callable with the bracket that was used.
#[derive(Clone, Debug, thiserror::Error, miette::Diagnostic)]
#[error("'{type_name}' is not callable with '{operator}'")]
#[diagnostic(code("zs::error::not_callable"))]
pub struct NotCallable {
    pub type_name: String,
    pub operator: String,

    #[label("this expression cannot be called")]
    pub position: SourceSpan,

    #[source_code]
    pub code: NamedSource<String>,
}

/// A binary or unary operator with no overload for its operand types.
#[derive(Clone, Debug, thiserror::Error, miette::Diagnostic)]
#[error("operator '{operator}' is not defined for ({operand_types})")]
#[diagnostic(code("zs::error::operator_not_defined"), help("define an overload for these operand types"))]
pub struct OperatorNotDefined {
    pub operator: String,
    pub operand_types: String,

    #[label("no overload accepts these operands")]
    pub position: SourceSpan,

    #[source_code]
    pub code: NamedSource<String>,
}

/// Overload resolution found zero or more than one match.
#[derive(Clone, Debug, thiserror::Error, miette::Diagnostic)]
#[error("{matches} overload(s) of '{group}' match ({argument_types})")]
#[diagnostic(code("zs::error::overload_match"))]
pub struct OverloadMatch {
    pub group: String,
    pub argument_types: String,
    pub matches: usize,

    #[label("at this call site")]
    pub position: SourceSpan,

    #[source_code]
    pub code: NamedSource<String>,
}

/// The value flowing into a target is not assignable to its type.
#[derive(Clone, Debug, thiserror::Error, miette::Diagnostic)]
#[error("type '{found}' is not assignable to '{expected}'")]
#[diagnostic(code("zs::error::types_do_not_match"))]
pub struct TypesDoNotMatch {
    pub expected: String,
    pub found: String,

    #[label("this value has type '{found}'")]
    pub position: SourceSpan,

    #[source_code]
    pub code: NamedSource<String>,
}

/// Return statements disagree about the function's result type.
#[derive(Clone, Debug, thiserror::Error, miette::Diagnostic)]
#[error("ambiguous return type: {types}")]
#[diagnostic(code("zs::error::ambiguous_return"), help("annotate the return type or make all return paths agree"))]
pub struct AmbiguousReturn {
    pub types: String,

    #[label("returns disagree inside this function")]
    pub position: SourceSpan,

    #[source_code]
    pub code: NamedSource<String>,
}

/// An import source string that no importer could resolve.
#[derive(Clone, Debug, thiserror::Error, miette::Diagnostic)]
#[error("cannot import from '{import_source}'")]
#[diagnostic(code("zs::error::import_not_found"), help("check the path or register the scheme"))]
pub struct ImportNotFound {
    pub import_source: String,

    #[label("nothing resolvable at this source")]
    pub position: SourceSpan,

    #[source_code]
    pub code: NamedSource<String>,
}

/// An import that re-enters a document that is still being compiled.
#[derive(Clone, Debug, thiserror::Error, miette::Diagnostic)]
#[error("cyclic import of '{import_source}'")]
#[diagnostic(code("zs::error::cyclic_import"))]
pub struct CyclicImport {
    pub import_source: String,

    #[label("this document is already being imported")]
    pub position: SourceSpan,

    #[source_code]
    pub code: NamedSource<String>,
}

/// A problem found while compiling code to instructions.
#[derive(Clone, Debug, thiserror::Error, miette::Diagnostic)]
#[error("{message}")]
#[diagnostic(code("zs::error::code_compilation"))]
pub struct CodeCompilation {
    pub message: String,

    #[label("while compiling this code")]
    pub position: SourceSpan,

    #[source_code]
    pub code: NamedSource<String>,
}

/// An unbreakable cycle between top-level definitions.
#[derive(Clone, Debug, thiserror::Error, miette::Diagnostic)]
#[error("circular definition: {cycle}")]
#[diagnostic(code("zs::error::dependency_cycle"), help("break the cycle by removing a compile-time dependency"))]
pub struct DependencyCycle {
    pub cycle: String,

    #[label("part of an unbreakable definition cycle")]
    pub position: SourceSpan,

    #[source_code]
    pub code: NamedSource<String>,
}

/// Multiple accumulated errors reported together.
#[derive(Clone, Debug, thiserror::Error, miette::Diagnostic)]
#[error("multiple errors detected")]
pub struct ErrorCollection {
    #[related]
    pub errors: Vec<ZsError>,
}

/// The unified error type of the compiler.
#[derive(Clone, Debug, thiserror::Error, miette::Diagnostic, EnumDiscriminants)]
pub enum ZsError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    SyntaxError(Box<SyntaxError>),

    #[error(transparent)]
    #[diagnostic(transparent)]
    NameNotFound(Box<NameNotFound>),

    #[error(transparent)]
    #[diagnostic(transparent)]
    NameAlreadyBound(Box<NameAlreadyBound>),

    #[error(transparent)]
    #[diagnostic(transparent)]
    NotCallable(Box<NotCallable>),

    #[error(transparent)]
    #[diagnostic(transparent)]
    OperatorNotDefined(Box<OperatorNotDefined>),

    #[error(transparent)]
    #[diagnostic(transparent)]
    OverloadMatch(Box<OverloadMatch>),

    #[error(transparent)]
    #[diagnostic(transparent)]
    TypesDoNotMatch(Box<TypesDoNotMatch>),

    #[error(transparent)]
    #[diagnostic(transparent)]
    AmbiguousReturn(Box<AmbiguousReturn>),

    #[error(transparent)]
    #[diagnostic(transparent)]
    ImportNotFound(Box<ImportNotFound>),

    #[error(transparent)]
    #[diagnostic(transparent)]
    CyclicImport(Box<CyclicImport>),

    #[error(transparent)]
    #[diagnostic(transparent)]
    CodeCompilation(Box<CodeCompilation>),

    #[error(transparent)]
    #[diagnostic(transparent)]
    DependencyCycle(Box<DependencyCycle>),

    #[error(transparent)]
    #[diagnostic(transparent)]
    ErrorCollection(Box<ErrorCollection>),
}

/// Flattened report data extracted from one error for rendering.
pub struct ErrorParts {
    pub message: String,
    pub diagnostic_code: Option<String>,
    pub labels: Vec<(String, Range<usize>)>,
    pub source: Option<(String, String)>,
    pub help: Option<String>,
    pub related: Vec<ZsError>,
    pub origin: Option<SpanInfo>,
}

fn span_range(span: &SourceSpan) -> Range<usize> {
    span.offset()..span.offset() + span.len()
}

impl ZsError {
    pub fn syntax_error(errors: Vec<SyntaxErrorItem>) -> Self {
        ZsError::SyntaxError(SyntaxError { errors }.into())
    }

    pub fn multiple_errors(errors: Vec<ZsError>) -> Self {
        ZsError::ErrorCollection(ErrorCollection { errors }.into())
    }

    /// Extracts the renderable pieces of this error.
    ///
    /// This is the concrete counterpart of a diagnostic trait walk; the
    /// codespan generator and the state's message lines both feed from it.
    pub fn parts(&self) -> ErrorParts {
        let mut parts = ErrorParts {
            message: self.to_string(),
            diagnostic_code: None,
            labels: Vec::new(),
            source: None,
            help: None,
            related: Vec::new(),
            origin: None,
        };

        let mut set_source = |parts: &mut ErrorParts, code: &NamedSource<String>| {
            parts.source = Some((code.name().to_string(), code.inner().clone()));
        };

        match self {
            ZsError::SyntaxError(error) => {
                if let Some(first) = error.errors.first() {
                    set_source(&mut parts, &first.code);
                    parts.message = first.message.clone();
                    for item in error.errors.iter() {
                        parts.labels.push((item.message.clone(), span_range(&item.position)));
                    }
                }
            }
            ZsError::NameNotFound(error) => {
                parts.diagnostic_code = Some("zs::error::name_not_found".into());
                parts.labels.push(("no definition or import is visible from here".into(), span_range(&error.position)));
                set_source(&mut parts, &error.code);
                parts.help = error.advice.clone();
            }
            ZsError::NameAlreadyBound(error) => {
                parts.diagnostic_code = Some("zs::error::name_already_bound".into());
                parts.labels.push(("already bound here".into(), span_range(&error.old_position)));
                parts.labels.push(("but it is bound again here".into(), span_range(&error.new_position)));
                set_source(&mut parts, &error.code);
                parts.help = Some("rename one of the definitions or remove it".into());
            }
            ZsError::NotCallable(error) => {
                parts.diagnostic_code = Some("zs::error::not_callable".into());
                parts.labels.push(("this expression cannot be called".into(), span_range(&error.position)));
                set_source(&mut parts, &error.code);
            }
            ZsError::OperatorNotDefined(error) => {
                parts.diagnostic_code = Some("zs::error::operator_not_defined".into());
                parts.labels.push(("no overload accepts these operands".into(), span_range(&error.position)));
                set_source(&mut parts, &error.code);
                parts.help = Some("define an overload for these operand types".into());
            }
            ZsError::OverloadMatch(error) => {
                parts.diagnostic_code = Some("zs::error::overload_match".into());
                parts.labels.push(("at this call site".into(), span_range(&error.position)));
                set_source(&mut parts, &error.code);
            }
            ZsError::TypesDoNotMatch(error) => {
                parts.diagnostic_code = Some("zs::error::types_do_not_match".into());
                parts.labels.push((format!("this value has type '{}'", error.found), span_range(&error.position)));
                set_source(&mut parts, &error.code);
            }
            ZsError::AmbiguousReturn(error) => {
                parts.diagnostic_code = Some("zs::error::ambiguous_return".into());
                parts.labels.push(("returns disagree inside this function".into(), span_range(&error.position)));
                set_source(&mut parts, &error.code);
                parts.help = Some("annotate the return type or make all return paths agree".into());
            }
            ZsError::ImportNotFound(error) => {
                parts.diagnostic_code = Some("zs::error::import_not_found".into());
                parts.labels.push(("nothing resolvable at this source".into(), span_range(&error.position)));
                set_source(&mut parts, &error.code);
                parts.help = Some("check the path or register the scheme".into());
            }
            ZsError::CyclicImport(error) => {
                parts.diagnostic_code = Some("zs::error::cyclic_import".into());
                parts.labels.push(("this document is already being imported".into(), span_range(&error.position)));
                set_source(&mut parts, &error.code);
            }
            ZsError::CodeCompilation(error) => {
                parts.diagnostic_code = Some("zs::error::code_compilation".into());
                parts.labels.push(("while compiling this code".into(), span_range(&error.position)));
                set_source(&mut parts, &error.code);
            }
            ZsError::DependencyCycle(error) => {
                parts.diagnostic_code = Some("zs::error::dependency_cycle".into());
                parts.labels.push(("part of an unbreakable definition cycle".into(), span_range(&error.position)));
                set_source(&mut parts, &error.code);
                parts.help = Some("break the cycle by removing a compile-time dependency".into());
            }
            ZsError::ErrorCollection(error) => {
                parts.related = error.errors.clone();
            }
        }

        if parts.origin.is_none() {
            if let (Some((name, source)), Some((_, range))) = (parts.source.as_ref(), parts.labels.first()) {
                parts.origin = Some(SpanInfo::new(
                    range.clone(),
                    crate::file::SourceFile::new(vec![name.clone()], source.clone()),
                ));
            }
        }

        parts
    }
}

/// Trait for rendering a [`ZsError`] tree to the user.
pub trait ReportGenerator {
    fn generate(error: &ZsError);
}

/// Rich diagnostic rendering through `codespan-reporting`.
pub struct CodeSpanReportGenerator;

impl CodeSpanReportGenerator {
    fn inner_generate(
        files: &mut SimpleFiles<String, String>,
        diagnostics: &mut Vec<Diagnostic<usize>>,
        error: &ZsError,
    ) {
        let parts = error.parts();
        let mut diagnostic: Diagnostic<usize> = Diagnostic::error().with_message(&parts.message);

        if let Some(code) = &parts.diagnostic_code {
            diagnostic = diagnostic.with_code(code);
        }

        if let Some((name, source)) = parts.source {
            let file_id = files.add(name, source);
            let labels = parts
                .labels
                .into_iter()
                .map(|(message, range)| Label::primary(file_id, range).with_message(message))
                .collect::<Vec<_>>();
            diagnostic = diagnostic.with_labels(labels);
        }

        if let Some(help) = parts.help {
            diagnostic = diagnostic.with_note(help);
        }

        diagnostics.push(diagnostic);

        for related in parts.related.iter() {
            Self::inner_generate(files, diagnostics, related);
        }
    }
}

impl ReportGenerator for CodeSpanReportGenerator {
    fn generate(error: &ZsError) {
        let mut diagnostics = Vec::new();
        let mut files = SimpleFiles::new();

        Self::inner_generate(&mut files, &mut diagnostics, error);

        let writer = StandardStream::stderr(ColorChoice::Auto);
        let config = codespan_reporting::term::Config::default();

        for diagnostic in diagnostics.into_iter() {
            term::emit(&mut writer.lock(), &config, &files, &diagnostic).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::SourceFile;

    fn source() -> NamedSource<String> {
        SourceFile::new(vec!["test".into()], "fun f() {}".to_string()).into()
    }

    #[test]
    fn state_collects_errors_and_messages() {
        let mut state = State::new();
        assert!(!state.has_errors());

        state.error(
            Phase::Resolver,
            ZsError::NameNotFound(NameNotFound {
                name: "missing".into(),
                position: (4..5).into(),
                code: source(),
                advice: None,
            }.into()),
        );

        assert!(state.has_errors());
        assert_eq!(state.messages().len(), 1);
        let line = state.messages()[0].format_line();
        assert!(line.starts_with("[Resolver] [Error]"), "{line}");
        assert!(line.ends_with("-> 'missing' not found"), "{line}");
    }

    #[test]
    fn parts_carry_labels_and_source() {
        let error = ZsError::NameAlreadyBound(NameAlreadyBound {
            name: "f".into(),
            old_position: (4..5).into(),
            new_position: (8..9).into(),
            code: source(),
        }.into());

        let parts = error.parts();
        assert_eq!(parts.labels.len(), 2);
        assert_eq!(parts.labels[0].1, 4..5);
        assert_eq!(parts.labels[1].1, 8..9);
        assert!(parts.source.is_some());
    }
}
