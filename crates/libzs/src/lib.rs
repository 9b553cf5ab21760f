//! Z# compiler library.
//!
//! The compiler front-end and mid-end of the Z# programming language: an
//! expression-oriented, statically-typed language with modules, classes,
//! typeclasses, function overloading, generics and operator overloading.
//! Source text compiles into a module of fully-resolved, type-checked
//! definitions plus instruction sequences for a small stack VM — the same
//! VM the compiler uses to evaluate compile-time expressions (constant
//! folding, generic instantiation, signature computation).
//!
//! # Pipeline
//!
//! ```text
//! source bytes -> tokens -> AST -> resolved AST -> build order
//!              -> constructed objects -> defined objects
//! ```
//!
//! 1. [`lexer`] turns a [`file::SourceFile`] into tokens
//! 2. [`parser`] builds the untyped [`ast`]
//! 3. [`resolver`] registers declarations into scopes and links every
//!    identifier to its definition
//! 4. [`deps`] orders the top level into equivalence classes
//! 5. [`compiler`] constructs object skeletons, then defines them —
//!    evaluating signatures in the [`vm`] and emitting body instructions
//!
//! [`toolchain::Toolchain`] drives the whole pipeline per document with
//! memoization at every stage.
//!
//! # Example
//!
//! ```ignore
//! use libzs::toolchain::{Toolchain, ToolchainResult};
//!
//! let mut toolchain = Toolchain::new();
//! let info = toolchain.add_source("main.zs", "fun add(a: Int32, b: Int32): Int32 { return a + b; }");
//! toolchain.execute_document(&info, ToolchainResult::DocumentContext);
//! assert!(!toolchain.context.has_errors());
//! ```

use std::rc::Rc;

pub mod ast;
pub mod builtins;
pub mod compiler;
pub mod context;
pub mod debug;
pub mod deps;
pub mod error;
pub mod file;
pub mod import;
pub mod lexer;
pub mod map;
pub mod objects;
pub mod parser;
pub mod resolved;
pub mod resolver;
pub mod scope;
pub mod span;
pub mod token;
pub mod toolchain;
pub mod vm;

#[cfg(test)]
mod tests;

use ast::Ast;
use error::ZsError;
use file::SourceFile;

/// Parses a source document into its top-level AST nodes.
///
/// The first pipeline stage pair: tokenize, then parse. Lexical and syntax
/// problems come back as one [`ZsError`] carrying every collected item.
pub fn process_code(file: &SourceFile) -> Result<Vec<Rc<Ast>>, ZsError> {
    let tokens = lexer::tokenize(file)?;
    parser::parse(file, &tokens)
}
