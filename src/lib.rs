//! A single-pass, whole-program compiler from the Ae language to C.
//!
//! The pipeline is linear: bytes → tokens ([`lexer`]) → AST + [`Program`]
//! metadata ([`parser`], which also resolves `use` includes and re-enters
//! the lexer for format-string fragments) → checked AST ([`infer`], which
//! resolves names, validates types, and rewrites the tree in place) → C
//! source text ([`codegen`]). Every stage shares the one [`Program`] value;
//! errors are fatal and surface as [`diag::Diagnostic`] values that the
//! driver renders and exits on.

pub mod codegen;
pub mod diag;
pub mod infer;
pub mod lexer;
pub mod parser;
pub mod types;

use std::fs;

pub use diag::{Error, Result};
pub use types::entity::Program;

/// Run the full front end over one entry file and return the checked
/// program together with the emitted C translation unit.
///
/// `include_dirs` are searched, after `.`, when resolving `use` paths and
/// the implicit `lib/prelude.ae`.
pub fn compile_to_c(
  filename: &str, include_dirs: &[String], debug: bool,
) -> Result<(Program, Vec<u8>)> {
  let contents = fs::read_to_string(filename)?;
  let tokens = lexer::Lexer::new(contents, filename).lex()?;
  let mut parser = parser::Parser::new(tokens, filename);
  for dir in include_dirs {
    parser.add_include_dir(dir.clone());
  }
  let mut prog = parser.parse_program()?;
  log::debug!("parsed {} functions, {} structs", prog.functions.len(), prog.structs.len());
  infer::TypeChecker::new().check_program(&mut prog)?;
  let mut out = Vec::new();
  codegen::CodeGenerator::new(&prog, &mut out, debug).gen_program()?;
  log::debug!("emitted {} bytes of C", out.len());
  Ok((prog, out))
}
