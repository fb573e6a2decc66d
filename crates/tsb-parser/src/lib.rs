//! AST types and the recursive-descent parser for the tsb subset.
//!
//! The parser consumes the scanner's token stream and produces `Stmt`/`Expr`
//! trees plus a separate `TypeExpr` tree for annotations. Expressions use
//! Pratt precedence climbing. Errors are fatal; there is no recovery.

pub mod ast;
pub mod parser;

pub use ast::{Expr, ExprKind, NodeId, Stmt, StmtKind, TypeExpr};
pub use parser::Parser;

use tsb_common::Diagnostic;
use tsb_scanner::Scanner;

/// Scan and parse a source file into a module body.
pub fn parse_source(source: &str) -> Result<Vec<Stmt>, Diagnostic> {
    let tokens = Scanner::new(source).scan_tokens()?;
    Parser::new(tokens).parse_module()
}

/// Scan and parse with an explicit starting node id, so that every node in a
/// multi-module program gets a unique id.
pub fn parse_source_with_ids(source: &str, first_id: NodeId) -> Result<(Vec<Stmt>, NodeId), Diagnostic> {
    let tokens = Scanner::new(source).scan_tokens()?;
    let mut parser = Parser::with_first_id(tokens, first_id);
    let body = parser.parse_module_body()?;
    Ok((body, parser.next_id()))
}
