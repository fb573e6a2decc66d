//! Lexer for the tsb TypeScript subset.
//!
//! Turns a UTF-8 character stream into a token stream. Template literals are
//! split into head/middle/tail pieces at scan time, regex literals are
//! disambiguated from division by the preceding token kind, and numeric
//! literals support all four radixes, `_` separators, exponents, and the `n`
//! bigint suffix.

pub mod scanner;
pub mod token;

pub use scanner::Scanner;
pub use token::{Literal, Token, TokenKind};
