//! Syntax analysis for the Rill language
//!
//! The parser is predictive recursive descent with single-token look-ahead
//! plus a pseudo-match mechanism (speculative consumption with rollback) for
//! the statement prefixes that are ambiguous: `fmt.Scan` / `fmt.Print` /
//! `fmt.Println`, and assignment vs. invocation.

pub mod ast;
pub mod parser;

pub use ast::*;
pub use parser::*;
