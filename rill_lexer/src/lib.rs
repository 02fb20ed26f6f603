//! Lexical analyzer for the Rill language
//!
//! Turns a source byte sequence into a finite token sequence terminated by
//! EOF, tracking 1-based line numbers and skipping `//` comments.

pub mod lexer;
pub mod token;

pub use lexer::*;
pub use token::*;
