//! Semantic analysis for the Rill language
//!
//! Two passes over the AST share an arena-allocated scope tree: the first
//! builds declarations (allocating virtual registers for scalars), the second
//! type-checks every expression and statement. Errors are collected, not
//! fatal mid-pass; the driver aborts before lowering if any accumulated.

pub mod analyzer;
pub mod symtab;
pub mod types;

pub use analyzer::*;
pub use symtab::*;
pub use types::*;
