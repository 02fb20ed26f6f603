//! Intermediate representation and code generation for the Rill language
//!
//! Lowering walks the validated AST and produces an ordered list of labelled
//! instruction fragments in virtual registers; the backend assigns every
//! virtual register a stack slot, spills across each instruction, and emits
//! GNU-assembler-compatible AArch64 text.

pub mod codegen;
pub mod frame;
pub mod ir;
pub mod lower;
pub mod regalloc;

pub use codegen::*;
pub use frame::*;
pub use ir::*;
pub use lower::*;
pub use regalloc::*;
