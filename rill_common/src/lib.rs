//! Shared utilities for the Rill compiler
//!
//! This crate provides common functionality used across all compiler stages:
//! - Error types and the `RillResult` alias
//! - Diagnostic collection for semantic analysis
//! - The compilation context (virtual-register and label generators)

pub mod context;
pub mod diagnostics;
pub mod error;

pub use context::*;
pub use diagnostics::*;
pub use error::*;
