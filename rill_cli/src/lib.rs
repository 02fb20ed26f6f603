//! Driver library for the `rillc` binary
//!
//! The binary is a thin argument-parsing shell; everything it does is
//! reachable through [`driver`] so integration tests can exercise the
//! pipeline without spawning processes.

pub mod driver;

pub use driver::*;
