//! Type descriptors for the Rill type system

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of Rill types.
///
/// Equality is by variant, and by name for `Struct`/`Function`/`Unknown`.
/// `Unknown` carries the name that failed to resolve and silences follow-on
/// diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ty {
    Int,
    Bool,
    Nil,
    Unknown(String),
    Struct(String),
    Function(String),
    Import,
}

impl Ty {
    /// The name used in diagnostics and in by-name type comparison.
    pub fn name(&self) -> &str {
        match self {
            Ty::Int => "int",
            Ty::Bool => "bool",
            Ty::Nil => "nil",
            Ty::Unknown(_) => "unknown",
            Ty::Struct(name) => name,
            Ty::Function(_) => "function",
            Ty::Import => "import",
        }
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, Ty::Struct(_))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Ty::Unknown(_))
    }

    /// Type compatibility for assignment and `==`/`!=`: equality by name,
    /// with `nil` matching any record pointer.
    pub fn matches(&self, other: &Ty) -> bool {
        match (self, other) {
            (Ty::Struct(_), Ty::Nil) | (Ty::Nil, Ty::Struct(_)) => true,
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
