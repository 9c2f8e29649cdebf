//! Fatal compilation errors.
//!
//! All errors here abort the compilation at the point of use: there is no
//! multi-error batching and no continue-past-error mode. Given identical
//! input the pipeline is deterministic, so failures reproduce exactly.
//! Rendering follows the GCC `file:line: error: ...` convention.

use crate::common::source::SourceLocation;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CompileError {
    /// A type name absent from both the primitive table and the custom-type
    /// registry, or a placeholder that survived the rescan pass.
    #[error("{location}: error: cannot resolve type `{name}`")]
    UnresolvedType { name: String, location: SourceLocation },

    /// A referenced name was never declared in any visible scope.
    #[error("{location}: error: symbol `{name}` not found in any visible scope")]
    SymbolNotFound { name: String, location: SourceLocation },

    /// A value's type is incompatible with its target.
    #[error("{location}: error: expected type `{expected}`, found `{found}`")]
    TypeMismatch {
        expected: String,
        found: String,
        location: SourceLocation,
    },

    /// A name declared twice in the same scope.
    #[error("{location}: error: `{name}` is already declared in this scope")]
    DuplicateSymbol { name: String, location: SourceLocation },
}

pub type Result<T> = std::result::Result<T, CompileError>;
