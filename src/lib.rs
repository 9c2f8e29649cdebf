//! Semantic-analysis and C code generation core for a statically-flavored
//! source language compiled to a native extension module for a dynamic
//! object runtime.
//!
//! Given a parsed statement tree, this crate resolves every name and type
//! reference (including forward and mutually-recursive type references via
//! a two-pass declare/rescan scheme), populates a scope/symbol hierarchy,
//! and emits equivalent C source — including the boxing/unboxing bridge
//! between native scalars/pointers and the runtime's boxed `VALUE`
//! representation.
//!
//! Lexing/parsing and the command-line driver are external collaborators;
//! the entry point is [`driver::compile_unit`].

pub mod backend;
pub mod common;
pub mod driver;
pub mod frontend;

pub use common::error::{CompileError, Result};
