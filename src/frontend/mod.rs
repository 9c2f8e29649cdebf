pub mod ast;
pub mod sema;
