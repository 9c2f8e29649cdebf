pub mod error;
pub mod source;
pub mod symbol_table;
pub mod types;
