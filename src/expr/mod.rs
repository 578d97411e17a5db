//! Expression engine (C1): parse, compile, evaluate, and differentiate
//! scalar real expressions over a named-scalar environment (spec.md §4.1).

pub mod ast;
pub mod compiled;
pub mod lexer;
pub mod parser;

pub use compiled::{compile, CompiledExpr};
