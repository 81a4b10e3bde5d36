//! Rule Compiler & Evaluator (C5): AST compilation, reference resolution,
//! typed operator dispatch. See `ast.rs` for the raw/compiled node types,
//! `compiler.rs` for path resolution and operator validation, and
//! `evaluator.rs` for the runtime dispatch loop.

pub mod ast;
pub mod compiler;
pub mod evaluator;

pub use ast::{
    ArithOp, CompiledExpr, CompiledRef, CondExpr, Literal, Operand, Operator, RawExpr, RawOperand,
    Setup, SetupTable,
};
pub use compiler::{compile_expr, compile_ref, compile_setups, CompileError, DeclaredRegistry};
pub use evaluator::{EvalResult, Evaluator, ReasonCode, RefValue};
