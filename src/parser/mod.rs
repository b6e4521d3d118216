// ycalc expression language and the small grammars used by templates

pub mod ast;
pub mod expr;
pub mod lexer;
pub mod tics;
pub mod timedelta;

// Public API re-exports
pub use ast::{Aggregate, BinaryOp, CompareOp, Expr, Predicate, WindowSpec};
pub use expr::{parse_expression, ExprError};
pub use tics::{format_y2tics, parse_y2tics};
pub use timedelta::{format_timedelta, parse_timedelta};
