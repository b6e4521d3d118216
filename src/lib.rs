// Library exports for windgraph

pub mod aggregate;
pub mod config;
pub mod data;
pub mod error;
pub mod eval;
pub mod functions;
pub mod graph;
pub mod ir;
pub mod palette;
pub mod parser;
pub mod runtime;
pub mod scale;
pub mod template;

pub use error::{EvaluationError, GraphError, ParseError};
pub use template::parse_template;
