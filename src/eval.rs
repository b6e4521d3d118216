// Tree-walking evaluator for ycalc expressions

use crate::aggregate::WindowAggregator;
use crate::data::{DataRow, DataWindow};
use crate::error::EvaluationError;
use crate::functions::FunctionRegistry;
use crate::parser::{Aggregate, BinaryOp, CompareOp, Expr, Predicate};

/// Evaluates expressions against one row of a data window.
///
/// Holds no mutable state, so one evaluator can be shared across threads.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    functions: &'a FunctionRegistry,
    aggregator: &'a WindowAggregator,
}

impl<'a> Evaluator<'a> {
    pub fn new(functions: &'a FunctionRegistry, aggregator: &'a WindowAggregator) -> Self {
        Evaluator { functions, aggregator }
    }

    pub fn functions(&self) -> &'a FunctionRegistry {
        self.functions
    }

    pub fn aggregator(&self) -> &'a WindowAggregator {
        self.aggregator
    }

    /// Value of `expr` at row `index` of `window`; `Ok(None)` is "no value"
    pub fn evaluate(&self, expr: &Expr, window: DataWindow<'_>, index: usize) -> Result<Option<f64>, EvaluationError> {
        let row = window
            .rows()
            .get(index)
            .ok_or(EvaluationError::RowOutOfRange(index))?;
        let scope = Scope { window, row };
        self.eval_expr(expr, &scope)
    }

    fn eval_expr(&self, expr: &Expr, scope: &Scope<'_>) -> Result<Option<f64>, EvaluationError> {
        let value = match expr {
            Expr::Number(n) => Some(*n),
            Expr::NoValue => None,
            Expr::Field(name) => scope
                .window
                .value(scope.row, name)
                .ok_or_else(|| EvaluationError::UnknownField(name.clone()))?,
            Expr::Neg(inner) => self.eval_expr(inner, scope)?.map(|v| -v),
            Expr::Binary { op, lhs, rhs } => {
                // Both sides are evaluated so reference errors surface even next to a gap
                let lhs = self.eval_expr(lhs, scope)?;
                let rhs = self.eval_expr(rhs, scope)?;
                match (lhs, rhs) {
                    (Some(a), Some(b)) => apply_binary(*op, a, b),
                    _ => None,
                }
            }
            Expr::Call { function, args } => self.eval_call(function, args, scope)?,
            Expr::Conditional {
                predicate,
                then,
                otherwise,
            } => match self.eval_predicate(predicate, scope)? {
                Some(true) => self.eval_expr(then, scope)?,
                Some(false) => self.eval_expr(otherwise, scope)?,
                None => None,
            },
            Expr::Aggregate {
                function: Aggregate::WinddirAverage,
                window,
                smoothing,
                iterations,
            } => self.aggregator.winddir_average(
                scope.window,
                scope.row.idx,
                *window,
                *smoothing,
                *iterations,
            )?,
        };
        Ok(value.filter(|v| v.is_finite()))
    }

    fn eval_call(&self, name: &str, args: &[Expr], scope: &Scope<'_>) -> Result<Option<f64>, EvaluationError> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| EvaluationError::UnknownFunction(name.to_string()))?;
        let [arg] = args else {
            return Err(EvaluationError::Arity {
                function: name.to_string(),
                expected: 1,
                found: args.len(),
            });
        };
        Ok(self.eval_expr(arg, scope)?.map(|v| function(v)))
    }

    fn eval_predicate(&self, predicate: &Predicate, scope: &Scope<'_>) -> Result<Option<bool>, EvaluationError> {
        Ok(match predicate {
            Predicate::Compare { op, lhs, rhs } => {
                let lhs = self.eval_expr(lhs, scope)?;
                let rhs = self.eval_expr(rhs, scope)?;
                match (lhs, rhs) {
                    (Some(a), Some(b)) => Some(compare(*op, a, b)),
                    _ => None,
                }
            }
            Predicate::Not(inner) => self.eval_predicate(inner, scope)?.map(|b| !b),
            Predicate::And(lhs, rhs) => {
                let lhs = self.eval_predicate(lhs, scope)?;
                let rhs = self.eval_predicate(rhs, scope)?;
                lhs.zip(rhs).map(|(a, b)| a && b)
            }
            Predicate::Or(lhs, rhs) => {
                let lhs = self.eval_predicate(lhs, scope)?;
                let rhs = self.eval_predicate(rhs, scope)?;
                lhs.zip(rhs).map(|(a, b)| a || b)
            }
        })
    }
}

struct Scope<'w> {
    window: DataWindow<'w>,
    row: &'w DataRow,
}

fn apply_binary(op: BinaryOp, a: f64, b: f64) -> Option<f64> {
    match op {
        BinaryOp::Add => Some(a + b),
        BinaryOp::Sub => Some(a - b),
        BinaryOp::Mul => Some(a * b),
        BinaryOp::Div if b == 0.0 => None,
        BinaryOp::Div => Some(a / b),
    }
}

fn compare(op: CompareOp, a: f64, b: f64) -> bool {
    match op {
        CompareOp::Lt => a < b,
        CompareOp::Le => a <= b,
        CompareOp::Gt => a > b,
        CompareOp::Ge => a >= b,
        CompareOp::Eq => a == b,
        CompareOp::Ne => a != b,
    }
}
