// Abstract Syntax Tree for ycalc expressions

use chrono::TimeDelta;
use std::collections::BTreeSet;

/// A numeric expression. Evaluates to a number or to "no value".
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// The `None` literal
    NoValue,
    /// `data['name']`
    Field(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Registry function applied to its arguments, e.g. `wind_mph(x)`
    Call { function: String, args: Vec<Expr> },
    /// `then if predicate else otherwise`, also produced by `(otherwise, then)[predicate]`
    Conditional {
        predicate: Box<Predicate>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// Aggregate over the rows of a time window around the current row
    Aggregate {
        function: Aggregate,
        window: WindowSpec,
        smoothing: f64,
        iterations: u32,
    },
}

/// A boolean expression, only valid as the selector of a conditional
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare { op: CompareOp, lhs: Expr, rhs: Expr },
    Not(Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

/// Windowed aggregate functions known to the grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    /// Robust circular mean of the wind direction field
    WinddirAverage,
}

impl Aggregate {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "winddir_average" => Some(Aggregate::WinddirAverage),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Aggregate::WinddirAverage => "winddir_average",
        }
    }
}

/// Half-open window `[idx + start, idx + end)` relative to the current row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub start: TimeDelta,
    pub end: TimeDelta,
}

impl Expr {
    /// Names of all data fields the expression reads directly
    pub fn fields<'a>(&'a self) -> BTreeSet<&'a str> {
        let mut out = BTreeSet::new();
        self.walk(&mut |expr: &'a Expr| {
            if let Expr::Field(name) = expr {
                out.insert(name.as_str());
            }
        });
        out
    }

    /// Names of all registry functions the expression calls
    pub fn functions<'a>(&'a self) -> BTreeSet<&'a str> {
        let mut out = BTreeSet::new();
        self.walk(&mut |expr: &'a Expr| {
            if let Expr::Call { function, .. } = expr {
                out.insert(function.as_str());
            }
        });
        out
    }

    /// True if any windowed aggregate appears in the expression
    pub fn uses_aggregate(&self) -> bool {
        let mut found = false;
        self.walk(&mut |expr: &Expr| {
            if matches!(expr, Expr::Aggregate { .. }) {
                found = true;
            }
        });
        found
    }

    /// Visit every expression node, including those inside predicates
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Number(_) | Expr::NoValue | Expr::Field(_) | Expr::Aggregate { .. } => {}
            Expr::Neg(inner) => inner.walk(visit),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.walk(visit);
                rhs.walk(visit);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            Expr::Conditional {
                predicate,
                then,
                otherwise,
            } => {
                predicate.walk(visit);
                then.walk(visit);
                otherwise.walk(visit);
            }
        }
    }
}

impl Predicate {
    fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        match self {
            Predicate::Compare { lhs, rhs, .. } => {
                lhs.walk(visit);
                rhs.walk(visit);
            }
            Predicate::Not(inner) => inner.walk(visit),
            Predicate::And(a, b) | Predicate::Or(a, b) => {
                a.walk(visit);
                b.walk(visit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str) -> Box<Expr> {
        Box::new(Expr::Field(name.to_string()))
    }

    #[test]
    fn test_fields_collects_from_predicate_and_branches() {
        let expr = Expr::Conditional {
            predicate: Box::new(Predicate::Compare {
                op: CompareOp::Gt,
                lhs: Expr::Field("wind_gust".to_string()),
                rhs: Expr::Field("wind_ave".to_string()),
            }),
            then: field("wind_gust"),
            otherwise: Box::new(Expr::NoValue),
        };
        let fields: Vec<&str> = expr.fields().into_iter().collect();
        assert_eq!(fields, vec!["wind_ave", "wind_gust"]);
    }

    #[test]
    fn test_functions_and_aggregate_detection() {
        let expr = Expr::Call {
            function: "wind_mph".to_string(),
            args: vec![Expr::Aggregate {
                function: Aggregate::WinddirAverage,
                window: WindowSpec {
                    start: TimeDelta::minutes(-24),
                    end: TimeDelta::minutes(24),
                },
                smoothing: 0.8,
                iterations: 6,
            }],
        };
        assert!(expr.functions().contains("wind_mph"));
        assert!(expr.uses_aggregate());
        assert!(!Expr::Number(1.0).uses_aggregate());
    }

    #[test]
    fn test_aggregate_names() {
        assert_eq!(Aggregate::from_name("winddir_average"), Some(Aggregate::WinddirAverage));
        assert_eq!(Aggregate::WinddirAverage.name(), "winddir_average");
        assert_eq!(Aggregate::from_name("mean"), None);
    }
}
