// ycalc expression parser
//
// numeric   := arith [ "if" predicate "else" numeric ]
// arith     := term { ("+" | "-") term }
// term      := unary { ("*" | "/") unary }
// unary     := "-" unary | primary
// primary   := number | None | field | aggregate | call | tuple-select | "(" numeric ")"
// predicate := conj { "or" conj }
// conj      := neg { "and" neg }
// neg       := "not" neg | arith cmp arith | "(" predicate ")"

use super::ast::{Aggregate, BinaryOp, CompareOp, Expr, Predicate, WindowSpec};
use super::lexer::{identifier, keyword, number_literal, string_literal, ws};
use super::timedelta::timedelta_call;
use chrono::TimeDelta;
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::char,
    combinator::{eof, map, opt, value},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

/// Where and why an expression failed to parse
#[derive(Debug, Clone, PartialEq)]
pub struct ExprError {
    /// 1-based character column of the first unparsed input
    pub column: usize,
    pub message: String,
}

impl std::fmt::Display for ExprError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "column {}: {}", self.column, self.message)
    }
}

/// Parse a complete ycalc expression
pub fn parse_expression(input: &str) -> Result<Expr, ExprError> {
    let result = tuple((numeric, ws(eof)))(input);
    let rest = match result {
        Ok((_, (expr, _))) => return validate(expr, input),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => e.input,
        Err(nom::Err::Incomplete(_)) => "",
    };
    let column = input[..input.len() - rest.len()].chars().count() + 1;
    let message = if rest.trim().is_empty() {
        "unexpected end of expression".to_string()
    } else {
        format!("cannot parse '{}'", rest.trim_end())
    };
    Err(ExprError { column, message })
}

/// Literal argument checks the grammar alone cannot express
fn validate(expr: Expr, input: &str) -> Result<Expr, ExprError> {
    let mut problem = None;
    expr.walk(&mut |node: &Expr| {
        if problem.is_some() {
            return;
        }
        if let Expr::Aggregate {
            function,
            window,
            smoothing,
            ..
        } = node
        {
            if window.start >= window.end {
                problem = Some(format!("{}: window start must be before its end", function.name()));
            } else if !(*smoothing > 0.0 && *smoothing <= 1.0) {
                problem = Some(format!(
                    "{}: smoothing must be in (0, 1], got {}",
                    function.name(),
                    smoothing
                ));
            }
        }
    });
    match problem {
        None => Ok(expr),
        Some(message) => Err(ExprError {
            column: input.len() - input.trim_start().len() + 1,
            message,
        }),
    }
}

fn numeric(input: &str) -> IResult<&str, Expr> {
    let (input, then) = arith(input)?;
    let (input, branch) = opt(pair(
        preceded(ws(keyword("if")), predicate),
        preceded(ws(keyword("else")), numeric),
    ))(input)?;

    Ok(match branch {
        Some((predicate, otherwise)) => (
            input,
            Expr::Conditional {
                predicate: Box::new(predicate),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
        ),
        None => (input, then),
    })
}

fn arith(input: &str) -> IResult<&str, Expr> {
    let (input, first) = term(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            value(BinaryOp::Add, char('+')),
            value(BinaryOp::Sub, char('-')),
        ))),
        term,
    ))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn term(input: &str) -> IResult<&str, Expr> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            value(BinaryOp::Mul, char('*')),
            value(BinaryOp::Div, char('/')),
        ))),
        unary,
    ))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn fold_binary(first: Expr, rest: Vec<(BinaryOp, Expr)>) -> Expr {
    rest.into_iter().fold(first, |lhs, (op, rhs)| Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(char('-')), unary), |e| Expr::Neg(Box::new(e))),
        primary,
    ))(input)
}

fn primary(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        map(number_literal, Expr::Number),
        value(Expr::NoValue, keyword("None")),
        map(field, Expr::Field),
        aggregate,
        call,
        tuple_select,
        delimited(char('('), numeric, ws(char(')'))),
    )))(input)
}

/// `data['name']`
fn field(input: &str) -> IResult<&str, String> {
    let (input, _) = keyword("data")(input)?;
    delimited(ws(char('[')), ws(string_literal), char(']'))(input)
}

fn call(input: &str) -> IResult<&str, Expr> {
    let (input, function) = identifier(input)?;
    let (input, args) = delimited(
        ws(char('(')),
        separated_list0(ws(char(',')), numeric),
        ws(char(')')),
    )(input)?;
    Ok((input, Expr::Call { function, args }))
}

/// `(otherwise, then)[predicate]`: a true predicate selects the second element
fn tuple_select(input: &str) -> IResult<&str, Expr> {
    let (input, (_, otherwise, _, then, _)) =
        tuple((char('('), numeric, ws(char(',')), numeric, ws(char(')'))))(input)?;
    let (input, predicate) = delimited(ws(char('[')), predicate, ws(char(']')))(input)?;
    Ok((
        input,
        Expr::Conditional {
            predicate: Box::new(predicate),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        },
    ))
}

/// `winddir_average(source[lo:hi], smoothing, iterations)`
fn aggregate(input: &str) -> IResult<&str, Expr> {
    let (rest, name) = identifier(input)?;
    let function = match Aggregate::from_name(&name) {
        Some(function) => function,
        None => {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            )))
        }
    };
    let (rest, _) = ws(char('('))(rest)?;
    let (rest, window) = window(rest)?;
    let (rest, _) = ws(char(','))(rest)?;
    let (rest, smoothing) = ws(number_literal)(rest)?;
    let (rest, _) = ws(char(','))(rest)?;
    let iterations_at = rest;
    let (rest, iterations) = ws(number_literal)(rest)?;
    let (rest, _) = ws(char(')'))(rest)?;

    if iterations < 0.0 || iterations.fract() != 0.0 || iterations > u32::MAX as f64 {
        return Err(nom::Err::Failure(nom::error::Error::new(
            iterations_at,
            nom::error::ErrorKind::Digit,
        )));
    }

    Ok((
        rest,
        Expr::Aggregate {
            function,
            window,
            smoothing,
            iterations: iterations as u32,
        },
    ))
}

/// `source[data['idx'] - timedelta(...) : data['idx'] + timedelta(...)]`
fn window(input: &str) -> IResult<&str, WindowSpec> {
    let (input, _) = ws(keyword("source"))(input)?;
    let (input, (start, _, end)) = delimited(
        ws(char('[')),
        tuple((bound, ws(char(':')), bound)),
        ws(char(']')),
    )(input)?;
    Ok((input, WindowSpec { start, end }))
}

/// Offset of a window bound from the current row timestamp
fn bound(input: &str) -> IResult<&str, TimeDelta> {
    let (input, name) = ws(field)(input)?;
    if name != "idx" {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        )));
    }
    let (input, offset) = opt(pair(
        ws(alt((value(1i32, char('+')), value(-1i32, char('-'))))),
        timedelta_call,
    ))(input)?;
    Ok((
        input,
        match offset {
            Some((sign, delta)) if sign < 0 => -delta,
            Some((_, delta)) => delta,
            None => TimeDelta::zero(),
        },
    ))
}

fn predicate(input: &str) -> IResult<&str, Predicate> {
    let (input, first) = conjunction(input)?;
    let (input, rest) = many0(preceded(ws(keyword("or")), conjunction))(input)?;
    Ok((
        input,
        rest.into_iter()
            .fold(first, |a, b| Predicate::Or(Box::new(a), Box::new(b))),
    ))
}

fn conjunction(input: &str) -> IResult<&str, Predicate> {
    let (input, first) = negation(input)?;
    let (input, rest) = many0(preceded(ws(keyword("and")), negation))(input)?;
    Ok((
        input,
        rest.into_iter()
            .fold(first, |a, b| Predicate::And(Box::new(a), Box::new(b))),
    ))
}

fn negation(input: &str) -> IResult<&str, Predicate> {
    alt((
        map(preceded(ws(keyword("not")), negation), |p| {
            Predicate::Not(Box::new(p))
        }),
        comparison,
        delimited(ws(char('(')), predicate, ws(char(')'))),
    ))(input)
}

fn comparison(input: &str) -> IResult<&str, Predicate> {
    let (input, (lhs, op, rhs)) = tuple((arith, ws(compare_op), arith))(input)?;
    Ok((input, Predicate::Compare { op, lhs, rhs }))
}

fn compare_op(input: &str) -> IResult<&str, CompareOp> {
    // Two-character operators first so `<=` is not read as `<`
    alt((
        value(CompareOp::Le, tag("<=")),
        value(CompareOp::Ge, tag(">=")),
        value(CompareOp::Eq, tag("==")),
        value(CompareOp::Ne, tag("!=")),
        value(CompareOp::Lt, tag("<")),
        value(CompareOp::Gt, tag(">")),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str) -> Expr {
        Expr::Field(name.to_string())
    }

    #[test]
    fn test_parse_field_lookup() {
        assert_eq!(parse_expression("data['wind_ave']"), Ok(field("wind_ave")));
        assert_eq!(parse_expression(r#" data["wind_ave"] "#), Ok(field("wind_ave")));
    }

    #[test]
    fn test_parse_precedence() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Add,
                lhs: Box::new(Expr::Number(1.0)),
                rhs: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    lhs: Box::new(Expr::Number(2.0)),
                    rhs: Box::new(Expr::Number(3.0)),
                }),
            }
        );
    }

    #[test]
    fn test_parse_left_associative_subtraction() {
        let expr = parse_expression("8 - 4 - 2").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Sub, lhs, rhs } => {
                assert_eq!(*rhs, Expr::Number(2.0));
                assert!(matches!(*lhs, Expr::Binary { op: BinaryOp::Sub, .. }));
            }
            other => panic!("Expected subtraction, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_function_call() {
        assert_eq!(
            parse_expression("wind_mph(data['wind_ave'])"),
            Ok(Expr::Call {
                function: "wind_mph".to_string(),
                args: vec![field("wind_ave")],
            })
        );
    }

    #[test]
    fn test_parse_tuple_select_matches_if_else() {
        let tuple = parse_expression(
            "(None, wind_mph(data['wind_gust']))[data['wind_gust'] > data['wind_ave'] + 1.0]",
        )
        .unwrap();
        let inline = parse_expression(
            "wind_mph(data['wind_gust']) if data['wind_gust'] > data['wind_ave'] + 1.0 else None",
        )
        .unwrap();
        assert_eq!(tuple, inline);
        match tuple {
            Expr::Conditional { otherwise, .. } => assert_eq!(*otherwise, Expr::NoValue),
            other => panic!("Expected conditional, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_parenthesised_predicates() {
        let expr = parse_expression(
            "1 if (data['a'] > 2) and not data['b'] <= 0 or data['a'] == 1 else 0",
        )
        .unwrap();
        match expr {
            Expr::Conditional { predicate, .. } => {
                assert!(matches!(*predicate, Predicate::Or(_, _)));
            }
            other => panic!("Expected conditional, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_window_aggregate() {
        let expr = parse_expression(
            "winddir_average(source[data['idx']-timedelta(minutes=24):data['idx']+timedelta(minutes=24)], 0.8, 6)",
        )
        .unwrap();
        assert_eq!(
            expr,
            Expr::Aggregate {
                function: Aggregate::WinddirAverage,
                window: WindowSpec {
                    start: TimeDelta::minutes(-24),
                    end: TimeDelta::minutes(24),
                },
                smoothing: 0.8,
                iterations: 6,
            }
        );
    }

    #[test]
    fn test_parse_window_with_bare_idx_bound() {
        let expr = parse_expression(
            "winddir_average(source[data['idx'] - timedelta(hours=1) : data['idx']], 0.5, 0)",
        )
        .unwrap();
        match expr {
            Expr::Aggregate { window, iterations, .. } => {
                assert_eq!(window.start, TimeDelta::hours(-1));
                assert_eq!(window.end, TimeDelta::zero());
                assert_eq!(iterations, 0);
            }
            other => panic!("Expected aggregate, got {:?}", other),
        }
    }

    #[test]
    fn test_reject_empty_window() {
        let err = parse_expression(
            "winddir_average(source[data['idx']:data['idx']], 0.8, 6)",
        )
        .unwrap_err();
        assert!(err.message.contains("window start"));
    }

    #[test]
    fn test_reject_bad_smoothing_and_iterations() {
        let window = "source[data['idx']-timedelta(minutes=5):data['idx']+timedelta(minutes=5)]";
        assert!(parse_expression(&format!("winddir_average({}, 1.5, 6)", window)).is_err());
        assert!(parse_expression(&format!("winddir_average({}, 0.8, 2.5)", window)).is_err());
        assert!(parse_expression(&format!("winddir_average({}, 0.8, -1)", window)).is_err());
    }

    #[test]
    fn test_reject_malformed_expressions() {
        assert!(parse_expression("").is_err());
        assert!(parse_expression("data['wind_ave'] +").is_err());
        assert!(parse_expression("wind_mph(data['wind_ave']").is_err());
        assert!(parse_expression("data[wind_ave]").is_err());
        assert!(parse_expression("1 if data['a'] else 0").is_err());
        assert!(parse_expression("__import__('os')").is_err());
    }

    #[test]
    fn test_error_reports_column() {
        let err = parse_expression("data['a'] + * 2").unwrap_err();
        assert_eq!(err.column, 11);
    }

    #[test]
    fn test_unary_minus() {
        assert_eq!(
            parse_expression("-data['t']"),
            Ok(Expr::Neg(Box::new(field("t"))))
        );
    }
}
