// Time spans written as keyword arguments: `hours=24`, `days=1, minutes=30`

use super::lexer::{identifier, keyword, number_literal, ws};
use chrono::TimeDelta;
use nom::{
    character::complete::char,
    combinator::map_res,
    multi::separated_list1,
    sequence::{delimited, separated_pair},
    IResult,
};

/// Parse a comma-separated list of `unit=number` pairs into a time span
pub fn timedelta_kwargs(input: &str) -> IResult<&str, TimeDelta> {
    map_res(
        separated_list1(
            ws(char(',')),
            separated_pair(ws(identifier), ws(char('=')), ws(number_literal)),
        ),
        |pairs: Vec<(String, f64)>| kwargs_to_timedelta(&pairs),
    )(input)
}

/// Parse a `timedelta(...)` call as written inside ycalc window bounds
pub fn timedelta_call(input: &str) -> IResult<&str, TimeDelta> {
    let (input, _) = ws(keyword("timedelta"))(input)?;
    delimited(ws(char('(')), timedelta_kwargs, ws(char(')')))(input)
}

/// Parse a whole string such as a template `duration` field
pub fn parse_timedelta(text: &str) -> Result<TimeDelta, String> {
    match timedelta_kwargs(text) {
        Ok(("", delta)) => Ok(delta),
        Ok((rest, _)) => Err(format!("unexpected '{}' in time span", rest)),
        Err(_) => Err(format!(
            "expected time span such as 'hours=24', got '{}'",
            text
        )),
    }
}

fn kwargs_to_timedelta(pairs: &[(String, f64)]) -> Result<TimeDelta, String> {
    let mut millis = 0.0;
    for (unit, amount) in pairs {
        let seconds = match unit.as_str() {
            "weeks" => 604_800.0,
            "days" => 86_400.0,
            "hours" => 3_600.0,
            "minutes" => 60.0,
            "seconds" => 1.0,
            other => return Err(format!("unknown time unit '{}'", other)),
        };
        millis += amount * seconds * 1000.0;
    }
    if !millis.is_finite() || millis.abs() > i64::MAX as f64 / 2.0 {
        return Err("time span out of range".to_string());
    }
    TimeDelta::try_milliseconds(millis.round() as i64).ok_or_else(|| "time span out of range".to_string())
}

/// Render a time span in the keyword form accepted by `timedelta_kwargs`
pub fn format_timedelta(delta: TimeDelta) -> String {
    let millis = delta.num_milliseconds();
    if millis != 0 && millis % 86_400_000 == 0 {
        format!("days={}", millis / 86_400_000)
    } else if millis != 0 && millis % 3_600_000 == 0 {
        format!("hours={}", millis / 3_600_000)
    } else if millis != 0 && millis % 60_000 == 0 {
        format!("minutes={}", millis / 60_000)
    } else if millis % 1000 == 0 {
        format!("seconds={}", millis / 1000)
    } else {
        format!("seconds={}", millis as f64 / 1000.0)
    }
}
