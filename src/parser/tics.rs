// Secondary axis labels in gnuplot form: `"N" 0, "NE" 45, "E" 90`

use super::lexer::{number_literal, string_literal, ws};
use nom::{
    character::complete::char,
    combinator::{eof, opt},
    multi::separated_list0,
    sequence::{pair, terminated},
    IResult,
};

fn tic(input: &str) -> IResult<&str, (String, f64)> {
    pair(ws(string_literal), ws(number_literal))(input)
}

fn tic_list(input: &str) -> IResult<&str, Vec<(String, f64)>> {
    // gnuplot allows the list to be wrapped in parentheses
    let (input, open) = opt(ws(char('(')))(input)?;
    let (input, tics) = separated_list0(ws(char(',')), tic)(input)?;
    let (input, _) = match open {
        Some(_) => ws(char(')'))(input)?,
        None => (input, ' '),
    };
    Ok((input, tics))
}

/// Parse a complete y2tics string into ordered (label, position) pairs
pub fn parse_y2tics(text: &str) -> Result<Vec<(String, f64)>, String> {
    match terminated(tic_list, ws(eof))(text) {
        Ok((_, tics)) => Ok(tics),
        Err(_) => Err(format!(
            "expected labels such as '\"N\" 0, \"E\" 90', got '{}'",
            text
        )),
    }
}

/// Render pairs back to the form accepted by `parse_y2tics`
pub fn format_y2tics(tics: &[(String, f64)]) -> String {
    tics.iter()
        .map(|(label, position)| {
            // Labels read from text never hold both quote kinds
            if label.contains('"') {
                format!("'{}' {}", label, position)
            } else {
                format!("\"{}\" {}", label, position)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
