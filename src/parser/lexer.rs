// Lexer utilities shared by the ycalc, time-delta and y2tics grammars

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, multispace0, satisfy},
    combinator::{map_res, not, recognize},
    number::complete::recognize_float,
    sequence::{delimited, terminated},
    IResult,
};

/// Parse and consume whitespace
pub fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

/// Parse an identifier (function name, time unit)
/// Format: [a-zA-Z_][a-zA-Z0-9_]*
pub fn identifier(input: &str) -> IResult<&str, String> {
    let (rest, ident) = recognize(take_while1(|c: char| c.is_alphanumeric() || c == '_'))(input)?;

    // Validate first character
    if let Some(first) = ident.chars().next() {
        if !first.is_alphabetic() && first != '_' {
            return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Alpha)));
        }
    }

    Ok((rest, ident.to_string()))
}

/// Match a reserved word that is not the prefix of a longer identifier
pub fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    move |input| {
        terminated(
            tag(word),
            not(satisfy(|c: char| c.is_alphanumeric() || c == '_')),
        )(input)
    }
}

/// Parse a string literal in single or double quotes
/// Format: "..." or '...'
pub fn string_literal(input: &str) -> IResult<&str, String> {
    let (input, content) = alt((
        delimited(char('"'), take_while(|c| c != '"'), char('"')),
        delimited(char('\''), take_while(|c| c != '\''), char('\'')),
    ))(input)?;

    Ok((input, content.to_string()))
}

/// Parse a number literal (integer or float). Never matches `nan` or `inf`.
pub fn number_literal(input: &str) -> IResult<&str, f64> {
    map_res(recognize_float, |s: &str| s.parse::<f64>())(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier() {
        assert_eq!(identifier("foo"), Ok(("", "foo".to_string())));
        assert_eq!(identifier("wind_mph("), Ok(("(", "wind_mph".to_string())));
        assert_eq!(identifier("_bar"), Ok(("", "_bar".to_string())));
    }

    #[test]
    fn test_identifier_invalid_start_with_number() {
        assert!(identifier("123abc").is_err());
        assert!(identifier("1test").is_err());
    }

    #[test]
    fn test_keyword_requires_word_boundary() {
        assert_eq!(keyword("if")("if x"), Ok((" x", "if")));
        assert!(keyword("or")("order").is_err());
        assert_eq!(keyword("None")("None)"), Ok((")", "None")));
    }

    #[test]
    fn test_string_literal_both_quotes() {
        assert_eq!(string_literal(r#""wind_ave""#), Ok(("", "wind_ave".to_string())));
        assert_eq!(string_literal("'wind_gust']"), Ok(("]", "wind_gust".to_string())));
    }

    #[test]
    fn test_string_literal_empty() {
        // Empty labels are legal in y2tics
        assert_eq!(string_literal(r#""""#), Ok(("", String::new())));
    }

    #[test]
    fn test_string_literal_unclosed() {
        assert!(string_literal(r#""hello"#).is_err());
        assert!(string_literal("'hello").is_err());
    }

    #[test]
    fn test_number_literal() {
        assert_eq!(number_literal("42"), Ok(("", 42.0)));
        assert_eq!(number_literal("0.8,"), Ok((",", 0.8)));
        assert_eq!(number_literal("1e3"), Ok(("", 1000.0)));
        assert_eq!(number_literal("-3.5"), Ok(("", -3.5)));
    }

    #[test]
    fn test_number_literal_rejects_words() {
        assert!(number_literal("nan").is_err());
        assert!(number_literal("inf").is_err());
    }

    #[test]
    fn test_ws() {
        let mut parser = ws(tag("foo"));
        assert_eq!(parser("  foo  "), Ok(("", "foo")));
        assert_eq!(parser("\n\tfoo\t\n"), Ok(("", "foo")));
    }
}
