use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_until},
    character::complete::{char, digit1, multispace0, multispace1},
    combinator::{map_res, opt},
    sequence::{delimited, preceded},
    IResult,
};

use crate::model::DEFAULT_TOP_K;

#[derive(Debug, PartialEq, Clone)]
pub enum Command {
    /// Retrieval-augmented answer over browsing history.
    Rag { query: String, k: usize },
    /// Plain generation, no retrieval.
    Ask { query: String },
    Help,
    Exit,
}

// --- BASIC PARSERS ---

fn parse_quoted_string(input: &str) -> IResult<&str, String> {
    let (input, _) = char('"')(input)?;
    let (input, content) = take_until("\"")(input)?;
    let (input, _) = char('"')(input)?;
    Ok((input, content.to_string()))
}

fn parse_usize(input: &str) -> IResult<&str, usize> {
    map_res(digit1, |s: &str| s.parse::<usize>())(input)
}

// --- HELPERS ---
fn ws<'a, F, O, E: nom::error::ParseError<&'a str>>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O, E>
where F: FnMut(&'a str) -> IResult<&'a str, O, E> {
    delimited(multispace0, inner, multispace0)
}

fn tag_ci(t: &'static str) -> impl FnMut(&str) -> IResult<&str, &str> {
    move |input| tag_no_case(t)(input)
}

// --- COMMAND PARSERS ---

// RAG "text" [LIMIT k]   (SEARCH is an alias)
fn parse_rag(input: &str) -> IResult<&str, Command> {
    let (input, _) = alt((tag_ci("RAG"), tag_ci("SEARCH")))(input)?;
    let (input, _) = multispace1(input)?;
    let (input, query) = parse_quoted_string(input)?;
    let (input, k) = opt(preceded(ws(tag_ci("LIMIT")), parse_usize))(input)?;
    Ok((input, Command::Rag { query, k: k.unwrap_or(DEFAULT_TOP_K) }))
}

// ASK "text"
fn parse_ask(input: &str) -> IResult<&str, Command> {
    let (input, _) = alt((tag_ci("ASK"), tag_ci("GENERATE")))(input)?;
    let (input, _) = multispace1(input)?;
    let (input, query) = parse_quoted_string(input)?;
    Ok((input, Command::Ask { query }))
}

fn parse_help(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("HELP")(input)?;
    Ok((input, Command::Help))
}

fn parse_exit(input: &str) -> IResult<&str, Command> {
    let (input, _) = alt((tag_ci("EXIT"), tag_ci("QUIT")))(input)?;
    Ok((input, Command::Exit))
}

pub fn parse_command(input: &str) -> Result<Command, String> {
    let input = input.trim();
    let result = alt((
        parse_rag,
        parse_ask,
        parse_help,
        parse_exit,
    ))(input);

    match result {
        Ok((remainder, cmd)) => {
            if !remainder.trim().is_empty() {
                return Err(format!("Unexpected tokens at end: '{}'", remainder));
            }
            if let Command::Rag { k: 0, .. } = cmd {
                return Err("LIMIT must be at least 1".to_string());
            }
            Ok(cmd)
        },
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let context: String = if e.input.chars().count() > 20 {
                format!("{}...", e.input.chars().take(20).collect::<String>())
            } else {
                e.input.to_string()
            };
            Err(format!("Invalid syntax near: '{}'", context))
        },
        Err(nom::Err::Incomplete(_)) => Err("Incomplete command.".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rag_with_limit() {
        assert_eq!(
            parse_command(r#"rag "investment account balance" LIMIT 1"#),
            Ok(Command::Rag { query: "investment account balance".into(), k: 1 })
        );
    }

    #[test]
    fn rag_defaults_k() {
        assert_eq!(
            parse_command(r#"SEARCH "weather""#),
            Ok(Command::Rag { query: "weather".into(), k: DEFAULT_TOP_K })
        );
    }

    #[test]
    fn ask_and_keywords() {
        assert_eq!(parse_command(r#"ASK "what is rust?""#), Ok(Command::Ask { query: "what is rust?".into() }));
        assert_eq!(parse_command("help"), Ok(Command::Help));
        assert_eq!(parse_command(" quit "), Ok(Command::Exit));
    }

    #[test]
    fn zero_limit_rejected() {
        assert!(parse_command(r#"RAG "x" LIMIT 0"#).is_err());
    }

    #[test]
    fn trailing_garbage_rejected() {
        let err = parse_command(r#"ASK "x" extra"#).unwrap_err();
        assert!(err.starts_with("Unexpected tokens"));
    }

    #[test]
    fn unquoted_query_is_syntax_error() {
        assert!(parse_command("RAG weather").unwrap_err().starts_with("Invalid syntax"));
    }
}
