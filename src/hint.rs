//! Optimizer hints attached to prepared statements.
//!
//! Hints arrive as raw strings on the parsed statement (for example
//! `route(r=w)` or `fullscan()`) and are parsed eagerly at prepare time so a
//! malformed hint fails the prepare rather than the execute.

use crate::error::SqlError;
use crate::errorcodes::ErrorKind;

/// The hint families the proxy understands.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HintKind {
    /// Pin the statement to the primary.
    Master,
    /// Allow the statement on a replica.
    Slave,
    /// Route to named clusters.
    Route,
    /// Permit a full-shard scan.
    FullScan,
    /// Attach a trace context.
    Trace,
    /// Execute against the shadow table.
    Shadow,
}

impl HintKind {
    fn from_name(name: &str) -> Option<HintKind> {
        match name.to_ascii_lowercase().as_str() {
            "master" => Some(HintKind::Master),
            "slave" => Some(HintKind::Slave),
            "route" => Some(HintKind::Route),
            "fullscan" => Some(HintKind::FullScan),
            "trace" => Some(HintKind::Trace),
            "shadow" => Some(HintKind::Shadow),
            _ => None,
        }
    }
}

/// One `key` or `key=value` hint argument.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HintArg {
    /// Argument name, or the bare token.
    pub key: String,
    /// Value after `=`, when present.
    pub value: Option<String>,
}

/// A parsed optimizer hint.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Hint {
    /// Which hint family this is.
    pub kind: HintKind,
    /// Its arguments, in source order.
    pub args: Vec<HintArg>,
}

fn ident(i: &str) -> nom::IResult<&str, &str> {
    nom::bytes::complete::take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(i)
}

fn arg(i: &str) -> nom::IResult<&str, HintArg> {
    use nom::bytes::complete::{tag, take_while1};
    use nom::character::complete::multispace0;
    use nom::combinator::opt;
    use nom::sequence::{delimited, preceded};

    let (i, key) = delimited(multispace0, ident, multispace0)(i)?;
    let (i, value) = opt(preceded(
        tag("="),
        delimited(
            multispace0,
            take_while1(|c: char| c != ',' && c != ')'),
            multispace0,
        ),
    ))(i)?;
    Ok((
        i,
        HintArg {
            key: key.to_owned(),
            value: value.map(|v: &str| v.trim().to_owned()),
        },
    ))
}

fn hint(i: &str) -> nom::IResult<&str, (&str, Vec<HintArg>)> {
    use nom::bytes::complete::tag;
    use nom::character::complete::multispace0;
    use nom::combinator::opt;
    use nom::multi::separated_list0;
    use nom::sequence::{delimited, tuple};

    let (i, name) = delimited(multispace0, ident, multispace0)(i)?;
    let (i, args) = opt(tuple((
        tag("("),
        separated_list0(tag(","), arg),
        multispace0,
        tag(")"),
    )))(i)?;
    let (i, _) = multispace0(i)?;
    Ok((i, (name, args.map(|(_, a, _, _)| a).unwrap_or_default())))
}

impl Hint {
    /// Parse one hint string.
    pub fn parse(s: &str) -> Result<Hint, SqlError> {
        let bad = || {
            SqlError::new(
                ErrorKind::ER_PARSE_ERROR,
                format!("invalid optimizer hint '{}'", s),
            )
        };

        let (rest, (name, args)) = hint(s).map_err(|_| bad())?;
        if !rest.is_empty() {
            return Err(bad());
        }
        let kind = HintKind::from_name(name).ok_or_else(|| {
            SqlError::new(
                ErrorKind::ER_PARSE_ERROR,
                format!("unsupported optimizer hint '{}'", name),
            )
        })?;
        Ok(Hint { kind, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_hint() {
        let h = Hint::parse("master").unwrap();
        assert_eq!(h.kind, HintKind::Master);
        assert!(h.args.is_empty());
    }

    #[test]
    fn parses_empty_parens() {
        let h = Hint::parse("fullscan()").unwrap();
        assert_eq!(h.kind, HintKind::FullScan);
        assert!(h.args.is_empty());
    }

    #[test]
    fn parses_key_value_args() {
        let h = Hint::parse("route(r=w, az=east_1)").unwrap();
        assert_eq!(h.kind, HintKind::Route);
        assert_eq!(
            h.args,
            vec![
                HintArg {
                    key: "r".to_owned(),
                    value: Some("w".to_owned()),
                },
                HintArg {
                    key: "az".to_owned(),
                    value: Some("east_1".to_owned()),
                },
            ]
        );
    }

    #[test]
    fn rejects_unknown_hint() {
        let e = Hint::parse("teleport(now)").unwrap_err();
        assert_eq!(e.code, 1064);
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(Hint::parse("master(").is_err());
    }
}
