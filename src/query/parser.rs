//! SQL parser
//!
//! Parses the supported SELECT subset into [`SelectStatement`]s.
//!
//! # Supported syntax
//!
//! ```text
//! SELECT * | col [, col ...] | AGG(col) [, ...]
//! FROM table | "Table@source"
//! [WHERE col op value [AND ...]]       op: = != <> < <= > >= BETWEEN
//! [ORDER BY col [ASC|DESC]]
//! [LIMIT n [OFFSET m]]
//! ```
//!
//! Values are integer/float literals, `'strings'` (with `''` escaping),
//! `NULL`, `TRUE`/`FALSE`, or positional `?` placeholders numbered left
//! to right. Keywords are case-insensitive.

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{char, digit1, multispace0, multispace1},
    combinator::{map, map_res, opt, recognize, value},
    multi::separated_list1,
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

use crate::query::ast::*;
use crate::query::error::{QueryError, QueryResult};
use crate::value::Value;

/// Parse a query string into a statement, numbering `?` placeholders
pub fn parse_query(input: &str) -> QueryResult<SelectStatement> {
    let trimmed = input.trim().trim_end_matches(';');

    match parse_select(trimmed) {
        Ok((remaining, mut stmt)) => {
            if !remaining.trim().is_empty() {
                return Err(QueryError::Parse(format!(
                    "unexpected input after query: '{}'",
                    remaining.trim()
                )));
            }
            number_params(&mut stmt);
            Ok(stmt)
        }
        Err(e) => Err(QueryError::Parse(format!("{:?}", e))),
    }
}

/// Assign placeholder slots left to right
fn number_params(stmt: &mut SelectStatement) {
    let mut count = 0;
    for predicate in &mut stmt.predicates {
        if let Operand::Param(slot) = &mut predicate.operand {
            *slot = count;
            count += 1;
        }
    }
    stmt.param_count = count;
}

fn parse_select(input: &str) -> IResult<&str, SelectStatement> {
    let (input, _) = multispace0(input)?;
    let (input, _) = tag_no_case("SELECT")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, columns) = parse_select_list(input)?;
    let (input, _) = multispace1(input)?;
    let (input, _) = tag_no_case("FROM")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, table) = parse_table_name(input)?;
    let (input, predicates) = opt(preceded(multispace1, parse_where))(input)?;
    let (input, order_by) = opt(preceded(multispace1, parse_order_by))(input)?;
    let (input, limits) = opt(preceded(multispace1, parse_limit))(input)?;
    let (input, _) = multispace0(input)?;

    let (limit, offset) = limits.unwrap_or((None, None));

    Ok((
        input,
        SelectStatement {
            columns,
            table,
            predicates: predicates.unwrap_or_default(),
            order_by,
            limit,
            offset,
            param_count: 0,
        },
    ))
}

fn parse_select_list(input: &str) -> IResult<&str, Vec<SelectColumn>> {
    alt((
        value(vec![SelectColumn::Star], char('*')),
        separated_list1(
            delimited(multispace0, char(','), multispace0),
            parse_select_item,
        ),
    ))(input)
}

fn parse_select_item(input: &str) -> IResult<&str, SelectColumn> {
    alt((
        parse_aggregate,
        map(identifier, |name| SelectColumn::Column(name.to_string())),
    ))(input)
}

/// `COUNT(*)`, `SUM(col)`, ...
fn parse_aggregate(input: &str) -> IResult<&str, SelectColumn> {
    let (input, func) = parse_aggregate_func(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char('(')(input)?;
    let (input, _) = multispace0(input)?;
    let (input, column) = alt((
        value(None, char('*')),
        map(identifier, |name| Some(name.to_string())),
    ))(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char(')')(input)?;

    Ok((input, SelectColumn::Aggregate { func, column }))
}

fn parse_aggregate_func(input: &str) -> IResult<&str, AggregateFunc> {
    alt((
        value(AggregateFunc::Count, tag_no_case("COUNT")),
        value(AggregateFunc::Sum, tag_no_case("SUM")),
        value(AggregateFunc::Min, tag_no_case("MIN")),
        value(AggregateFunc::Max, tag_no_case("MAX")),
        value(AggregateFunc::Avg, tag_no_case("AVG")),
    ))(input)
}

/// Bare identifier or a quoted `"Table@source"` name
fn parse_table_name(input: &str) -> IResult<&str, String> {
    alt((
        map(quoted_identifier, str::to_string),
        map(identifier, str::to_string),
    ))(input)
}

fn parse_where(input: &str) -> IResult<&str, Vec<Predicate>> {
    let (input, _) = tag_no_case("WHERE")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, groups) = separated_list1(
        delimited(multispace1, tag_no_case("AND"), multispace1),
        parse_predicate,
    )(input)?;
    Ok((input, groups.into_iter().flatten().collect()))
}

/// One conjunct; `BETWEEN a AND b` desugars to two inclusive predicates
fn parse_predicate(input: &str) -> IResult<&str, Vec<Predicate>> {
    let (input, column) = identifier(input)?;
    let (input, _) = multispace0(input)?;

    if let Ok((input, _)) = tuple((
        tag_no_case::<_, _, nom::error::Error<&str>>("BETWEEN"),
        multispace1,
    ))(input)
    {
        let (input, lo) = parse_operand(input)?;
        let (input, _) = delimited(multispace1, tag_no_case("AND"), multispace1)(input)?;
        let (input, hi) = parse_operand(input)?;
        return Ok((
            input,
            vec![
                Predicate {
                    column: column.to_string(),
                    op: CompareOp::Ge,
                    operand: lo,
                },
                Predicate {
                    column: column.to_string(),
                    op: CompareOp::Le,
                    operand: hi,
                },
            ],
        ));
    }

    let (input, op) = parse_operator(input)?;
    let (input, _) = multispace0(input)?;
    let (input, operand) = parse_operand(input)?;

    Ok((
        input,
        vec![Predicate {
            column: column.to_string(),
            op,
            operand,
        }],
    ))
}

fn parse_operator(input: &str) -> IResult<&str, CompareOp> {
    alt((
        value(CompareOp::Ge, tag(">=")),
        value(CompareOp::Le, tag("<=")),
        value(CompareOp::Ne, alt((tag("!="), tag("<>")))),
        value(CompareOp::Gt, tag(">")),
        value(CompareOp::Lt, tag("<")),
        value(CompareOp::Eq, alt((tag("=="), tag("=")))),
    ))(input)
}

fn parse_operand(input: &str) -> IResult<&str, Operand> {
    alt((
        // Slots are renumbered left to right after the parse
        value(Operand::Param(usize::MAX), char('?')),
        map(parse_literal, Operand::Literal),
    ))(input)
}

fn parse_literal(input: &str) -> IResult<&str, Value> {
    alt((
        value(Value::Null, tag_no_case("NULL")),
        value(Value::Bool(true), tag_no_case("TRUE")),
        value(Value::Bool(false), tag_no_case("FALSE")),
        map(parse_string_literal, Value::Str),
        parse_number,
    ))(input)
}

/// `'text'` with `''` as an escaped quote
fn parse_string_literal(input: &str) -> IResult<&str, String> {
    let (mut rest, _) = char('\'')(input)?;
    let mut out = String::new();
    loop {
        let Some(idx) = rest.find('\'') else {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Char,
            )));
        };
        out.push_str(&rest[..idx]);
        rest = &rest[idx + 1..];
        if let Some(stripped) = rest.strip_prefix('\'') {
            out.push('\'');
            rest = stripped;
        } else {
            return Ok((rest, out));
        }
    }
}

/// Integer or float literal; a decimal point selects f64
fn parse_number(input: &str) -> IResult<&str, Value> {
    let (rest, text) = recognize(tuple((
        opt(char('-')),
        digit1,
        opt(pair(char('.'), digit1)),
    )))(input)?;

    let value = if text.contains('.') {
        match text.parse::<f64>() {
            Ok(v) => Value::F64(v),
            Err(_) => {
                return Err(nom::Err::Error(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Float,
                )))
            }
        }
    } else {
        match text.parse::<i64>() {
            Ok(v) => Value::I64(v),
            Err(_) => {
                return Err(nom::Err::Error(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Digit,
                )))
            }
        }
    };
    Ok((rest, value))
}

fn parse_order_by(input: &str) -> IResult<&str, OrderBy> {
    let (input, _) = tag_no_case("ORDER")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, _) = tag_no_case("BY")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, column) = identifier(input)?;
    let (input, direction) = opt(preceded(
        multispace1,
        alt((
            value(false, tag_no_case("ASC")),
            value(true, tag_no_case("DESC")),
        )),
    ))(input)?;

    Ok((
        input,
        OrderBy {
            column: column.to_string(),
            descending: direction.unwrap_or(false),
        },
    ))
}

fn parse_limit(input: &str) -> IResult<&str, (Option<u64>, Option<u64>)> {
    let (input, _) = tag_no_case("LIMIT")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, limit) = map_res(digit1, str::parse::<u64>)(input)?;
    let (input, offset) = opt(preceded(
        tuple((multispace1, tag_no_case("OFFSET"), multispace1)),
        map_res(digit1, str::parse::<u64>),
    ))(input)?;

    Ok((input, (Some(limit), offset)))
}

/// Identifier: letters, digits, underscores; leading underscore allowed
/// for the synthetic columns
fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))(input)
}

/// `"quoted name"` (used for source-variant tables)
fn quoted_identifier(input: &str) -> IResult<&str, &str> {
    delimited(char('"'), take_while1(|c| c != '"'), char('"'))(input)
}
