//! Schema IDL parser
//!
//! Parses the text IDL describing tables, columns, column types, and
//! column attributes into [`TableDef`]s for the catalog:
//!
//! ```text
//! table User {
//!     id: int (id);
//!     name: string;
//!     email: string (key);
//!     age: int;
//! }
//! ```
//!
//! The `(id)` and `(key)` attributes both mark a column as indexed.
//! Top-level directives (`namespace`, `include`, `root_type`,
//! `file_identifier`, `attribute`) and `enum`/`union` blocks are
//! tolerated and skipped; include edges and junction derivation are not
//! part of the core contract. Column types that name another table (or
//! a vector type) are carried as opaque `bytes` columns.

use crate::catalog::{Column, TableDef};
use crate::value::ValueType;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while, take_while1},
    character::complete::{char, multispace1, not_line_ending},
    combinator::{map, opt, recognize, value},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};
use thiserror::Error;

/// Schema parsing errors
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("schema parse error: {0}")]
    Parse(String),

    #[error("duplicate table in schema: {0}")]
    DuplicateTable(String),
}

pub type SchemaResult<T> = Result<T, SchemaError>;

/// Parse a schema document into table definitions
pub fn parse_schema(input: &str) -> SchemaResult<Vec<TableDef>> {
    let (remaining, tables) = match parse_document(input) {
        Ok(ok) => ok,
        Err(e) => return Err(SchemaError::Parse(format!("{:?}", e))),
    };

    if !remaining.trim().is_empty() {
        return Err(SchemaError::Parse(format!(
            "unexpected input near: '{}'",
            remaining.trim().chars().take(40).collect::<String>()
        )));
    }

    let mut seen = std::collections::HashSet::new();
    for table in &tables {
        if !seen.insert(table.name.clone()) {
            return Err(SchemaError::DuplicateTable(table.name.clone()));
        }
    }

    Ok(tables)
}

/// Whitespace and `//` comments
fn ws(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0(alt((
            value((), multispace1),
            value((), pair(tag("//"), not_line_ending)),
        ))),
    )(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_' || c == '.'),
    ))(input)
}

fn parse_document(input: &str) -> IResult<&str, Vec<TableDef>> {
    let (input, items) = many0(preceded(ws, parse_item))(input)?;
    let (input, _) = ws(input)?;
    Ok((input, items.into_iter().flatten().collect()))
}

fn parse_item(input: &str) -> IResult<&str, Option<TableDef>> {
    alt((
        map(parse_table, Some),
        value(None, parse_directive),
        value(None, parse_enum_like),
    ))(input)
}

/// `namespace a.b;`, `include "x";`, `root_type X;`, etc.
fn parse_directive(input: &str) -> IResult<&str, ()> {
    value(
        (),
        tuple((
            alt((
                tag("namespace"),
                tag("include"),
                tag("root_type"),
                tag("file_identifier"),
                tag("attribute"),
            )),
            take_until(";"),
            char(';'),
        )),
    )(input)
}

/// `enum X : int { ... }` / `union X { ... }` blocks are skipped whole
fn parse_enum_like(input: &str) -> IResult<&str, ()> {
    value(
        (),
        tuple((
            alt((tag("enum"), tag("union"))),
            take_until("}"),
            char('}'),
        )),
    )(input)
}

fn parse_table(input: &str) -> IResult<&str, TableDef> {
    let (input, _) = tag("table")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, name) = identifier(input)?;
    let (input, _) = ws(input)?;
    let (input, fields) = delimited(
        char('{'),
        many0(preceded(ws, parse_field)),
        preceded(ws, char('}')),
    )(input)?;

    let mut columns = Vec::new();
    let mut indexed = Vec::new();
    for (column, is_indexed) in fields {
        if is_indexed {
            indexed.push(column.name.clone());
        }
        columns.push(column);
    }

    Ok((
        input,
        TableDef {
            name: name.to_string(),
            columns,
            indexed,
        },
    ))
}

/// One field: `name: type (attr, ...);`
fn parse_field(input: &str) -> IResult<&str, (Column, bool)> {
    let (input, name) = identifier(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = char(':')(input)?;
    let (input, _) = ws(input)?;
    let (input, ty) = parse_type(input)?;
    let (input, _) = ws(input)?;
    let (input, attrs) = opt(parse_attrs)(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = char(';')(input)?;

    let indexed = attrs
        .as_deref()
        .map(|attrs| attrs.iter().any(|a| a == "id" || a == "key"))
        .unwrap_or(false);

    Ok((input, (Column::new(name, ty), indexed)))
}

/// Scalar type name, or `[type]` / table reference carried as bytes
fn parse_type(input: &str) -> IResult<&str, ValueType> {
    alt((
        // Vector types are opaque to the core
        value(
            ValueType::Bytes,
            delimited(char('['), preceded(ws, pair(identifier, ws)), char(']')),
        ),
        map(identifier, scalar_type),
    ))(input)
}

fn scalar_type(name: &str) -> ValueType {
    match name {
        "bool" => ValueType::Bool,
        "byte" | "int8" => ValueType::Int8,
        "ubyte" | "uint8" => ValueType::UInt8,
        "short" | "int16" => ValueType::Int16,
        "ushort" | "uint16" => ValueType::UInt16,
        "int" | "int32" => ValueType::Int32,
        "uint" | "uint32" => ValueType::UInt32,
        "long" | "int64" => ValueType::Int64,
        "ulong" | "uint64" => ValueType::UInt64,
        "float" | "float32" => ValueType::Float32,
        "double" | "float64" => ValueType::Float64,
        "string" => ValueType::String,
        "bytes" => ValueType::Bytes,
        // Reference to another table: opaque to the core
        _ => ValueType::Bytes,
    }
}

fn parse_attrs(input: &str) -> IResult<&str, Vec<String>> {
    let (input, attrs) = delimited(
        char('('),
        separated_list1(
            delimited(ws, char(','), ws),
            delimited(ws, identifier, ws),
        ),
        char(')'),
    )(input)?;
    Ok((input, attrs.into_iter().map(str::to_string).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER_POST: &str = r#"
        table User {
            id: int (id);
            name: string;
            email: string (key);
            age: int;
        }

        table Post {
            id: int (id);
            user_id: int (key);
            title: string;
            content: string;
        }
    "#;

    #[test]
    fn test_parse_two_tables() {
        let tables = parse_schema(USER_POST).unwrap();
        assert_eq!(tables.len(), 2);

        let user = &tables[0];
        assert_eq!(user.name, "User");
        assert_eq!(user.columns.len(), 4);
        assert_eq!(user.columns[0], Column::new("id", ValueType::Int32));
        assert_eq!(user.columns[1], Column::new("name", ValueType::String));
        assert_eq!(user.indexed, vec!["id", "email"]);

        let post = &tables[1];
        assert_eq!(post.name, "Post");
        assert_eq!(post.indexed, vec!["id", "user_id"]);
    }

    #[test]
    fn test_all_scalar_types() {
        let schema = r#"
            table Scalars {
                a: bool;
                b: byte;
                c: ubyte;
                d: short;
                e: ushort;
                f: int;
                g: uint;
                h: long;
                i: ulong;
                j: float;
                k: double;
                l: string;
                m: bytes;
            }
        "#;
        let tables = parse_schema(schema).unwrap();
        let types: Vec<ValueType> = tables[0].columns.iter().map(|c| c.ty).collect();
        assert_eq!(
            types,
            vec![
                ValueType::Bool,
                ValueType::Int8,
                ValueType::UInt8,
                ValueType::Int16,
                ValueType::UInt16,
                ValueType::Int32,
                ValueType::UInt32,
                ValueType::Int64,
                ValueType::UInt64,
                ValueType::Float32,
                ValueType::Float64,
                ValueType::String,
                ValueType::Bytes,
            ]
        );
        assert!(tables[0].indexed.is_empty());
    }

    #[test]
    fn test_comments_and_directives_skipped() {
        let schema = r#"
            // schema for the stream
            namespace app.wire;
            include "base.idl";
            attribute "key";

            table Event { // inline comment
                id: long (id);
                kind: string;
            }

            root_type Event;
            file_identifier "EVNT";
        "#;
        let tables = parse_schema(schema).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "Event");
        assert_eq!(tables[0].columns[0].ty, ValueType::Int64);
    }

    #[test]
    fn test_enum_blocks_skipped() {
        let schema = r#"
            enum Color : byte { Red, Green, Blue }

            table Shape {
                id: int (id);
                color: Color;
            }
        "#;
        let tables = parse_schema(schema).unwrap();
        assert_eq!(tables.len(), 1);
        // Enum-typed column is opaque
        assert_eq!(tables[0].columns[1].ty, ValueType::Bytes);
    }

    #[test]
    fn test_vector_and_reference_types_opaque() {
        let schema = r#"
            table Post {
                id: int (id);
                tags: [string];
                author: User;
            }
        "#;
        let tables = parse_schema(schema).unwrap();
        assert_eq!(tables[0].columns[1].ty, ValueType::Bytes);
        assert_eq!(tables[0].columns[2].ty, ValueType::Bytes);
    }

    #[test]
    fn test_multiple_attrs() {
        let schema = "table T { id: int (id, required); }";
        let tables = parse_schema(schema).unwrap();
        assert_eq!(tables[0].indexed, vec!["id"]);
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let schema = "table T { id: int; } table T { id: int; }";
        assert!(matches!(
            parse_schema(schema),
            Err(SchemaError::DuplicateTable(_))
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            parse_schema("tible User { }"),
            Err(SchemaError::Parse(_))
        ));
    }

    #[test]
    fn test_empty_schema() {
        assert!(parse_schema("  \n // nothing here\n").unwrap().is_empty());
    }
}
