//! Summary: Line-oriented command parsing for the client protocol.
//! Copyright (c) Meridian. All rights reserved.
//!
//! The parser validates argument count and shape before the engine is
//! invoked; the engine only ever sees well-formed requests and returns typed
//! errors for everything else.

use crate::engine::FieldChanges;
use crate::error::{Error, Result};

/// One parsed client command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add {
        name: String,
        latitude: f64,
        longitude: f64,
    },
    Intersect {
        latitude: f64,
        longitude: f64,
        width: f64,
        height: f64,
    },
    Update {
        offset: i64,
        changes: FieldChanges,
    },
    Delete {
        offset: i64,
    },
    Save,
    Load,
    Print,
    Hang,
}

/// Parses one command body (the text between command terminators).
pub fn parse(input: &str) -> Result<Command> {
    let mut tokens = input.split_whitespace();
    let keyword = tokens
        .next()
        .ok_or_else(|| Error::BadArgument("empty command".to_string()))?;

    match keyword.to_ascii_lowercase().as_str() {
        "add" => {
            let name = next_arg(&mut tokens, "add", "name")?.to_string();
            let latitude = parse_f64(next_arg(&mut tokens, "add", "lat")?, "lat")?;
            let longitude = parse_f64(next_arg(&mut tokens, "add", "lng")?, "lng")?;
            expect_end(tokens, "add")?;
            Ok(Command::Add {
                name,
                latitude,
                longitude,
            })
        }
        "intersect" => {
            let latitude = parse_f64(next_arg(&mut tokens, "intersect", "lat")?, "lat")?;
            let longitude = parse_f64(next_arg(&mut tokens, "intersect", "lng")?, "lng")?;
            let width = parse_f64(next_arg(&mut tokens, "intersect", "width")?, "width")?;
            let height = parse_f64(next_arg(&mut tokens, "intersect", "height")?, "height")?;
            expect_end(tokens, "intersect")?;
            Ok(Command::Intersect {
                latitude,
                longitude,
                width,
                height,
            })
        }
        "update" => {
            let offset = parse_i64(next_arg(&mut tokens, "update", "offset")?, "offset")?;
            let mut pairs = Vec::new();
            loop {
                match (tokens.next(), tokens.next()) {
                    (None, _) => break,
                    (Some(key), Some(value)) => pairs.push((key, value)),
                    (Some(key), None) => {
                        return Err(Error::BadArgument(format!(
                            "update key {key:?} is missing a value"
                        )));
                    }
                }
            }
            let changes = FieldChanges::parse(pairs)?;
            Ok(Command::Update { offset, changes })
        }
        "delete" => {
            let offset = parse_i64(next_arg(&mut tokens, "delete", "offset")?, "offset")?;
            expect_end(tokens, "delete")?;
            Ok(Command::Delete { offset })
        }
        "save" => {
            expect_end(tokens, "save")?;
            Ok(Command::Save)
        }
        "load" => {
            expect_end(tokens, "load")?;
            Ok(Command::Load)
        }
        "print" => {
            expect_end(tokens, "print")?;
            Ok(Command::Print)
        }
        "hang" => {
            expect_end(tokens, "hang")?;
            Ok(Command::Hang)
        }
        other => Err(Error::BadArgument(format!("unknown command {other:?}"))),
    }
}

fn next_arg<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    command: &str,
    what: &str,
) -> Result<&'a str> {
    tokens
        .next()
        .ok_or_else(|| Error::BadArgument(format!("{command} is missing the {what} argument")))
}

fn parse_f64(token: &str, what: &str) -> Result<f64> {
    token
        .parse()
        .map_err(|_| Error::BadArgument(format!("{what} expects a number, got {token:?}")))
}

fn parse_i64(token: &str, what: &str) -> Result<i64> {
    token
        .parse()
        .map_err(|_| Error::BadArgument(format!("{what} expects an integer, got {token:?}")))
}

fn expect_end<'a>(mut tokens: impl Iterator<Item = &'a str>, command: &str) -> Result<()> {
    match tokens.next() {
        None => Ok(()),
        Some(extra) => Err(Error::BadArgument(format!(
            "{command} got unexpected trailing argument {extra:?}"
        ))),
    }
}
