//! Terminal commands: the client's user-input source.
//!
//! One command per line. Anything not starting with `:` is appended to the
//! document as typed.

use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Append text at the end of the document
    Append(String),
    Insert { index: usize, text: String },
    Delete { index: usize, length: usize },
    /// Toggle bold on a range
    Bold { index: usize, length: usize },
    Save,
    Summary,
    Show,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  <text>                 append text
  :insert <index> <text> insert text at a position
  :delete <index> <len>  delete a range
  :bold <index> <len>    toggle bold on a range
  :save                  save the document
  :summary               refresh the summary
  :show                  print the document
  :help                  show this help
  :quit                  leave the session";

fn parse_usize(arg: Option<&str>, usage: &'static str) -> Result<usize, CommandError> {
    arg.and_then(|a| a.parse().ok())
        .ok_or(CommandError::Usage(usage))
}

fn range(args: &str, usage: &'static str) -> Result<(usize, usize), CommandError> {
    let mut parts = args.split_whitespace();
    let index = parse_usize(parts.next(), usage)?;
    let length = parse_usize(parts.next(), usage)?;
    if parts.next().is_some() {
        return Err(CommandError::Usage(usage));
    }
    Ok((index, length))
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let Some(rest) = line.strip_prefix(':') else {
            return Ok(Command::Append(line.to_string()));
        };

        let (name, args) = rest.split_once(' ').unwrap_or((rest, ""));
        match name {
            "insert" => {
                const USAGE: &str = ":insert <index> <text>";
                let (index, text) = args.split_once(' ').ok_or(CommandError::Usage(USAGE))?;
                let index = parse_usize(Some(index), USAGE)?;
                if text.is_empty() {
                    return Err(CommandError::Usage(USAGE));
                }
                Ok(Command::Insert {
                    index,
                    text: text.to_string(),
                })
            }
            "delete" => {
                let (index, length) = range(args, ":delete <index> <len>")?;
                Ok(Command::Delete { index, length })
            }
            "bold" => {
                let (index, length) = range(args, ":bold <index> <len>")?;
                Ok(Command::Bold { index, length })
            }
            "save" => Ok(Command::Save),
            "summary" => Ok(Command::Summary),
            "show" => Ok(Command::Show),
            "help" => Ok(Command::Help),
            "quit" | "q" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}
