//! Minimal CLI parsing for the `authdb` binary.

use std::env;

pub const USAGE: &str = "\
Usage: authdb [--database-url <url>] <command>

Commands:
  push     Create missing tables, columns and indexes
  schema   Print the schema DDL
  stats    Print row counts per model as JSON";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Push,
    Schema,
    Stats,
    Help,
}

impl Command {
    fn from_arg(value: &str) -> Option<Self> {
        match value {
            "push" => Some(Command::Push),
            "schema" => Some(Command::Schema),
            "stats" => Some(Command::Stats),
            "help" | "--help" | "-h" => Some(Command::Help),
            _ => None,
        }
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct CliOptions {
    pub command: Option<Command>,
    pub database_url: Option<String>,
}

impl CliOptions {
    pub fn from_args() -> Result<Self, String> {
        Self::parse(env::args().skip(1))
    }

    pub fn parse<I>(args: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = CliOptions::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--database-url" => match args.next() {
                    Some(value) => options.database_url = Some(value),
                    None => return Err("--database-url needs a value".to_string()),
                },
                _ if arg.starts_with("--database-url=") => {
                    if let Some(value) = arg.split_once('=').map(|(_, v)| v) {
                        options.database_url = Some(value.to_string());
                    }
                }
                _ => match Command::from_arg(&arg) {
                    Some(command) if options.command.is_none() => options.command = Some(command),
                    Some(_) => return Err(format!("unexpected argument: {}", arg)),
                    None => return Err(format!("unknown argument: {}", arg)),
                },
            }
        }
        Ok(options)
    }
}
