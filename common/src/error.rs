// SPDX-FileCopyrightText: © 2025 pyisolate authors

use crate::pyenv::ModuleCategory;
use ruff_python_parser::ParseError;
use std::fmt::Display;
use std::io;

/// Failures surfaced to the caller. Unresolved names are not errors:
/// they accumulate in the report and are downgraded to warnings.
#[derive(Debug)]
pub enum Error {
    /// the entry's defining module or definition cannot be found
    NotLocatable(String),
    /// the entry is a builtin with no readable source
    BuiltinSource(String),
    /// the entry lives in `__main__` and no history fragment defines it
    NoSessionSource(String),
    /// the module source did not parse
    SyntaxFailure(ParseError),
    /// the entry belongs to stdlib or an installed distribution
    ExternalEntry {
        name: String,
        category: ModuleCategory,
    },
    Io(io::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotLocatable(what) => {
                write!(f, "could not locate a source definition for '{}'", what)
            }
            Error::BuiltinSource(what) => {
                write!(f, "'{}' is a builtin; its source cannot be extracted", what)
            }
            Error::NoSessionSource(what) => write!(
                f,
                "'{}' is defined in __main__ but no session fragment defines it",
                what
            ),
            Error::SyntaxFailure(parse) => parse.fmt(f),
            Error::ExternalEntry { name, category } => {
                write!(f, "refusing to extract '{}' from a {} module", name, category)
            }
            Error::Io(io) => io.fmt(f),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Error {
        Error::SyntaxFailure(err)
    }
}
