//! Error type shared by the row-diff and taxonomy modules.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by this crate.
///
/// Some kinds mean the index on disk is missing or corrupt. Callers typically
/// abort on those. The rest are failures local to a single call. See [`Error::is_fatal`].
#[derive(Debug, Error)]
pub enum Error {
    /// A required input file does not exist.
    #[error("can't read {what} file '{}'", path.display())]
    MissingFile { what: &'static str, path: PathBuf },

    /// Reading or writing failed, or a serialized structure could not be decoded.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A line of a text input could not be parsed.
    #[error("parse error in {what} at line {line}: {msg}")]
    Parse { what: &'static str, line: usize, msg: String },

    /// A label refers to an accession that is not in the lookup table.
    #[error("accession version {0} cannot be found in the lookup table")]
    UnknownAccession(String),

    /// A label does not have the pipe-delimited header layout.
    #[error("malformed label '{0}'")]
    MalformedLabel(String),

    /// Arguments that do not fit the loaded structures.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Returns true for errors that indicate a missing or corrupt index or input
    /// file, as opposed to a failure affecting a single query.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::MissingFile { .. } | Error::Io(_) | Error::Parse { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
