// Copyright 2017 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    /// A path component did not exist and `descend` was not asked to
    /// create it.
    NotFound(String),

    /// A path component exists but names a file or symlink rather than a
    /// directory.
    NotADirectory(String),

    /// The underlying store reported corruption or an I/O failure.
    Store(cas::Error),

    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(name) => write!(f, "no such entry: {name}"),
            Error::NotADirectory(name) => write!(f, "not a directory: {name}"),
            Error::Store(e) => write!(f, "{e}"),
            Error::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<cas::Error> for Error {
    fn from(e: cas::Error) -> Error {
        Error::Store(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}
