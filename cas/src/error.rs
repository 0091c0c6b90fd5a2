// Copyright 2017 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;
use std::io;

use hashing::Digest;

/// Errors surfaced by the content-addressable store. The CAS never swallows
/// an error: callers decide what a `NotFound` means for their use case, but
/// `Malformed` and `Io` are always propagated.
#[derive(Debug)]
pub enum Error {
    /// A digest or reference was absent from the store.
    NotFound(Digest),

    /// A blob's bytes did not hash to the digest it was stored under, or a
    /// manifest failed to decode. Fatal for the containing operation; the
    /// offending blob is left on disk rather than auto-deleted.
    Malformed(String),

    /// An underlying filesystem error, with the original OS error attached.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(digest) => write!(f, "not found in store: {digest}"),
            Error::Malformed(msg) => write!(f, "malformed store content: {msg}"),
            Error::Io(e) => write!(f, "store I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}
