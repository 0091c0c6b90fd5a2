use std::fmt;

#[derive(Debug)]
pub enum Error {
    NotFound(String),
    Malformed(String),
    /// A write would exceed quota and no evictable reference exists.
    QuotaExceeded,
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(reference) => write!(f, "no such reference: {reference}"),
            Error::Malformed(msg) => write!(f, "malformed reference file: {msg}"),
            Error::QuotaExceeded => write!(f, "quota exceeded: no evictable reference"),
            Error::Io(e) => write!(f, "{e}"),
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

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::Io(e)
    }
}

impl From<cas::Error> for Error {
    fn from(e: cas::Error) -> Error {
        match e {
            cas::Error::NotFound(d) => Error::NotFound(d.to_string()),
            cas::Error::Malformed(msg) => Error::Malformed(msg),
            cas::Error::Io(e) => Error::Io(e),
        }
    }
}
