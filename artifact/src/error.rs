use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// A referenced digest or path component could not be found.
    NotFound(String),

    /// A manifest or blob failed to decode.
    Malformed(String),

    /// A metadata YAML document parsed as YAML but had an unexpected shape.
    SchemaMismatch(String),

    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(what) => write!(f, "not found: {what}"),
            Error::Malformed(msg) => write!(f, "malformed: {msg}"),
            Error::SchemaMismatch(msg) => write!(f, "schema mismatch: {msg}"),
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

impl From<vfs::Error> for Error {
    fn from(e: vfs::Error) -> Error {
        match e {
            vfs::Error::NotFound(name) => Error::NotFound(name),
            vfs::Error::NotADirectory(name) => Error::Malformed(format!("not a directory: {name}")),
            vfs::Error::Store(e) => e.into(),
            vfs::Error::Io(e) => Error::Io(e),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Error {
        Error::SchemaMismatch(e.to_string())
    }
}
