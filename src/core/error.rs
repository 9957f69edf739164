use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Grammar violation in the command argument vector.
    Syntax,
    /// Well-formed arguments that name something invalid.
    Semantic,
    /// Query string rejected by the query-language layer.
    Query,
    /// Index absent on every shard.
    NotFound,
    /// An index operation failed on one shard.
    Shard,
    Internal,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error { kind, message: message.into() }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Syntax, message)
    }

    pub fn semantic(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Semantic, message)
    }

    pub fn query(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Query, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::NotFound, message)
    }

    pub fn shard(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Shard, message)
    }
}

impl fmt::Display for Error {
    // The message is the user-visible reply string, verbatim.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
