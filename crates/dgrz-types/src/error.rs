//! The error model shared by every dogg3rz crate.
//!
//! Errors carry a coarse [`ErrorKind`] tag, a human-readable message, and an
//! ordered map of context fields (`path`, `key`, `element`, ...) that the CLI
//! prints after the message.

use std::collections::BTreeMap;
use std::fmt;

/// The kind of failure. The CLI prints this as a `Kind: message` prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidValue,
    InvalidPathElement,
    OutOfRange,
    AlreadyExists,
    NotFound,
    UnexpectedType,
    UnexpectedValue,
    TryAgain,
    Cancelled,
    TimedOut,
    InvalidState,
    EmptyCommit,
    ExternalError,
    AssertionError,
}

impl ErrorKind {
    /// The tag as printed to users.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidValue => "InvalidValue",
            Self::InvalidPathElement => "InvalidPathElement",
            Self::OutOfRange => "OutOfRange",
            Self::AlreadyExists => "AlreadyExists",
            Self::NotFound => "NotFound",
            Self::UnexpectedType => "UnexpectedType",
            Self::UnexpectedValue => "UnexpectedValue",
            Self::TryAgain => "TryAgain",
            Self::Cancelled => "Cancelled",
            Self::TimedOut => "TimedOut",
            Self::InvalidState => "InvalidState",
            Self::EmptyCommit => "EmptyCommit",
            Self::ExternalError => "ExternalError",
            Self::AssertionError => "AssertionError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dogg3rz error: kind, message, context fields and an optional cause.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct DgrzError {
    kind: ErrorKind,
    message: String,
    context: BTreeMap<String, String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl DgrzError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: BTreeMap::new(),
            source: None,
        }
    }

    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidValue, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OutOfRange, message)
    }

    pub fn unexpected_type(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnexpectedType, message)
    }

    pub fn unexpected_value(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnexpectedValue, message)
    }

    pub fn try_again(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TryAgain, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation cancelled")
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExternalError, message)
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AssertionError, message)
    }

    /// Attach a context field. Later values for the same key win.
    pub fn with_context(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// Attach the underlying cause.
    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    /// Returns `true` if this error has the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl From<std::io::Error> for DgrzError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
            std::io::ErrorKind::TimedOut => ErrorKind::TimedOut,
            std::io::ErrorKind::InvalidData => ErrorKind::UnexpectedValue,
            _ => ErrorKind::ExternalError,
        };
        Self::new(kind, err.to_string()).with_source(err)
    }
}

impl From<serde_json::Error> for DgrzError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorKind::UnexpectedValue, format!("invalid JSON: {err}")).with_source(err)
    }
}

/// Convenience alias for dogg3rz results.
pub type DgrzResult<T> = Result<T, DgrzError>;
