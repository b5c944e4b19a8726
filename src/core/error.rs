//! Purpose: Shared error type for the wire codec, decoder, transport, and CLI.
//! Exports: `Error`, `ErrorKind`, `DecodeError`, `to_exit_code`.
//! Role: One error surface; `DecodeError` stays separate so callers can match on it.
//! Invariants: Exit codes per `ErrorKind` are stable.
//! Invariants: Decode failures keep the included id, type url, and the underlying cause.
use std::error::Error as StdError;
use std::fmt;

use crate::core::wire::WireError;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    NotFound,
    AlreadyExists,
    Busy,
    Permission,
    Corrupt,
    Io,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    method: Option<String>,
    entry: Option<String>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            method: None,
            entry: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    /// RPC method path the failure belongs to, if any.
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    /// Included-map id the failure belongs to, if any.
    pub fn entry(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(method) = &self.method {
            write!(f, " (method: {method})")?;
        }
        if let Some(entry) = &self.entry {
            write!(f, " (entry: {entry})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

/// Failure to resolve one entry of an included map.
///
/// Both variants are terminal for the whole decode call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// No decoder is registered for the entry's type url.
    UnknownTypeTag { id: String, type_url: String },
    /// The bytes do not parse under the schema named by the type url.
    MalformedPayload {
        id: String,
        type_url: String,
        cause: WireError,
    },
}

impl DecodeError {
    pub fn id(&self) -> &str {
        match self {
            DecodeError::UnknownTypeTag { id, .. } | DecodeError::MalformedPayload { id, .. } => id,
        }
    }

    pub fn type_url(&self) -> &str {
        match self {
            DecodeError::UnknownTypeTag { type_url, .. }
            | DecodeError::MalformedPayload { type_url, .. } => type_url,
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnknownTypeTag { id, type_url } => {
                write!(f, "unknown type url {type_url:?} for included entry {id:?}")
            }
            DecodeError::MalformedPayload {
                id,
                type_url,
                cause,
            } => write!(
                f,
                "malformed {type_url:?} payload for included entry {id:?}: {cause}"
            ),
        }
    }
}

impl StdError for DecodeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            DecodeError::UnknownTypeTag { .. } => None,
            DecodeError::MalformedPayload { cause, .. } => Some(cause),
        }
    }
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        let hint = match &err {
            DecodeError::UnknownTypeTag { .. } => {
                "The server returned an entity type this client does not know; upgrade the client or pass --skip-unknown."
            }
            DecodeError::MalformedPayload { .. } => {
                "The payload does not match the client's schema for this type; check client/server versions."
            }
        };
        let message = err.to_string();
        let entry = err.id().to_string();
        Error::new(ErrorKind::Corrupt)
            .with_message(message)
            .with_hint(hint)
            .with_entry(entry)
            .with_source(err)
    }
}

impl From<WireError> for Error {
    fn from(err: WireError) -> Self {
        Error::new(ErrorKind::Corrupt)
            .with_message("malformed protobuf message")
            .with_source(err)
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::AlreadyExists => 4,
        ErrorKind::Busy => 5,
        ErrorKind::Permission => 6,
        ErrorKind::Corrupt => 7,
        ErrorKind::Io => 8,
    }
}
