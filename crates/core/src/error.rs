use std::error::Error as StdError;
use std::fmt::{self, Display};

use chatroom_model::{BackendError, ErrorKind};

/// A failure to obtain or read a response body.
///
/// Backend errors of any type are converted into this one, so the rest
/// of the client does not need to know which backend is in use.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TransportError {
    kind: ErrorKind,
    message: String,
}

impl TransportError {
    #[inline]
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[inline]
    pub(crate) fn from_backend<E: BackendError>(err: &E) -> Self {
        Self::new(err.kind(), err.to_string())
    }

    /// Returns the message reported by the backend.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl StdError for TransportError {}

impl BackendError for TransportError {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}
