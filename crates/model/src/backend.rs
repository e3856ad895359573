use std::error::Error;

use crate::error::ErrorKind;
use crate::request::ChatRequest;
use crate::stream::ByteStream;

/// The error type for a chat backend.
pub trait BackendError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;
}

/// A type that represents a chat backend, which accepts a prompt with
/// its history and streams back the model's answer.
///
/// Once the backend is created, it should behave like a stateless
/// object. It can still have internal state, but callers should not
/// rely on it, and the backend should be prepared for being dropped
/// anytime.
pub trait ChatBackend: Send + Sync {
    /// The error type that may be returned by the backend.
    type Error: BackendError;

    /// The body stream type for this backend.
    type Stream: ByteStream<Error = Self::Error> + Send;

    /// Sends a request to the backend.
    ///
    /// The returned future resolves once the backend has accepted the
    /// request and a readable body is available.
    fn send_request(
        &self,
        req: &ChatRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static;
}
