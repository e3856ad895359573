use std::pin::Pin;
use std::task::{self, Poll};

use bytes::Bytes;

use crate::backend::BackendError;

/// The body of a backend response, delivered as opaque byte chunks.
///
/// Chunk boundaries carry no meaning: a chunk may end in the middle of
/// a line, or even in the middle of a multi-byte character.
pub trait ByteStream {
    /// The error type that may be returned while reading.
    type Error: BackendError;

    /// Attempts to pull out the next chunk from the body.
    ///
    /// # Return value
    ///
    /// - `Poll::Pending` means that the next chunk has not arrived yet.
    ///   Implementations will ensure that the current task will be
    ///   notified when it may be ready.
    /// - `Poll::Ready(Ok(Some(chunk)))` delivers a chunk; more may follow.
    /// - `Poll::Ready(Ok(None))` means the body has been exhausted.
    /// - `Poll::Ready(Err(error))` means reading the body failed.
    ///
    /// Calling this method after exhaustion should always return `None`.
    fn poll_next_chunk(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<Bytes>, Self::Error>>;
}
