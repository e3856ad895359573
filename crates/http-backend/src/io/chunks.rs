use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use chatroom_model::ByteStream;
use futures_util::Stream;
use futures_util::stream::unfold;
use reqwest::Response;

use crate::Error;

type BoxedChunkStream =
    Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// An adapter for streaming byte chunks out of a response body.
pub struct ResponseChunks {
    inner: BoxedChunkStream,
}

impl ResponseChunks {
    /// Wraps the body of `response`.
    pub fn from_response(response: Response) -> Self {
        // The response is dropped after the first error, so a broken body
        // is never read again.
        let inner = unfold(Some(response), |response| async move {
            let mut response = response?;
            match response.chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(response))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        });
        Self {
            inner: Box::pin(inner),
        }
    }
}

impl ByteStream for ResponseChunks {
    type Error = Error;

    fn poll_next_chunk(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<Bytes>, Self::Error>> {
        match self.inner.as_mut().poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => Poll::Ready(Ok(None)),
            Poll::Ready(Some(Ok(chunk))) => {
                trace!("got {} bytes", chunk.len());
                Poll::Ready(Ok(Some(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                Poll::Ready(Err(Error::from_reqwest(err)))
            }
        }
    }
}
