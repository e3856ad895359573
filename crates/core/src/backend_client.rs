use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use chatroom_model::{ByteStream, ChatBackend, ChatRequest};
use pin_project_lite::pin_project;
use tracing::Instrument;

use crate::TransportError;

/// A response body whose backend type has been erased.
pub(crate) type ResponseStream =
    Pin<Box<dyn ByteStream<Error = TransportError> + Send>>;

type SendRequestResult = Result<ResponseStream, TransportError>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type HandlerFn =
    Arc<dyn Fn(ChatRequest) -> BoxedSendRequestFuture + Send + Sync>;

/// A wrapper around a chat backend that provides a type-erased
/// interface for the other modules.
#[derive(Clone)]
pub(crate) struct BackendClient {
    handler_fn: HandlerFn,
}

impl BackendClient {
    pub fn new<B: ChatBackend + 'static>(backend: B) -> Self
    where
        B::Stream: 'static,
    {
        // The client task and the session tasks must not be generic over
        // the backend, so `B` is erased here.
        let handler_fn: HandlerFn = Arc::new(move |req| {
            let fut = backend.send_request(&req);
            Box::pin(
                async move {
                    trace!("sending {} history entries", req.history.len());
                    match fut.await {
                        Ok(stream) => {
                            trace!("got a response body");
                            let stream: ResponseStream =
                                Box::pin(ErasedStream { inner: stream });
                            Ok(stream)
                        }
                        Err(err) => {
                            error!("failed to send request: {err}");
                            Err(TransportError::from_backend(&err))
                        }
                    }
                }
                .instrument(trace_span!("backend req")),
            )
        });
        Self { handler_fn }
    }

    /// Sends a request and returns the response body once the backend
    /// has accepted it.
    #[inline]
    pub async fn send_request(&self, req: ChatRequest) -> SendRequestResult {
        (self.handler_fn)(req).await
    }
}

pin_project! {
    struct ErasedStream<S> {
        #[pin]
        inner: S,
    }
}

impl<S: ByteStream> ByteStream for ErasedStream<S> {
    type Error = TransportError;

    fn poll_next_chunk(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<Bytes>, Self::Error>> {
        self.project().inner.poll_next_chunk(cx).map_err(|err| {
            error!("failed to read response: {err}");
            TransportError::from_backend(&err)
        })
    }
}
