//! A local scripted chat backend for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use bytes::Bytes;
use chatroom_model::{
    BackendError, ByteStream, ChatBackend, ChatRequest, ErrorKind,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl BackendError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestByteStream {
    chunks: VecDeque<Bytes>,
    failure: PresetFailure,
    delivered: usize,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ByteStream for TestByteStream {
    type Error = crate::Error;

    fn poll_next_chunk(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<Bytes>, Self::Error>> {
        let this = self.get_mut();

        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;

            if let PresetFailure::AfterChunks { chunks } = this.failure {
                if this.delivered >= chunks {
                    return Poll::Ready(Err(Error {
                        message: "connection reset",
                        kind: ErrorKind::Unavailable,
                    }));
                }
            }

            let Some(chunk) = this.chunks.pop_front() else {
                if this.failure == PresetFailure::Stall {
                    // Never woken up again, the reader has to give up.
                    return Poll::Pending;
                }
                return Poll::Ready(Ok(None));
            };
            this.delivered += 1;
            return Poll::Ready(Ok(Some(chunk)));
        }
        this.sleep = Some(Box::pin(sleep(this.delay)));
        Pin::new(this).poll_next_chunk(cx)
    }
}

/// A local scripted backend for testing purpose.
///
/// Each request consumes the next [`PresetResponse`] in the script, in the
/// order they were added. If the script is exhausted, the request fails.
/// All requests are recorded so tests can inspect what the client sent.
///
/// Clones share the same script and request log.
#[derive(Clone, Default)]
pub struct TestBackend {
    script: Arc<Mutex<VecDeque<PresetResponse>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
    delay: Option<Duration>,
}

impl TestBackend {
    #[inline]
    pub fn add_response(&self, preset: PresetResponse) {
        lock(&self.script).push_back(preset);
    }

    /// Sets how long each body chunk takes to arrive. Defaults to 1ms.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns the requests received so far.
    #[inline]
    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.requests).clone()
    }
}

impl Debug for TestBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestBackend")
            .field("pending_responses", &lock(&self.script).len())
            .field("delay", &self.delay)
            .finish()
    }
}

impl ChatBackend for TestBackend {
    type Error = crate::Error;
    type Stream = TestByteStream;

    fn send_request(
        &self,
        req: &ChatRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static
    {
        lock(&self.requests).push(req.clone());

        let result = match lock(&self.script).pop_front() {
            None => Err(Error {
                message: "no enough responses",
                kind: ErrorKind::RateLimitExceeded,
            }),
            Some(preset) if preset.failure == PresetFailure::OnSend => {
                Err(Error {
                    message: "request rejected",
                    kind: ErrorKind::Unavailable,
                })
            }
            Some(preset) => Ok(TestByteStream {
                chunks: preset.chunks.into_iter().map(Bytes::from).collect(),
                failure: preset.failure,
                delivered: 0,
                delay: self.delay.unwrap_or(Duration::from_millis(1)),
                sleep: None,
            }),
        };
        ready(result)
    }
}

#[inline]
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
