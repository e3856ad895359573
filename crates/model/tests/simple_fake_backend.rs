use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::future::{poll_fn, ready};
use std::pin::Pin;
use std::task::{self, Poll, ready};
use std::time::Duration;

use bytes::Bytes;
use chatroom_model::{
    BackendError, ByteStream, ChatBackend, ChatRequest, ErrorKind,
    HistoryEntry, Role,
};
use tokio::time::{Sleep, sleep};

#[derive(Debug)]
struct FakeBackendError(ErrorKind);

impl Display for FakeBackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Error for FakeBackendError {}

impl BackendError for FakeBackendError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

#[derive(Debug)]
struct FakeByteStream {
    fake_chunks: VecDeque<Bytes>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl FakeByteStream {
    fn new(input: &str) -> Self {
        let body = format!("data: {{\"content\":\"You said {input}\"}}\n\ndata: [DONE]\n\n");
        // Deliver the body three bytes at a time, like a stingy network.
        let fake_chunks = body
            .as_bytes()
            .chunks(3)
            .map(Bytes::copy_from_slice)
            .collect();
        Self {
            fake_chunks,
            sleep: None,
        }
    }
}

impl ByteStream for FakeByteStream {
    type Error = FakeBackendError;

    fn poll_next_chunk(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<Bytes>, Self::Error>> {
        let this = self.get_mut();
        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;
            return Poll::Ready(Ok(this.fake_chunks.pop_front()));
        }
        this.sleep = Some(Box::pin(sleep(Duration::from_millis(1))));
        Pin::new(this).poll_next_chunk(cx)
    }
}

struct FakeBackend;

impl ChatBackend for FakeBackend {
    type Error = FakeBackendError;
    type Stream = FakeByteStream;

    fn send_request(
        &self,
        req: &ChatRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static
    {
        let result = if req.prompt.is_empty() {
            Err(FakeBackendError(ErrorKind::Other))
        } else {
            Ok(FakeByteStream::new(&req.prompt))
        };
        ready(result)
    }
}

#[tokio::test]
async fn test_stream_body() {
    let backend = FakeBackend;
    let req = ChatRequest {
        prompt: "Good morning".to_owned(),
        history: vec![HistoryEntry {
            role: Role::User,
            content: "Hi".to_owned(),
        }],
    };
    let mut stream = backend.send_request(&req).await.unwrap();

    let mut body = Vec::new();
    while let Some(chunk) =
        poll_fn(|cx| Pin::new(&mut stream).poll_next_chunk(cx))
            .await
            .unwrap()
    {
        assert!(chunk.len() <= 3);
        body.extend_from_slice(&chunk);
    }

    assert_eq!(
        String::from_utf8(body).unwrap(),
        "data: {\"content\":\"You said Good morning\"}\n\ndata: [DONE]\n\n"
    );
}

#[tokio::test]
async fn test_error() {
    let backend = FakeBackend;
    let req = ChatRequest {
        prompt: String::new(),
        history: vec![],
    };
    let err = backend.send_request(&req).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Other);
}
