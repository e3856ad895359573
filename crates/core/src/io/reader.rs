use std::collections::VecDeque;
use std::future::poll_fn;
use std::pin::Pin;

use chatroom_model::ByteStream;

use super::LineDecoder;

/// A type for reading frames from a response body lazily.
///
/// Chunks are only pulled from the body when no decoded frame is
/// waiting, so a reader that is dropped halfway leaves the rest of the
/// body unread.
pub struct FrameReader<S: ?Sized> {
    stream: Pin<Box<S>>,
    decoder: LineDecoder,
    ready: VecDeque<String>,
    exhausted: bool,
}

impl<S: ByteStream + ?Sized> FrameReader<S> {
    /// Creates a reader over the given body.
    #[inline]
    pub fn new(stream: Pin<Box<S>>) -> Self {
        Self {
            stream,
            decoder: LineDecoder::new(),
            ready: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Returns the next complete frame, or `None` once the body is
    /// exhausted and every frame has been returned.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. No frame is lost if the returned
    /// future is dropped before completion.
    pub async fn next_frame(&mut self) -> Result<Option<String>, S::Error> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(Some(frame));
            }
            if self.exhausted {
                return Ok(None);
            }

            let chunk =
                poll_fn(|cx| self.stream.as_mut().poll_next_chunk(cx)).await?;
            match chunk {
                Some(bytes) => {
                    trace!("decoding {} bytes", bytes.len());
                    self.ready.extend(self.decoder.push(&bytes));
                }
                None => {
                    self.exhausted = true;
                    self.ready.extend(self.decoder.finish());
                }
            }
        }
    }
}
