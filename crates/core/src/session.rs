//! One request/response cycle against the backend.

use chatroom_model::ChatRequest;

use crate::TransportError;
use crate::backend_client::BackendClient;
use crate::frame::{Frame, parse_frame};
use crate::io::FrameReader;

/// The text appended to an answer when the backend fails.
pub(crate) const APOLOGY: &str =
    "Sorry, something went wrong while talking to the model.";

/// Where a conversation's session currently is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No session has run yet.
    #[default]
    Idle,
    /// Waiting for the backend to accept the request.
    Sending,
    /// Receiving the answer.
    Streaming,
    /// Splitting the complete answer into thinking and result.
    Finalizing,
    /// The last session is over, whatever its outcome.
    Done,
    /// The backend failed. The apology is being recorded.
    Errored,
}

impl SessionState {
    /// Returns `true` if another prompt must not be submitted yet.
    #[inline]
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            SessionState::Sending
                | SessionState::Streaming
                | SessionState::Finalizing
                | SessionState::Errored
        )
    }
}

/// How a session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The answer was received and finalized.
    Completed,
    /// The backend failed. An apology was appended to the answer.
    Errored(TransportError),
    /// The session was aborted. The partial answer was kept as is.
    Cancelled,
}

/// Progress reported by [`run_session`].
#[derive(Debug)]
pub(crate) enum SessionEvent {
    /// The backend accepted the request.
    Streaming,
    Delta(String),
    /// The answer is complete.
    Finished,
    Failed(TransportError),
}

/// Sends `req` and reports the answer as it arrives.
///
/// Exactly one of [`SessionEvent::Finished`] and [`SessionEvent::Failed`]
/// is reported last, unless the future is dropped first.
pub(crate) async fn run_session(
    backend: BackendClient,
    req: ChatRequest,
    mut report: impl FnMut(SessionEvent),
) {
    let stream = match backend.send_request(req).await {
        Ok(stream) => stream,
        Err(err) => {
            report(SessionEvent::Failed(err));
            return;
        }
    };
    report(SessionEvent::Streaming);

    let mut reader = FrameReader::new(stream);
    loop {
        let line = match reader.next_frame().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("body ended without end marker");
                break;
            }
            Err(err) => {
                report(SessionEvent::Failed(err));
                return;
            }
        };
        trace!("got a frame: {line:?}");

        match parse_frame(&line) {
            Some(Frame::Delta(text)) => report(SessionEvent::Delta(text)),
            Some(Frame::EndOfStream) => break,
            Some(Frame::Malformed(payload)) => {
                warn!("dropping malformed frame: {payload}");
            }
            None => {}
        }
    }
    report(SessionEvent::Finished);
}
