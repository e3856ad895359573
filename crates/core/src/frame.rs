//! Interpreting single event-stream lines.

use serde::Deserialize;

/// The prefix of lines that carry an event payload.
pub const EVENT_MARKER: &str = "data:";

/// The payload announcing that the response is complete.
pub const DONE_SENTINEL: &str = "[DONE]";

/// What a single event line means.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Frame {
    /// A piece of the assistant's answer.
    Delta(String),
    /// The backend has finished the response.
    EndOfStream,
    /// An event whose payload could not be understood. Carries the
    /// payload as received.
    Malformed(String),
}

#[derive(Deserialize)]
struct Payload {
    content: Option<String>,
    error: Option<String>,
}

/// Parses one line of the event stream.
///
/// Returns `None` for lines that are not events (comments, other
/// fields). Never fails: payloads that cannot be parsed are reported as
/// [`Frame::Malformed`].
pub fn parse_frame(line: &str) -> Option<Frame> {
    let payload = line.strip_prefix(EVENT_MARKER)?.trim();
    if payload == DONE_SENTINEL {
        return Some(Frame::EndOfStream);
    }

    let frame = match serde_json::from_str::<Payload>(payload) {
        Ok(Payload {
            content: Some(content),
            ..
        }) if !content.is_empty() => Frame::Delta(content),
        Ok(Payload {
            error: Some(error), ..
        }) => {
            warn!("backend reported an error: {error}");
            Frame::Malformed(payload.to_owned())
        }
        Ok(_) => Frame::Malformed(payload.to_owned()),
        Err(err) => {
            debug!("invalid event payload: {err}");
            Frame::Malformed(payload.to_owned())
        }
    };
    Some(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta() {
        assert_eq!(
            parse_frame(r#"data: {"content":"He"}"#),
            Some(Frame::Delta("He".to_owned()))
        );
        // Whitespace inside the content is kept.
        assert_eq!(
            parse_frame(r#"data:   {"content":" llo\n", "extra": 1}  "#),
            Some(Frame::Delta(" llo\n".to_owned()))
        );
        assert_eq!(
            parse_frame(r#"data:{"content":"x"}"#),
            Some(Frame::Delta("x".to_owned()))
        );
    }

    #[test]
    fn test_end_of_stream() {
        assert_eq!(parse_frame("data: [DONE]"), Some(Frame::EndOfStream));
        assert_eq!(parse_frame("data: [DONE]  "), Some(Frame::EndOfStream));
    }

    #[test]
    fn test_malformed() {
        assert_eq!(
            parse_frame("data: {not json}"),
            Some(Frame::Malformed("{not json}".to_owned()))
        );
        assert_eq!(
            parse_frame(r#"data: {"content":""}"#),
            Some(Frame::Malformed(r#"{"content":""}"#.to_owned()))
        );
        assert_eq!(
            parse_frame(r#"data: {"content":42}"#),
            Some(Frame::Malformed(r#"{"content":42}"#.to_owned()))
        );
        assert_eq!(
            parse_frame(r#"data: {"error":"Failed to communicate with Ollama"}"#),
            Some(Frame::Malformed(
                r#"{"error":"Failed to communicate with Ollama"}"#.to_owned()
            ))
        );
        assert_eq!(parse_frame("data:"), Some(Frame::Malformed(String::new())));
    }

    #[test]
    fn test_ignored_lines() {
        assert_eq!(parse_frame(": keep-alive"), None);
        assert_eq!(parse_frame("event: message"), None);
        assert_eq!(parse_frame(r#"{"content":"no marker"}"#), None);
    }
}
