//! Pure state transitions over message logs.

use std::sync::Arc;

use crate::conversation::{Message, MessageLog, Role};
use crate::extract::{Extracted, extract};

/// An operation on a message log.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LogOp {
    /// Adds a complete message at the end.
    Append(Role, String),
    /// Extends the text of the trailing assistant message.
    Delta(String),
    /// Splits every assistant message into thinking and result.
    Finalize,
    /// Removes all messages.
    Clear,
}

/// Applies `op` to `log` and returns the resulting log.
///
/// The input is left untouched. When the operation changes nothing, the
/// returned value is the same snapshot (see [`MessageLog::ptr_eq`]).
pub fn reduce(log: &MessageLog, op: LogOp) -> MessageLog {
    match op {
        LogOp::Append(role, text) => {
            let mut messages = log.shared().to_vec();
            messages.push(Arc::new(Message::new(role, text)));
            MessageLog::from_shared(messages)
        }
        LogOp::Delta(text) => {
            let Some(last) = log.last() else {
                return log.clone();
            };
            if last.role != Role::Assistant || text.is_empty() {
                return log.clone();
            }
            let mut grown = last.clone();
            grown.raw.push_str(&text);

            let mut messages = log.shared().to_vec();
            let last_idx = messages.len() - 1;
            messages[last_idx] = Arc::new(grown);
            MessageLog::from_shared(messages)
        }
        LogOp::Finalize => finalize(log),
        LogOp::Clear => {
            if log.is_empty() {
                log.clone()
            } else {
                MessageLog::default()
            }
        }
    }
}

fn finalize(log: &MessageLog) -> MessageLog {
    let pending = |msg: &Message| msg.role == Role::Assistant && !msg.is_finalized();
    if !log.iter().any(pending) {
        return log.clone();
    }

    let messages = log
        .shared()
        .iter()
        .map(|msg| {
            if !pending(msg) {
                return Arc::clone(msg);
            }
            let Extracted { thinking, result } = extract(&msg.raw);
            Arc::new(Message {
                role: msg.role,
                raw: msg.raw.clone(),
                thinking,
                result: Some(result),
            })
        })
        .collect();
    MessageLog::from_shared(messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_of(messages: &[(Role, &str)]) -> MessageLog {
        messages
            .iter()
            .map(|(role, raw)| Message::new(*role, *raw))
            .collect()
    }

    #[test]
    fn test_append() {
        let log = MessageLog::default();
        let log = reduce(&log, LogOp::Append(Role::User, "Hi".to_owned()));
        let log = reduce(&log, LogOp::Append(Role::Assistant, String::new()));
        assert_eq!(log, log_of(&[(Role::User, "Hi"), (Role::Assistant, "")]));
        assert!(!log.last().unwrap().is_finalized());
    }

    #[test]
    fn test_delta_grows_last_assistant() {
        let before = log_of(&[(Role::User, "Hi"), (Role::Assistant, "He")]);
        let after = reduce(&before, LogOp::Delta("llo".to_owned()));

        assert_eq!(after.last().unwrap().raw(), "Hello");
        // The old snapshot is still intact.
        assert_eq!(before.last().unwrap().raw(), "He");
        // The untouched message is shared rather than copied.
        assert!(Arc::ptr_eq(&before.shared()[0], &after.shared()[0]));
    }

    #[test]
    fn test_delta_noop() {
        let empty = MessageLog::default();
        assert!(reduce(&empty, LogOp::Delta("x".to_owned())).ptr_eq(&empty));

        let user_last = log_of(&[(Role::Assistant, "a"), (Role::User, "b")]);
        let after = reduce(&user_last, LogOp::Delta("x".to_owned()));
        assert!(after.ptr_eq(&user_last));
        assert_eq!(after, log_of(&[(Role::Assistant, "a"), (Role::User, "b")]));
    }

    #[test]
    fn test_finalize() {
        let log = log_of(&[
            (Role::User, "<think>not mine</think>Q"),
            (Role::Assistant, "<think>A</think>B"),
            (Role::Assistant, " plain "),
        ]);
        let log = reduce(&log, LogOp::Finalize);

        let user = log.get(0).unwrap();
        assert_eq!(user.thinking(), None);
        assert_eq!(user.result(), None);

        let first = log.get(1).unwrap();
        assert_eq!(first.thinking(), Some("A"));
        assert_eq!(first.result(), Some("B"));
        assert_eq!(first.raw(), "<think>A</think>B");

        let second = log.get(2).unwrap();
        assert_eq!(second.thinking(), None);
        assert_eq!(second.result(), Some("plain"));
    }

    #[test]
    fn test_finalize_idempotent() {
        let log = log_of(&[
            (Role::User, "Q"),
            (Role::Assistant, "<think> </think>Answer<think>x</think>"),
        ]);
        let once = reduce(&log, LogOp::Finalize);
        let twice = reduce(&once, LogOp::Finalize);

        assert!(twice.ptr_eq(&once));
        assert_eq!(twice, once);
        let msg = twice.last().unwrap();
        assert_eq!(msg.thinking(), None);
        assert_eq!(msg.result(), Some("Answer<think>x</think>"));
    }

    #[test]
    fn test_finalize_keeps_earlier_results() {
        let log = log_of(&[(Role::User, "Q1"), (Role::Assistant, "A1")]);
        let log = reduce(&log, LogOp::Finalize);
        let first_answer = Arc::clone(&log.shared()[1]);

        let log = reduce(&log, LogOp::Append(Role::User, "Q2".to_owned()));
        let log = reduce(&log, LogOp::Append(Role::Assistant, String::new()));
        let log = reduce(&log, LogOp::Delta("A2".to_owned()));
        let log = reduce(&log, LogOp::Finalize);

        assert!(Arc::ptr_eq(&first_answer, &log.shared()[1]));
        assert_eq!(log.last().unwrap().result(), Some("A2"));
    }

    #[test]
    fn test_clear() {
        let log = log_of(&[(Role::User, "Q")]);
        assert!(reduce(&log, LogOp::Clear).is_empty());

        let empty = MessageLog::default();
        assert!(reduce(&empty, LogOp::Clear).ptr_eq(&empty));
    }
}
