//! Conversation-related types.

use std::fmt::{self, Display};
use std::slice;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

pub use chatroom_model::Role;

/// Identifies a conversation.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ConversationId(Uuid);

impl ConversationId {
    /// Generates a new random id.
    #[inline]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl FromStr for ConversationId {
    type Err = uuid::Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A message in the conversation.
///
/// `raw` holds everything received so far. `thinking` and `result` stay
/// empty until the message is finalized, and never change after that.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub(crate) role: Role,
    pub(crate) raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) result: Option<String>,
}

impl Message {
    #[inline]
    pub(crate) fn new(role: Role, raw: impl Into<String>) -> Self {
        Self {
            role,
            raw: raw.into(),
            thinking: None,
            result: None,
        }
    }

    /// Returns who wrote this message.
    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the text accumulated so far.
    #[inline]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Returns the reasoning segment, if the message has one.
    #[inline]
    pub fn thinking(&self) -> Option<&str> {
        self.thinking.as_deref()
    }

    /// Returns the answer without the reasoning segment, once finalized.
    #[inline]
    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    /// Returns `true` once the message went through finalization.
    #[inline]
    pub fn is_finalized(&self) -> bool {
        self.result.is_some()
    }

    /// Returns the finalized result if there is one, the raw text
    /// otherwise.
    #[inline]
    pub fn content(&self) -> &str {
        self.result.as_deref().unwrap_or(&self.raw)
    }
}

/// An immutable snapshot of a conversation's messages.
///
/// Cloning a log is cheap, and producing a new log from an old one
/// shares every message that did not change. Holders of an older
/// snapshot keep seeing exactly what it contained.
#[derive(Clone, Debug, Default)]
pub struct MessageLog {
    messages: Arc<Vec<Arc<Message>>>,
}

impl MessageLog {
    #[inline]
    pub(crate) fn from_shared(messages: Vec<Arc<Message>>) -> Self {
        Self {
            messages: Arc::new(messages),
        }
    }

    #[inline]
    pub(crate) fn shared(&self) -> &[Arc<Message>] {
        &self.messages
    }

    /// Returns the number of messages.
    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if the log has no messages.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns the message at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index).map(AsRef::as_ref)
    }

    /// Returns the most recent message.
    #[inline]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last().map(AsRef::as_ref)
    }

    /// Iterates over the messages, oldest first.
    #[inline]
    pub fn iter(&self) -> Iter<'_> {
        Iter(self.messages.iter())
    }

    /// Returns `true` if both values are the same snapshot.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.messages, &other.messages)
    }
}

impl PartialEq for MessageLog {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.iter().eq(other.iter())
    }
}

impl Eq for MessageLog {}

impl FromIterator<Message> for MessageLog {
    fn from_iter<T: IntoIterator<Item = Message>>(iter: T) -> Self {
        Self::from_shared(iter.into_iter().map(Arc::new).collect())
    }
}

impl<'a> IntoIterator for &'a MessageLog {
    type Item = &'a Message;
    type IntoIter = Iter<'a>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Serialize for MessageLog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for MessageLog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<Message>::deserialize(deserializer).map(MessageLog::from_iter)
    }
}

/// Iterator over the messages of a [`MessageLog`].
#[derive(Clone, Debug)]
pub struct Iter<'a>(slice::Iter<'a, Arc<Message>>);

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Message;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(AsRef::as_ref)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl DoubleEndedIterator for Iter<'_> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        self.0.next_back().map(AsRef::as_ref)
    }
}

impl ExactSizeIterator for Iter<'_> {}

/// Describes a conversation without its messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMeta {
    /// The conversation's identity.
    pub id: ConversationId,
    /// The name shown to the user.
    pub name: String,
    /// A short excerpt of the latest assistant answer.
    #[serde(default)]
    pub preview: Option<String>,
    /// When the conversation was created.
    pub created_at: DateTime<Utc>,
    /// When the conversation's messages last changed.
    pub updated_at: DateTime<Utc>,
}
