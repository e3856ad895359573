use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::io;
use std::path::PathBuf;

use crate::conversation::{ConversationId, ConversationMeta, MessageLog};

/// Errors that can occur while reading or writing persisted state.
#[derive(Debug)]
pub enum StorageError {
    /// File I/O error.
    Io(io::Error),
    /// A value could not be serialized.
    Serialize(serde_json::Error),
    /// A stored record could not be parsed. The record has been
    /// discarded.
    Corrupted {
        /// Where the record was stored.
        location: PathBuf,
        /// Why parsing failed.
        source: serde_json::Error,
    },
}

impl Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "I/O error: {e}"),
            StorageError::Serialize(e) => write!(f, "serialization error: {e}"),
            StorageError::Corrupted { location, source } => {
                write!(f, "corrupted record {}: {source}", location.display())
            }
        }
    }
}

impl StdError for StorageError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            StorageError::Io(e) => Some(e),
            StorageError::Serialize(e) => Some(e),
            StorageError::Corrupted { source, .. } => Some(source),
        }
    }
}

impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self {
        StorageError::Io(e)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialize(e)
    }
}

/// Durable home of conversations.
///
/// Records are keyed by conversation id: one for the metadata and one
/// for the message log of each conversation, plus a single record for
/// the active pointer.
///
/// Implementations must tolerate corrupted records: a record that cannot
/// be parsed is removed, and reported either by leaving it out
/// ([`Storage::load_metas`], [`Storage::load_active`]) or by returning
/// [`StorageError::Corrupted`] ([`Storage::load_log`]).
pub trait Storage: Send {
    /// Loads the metadata of every stored conversation, newest first.
    fn load_metas(&mut self) -> Result<Vec<ConversationMeta>, StorageError>;

    /// Loads a conversation's messages, `None` if none were stored.
    fn load_log(
        &mut self,
        id: ConversationId,
    ) -> Result<Option<MessageLog>, StorageError>;

    /// Loads the id of the conversation that was active last.
    fn load_active(&mut self) -> Result<Option<ConversationId>, StorageError>;

    /// Stores a conversation's metadata, replacing the previous record.
    fn save_meta(&mut self, meta: &ConversationMeta) -> Result<(), StorageError>;

    /// Stores a conversation's messages, replacing the previous record.
    fn save_log(
        &mut self,
        id: ConversationId,
        log: &MessageLog,
    ) -> Result<(), StorageError>;

    /// Stores the active pointer.
    fn save_active(
        &mut self,
        active: Option<ConversationId>,
    ) -> Result<(), StorageError>;

    /// Removes every record of a conversation. Removing an unknown
    /// conversation is not an error.
    fn remove(&mut self, id: ConversationId) -> Result<(), StorageError>;
}

/// Orders conversations newest first.
pub(crate) fn sort_newest_first(metas: &mut [ConversationMeta]) {
    metas.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}
