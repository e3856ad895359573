//! The conversation store and its persistence.

mod json_dir;
mod memory;
mod storage;

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt::{self, Display};

use chrono::Utc;

pub use json_dir::JsonDirStorage;
pub use memory::MemoryStorage;
pub use storage::{Storage, StorageError};

use crate::conversation::{
    ConversationId, ConversationMeta, MessageLog, Role,
};
use crate::reducer::{LogOp, reduce};

const PREVIEW_MAX_CHARS: usize = 120;

/// Returned when an operation names a conversation that does not exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UnknownConversation(pub ConversationId);

impl Display for UnknownConversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown conversation {}", self.0)
    }
}

impl StdError for UnknownConversation {}

/// All conversations of a client, and which one is active.
///
/// Every change is written to the [`Storage`] right after it is applied
/// in memory. Storage failures are logged and otherwise ignored: the
/// in-memory state stays authoritative for the running process.
///
/// Writes are synchronous and happen on the caller's thread, including
/// one full log write per streamed delta. With [`JsonDirStorage`] each of
/// them is flushed to disk before the next change is applied, so a crash
/// loses at most the delta being written.
///
/// Operations without a conversation id act on the active conversation
/// and do nothing when there is none. Mutations return the new message
/// log when they changed something.
pub struct ConversationStore {
    storage: Box<dyn Storage>,
    // Newest first.
    metas: Vec<ConversationMeta>,
    // Only conversations that have been looked at are loaded.
    logs: HashMap<ConversationId, MessageLog>,
    active: Option<ConversationId>,
}

impl ConversationStore {
    /// Opens a store over `storage`, loading every conversation's
    /// metadata and the active conversation's messages.
    ///
    /// Never fails: unreadable state is logged and skipped.
    #[inline]
    pub fn open<S: Storage + 'static>(storage: S) -> Self {
        Self::open_boxed(Box::new(storage))
    }

    pub(crate) fn open_boxed(mut storage: Box<dyn Storage>) -> Self {
        let metas = storage.load_metas().unwrap_or_else(|err| {
            error!("failed to load conversations: {err}");
            Vec::new()
        });
        let stored_active = storage.load_active().unwrap_or_else(|err| {
            error!("failed to load active conversation: {err}");
            None
        });
        let active = stored_active
            .filter(|id| metas.iter().any(|m| m.id == *id))
            .or_else(|| metas.first().map(|m| m.id));
        debug!(
            "loaded {} conversations, active: {active:?}",
            metas.len()
        );

        let mut store = Self {
            storage,
            metas,
            logs: HashMap::new(),
            active,
        };
        if let Some(id) = active {
            store.ensure_loaded(id);
        }
        if active != stored_active {
            store.persist_active();
        }
        store
    }

    /// Returns every conversation, newest first.
    #[inline]
    pub fn conversations(&self) -> &[ConversationMeta] {
        &self.metas
    }

    /// Returns a conversation's metadata.
    #[inline]
    pub fn meta(&self, id: ConversationId) -> Option<&ConversationMeta> {
        self.metas.iter().find(|m| m.id == id)
    }

    /// Returns the active conversation's id.
    #[inline]
    pub fn active_id(&self) -> Option<ConversationId> {
        self.active
    }

    /// Returns the active conversation's messages.
    #[inline]
    pub fn active_log(&self) -> Option<&MessageLog> {
        self.logs.get(&self.active?)
    }

    /// Returns a conversation's messages, loading them if needed.
    pub fn log(&mut self, id: ConversationId) -> Option<&MessageLog> {
        self.ensure_loaded(id)?;
        self.logs.get(&id)
    }

    /// Creates an empty conversation and makes it active.
    pub fn create(&mut self) -> ConversationId {
        let now = Utc::now();
        let meta = ConversationMeta {
            id: ConversationId::new(),
            name: format!("New Chat {}", self.metas.len() + 1),
            preview: None,
            created_at: now,
            updated_at: now,
        };
        let id = meta.id;
        debug!("created conversation {id}");

        let log = MessageLog::default();
        persist("save log", self.storage.save_log(id, &log));
        persist("save meta", self.storage.save_meta(&meta));
        self.metas.insert(0, meta);
        self.logs.insert(id, log);
        self.active = Some(id);
        self.persist_active();
        id
    }

    /// Makes `id` the active conversation.
    pub fn select(&mut self, id: ConversationId) -> Result<(), UnknownConversation> {
        self.ensure_loaded(id).ok_or(UnknownConversation(id))?;
        if self.active != Some(id) {
            self.active = Some(id);
            self.persist_active();
        }
        Ok(())
    }

    /// Deletes a conversation with all of its messages.
    ///
    /// If it was active, the first remaining conversation becomes active,
    /// or none if there is no conversation left.
    pub fn delete(&mut self, id: ConversationId) -> Result<(), UnknownConversation> {
        let idx = self
            .metas
            .iter()
            .position(|m| m.id == id)
            .ok_or(UnknownConversation(id))?;
        self.metas.remove(idx);
        self.logs.remove(&id);
        persist("remove conversation", self.storage.remove(id));
        debug!("deleted conversation {id}");

        if self.active == Some(id) {
            self.active = self.metas.first().map(|m| m.id);
            if let Some(next) = self.active {
                self.ensure_loaded(next);
            }
            self.persist_active();
        }
        Ok(())
    }

    /// Changes a conversation's display name.
    pub fn rename(
        &mut self,
        id: ConversationId,
        name: impl Into<String>,
    ) -> Result<(), UnknownConversation> {
        let meta = self
            .metas
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(UnknownConversation(id))?;
        meta.name = name.into();
        persist("save meta", self.storage.save_meta(meta));
        Ok(())
    }

    /// Appends a complete message to the active conversation.
    pub fn append(&mut self, role: Role, text: impl Into<String>) -> Option<MessageLog> {
        self.append_to(self.active?, role, text)
    }

    /// Extends the trailing assistant message of the active conversation.
    pub fn apply_delta(&mut self, text: &str) -> Option<MessageLog> {
        self.apply_delta_to(self.active?, text)
    }

    /// Finalizes the assistant messages of the active conversation.
    pub fn finalize(&mut self) -> Option<MessageLog> {
        self.finalize_conversation(self.active?)
    }

    /// Removes every message of the active conversation.
    pub fn clear(&mut self) -> Option<MessageLog> {
        self.apply(self.active?, LogOp::Clear)
    }

    /// Appends a complete message to the given conversation.
    pub fn append_to(
        &mut self,
        id: ConversationId,
        role: Role,
        text: impl Into<String>,
    ) -> Option<MessageLog> {
        self.apply(id, LogOp::Append(role, text.into()))
    }

    /// Extends the trailing assistant message of the given conversation.
    pub fn apply_delta_to(&mut self, id: ConversationId, text: &str) -> Option<MessageLog> {
        self.apply(id, LogOp::Delta(text.to_owned()))
    }

    /// Finalizes the assistant messages of the given conversation.
    pub fn finalize_conversation(&mut self, id: ConversationId) -> Option<MessageLog> {
        self.apply(id, LogOp::Finalize)
    }

    fn apply(&mut self, id: ConversationId, op: LogOp) -> Option<MessageLog> {
        let old = self.ensure_loaded(id)?.clone();
        trace!("applying {op:?} to {id}");
        let new = reduce(&old, op);
        if new.ptr_eq(&old) {
            return None;
        }
        self.logs.insert(id, new.clone());
        persist("save log", self.storage.save_log(id, &new));

        if let Some(meta) = self.metas.iter_mut().find(|m| m.id == id) {
            meta.preview = preview_of(&new);
            meta.updated_at = Utc::now();
            persist("save meta", self.storage.save_meta(meta));
        }
        Some(new)
    }

    fn ensure_loaded(&mut self, id: ConversationId) -> Option<&MessageLog> {
        if !self.metas.iter().any(|m| m.id == id) {
            return None;
        }
        if !self.logs.contains_key(&id) {
            let log = match self.storage.load_log(id) {
                Ok(log) => log.unwrap_or_default(),
                Err(err) => {
                    warn!("discarding messages of {id}: {err}");
                    MessageLog::default()
                }
            };
            self.logs.insert(id, log);
        }
        self.logs.get(&id)
    }

    fn persist_active(&mut self) {
        persist("save active", self.storage.save_active(self.active));
    }
}

#[inline]
fn persist(what: &str, result: Result<(), StorageError>) {
    if let Err(err) = result {
        error!("failed to {what}: {err}");
    }
}

fn preview_of(log: &MessageLog) -> Option<String> {
    log.iter()
        .rev()
        .filter(|m| m.role() == Role::Assistant)
        .map(|m| m.content().trim())
        .find(|text| !text.is_empty())
        .map(|text| text.chars().take(PREVIEW_MAX_CHARS).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_memory() -> (ConversationStore, MemoryStorage) {
        let storage = MemoryStorage::new();
        (ConversationStore::open(storage.clone()), storage)
    }

    #[test]
    fn test_create() {
        let (mut store, _) = open_memory();
        assert_eq!(store.active_id(), None);
        assert!(store.append(Role::User, "nobody listens").is_none());

        let first = store.create();
        let second = store.create();
        assert_eq!(store.active_id(), Some(second));
        assert!(store.active_log().unwrap().is_empty());

        let names: Vec<_> =
            store.conversations().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["New Chat 2", "New Chat 1"]);
        assert_eq!(store.conversations()[1].id, first);
    }

    #[test]
    fn test_turn_scoped_to_active() {
        let (mut store, _) = open_memory();
        let first = store.create();
        let second = store.create();

        store.append(Role::User, "Hi").unwrap();
        store.append(Role::Assistant, "").unwrap();
        store.apply_delta("<think>greet</think>").unwrap();
        let log = store.apply_delta("Hello").unwrap();
        assert_eq!(log.last().unwrap().raw(), "<think>greet</think>Hello");

        let log = store.finalize().unwrap();
        let answer = log.last().unwrap();
        assert_eq!(answer.thinking(), Some("greet"));
        assert_eq!(answer.result(), Some("Hello"));
        assert!(store.finalize().is_none());

        assert!(store.log(first).unwrap().is_empty());
        assert_eq!(store.log(second).unwrap().len(), 2);
    }

    #[test]
    fn test_delta_after_user_message_is_ignored() {
        let (mut store, _) = open_memory();
        store.create();
        assert!(store.apply_delta("x").is_none());
        store.append(Role::User, "Hi").unwrap();
        assert!(store.apply_delta("x").is_none());
        assert_eq!(store.active_log().unwrap().last().unwrap().raw(), "Hi");
    }

    #[test]
    fn test_preview_and_timestamp() {
        let (mut store, _) = open_memory();
        let id = store.create();
        let created = store.meta(id).unwrap().updated_at;

        store.append(Role::User, "Hi").unwrap();
        assert_eq!(store.meta(id).unwrap().preview, None);

        store.append(Role::Assistant, "").unwrap();
        store.apply_delta("<think>hmm</think>  Hello there").unwrap();
        let meta = store.meta(id).unwrap();
        assert_eq!(meta.preview.as_deref(), Some("<think>hmm</think>  Hello there"));
        assert!(meta.updated_at >= created);

        store.finalize().unwrap();
        assert_eq!(store.meta(id).unwrap().preview.as_deref(), Some("Hello there"));

        store.append(Role::Assistant, "x".repeat(500)).unwrap();
        let preview = store.meta(id).unwrap().preview.clone().unwrap();
        assert_eq!(preview.chars().count(), PREVIEW_MAX_CHARS);

        store.clear().unwrap();
        assert_eq!(store.meta(id).unwrap().preview, None);
        assert!(store.active_log().unwrap().is_empty());
    }

    #[test]
    fn test_delete_active_promotes_other() {
        let (mut store, _) = open_memory();
        let other = store.create();
        let active = store.create();

        store.delete(active).unwrap();
        assert_eq!(store.active_id(), Some(other));
        assert!(store.meta(active).is_none());
        assert!(store.log(active).is_none());

        store.delete(other).unwrap();
        assert_eq!(store.active_id(), None);
        assert!(store.active_log().is_none());
        assert_eq!(store.delete(other), Err(UnknownConversation(other)));
    }

    #[test]
    fn test_delete_inactive_keeps_active() {
        let (mut store, _) = open_memory();
        let inactive = store.create();
        let active = store.create();
        store.delete(inactive).unwrap();
        assert_eq!(store.active_id(), Some(active));
    }

    #[test]
    fn test_select_and_rename() {
        let (mut store, _) = open_memory();
        let first = store.create();
        store.create();

        store.select(first).unwrap();
        assert_eq!(store.active_id(), Some(first));

        let unknown = ConversationId::new();
        assert_eq!(store.select(unknown), Err(UnknownConversation(unknown)));
        assert_eq!(store.active_id(), Some(first));

        store.rename(first, "Groceries").unwrap();
        assert_eq!(store.meta(first).unwrap().name, "Groceries");
        assert!(store.rename(unknown, "x").is_err());
    }

    #[test]
    fn test_reload() {
        let storage = MemoryStorage::new();
        let (first, second) = {
            let mut store = ConversationStore::open(storage.clone());
            let first = store.create();
            store.append(Role::User, "Hi").unwrap();
            store.append(Role::Assistant, "").unwrap();
            store.apply_delta("Hel").unwrap();
            let second = store.create();
            store.append(Role::User, "Other").unwrap();
            store.rename(second, "Second").unwrap();
            store.select(first).unwrap();
            (first, second)
        };

        let mut store = ConversationStore::open(storage);
        assert_eq!(store.active_id(), Some(first));
        let ids: Vec<_> = store.conversations().iter().map(|m| m.id).collect();
        assert_eq!(ids, [second, first]);
        assert_eq!(store.meta(second).unwrap().name, "Second");

        // Streaming was interrupted: the partial answer survives as is.
        let log = store.active_log().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.last().unwrap().raw(), "Hel");
        assert!(!log.last().unwrap().is_finalized());

        assert_eq!(store.log(second).unwrap().get(0).unwrap().raw(), "Other");
    }

    #[test]
    fn test_reload_tolerates_corruption() {
        let storage = MemoryStorage::new();
        let id = {
            let mut store = ConversationStore::open(storage.clone());
            let id = store.create();
            store.append(Role::User, "lost").unwrap();
            id
        };
        storage.put_raw_log(id, "[{\"role\":\"user\"");
        let orphan = ConversationId::new();
        storage.put_raw_meta(orphan, "not json");
        storage.put_raw_log(orphan, "[]");

        let mut store = ConversationStore::open(storage.clone());
        assert_eq!(store.conversations().len(), 1);
        assert_eq!(store.active_id(), Some(id));
        assert!(store.active_log().unwrap().is_empty());
        assert!(!storage.has_log(id));
        assert!(!storage.has_log(orphan));

        // The conversation keeps working and is persisted again.
        store.append(Role::User, "again").unwrap();
        assert!(storage.has_log(id));
    }

    #[test]
    fn test_reload_falls_back_to_first_conversation() {
        let storage = MemoryStorage::new();
        let newest = {
            let mut store = ConversationStore::open(storage.clone());
            store.create();
            let newest = store.create();
            let mut storage = storage.clone();
            storage.save_active(Some(ConversationId::new())).unwrap();
            newest
        };
        let store = ConversationStore::open(storage);
        assert_eq!(store.active_id(), Some(newest));
        assert!(store.active_log().is_some());
    }

    #[test]
    fn test_reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let mut store =
                ConversationStore::open(JsonDirStorage::open(dir.path()).unwrap());
            let id = store.create();
            store.append(Role::User, "Hi").unwrap();
            store.append(Role::Assistant, "").unwrap();
            store.apply_delta("<think>x</think>Hello").unwrap();
            store.finalize().unwrap();
            id
        };

        let store = ConversationStore::open(JsonDirStorage::open(dir.path()).unwrap());
        assert_eq!(store.active_id(), Some(id));
        let answer = store.active_log().unwrap().last().unwrap();
        assert_eq!(answer.thinking(), Some("x"));
        assert_eq!(answer.result(), Some("Hello"));
        assert_eq!(store.meta(id).unwrap().preview.as_deref(), Some("Hello"));
    }
}
