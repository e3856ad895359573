use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;

use super::storage::{Storage, StorageError, sort_newest_first};
use crate::conversation::{ConversationId, ConversationMeta, MessageLog};

#[derive(Debug, Default)]
struct Records {
    metas: HashMap<ConversationId, String>,
    logs: HashMap<ConversationId, String>,
    active: Option<String>,
}

/// Keeps records in memory, serialized exactly like on disk.
///
/// Clones share the same records, so a store can be reopened over the
/// state another store left behind.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    records: Arc<Mutex<Records>>,
}

impl MemoryStorage {
    /// Creates an empty storage.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn records(&self) -> MutexGuard<'_, Records> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    pub(crate) fn put_raw_meta(&self, id: ConversationId, raw: &str) {
        self.records().metas.insert(id, raw.to_owned());
    }

    #[cfg(test)]
    pub(crate) fn put_raw_log(&self, id: ConversationId, raw: &str) {
        self.records().logs.insert(id, raw.to_owned());
    }

    #[cfg(test)]
    pub(crate) fn has_log(&self, id: ConversationId) -> bool {
        self.records().logs.contains_key(&id)
    }
}

fn parse<T: DeserializeOwned>(
    kind: &str,
    id: impl std::fmt::Display,
    raw: &str,
) -> Result<T, StorageError> {
    serde_json::from_str(raw).map_err(|source| StorageError::Corrupted {
        location: PathBuf::from(format!("memory://{kind}/{id}")),
        source,
    })
}

impl Storage for MemoryStorage {
    fn load_metas(&mut self) -> Result<Vec<ConversationMeta>, StorageError> {
        let mut records = self.records();
        let mut metas = Vec::with_capacity(records.metas.len());
        let mut corrupted = Vec::new();
        for (id, raw) in &records.metas {
            match parse::<ConversationMeta>("meta", id, raw) {
                Ok(meta) => metas.push(meta),
                Err(err) => {
                    warn!("discarding conversation: {err}");
                    corrupted.push(*id);
                }
            }
        }
        for id in corrupted {
            records.metas.remove(&id);
            records.logs.remove(&id);
        }
        sort_newest_first(&mut metas);
        Ok(metas)
    }

    fn load_log(
        &mut self,
        id: ConversationId,
    ) -> Result<Option<MessageLog>, StorageError> {
        let mut records = self.records();
        let Some(raw) = records.logs.get(&id) else {
            return Ok(None);
        };
        match parse("logs", id, raw) {
            Ok(log) => Ok(Some(log)),
            Err(err) => {
                records.logs.remove(&id);
                Err(err)
            }
        }
    }

    fn load_active(&mut self) -> Result<Option<ConversationId>, StorageError> {
        let mut records = self.records();
        let Some(raw) = &records.active else {
            return Ok(None);
        };
        match parse("active", "", raw) {
            Ok(active) => Ok(active),
            Err(err) => {
                warn!("discarding active pointer: {err}");
                records.active = None;
                Ok(None)
            }
        }
    }

    fn save_meta(&mut self, meta: &ConversationMeta) -> Result<(), StorageError> {
        let raw = serde_json::to_string(meta)?;
        self.records().metas.insert(meta.id, raw);
        Ok(())
    }

    fn save_log(
        &mut self,
        id: ConversationId,
        log: &MessageLog,
    ) -> Result<(), StorageError> {
        let raw = serde_json::to_string(log)?;
        self.records().logs.insert(id, raw);
        Ok(())
    }

    fn save_active(
        &mut self,
        active: Option<ConversationId>,
    ) -> Result<(), StorageError> {
        let raw = serde_json::to_string(&active)?;
        self.records().active = Some(raw);
        Ok(())
    }

    fn remove(&mut self, id: ConversationId) -> Result<(), StorageError> {
        let mut records = self.records();
        records.metas.remove(&id);
        records.logs.remove(&id);
        Ok(())
    }
}
