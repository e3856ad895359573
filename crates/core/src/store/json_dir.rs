use std::fs::{self, File};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::storage::{Storage, StorageError, sort_newest_first};
use crate::conversation::{ConversationId, ConversationMeta, MessageLog};

const META_DIR: &str = "meta";
const LOGS_DIR: &str = "logs";
const ACTIVE_FILE: &str = "active.json";

/// Stores conversations as JSON files under a root directory:
///
/// ```text
/// <root>/meta/<id>.json   conversation metadata
/// <root>/logs/<id>.json   conversation messages
/// <root>/active.json      the active pointer
/// ```
///
/// Every write goes to a temporary file first, which is then renamed
/// over the target, so a crash never leaves a half-written record.
#[derive(Clone, Debug)]
pub struct JsonDirStorage {
    root: PathBuf,
}

impl JsonDirStorage {
    /// Opens the storage at `root`, creating the directories if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(root.join(META_DIR))?;
        fs::create_dir_all(root.join(LOGS_DIR))?;
        debug!("opened storage at {}", root.display());
        Ok(Self { root })
    }

    /// Returns the root directory.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn meta_path(&self, id: ConversationId) -> PathBuf {
        self.root.join(META_DIR).join(format!("{id}.json"))
    }

    fn log_path(&self, id: ConversationId) -> PathBuf {
        self.root.join(LOGS_DIR).join(format!("{id}.json"))
    }

    fn active_path(&self) -> PathBuf {
        self.root.join(ACTIVE_FILE)
    }
}

/// Reads and parses a record. A record that fails to parse is deleted.
fn read_record<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    match serde_json::from_str(&content) {
        Ok(value) => Ok(Some(value)),
        Err(source) => {
            remove_if_exists(path)?;
            Err(StorageError::Corrupted {
                location: path.to_owned(),
                source,
            })
        }
    }
}

fn write_record<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    let json = serde_json::to_vec_pretty(value)?;

    let mut tmp_path = path.as_os_str().to_owned();
    tmp_path.push(".tmp");
    let tmp_path = PathBuf::from(tmp_path);

    let mut tmp_file = File::create(&tmp_path)?;
    tmp_file.write_all(&json)?;
    tmp_file.sync_all()?;
    drop(tmp_file);

    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<(), StorageError> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err.into()),
        _ => Ok(()),
    }
}

impl Storage for JsonDirStorage {
    fn load_metas(&mut self) -> Result<Vec<ConversationMeta>, StorageError> {
        let mut metas = Vec::new();
        for entry in fs::read_dir(self.root.join(META_DIR))? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match read_record::<ConversationMeta>(&path) {
                Ok(Some(meta)) => metas.push(meta),
                Ok(None) => {}
                Err(err @ StorageError::Corrupted { .. }) => {
                    warn!("discarding conversation: {err}");
                    // Without its metadata the log is unreachable.
                    let id = path
                        .file_stem()
                        .and_then(|stem| stem.to_str())
                        .and_then(|stem| stem.parse().ok());
                    if let Some(id) = id {
                        remove_if_exists(&self.log_path(id))?;
                    }
                }
                Err(err) => return Err(err),
            }
        }
        sort_newest_first(&mut metas);
        Ok(metas)
    }

    fn load_log(
        &mut self,
        id: ConversationId,
    ) -> Result<Option<MessageLog>, StorageError> {
        read_record(&self.log_path(id))
    }

    fn load_active(&mut self) -> Result<Option<ConversationId>, StorageError> {
        match read_record::<Option<ConversationId>>(&self.active_path()) {
            Ok(active) => Ok(active.flatten()),
            Err(err @ StorageError::Corrupted { .. }) => {
                warn!("discarding active pointer: {err}");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn save_meta(&mut self, meta: &ConversationMeta) -> Result<(), StorageError> {
        write_record(&self.meta_path(meta.id), meta)
    }

    fn save_log(
        &mut self,
        id: ConversationId,
        log: &MessageLog,
    ) -> Result<(), StorageError> {
        write_record(&self.log_path(id), log)
    }

    fn save_active(
        &mut self,
        active: Option<ConversationId>,
    ) -> Result<(), StorageError> {
        write_record(&self.active_path(), &active)
    }

    fn remove(&mut self, id: ConversationId) -> Result<(), StorageError> {
        remove_if_exists(&self.meta_path(id))?;
        remove_if_exists(&self.log_path(id))
    }
}
