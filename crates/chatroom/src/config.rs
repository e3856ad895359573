use std::env;
use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::path::PathBuf;

use chatroom_core::{ChatClientBuilder, JsonDirStorage, StorageError};
use chatroom_http_backend::{
    HttpBackend, HttpBackendConfig, HttpBackendConfigBuilder,
};

/// Errors that can occur while reading the configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// A required variable is not set.
    Missing(&'static str),
    /// The data directory cannot be used.
    Storage(StorageError),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(var) => {
                write!(f, "{var} environment variable is not set")
            }
            ConfigError::Storage(err) => {
                write!(f, "cannot open data directory: {err}")
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Missing(_) => None,
            ConfigError::Storage(err) => Some(err),
        }
    }
}

impl From<StorageError> for ConfigError {
    #[inline]
    fn from(err: StorageError) -> Self {
        ConfigError::Storage(err)
    }
}

/// Settings of the chat room application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    /// URL of the chat endpoint.
    pub endpoint: String,
    /// Where conversations are stored.
    pub data_dir: PathBuf,
}

impl AppConfig {
    /// Variable holding the endpoint URL. Required.
    pub const ENDPOINT_VAR: &'static str = "CHATROOM_ENDPOINT";
    /// Variable holding the data directory.
    pub const DATA_DIR_VAR: &'static str = "CHATROOM_DATA_DIR";
    /// Data directory used when none is configured.
    pub const DEFAULT_DATA_DIR: &'static str = ".chatroom";

    /// Reads the configuration from the process environment.
    #[inline]
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let endpoint = lookup(Self::ENDPOINT_VAR)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing(Self::ENDPOINT_VAR))?;
        let data_dir = lookup(Self::DATA_DIR_VAR)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| Self::DEFAULT_DATA_DIR.to_owned());
        Ok(Self {
            endpoint,
            data_dir: data_dir.into(),
        })
    }

    /// Returns the configuration of the HTTP backend.
    #[inline]
    pub fn backend_config(&self) -> HttpBackendConfig {
        HttpBackendConfigBuilder::with_endpoint(&self.endpoint).build()
    }

    /// Opens the data directory and returns a client builder talking to
    /// the configured endpoint.
    pub fn client_builder(&self) -> Result<ChatClientBuilder, ConfigError> {
        let storage = JsonDirStorage::open(&self.data_dir)?;
        debug!("storing conversations in {}", storage.root().display());
        let backend = HttpBackend::new(self.backend_config());
        Ok(ChatClientBuilder::with_backend(backend).with_storage(storage))
    }
}
